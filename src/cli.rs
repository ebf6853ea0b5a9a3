mod tester;

use {
    crate::logger::Logger,
    ::log::Level,
    clap::{Args, Parser, ValueEnum},
    std::path::PathBuf,
};

/// Allocates dma-bufs with Vulkan and checks that their contents survive an
/// export and import.
#[derive(Parser, Debug)]
#[clap(version)]
struct JayAllocator {
    #[clap(flatten)]
    global: GlobalArgs,
    #[clap(flatten)]
    test: TestArgs,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// The log level.
    #[clap(value_enum, long, default_value_t)]
    pub log_level: CliLogLevel,
}

#[derive(Args, Debug)]
pub struct TestArgs {
    /// The kind of bo to test.
    #[clap(value_enum)]
    pub kind: CliBoKind,
    /// The render node of the device to use.
    ///
    /// By default the first device that supports external memory is used.
    pub render_node: Option<PathBuf>,
    /// The alignment that the offsets of image planes must satisfy.
    #[clap(default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub offset_align: u64,
    /// The alignment that the pitches of image planes must satisfy.
    #[clap(default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub pitch_align: u64,
    /// The width of the bo.
    #[clap(long, default_value_t = 300)]
    pub width: u32,
    /// The height of the bo.
    #[clap(long, default_value_t = 300)]
    pub height: u32,
    /// Only test this format.
    ///
    /// The format can be given by name (e.g. nv12) or by fourcc (e.g. NV12).
    #[clap(long)]
    pub format: Option<String>,
    /// Allocate protected memory.
    ///
    /// Protected memory cannot be accessed by the CPU. Requires --no-cpu-access.
    #[clap(long)]
    pub protected: bool,
    /// Create disjoint images.
    #[clap(long)]
    pub disjoint: bool,
    /// Require memory that the CPU can map directly.
    ///
    /// Images are restricted to the linear modifier.
    #[clap(long)]
    pub cpu_direct: bool,
    /// Do not write or verify the contents of the bos.
    #[clap(long)]
    pub no_cpu_access: bool,
    /// The GPU writes to the bos.
    ///
    /// Buffers become storage buffers and images become color attachments.
    #[clap(long)]
    pub gpu_write: bool,
    /// The images are used as cursors. Restricts images to the linear modifier.
    #[clap(long)]
    pub cursor: bool,
    /// The images are written by a camera. Restricts images to the linear modifier.
    #[clap(long)]
    pub camera: bool,
    /// The images are used by a video codec. Restricts images to the linear modifier.
    #[clap(long)]
    pub video: bool,
}

#[derive(ValueEnum, Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum CliBoKind {
    Buffer,
    Image,
}

#[derive(ValueEnum, Debug, Copy, Clone, Hash, Default)]
pub enum CliLogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<CliLogLevel> for Level {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Trace => Level::Trace,
            CliLogLevel::Debug => Level::Debug,
            CliLogLevel::Info => Level::Info,
            CliLogLevel::Warn => Level::Warn,
            CliLogLevel::Error => Level::Error,
        }
    }
}

pub fn main() {
    let logger = Logger::install_stderr(Level::Info);
    let cli = JayAllocator::parse();
    logger.set_level(cli.global.log_level.into());
    tester::main(cli.test);
}
