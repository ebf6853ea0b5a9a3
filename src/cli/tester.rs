use {
    crate::{
        cli::{CliBoKind, TestArgs},
        format::{ABGR16161616F, FORMATS, Format, FourCc, format_by_name},
        utils::errorfmt::ErrorFmt,
        video::LINEAR_MODIFIER,
        vulkan::{
            Alignment, BufferInfo, ImageInfo, MemoryTypes, ModifierProperties, VulkanAllocator,
        },
    },
    ash::vk::{
        self, BufferCreateFlags, BufferUsageFlags, ImageCreateFlags, ImageUsageFlags,
        MemoryPropertyFlags,
    },
    thiserror::Error,
};

#[cfg(test)]
mod tests;

/// How the bos under test are going to be used.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub(super) struct Usage {
    pub(super) buffer: bool,
    pub(super) protected: bool,
    pub(super) disjoint: bool,
    pub(super) cpu_direct: bool,
    pub(super) cpu_read: bool,
    pub(super) cpu_write: bool,
    pub(super) gpu_read: bool,
    pub(super) gpu_write: bool,
    pub(super) display_cursor: bool,
    pub(super) camera: bool,
    pub(super) video: bool,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub(super) enum UsageError {
    #[error("Protected memory cannot be accessed by the CPU")]
    ProtectedCpuAccess,
    #[error("Disjoint buffers do not exist")]
    DisjointBuffer,
}

impl Usage {
    pub(super) fn new(args: &TestArgs) -> Result<Self, UsageError> {
        let cpu_access = !args.no_cpu_access;
        let mut usage = Self {
            buffer: args.kind == CliBoKind::Buffer,
            protected: args.protected,
            disjoint: args.disjoint,
            cpu_direct: args.cpu_direct,
            cpu_read: cpu_access,
            cpu_write: cpu_access,
            gpu_read: true,
            gpu_write: args.gpu_write,
            display_cursor: args.cursor,
            camera: args.camera,
            video: args.video,
        };
        if usage.buffer && usage.disjoint {
            return Err(UsageError::DisjointBuffer);
        }
        if usage.cpu_read || usage.cpu_write {
            if usage.protected {
                return Err(UsageError::ProtectedCpuAccess);
            }
            if usage.buffer {
                usage.cpu_direct = true;
            }
        } else {
            usage.cpu_direct = false;
        }
        Ok(usage)
    }

    /// Returns whether images must use the linear modifier.
    pub(super) fn linear_only(&self) -> bool {
        self.cpu_direct || self.display_cursor || self.camera || self.video
    }

    pub(super) fn memory_flags(&self) -> MemoryPropertyFlags {
        let mut flags = MemoryPropertyFlags::empty();
        if self.protected {
            flags |= MemoryPropertyFlags::PROTECTED;
        }
        if self.cpu_direct {
            flags |= MemoryPropertyFlags::HOST_VISIBLE
                | MemoryPropertyFlags::HOST_COHERENT
                | MemoryPropertyFlags::HOST_CACHED;
        }
        flags
    }

    pub(super) fn buffer_flags(&self) -> BufferCreateFlags {
        let mut flags = BufferCreateFlags::empty();
        if self.protected {
            flags |= BufferCreateFlags::PROTECTED;
        }
        flags
    }

    pub(super) fn buffer_usage(&self) -> BufferUsageFlags {
        let mut usage = BufferUsageFlags::empty();
        if self.gpu_read {
            usage |= BufferUsageFlags::UNIFORM_BUFFER;
        }
        if self.gpu_write {
            usage |= BufferUsageFlags::STORAGE_BUFFER;
        }
        usage
    }

    pub(super) fn image_flags(&self) -> ImageCreateFlags {
        let mut flags = ImageCreateFlags::empty();
        if self.protected {
            flags |= ImageCreateFlags::PROTECTED;
        }
        if self.disjoint {
            flags |= ImageCreateFlags::DISJOINT;
        }
        flags
    }

    /// Images are always accessed through transfers, even if they are linear.
    pub(super) fn image_usage(&self) -> ImageUsageFlags {
        let mut usage = ImageUsageFlags::empty();
        if self.cpu_read {
            usage |= ImageUsageFlags::TRANSFER_SRC;
        }
        if self.cpu_write {
            usage |= ImageUsageFlags::TRANSFER_DST;
        }
        if self.gpu_read {
            usage |= ImageUsageFlags::SAMPLED;
        }
        if self.gpu_write {
            usage |= ImageUsageFlags::COLOR_ATTACHMENT;
        }
        usage
    }
}

#[derive(Debug, Error, Eq, PartialEq)]
pub(super) enum CounterError {
    #[error("Expected at least {expected} bytes but found {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("Dword {index} has value {actual}")]
    Mismatch { index: usize, actual: u32 },
}

/// Returns the number of dwords covered by a plane.
pub(super) fn dword_count(width: u32, height: u32, bpp: u32) -> usize {
    (width as u64 * height as u64 * bpp as u64 / 32) as usize
}

/// Sets the first `count` dwords to their index.
pub(super) fn write_counter(data: &mut [u8], count: usize) -> Result<(), CounterError> {
    let Some(data) = data.get_mut(..count * 4) else {
        return Err(CounterError::TooShort {
            expected: count * 4,
            actual: data.len(),
        });
    };
    for (idx, dword) in data.chunks_exact_mut(4).enumerate() {
        dword.copy_from_slice(&(idx as u32).to_ne_bytes());
    }
    Ok(())
}

/// Checks that the first `count` dwords are equal to their index.
///
/// If `skip_nan` is set, dwords whose low half is a half-float NaN are not
/// checked. Such values are not guaranteed to be preserved.
pub(super) fn check_counter(data: &[u8], count: usize, skip_nan: bool) -> Result<(), CounterError> {
    let Some(data) = data.get(..count * 4) else {
        return Err(CounterError::TooShort {
            expected: count * 4,
            actual: data.len(),
        });
    };
    for (index, dword) in data.chunks_exact(4).enumerate() {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(dword);
        let actual = u32::from_ne_bytes(bytes);
        if skip_nan && is_half_nan(actual as u16) {
            continue;
        }
        if actual != index as u32 {
            return Err(CounterError::Mismatch { index, actual });
        }
    }
    Ok(())
}

pub(super) fn is_half_nan(half: u16) -> bool {
    let exponent = (half & 0x7c00) >> 10;
    let mantissa = half & 0x3ff;
    exponent == 0x1f && mantissa != 0
}

struct Tester<'a> {
    allocator: &'a VulkanAllocator,
    args: &'a TestArgs,
    usage: Usage,
    memory: MemoryTypes,
}

pub fn main(args: TestArgs) {
    let usage = match Usage::new(&args) {
        Ok(u) => u,
        Err(e) => fatal!("Invalid arguments: {}", ErrorFmt(e)),
    };
    let allocator = match VulkanAllocator::new(args.render_node.as_deref(), usage.protected) {
        Ok(a) => a,
        Err(e) => fatal!("Could not create the allocator: {}", ErrorFmt(e)),
    };
    let memory = allocator.select_memory_types(usage.memory_flags());
    if memory.is_empty() {
        fatal!("There is no memory type with flags {:?}", usage.memory_flags());
    }
    let tester = Tester {
        allocator: &allocator,
        args: &args,
        usage,
        memory,
    };
    match args.kind {
        CliBoKind::Buffer => tester.test_buffer(),
        CliBoKind::Image => tester.test_images(),
    }
}

impl Tester<'_> {
    fn test_buffer(&self) {
        let info = BufferInfo {
            flags: self.usage.buffer_flags(),
            usage: self.usage.buffer_usage(),
            memory: self.memory,
        };
        if !self.allocator.query_buffer_support(&info) {
            log::warn!("The device does not support exporting buffers as dma-bufs");
            return;
        }
        let size = self.args.width as u64 * self.args.height as u64;
        let count = (size / 4) as usize;
        let bo = match self.allocator.create_buffer(&info, size, None) {
            Ok(bo) => bo,
            Err(e) => fatal!("Could not create the buffer: {}", ErrorFmt(e)),
        };
        if self.usage.cpu_write {
            let mut mapping = match bo.map(0) {
                Ok(m) => m,
                Err(e) => fatal!("Could not map the buffer: {}", ErrorFmt(e)),
            };
            if let Err(e) = write_counter(mapping.data_mut(), count) {
                fatal!("Could not write the buffer: {}", ErrorFmt(e));
            }
        }
        let fds = match bo.export_fds() {
            Ok(fds) => fds,
            Err(e) => fatal!("Could not export the buffer: {}", ErrorFmt(e)),
        };
        drop(bo);
        let bo = match self.allocator.create_buffer(&info, size, Some(&fds[0])) {
            Ok(bo) => bo,
            Err(e) => fatal!("Could not import the buffer: {}", ErrorFmt(e)),
        };
        drop(fds);
        if self.usage.cpu_read {
            let mapping = match bo.map(0) {
                Ok(m) => m,
                Err(e) => fatal!("Could not map the buffer: {}", ErrorFmt(e)),
            };
            if let Err(e) = check_counter(mapping.data(), count, false) {
                fatal!("The imported buffer has unexpected contents: {}", ErrorFmt(e));
            }
        }
        log::info!("buffer: passed");
    }

    fn test_images(&self) {
        let only = match &self.args.format {
            Some(name) => match format_by_name(name) {
                Some(format) => Some(format),
                None => fatal!("Unknown format {}", name),
            },
            None => None,
        };
        for &format in FORMATS {
            if format.vk_format == vk::Format::UNDEFINED {
                continue;
            }
            if only.is_some_and(|only| only != format) {
                continue;
            }
            for modifier in self.allocator.query_format_modifiers(format.vk_format) {
                if self.usage.linear_only() && modifier.modifier != LINEAR_MODIFIER {
                    continue;
                }
                self.test_image(format, &modifier);
            }
        }
    }

    fn test_image(&self, format: &Format, modifier: &ModifierProperties) {
        let fourcc = FourCc(format.drm);
        let info = ImageInfo {
            flags: self.usage.image_flags(),
            format: format.vk_format,
            modifier: modifier.modifier,
            mem_plane_count: modifier.plane_count,
            usage: self.usage.image_usage(),
            memory: self.memory,
        };
        let supported = self.allocator.query_image_support(&info);
        log::info!(
            "fourcc {} modifier 0x{:x}: {}",
            fourcc,
            modifier.modifier,
            if supported { "supported" } else { "unsupported" },
        );
        if !supported {
            return;
        }
        let (width, height) = (self.args.width, self.args.height);
        let align = Alignment {
            offset: self.args.offset_align,
            pitch: self.args.pitch_align,
        };
        let bo = match self.allocator.create_image(&info, width, height, align, None) {
            Ok(bo) => bo,
            Err(e) if !align.is_none() => {
                log::warn!("Could not create an aligned image: {}", ErrorFmt(e));
                return;
            }
            Err(e) => fatal!("Could not create the image: {}", ErrorFmt(e)),
        };
        if self.usage.cpu_write {
            for (idx, plane) in format.planes.iter().enumerate() {
                let (width, height) = format.plane_extent(idx, width, height);
                let mut transfer = match bo.map_transfer(
                    BufferUsageFlags::TRANSFER_SRC,
                    plane.aspect,
                    0,
                    0,
                    width,
                    height,
                ) {
                    Ok(t) => t,
                    Err(e) => fatal!("Could not map plane {}: {}", idx, ErrorFmt(e)),
                };
                let count = dword_count(width, height, plane.bpp);
                if let Err(e) = write_counter(transfer.data_mut(), count) {
                    fatal!("Could not write plane {}: {}", idx, ErrorFmt(e));
                }
                if let Err(e) = transfer.finish() {
                    fatal!("Could not write plane {}: {}", idx, ErrorFmt(e));
                }
            }
        }
        let fds = match bo.export_fds() {
            Ok(fds) => fds,
            Err(e) => fatal!("Could not export the image: {}", ErrorFmt(e)),
        };
        drop(bo);
        let bo = match self.allocator.create_image(&info, width, height, align, Some(&fds[..])) {
            Ok(bo) => bo,
            Err(e) => fatal!("Could not import the image: {}", ErrorFmt(e)),
        };
        drop(fds);
        if self.usage.cpu_read {
            let skip_nan = format == ABGR16161616F;
            for (idx, plane) in format.planes.iter().enumerate() {
                let (width, height) = format.plane_extent(idx, width, height);
                let transfer = match bo.map_transfer(
                    BufferUsageFlags::TRANSFER_DST,
                    plane.aspect,
                    0,
                    0,
                    width,
                    height,
                ) {
                    Ok(t) => t,
                    Err(e) => fatal!("Could not map plane {}: {}", idx, ErrorFmt(e)),
                };
                let count = dword_count(width, height, plane.bpp);
                if let Err(e) = check_counter(transfer.data(), count, skip_nan) {
                    fatal!(
                        "fourcc {} modifier 0x{:x}: plane {} has unexpected contents: {}",
                        fourcc,
                        modifier.modifier,
                        idx,
                        ErrorFmt(e),
                    );
                }
            }
        }
        log::info!("fourcc {} modifier 0x{:x}: passed", fourcc, modifier.modifier);
    }
}
