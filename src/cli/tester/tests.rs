use {
    crate::cli::{
        CliBoKind, TestArgs,
        tester::{
            CounterError, Usage, UsageError, check_counter, dword_count, is_half_nan,
            write_counter,
        },
    },
    ash::vk::{BufferUsageFlags, ImageCreateFlags, ImageUsageFlags, MemoryPropertyFlags},
};

fn args(kind: CliBoKind) -> TestArgs {
    TestArgs {
        kind,
        render_node: None,
        offset_align: 1,
        pitch_align: 1,
        width: 300,
        height: 300,
        format: None,
        protected: false,
        disjoint: false,
        cpu_direct: false,
        no_cpu_access: false,
        gpu_write: false,
        cursor: false,
        camera: false,
        video: false,
    }
}

#[test]
fn buffers_are_mapped_directly() {
    let usage = Usage::new(&args(CliBoKind::Buffer)).unwrap();
    assert!(usage.cpu_direct);
    assert!(usage.memory_flags().contains(
        MemoryPropertyFlags::HOST_VISIBLE
            | MemoryPropertyFlags::HOST_COHERENT
            | MemoryPropertyFlags::HOST_CACHED
    ));
    assert_eq!(usage.buffer_usage(), BufferUsageFlags::UNIFORM_BUFFER);
}

#[test]
fn images_use_transfers() {
    let usage = Usage::new(&args(CliBoKind::Image)).unwrap();
    assert!(!usage.cpu_direct);
    assert!(!usage.linear_only());
    assert_eq!(usage.memory_flags(), MemoryPropertyFlags::empty());
    assert_eq!(
        usage.image_usage(),
        ImageUsageFlags::TRANSFER_SRC | ImageUsageFlags::TRANSFER_DST | ImageUsageFlags::SAMPLED,
    );
}

#[test]
fn cpu_direct_images_are_linear() {
    let mut args = args(CliBoKind::Image);
    args.cpu_direct = true;
    let usage = Usage::new(&args).unwrap();
    assert!(usage.linear_only());
    assert!(usage.memory_flags().contains(MemoryPropertyFlags::HOST_VISIBLE));
}

#[test]
fn cpu_direct_needs_cpu_access() {
    let mut args = args(CliBoKind::Buffer);
    args.no_cpu_access = true;
    let usage = Usage::new(&args).unwrap();
    assert!(!usage.cpu_direct);
    assert!(!usage.cpu_read);
    assert!(!usage.cpu_write);
}

#[test]
fn protected_forbids_cpu_access() {
    let mut args = args(CliBoKind::Image);
    args.protected = true;
    assert_eq!(Usage::new(&args), Err(UsageError::ProtectedCpuAccess));
    args.no_cpu_access = true;
    let usage = Usage::new(&args).unwrap();
    assert!(usage.memory_flags().contains(MemoryPropertyFlags::PROTECTED));
    assert!(usage.image_flags().contains(ImageCreateFlags::PROTECTED));
    assert!(!usage.image_usage().contains(ImageUsageFlags::TRANSFER_SRC));
}

#[test]
fn disjoint_images() {
    let mut args = args(CliBoKind::Image);
    args.disjoint = true;
    let usage = Usage::new(&args).unwrap();
    assert!(usage.image_flags().contains(ImageCreateFlags::DISJOINT));
    let mut args = args;
    args.kind = CliBoKind::Buffer;
    assert_eq!(Usage::new(&args), Err(UsageError::DisjointBuffer));
}

#[test]
fn display_uses_are_linear() {
    let setters: [fn(&mut TestArgs); 3] = [
        |a| a.cursor = true,
        |a| a.camera = true,
        |a| a.video = true,
    ];
    for set in setters {
        let mut args = args(CliBoKind::Image);
        set(&mut args);
        let usage = Usage::new(&args).unwrap();
        assert!(!usage.cpu_direct);
        assert!(usage.linear_only());
    }
}

#[test]
fn gpu_writes() {
    let mut args = args(CliBoKind::Buffer);
    args.gpu_write = true;
    let usage = Usage::new(&args).unwrap();
    assert_eq!(
        usage.buffer_usage(),
        BufferUsageFlags::UNIFORM_BUFFER | BufferUsageFlags::STORAGE_BUFFER,
    );
    args.kind = CliBoKind::Image;
    let usage = Usage::new(&args).unwrap();
    assert!(usage.image_usage().contains(ImageUsageFlags::COLOR_ATTACHMENT));
}

#[test]
fn dword_counts() {
    assert_eq!(dword_count(300, 300, 32), 90000);
    assert_eq!(dword_count(300, 300, 8), 22500);
    assert_eq!(dword_count(150, 150, 16), 11250);
    assert_eq!(dword_count(300, 300, 64), 180000);
}

#[test]
fn counter() {
    let mut data = vec![0; 64];
    write_counter(&mut data, 10).unwrap();
    assert_eq!(check_counter(&data, 10, false), Ok(()));
    assert_eq!(&data[40..], &[0; 24]);
    data[8..12].copy_from_slice(&7u32.to_ne_bytes());
    assert_eq!(
        check_counter(&data, 10, false),
        Err(CounterError::Mismatch {
            index: 2,
            actual: 7,
        }),
    );
}

#[test]
fn counter_needs_space() {
    let mut data = vec![0; 7];
    assert_eq!(
        write_counter(&mut data, 2),
        Err(CounterError::TooShort {
            expected: 8,
            actual: 7,
        }),
    );
    assert_eq!(
        check_counter(&data, 2, false),
        Err(CounterError::TooShort {
            expected: 8,
            actual: 7,
        }),
    );
}

#[test]
fn half_nans_are_skipped() {
    assert!(is_half_nan(0x7c01));
    assert!(is_half_nan(0xfe00));
    assert!(!is_half_nan(0x7c00));
    assert!(!is_half_nan(0x3c00));
    let mut data = vec![0; 8];
    write_counter(&mut data, 2).unwrap();
    data[4..].copy_from_slice(&0x7c01u32.to_ne_bytes());
    assert!(check_counter(&data, 2, false).is_err());
    assert_eq!(check_counter(&data, 2, true), Ok(()));
}
