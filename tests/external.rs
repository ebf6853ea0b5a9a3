#![cfg(feature = "it")]

use {
    ash::vk::{
        BufferCreateFlags, BufferUsageFlags, ImageAspectFlags, ImageCreateFlags, ImageUsageFlags,
        MemoryPropertyFlags,
    },
    jay_allocator::{
        format::{ARGB8888, NV12},
        video::LINEAR_MODIFIER,
        vulkan::{Alignment, BufferInfo, ImageInfo, MemoryTypes, VulkanAllocator, VulkanError},
    },
};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 32;

fn allocator() -> VulkanAllocator {
    VulkanAllocator::new(None, false).unwrap()
}

fn buffer_info(allocator: &VulkanAllocator) -> BufferInfo {
    let memory = allocator.select_memory_types(
        MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
    );
    assert!(!memory.is_empty());
    BufferInfo {
        flags: BufferCreateFlags::empty(),
        usage: BufferUsageFlags::TRANSFER_SRC | BufferUsageFlags::TRANSFER_DST,
        memory,
    }
}

fn linear_argb8888(allocator: &VulkanAllocator) -> Option<ImageInfo> {
    let modifier = allocator
        .query_format_modifiers(ARGB8888.vk_format)
        .into_iter()
        .find(|m| m.modifier == LINEAR_MODIFIER)?;
    let info = ImageInfo {
        flags: ImageCreateFlags::empty(),
        format: ARGB8888.vk_format,
        modifier: modifier.modifier,
        mem_plane_count: modifier.plane_count,
        usage: ImageUsageFlags::TRANSFER_SRC | ImageUsageFlags::TRANSFER_DST,
        memory: allocator.select_memory_types(MemoryPropertyFlags::empty()),
    };
    allocator.query_image_support(&info).then_some(info)
}

#[test]
fn modifiers_have_few_planes() {
    let allocator = allocator();
    for modifier in allocator.query_format_modifiers(ARGB8888.vk_format) {
        assert!(modifier.plane_count >= 1);
        assert!(modifier.plane_count <= 4);
    }
}

#[test]
fn buffer_round_trip() {
    let allocator = allocator();
    let info = buffer_info(&allocator);
    if !allocator.query_buffer_support(&info) {
        return;
    }
    let bo = allocator.create_buffer(&info, 4096, None).unwrap();
    assert!(!bo.is_image());
    assert_eq!(bo.mem_count(), 1);
    assert_eq!(bo.query_layout().len(), 1);
    {
        let mut mapping = bo.map(0).unwrap();
        for (idx, b) in mapping.data_mut()[..4096].iter_mut().enumerate() {
            *b = idx as u8;
        }
    }
    let fds = bo.export_fds().unwrap();
    assert_eq!(fds.len(), 1);
    drop(bo);
    let bo = allocator.create_buffer(&info, 4096, Some(&fds[0])).unwrap();
    assert!(uapi::fcntl_getfl(fds[0].raw()).is_ok());
    let mapping = bo.map(0).unwrap();
    for (idx, b) in mapping.data()[..4096].iter().enumerate() {
        assert_eq!(*b, idx as u8);
    }
}

#[test]
fn image_round_trip() {
    let allocator = allocator();
    let Some(info) = linear_argb8888(&allocator) else {
        return;
    };
    let bo = allocator
        .create_image(&info, WIDTH, HEIGHT, Alignment::NONE, None)
        .unwrap();
    assert!(bo.is_image());
    assert!(!bo.protected());
    assert_eq!(bo.mem_plane_count(), info.mem_plane_count);
    {
        let mut transfer = bo
            .map_transfer(
                BufferUsageFlags::TRANSFER_SRC,
                ImageAspectFlags::COLOR,
                0,
                0,
                WIDTH,
                HEIGHT,
            )
            .unwrap();
        for (idx, b) in transfer.data_mut().iter_mut().enumerate() {
            *b = idx as u8;
        }
        transfer.finish().unwrap();
    }
    let fds = bo.export_fds().unwrap();
    drop(bo);
    let bo = allocator
        .create_image(&info, WIDTH, HEIGHT, Alignment::NONE, Some(&fds[..]))
        .unwrap();
    let transfer = bo
        .map_transfer(
            BufferUsageFlags::TRANSFER_DST,
            ImageAspectFlags::COLOR,
            0,
            0,
            WIDTH,
            HEIGHT,
        )
        .unwrap();
    let size = (WIDTH * HEIGHT * 4) as usize;
    for (idx, b) in transfer.data()[..size].iter().enumerate() {
        assert_eq!(*b, idx as u8);
    }
}

#[test]
fn aligned_image() {
    let allocator = allocator();
    let Some(info) = linear_argb8888(&allocator) else {
        return;
    };
    let align = Alignment {
        offset: 4096,
        pitch: 512,
    };
    let Ok(bo) = allocator.create_image(&info, WIDTH, HEIGHT, align, None) else {
        return;
    };
    for plane in bo.query_layout() {
        assert_eq!(plane.offset % 4096, 0);
        assert_eq!(plane.pitch % 512, 0);
    }
}

#[test]
fn wrong_fd_count_keeps_fds() {
    let allocator = allocator();
    let Some(info) = linear_argb8888(&allocator) else {
        return;
    };
    let bo = allocator
        .create_image(&info, WIDTH, HEIGHT, Alignment::NONE, None)
        .unwrap();
    let fds = bo.export_fds().unwrap();
    let mut two = vec![];
    for fd in &fds {
        two.push(uapi::fcntl_dupfd_cloexec(fd.raw(), 0).unwrap());
        two.push(uapi::fcntl_dupfd_cloexec(fd.raw(), 0).unwrap());
    }
    let res = allocator.create_image(&info, WIDTH, HEIGHT, Alignment::NONE, Some(&two[..]));
    assert!(res.is_err());
    for fd in &two {
        assert!(uapi::fcntl_getfl(fd.raw()).is_ok());
    }
}

#[test]
fn buffers_cannot_be_transferred() {
    let allocator = allocator();
    let info = buffer_info(&allocator);
    if !allocator.query_buffer_support(&info) {
        return;
    }
    let bo = allocator.create_buffer(&info, 4096, None).unwrap();
    let res = bo.map_transfer(
        BufferUsageFlags::TRANSFER_DST,
        ImageAspectFlags::COLOR,
        0,
        0,
        1,
        1,
    );
    assert!(res.is_err());
}

#[test]
fn disjoint_images_are_never_dedicated() {
    let allocator = allocator();
    for modifier in allocator.query_format_modifiers(NV12.vk_format) {
        if modifier.plane_count < 2 {
            continue;
        }
        let info = ImageInfo {
            flags: ImageCreateFlags::DISJOINT,
            format: NV12.vk_format,
            modifier: modifier.modifier,
            mem_plane_count: modifier.plane_count,
            usage: ImageUsageFlags::TRANSFER_SRC | ImageUsageFlags::TRANSFER_DST,
            memory: allocator.select_memory_types(MemoryPropertyFlags::empty()),
        };
        if !allocator.query_image_support(&info) {
            continue;
        }
        match allocator.create_image(&info, WIDTH, HEIGHT, Alignment::NONE, None) {
            Ok(bo) => {
                assert_eq!(bo.mem_count(), modifier.plane_count);
                assert_eq!(bo.export_fds().unwrap().len(), modifier.plane_count);
            }
            Err(VulkanError::DedicatedDisjoint) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
}

#[test]
fn incompatible_import_keeps_fd() {
    let allocator = allocator();
    let info = buffer_info(&allocator);
    if !allocator.query_buffer_support(&info) {
        return;
    }
    let bo = allocator.create_buffer(&info, 4096, None).unwrap();
    let fds = bo.export_fds().unwrap();
    drop(bo);
    let empty = BufferInfo {
        memory: MemoryTypes::default(),
        ..info
    };
    let res = allocator.create_buffer(&empty, 4096, Some(&fds[0]));
    assert!(matches!(res, Err(VulkanError::MemoryType)));
    assert!(uapi::fcntl_getfl(fds[0].raw()).is_ok());
    let all = allocator.memory_type_mask(MemoryPropertyFlags::empty());
    for idx in 0..u32::BITS {
        if all & (1 << idx) == 0 {
            continue;
        }
        let single = BufferInfo {
            memory: MemoryTypes {
                mask: 1 << idx,
                coherent: false,
            },
            ..info
        };
        match allocator.create_buffer(&single, 4096, Some(&fds[0])) {
            Ok(_) | Err(VulkanError::MemoryType | VulkanError::FdMemoryType) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
        assert!(uapi::fcntl_getfl(fds[0].raw()).is_ok());
    }
}
