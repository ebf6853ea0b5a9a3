use {
    crate::vulkan::staging::staging_memory_type,
    ash::vk::{MemoryPropertyFlags, MemoryType},
};

fn ty(property_flags: MemoryPropertyFlags) -> MemoryType {
    MemoryType {
        property_flags,
        heap_index: 0,
    }
}

#[test]
fn cached_memory_is_preferred() {
    let types = [
        ty(MemoryPropertyFlags::DEVICE_LOCAL),
        ty(MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT),
        ty(MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_CACHED),
    ];
    assert_eq!(staging_memory_type(&types, !0), Some(2));
}

#[test]
fn buffer_requirements_are_respected() {
    let types = [
        ty(MemoryPropertyFlags::DEVICE_LOCAL),
        ty(MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT),
        ty(MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_CACHED),
    ];
    assert_eq!(staging_memory_type(&types, 0b011), Some(1));
    assert_eq!(staging_memory_type(&types, 0b001), None);
}
