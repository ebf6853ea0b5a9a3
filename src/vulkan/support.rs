use {
    crate::{
        video::{MAX_PLANES, Modifier},
        vulkan::allocator::{HANDLE_TYPE, VulkanAllocator},
    },
    ash::vk::{
        self, BufferCreateFlags, BufferUsageFlags, ExternalBufferProperties,
        ExternalImageFormatProperties, ExternalMemoryFeatureFlags, ExternalMemoryProperties,
        ImageCreateFlags, ImageFormatProperties2, ImageTiling, ImageType, ImageUsageFlags,
        MemoryPropertyFlags, MemoryType, PhysicalDeviceExternalBufferInfo,
        PhysicalDeviceExternalImageFormatInfo, PhysicalDeviceImageDrmFormatModifierInfoEXT,
        PhysicalDeviceImageFormatInfo2, SharingMode,
    },
};

#[cfg(test)]
mod tests;

/// A set of memory types an allocation may use.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MemoryTypes {
    /// Bit `i` is set if memory type `i` may be used.
    pub mask: u32,
    /// Whether all memory types in the mask are host coherent.
    pub coherent: bool,
}

impl MemoryTypes {
    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }
}

#[derive(Copy, Clone, Debug)]
pub struct BufferInfo {
    pub flags: BufferCreateFlags,
    pub usage: BufferUsageFlags,
    pub memory: MemoryTypes,
}

#[derive(Copy, Clone, Debug)]
pub struct ImageInfo {
    pub flags: ImageCreateFlags,
    pub format: vk::Format,
    pub modifier: Modifier,
    /// The number of memory planes of the modifier.
    pub mem_plane_count: usize,
    pub usage: ImageUsageFlags,
    pub memory: MemoryTypes,
}

const REQUIRED_FEATURES: ExternalMemoryFeatureFlags = ExternalMemoryFeatureFlags::from_raw(
    ExternalMemoryFeatureFlags::EXPORTABLE.as_raw()
        | ExternalMemoryFeatureFlags::IMPORTABLE.as_raw(),
);

/// Returns the mask of memory types that have all of `flags`.
pub(super) fn memory_type_mask(types: &[MemoryType], flags: MemoryPropertyFlags) -> u32 {
    let mut mask = 0;
    for (idx, ty) in types.iter().enumerate() {
        if ty.property_flags.contains(flags) {
            mask |= 1 << idx;
        }
    }
    mask
}

/// Selects the memory types that have all of `flags`.
///
/// If no memory type is host coherent, host coherence is dropped from the
/// request and the caller has to flush and invalidate mappings.
pub(super) fn select_memory_types(
    types: &[MemoryType],
    mut flags: MemoryPropertyFlags,
) -> MemoryTypes {
    let mut mask = memory_type_mask(types, flags);
    if mask == 0 && flags.contains(MemoryPropertyFlags::HOST_COHERENT) {
        flags &= !MemoryPropertyFlags::HOST_COHERENT;
        mask = memory_type_mask(types, flags);
    }
    MemoryTypes {
        mask,
        coherent: flags.contains(MemoryPropertyFlags::HOST_COHERENT),
    }
}

/// Returns whether memory with these properties can be both exported and
/// imported as a dma-buf.
pub(super) fn is_external_memory_supported(props: &ExternalMemoryProperties) -> bool {
    props.external_memory_features.contains(REQUIRED_FEATURES)
        && props
            .export_from_imported_handle_types
            .contains(HANDLE_TYPE)
        && props.compatible_handle_types.contains(HANDLE_TYPE)
}

impl VulkanAllocator {
    pub fn memory_type_mask(&self, flags: MemoryPropertyFlags) -> u32 {
        memory_type_mask(&self.device.memory_types, flags)
    }

    pub fn select_memory_types(&self, flags: MemoryPropertyFlags) -> MemoryTypes {
        select_memory_types(&self.device.memory_types, flags)
    }

    pub fn query_buffer_support(&self, info: &BufferInfo) -> bool {
        let external_info = PhysicalDeviceExternalBufferInfo::default()
            .flags(info.flags)
            .usage(info.usage)
            .handle_type(HANDLE_TYPE);
        let mut props = ExternalBufferProperties::default();
        unsafe {
            self.device
                .instance
                .instance
                .get_physical_device_external_buffer_properties(
                    self.device.physical_device,
                    &external_info,
                    &mut props,
                );
        }
        is_external_memory_supported(&props.external_memory_properties)
    }

    pub fn query_image_support(&self, info: &ImageInfo) -> bool {
        if info.mem_plane_count > MAX_PLANES {
            return false;
        }
        let mut modifier_info = PhysicalDeviceImageDrmFormatModifierInfoEXT::default()
            .drm_format_modifier(info.modifier)
            .sharing_mode(SharingMode::EXCLUSIVE);
        let mut external_info =
            PhysicalDeviceExternalImageFormatInfo::default().handle_type(HANDLE_TYPE);
        let image_info = PhysicalDeviceImageFormatInfo2::default()
            .format(info.format)
            .ty(ImageType::TYPE_2D)
            .tiling(ImageTiling::DRM_FORMAT_MODIFIER_EXT)
            .usage(info.usage)
            .flags(info.flags)
            .push_next(&mut external_info)
            .push_next(&mut modifier_info);
        let mut external_props = ExternalImageFormatProperties::default();
        let mut props = ImageFormatProperties2::default().push_next(&mut external_props);
        let res = unsafe {
            self.device
                .instance
                .instance
                .get_physical_device_image_format_properties2(
                    self.device.physical_device,
                    &image_info,
                    &mut props,
                )
        };
        if res.is_err() {
            return false;
        }
        is_external_memory_supported(&external_props.external_memory_properties)
    }
}
