use {
    crate::{
        video::{MAX_PLANES, Modifier},
        vulkan::allocator::VulkanAllocator,
    },
    ash::vk::{
        self, DrmFormatModifierPropertiesEXT, DrmFormatModifierPropertiesListEXT,
        FormatFeatureFlags, FormatProperties2,
    },
};

#[cfg(test)]
mod tests;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ModifierProperties {
    pub modifier: Modifier,
    /// The number of memory planes.
    pub plane_count: usize,
    pub features: FormatFeatureFlags,
}

impl VulkanAllocator {
    /// Returns the modifiers supported for `format`.
    ///
    /// Modifiers with more memory planes than can be imported or exported are
    /// not returned.
    pub fn query_format_modifiers(&self, format: vk::Format) -> Vec<ModifierProperties> {
        let instance = &self.device.instance.instance;
        let phy_dev = self.device.physical_device;
        let mut count_props = DrmFormatModifierPropertiesListEXT::default();
        let mut format_properties = FormatProperties2::default().push_next(&mut count_props);
        unsafe {
            instance.get_physical_device_format_properties2(
                phy_dev,
                format,
                &mut format_properties,
            );
        }
        let count = count_props.drm_format_modifier_count as usize;
        if count == 0 {
            return vec![];
        }
        let mut drm_mods = vec![DrmFormatModifierPropertiesEXT::default(); count];
        let mut modifier_props = DrmFormatModifierPropertiesListEXT::default()
            .drm_format_modifier_properties(&mut drm_mods);
        let mut format_properties = FormatProperties2::default().push_next(&mut modifier_props);
        unsafe {
            instance.get_physical_device_format_properties2(
                phy_dev,
                format,
                &mut format_properties,
            );
        }
        let count = modifier_props.drm_format_modifier_count as usize;
        let props = drm_mods[..count.min(drm_mods.len())].iter().map(|p| ModifierProperties {
            modifier: p.drm_format_modifier,
            plane_count: p.drm_format_modifier_plane_count as usize,
            features: p.drm_format_modifier_tiling_features,
        });
        filter_modifiers(format, props)
    }
}

pub(super) fn filter_modifiers(
    format: vk::Format,
    props: impl IntoIterator<Item = ModifierProperties>,
) -> Vec<ModifierProperties> {
    let mut res = vec![];
    for props in props {
        if props.plane_count > MAX_PLANES {
            log::warn!(
                "Ignoring modifier 0x{:x} of format {:?} with {} memory planes",
                props.modifier,
                format,
                props.plane_count,
            );
            continue;
        }
        res.push(props);
    }
    res
}
