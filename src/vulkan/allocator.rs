use {
    crate::vulkan::{
        VULKAN_VALIDATION, VulkanError, command::VulkanCommandRing, device::VulkanDevice,
        instance::VulkanInstance,
    },
    ash::vk::ExternalMemoryHandleTypeFlags,
    std::{path::Path, rc::Rc},
};

/// The only handle type used for import and export.
pub(super) const HANDLE_TYPE: ExternalMemoryHandleTypeFlags =
    ExternalMemoryHandleTypeFlags::DMA_BUF_EXT;

/// Allocates buffer objects that can be shared as dma-bufs.
///
/// The allocator is not thread safe. All device work is submitted to a single
/// queue and waited for before the operation returns.
pub struct VulkanAllocator {
    pub(super) ring: VulkanCommandRing,
    pub(super) device: Rc<VulkanDevice>,
}

impl VulkanAllocator {
    pub fn new(render_node: Option<&Path>, protected: bool) -> Result<Self, VulkanError> {
        let instance = VulkanInstance::new(*VULKAN_VALIDATION)?;
        let device = instance.create_device(render_node, protected)?;
        device.create_allocator()
    }

    pub fn device(&self) -> &Rc<VulkanDevice> {
        &self.device
    }
}

impl VulkanDevice {
    pub fn create_allocator(self: &Rc<Self>) -> Result<VulkanAllocator, VulkanError> {
        let ring = self.create_command_ring()?;
        Ok(VulkanAllocator {
            ring,
            device: self.clone(),
        })
    }
}
