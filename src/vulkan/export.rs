use {
    crate::{
        video::PlaneVec,
        vulkan::{VulkanError, allocator::HANDLE_TYPE, bo::VulkanBo},
    },
    ash::vk::MemoryGetFdInfoKHR,
    uapi::OwnedFd,
};

impl VulkanBo<'_> {
    /// Exports one dma-buf per allocation.
    ///
    /// If any export fails, the fds that have already been exported are closed.
    pub fn export_fds(&self) -> Result<PlaneVec<OwnedFd>, VulkanError> {
        let device = &self.allocator.device;
        let mut fds = PlaneVec::new();
        for mem in &self.mems {
            let info = MemoryGetFdInfoKHR::default()
                .memory(mem.memory)
                .handle_type(HANDLE_TYPE);
            let fd = unsafe { device.external_memory_fd.get_memory_fd(&info) };
            let fd = fd.map_err(VulkanError::GetDmaBuf)?;
            fds.push(OwnedFd::new(fd));
        }
        Ok(fds)
    }
}
