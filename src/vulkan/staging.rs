use {
    crate::vulkan::{
        VulkanError, device::VulkanDevice, mapping::whole_range, support::memory_type_mask,
    },
    ash::vk::{
        Buffer, BufferCreateInfo, BufferUsageFlags, DeviceMemory, MemoryAllocateInfo,
        MemoryMapFlags, MemoryPropertyFlags, MemoryType, SharingMode, WHOLE_SIZE,
    },
    run_on_drop::on_drop,
    std::{rc::Rc, slice},
};

#[cfg(test)]
mod tests;

/// A host-visible buffer that is mapped for its whole lifetime.
pub struct VulkanStagingBuffer {
    pub(super) device: Rc<VulkanDevice>,
    pub(super) buffer: Buffer,
    pub(super) memory: DeviceMemory,
    pub(super) size: u64,
    coherent: bool,
    data: *mut u8,
}

impl VulkanDevice {
    pub(super) fn create_staging_buffer(
        self: &Rc<Self>,
        size: u64,
        usage: BufferUsageFlags,
    ) -> Result<VulkanStagingBuffer, VulkanError> {
        let device = &self.device;
        let buffer = {
            let create_info = BufferCreateInfo::default()
                .size(size)
                .usage(usage)
                .sharing_mode(SharingMode::EXCLUSIVE);
            let buffer = unsafe { device.create_buffer(&create_info, None) };
            buffer.map_err(VulkanError::CreateBuffer)?
        };
        let destroy_buffer = on_drop(|| unsafe { device.destroy_buffer(buffer, None) });
        let reqs = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory_type_index = staging_memory_type(&self.memory_types, reqs.memory_type_bits)
            .ok_or(VulkanError::NoHostVisibleMemory)?;
        let coherent = self.memory_types[memory_type_index as usize]
            .property_flags
            .contains(MemoryPropertyFlags::HOST_COHERENT);
        let memory = {
            let allocate_info = MemoryAllocateInfo::default()
                .allocation_size(reqs.size)
                .memory_type_index(memory_type_index);
            let memory = unsafe { device.allocate_memory(&allocate_info, None) };
            memory.map_err(VulkanError::AllocateMemory)?
        };
        let free_memory = on_drop(|| unsafe { device.free_memory(memory, None) });
        unsafe {
            device
                .bind_buffer_memory(buffer, memory, 0)
                .map_err(VulkanError::BindBufferMemory)?;
        }
        let data = unsafe { device.map_memory(memory, 0, WHOLE_SIZE, MemoryMapFlags::empty()) };
        let data = data.map_err(VulkanError::MapMemory)?;
        free_memory.forget();
        destroy_buffer.forget();
        Ok(VulkanStagingBuffer {
            device: self.clone(),
            buffer,
            memory,
            size,
            coherent,
            data: data.cast(),
        })
    }
}

/// Returns the memory type to use for a staging buffer.
///
/// Cached memory is preferred since staging buffers are read by the host.
pub(super) fn staging_memory_type(types: &[MemoryType], supported: u32) -> Option<u32> {
    let preferences = [
        MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_CACHED,
        MemoryPropertyFlags::HOST_VISIBLE,
    ];
    for flags in preferences {
        let mask = memory_type_mask(types, flags) & supported;
        if mask != 0 {
            return Some(mask.trailing_zeros());
        }
    }
    None
}

impl VulkanStagingBuffer {
    pub fn data(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.data, self.size as usize) }
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.data, self.size as usize) }
    }

    /// Makes host writes available to the device.
    pub fn flush(&self) -> Result<(), VulkanError> {
        if self.coherent {
            return Ok(());
        }
        let range = whole_range(self.memory);
        let res = unsafe {
            self.device
                .device
                .flush_mapped_memory_ranges(slice::from_ref(&range))
        };
        res.map_err(VulkanError::FlushMemory)
    }

    /// Makes device writes visible to the host.
    pub fn invalidate(&self) -> Result<(), VulkanError> {
        if self.coherent {
            return Ok(());
        }
        let range = whole_range(self.memory);
        let res = unsafe {
            self.device
                .device
                .invalidate_mapped_memory_ranges(slice::from_ref(&range))
        };
        res.map_err(VulkanError::InvalidateMemory)
    }
}

impl Drop for VulkanStagingBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.device.unmap_memory(self.memory);
            self.device.device.free_memory(self.memory, None);
            self.device.device.destroy_buffer(self.buffer, None);
        }
    }
}
