use {
    crate::{
        utils::errorfmt::ErrorFmt,
        vulkan::{VulkanError, bo::VulkanBo},
    },
    ash::vk::{DeviceMemory, MappedMemoryRange, MemoryMapFlags, WHOLE_SIZE},
    run_on_drop::on_drop,
    std::slice,
};

/// A host mapping of one allocation of a bo.
///
/// Non-coherent memory is invalidated when the mapping is created and flushed
/// when it is dropped.
pub struct VulkanBoMapping<'a> {
    bo: &'a VulkanBo<'a>,
    memory: DeviceMemory,
    data: *mut u8,
    size: usize,
}

impl VulkanBo<'_> {
    pub fn map(&self, mem_plane: usize) -> Result<VulkanBoMapping<'_>, VulkanError> {
        if self.protected {
            return Err(VulkanError::ProtectedAccess);
        }
        let Some(mem) = self.mems.get(mem_plane).copied() else {
            return Err(VulkanError::InvalidMemPlane(mem_plane));
        };
        let device = &self.allocator.device.device;
        let data = unsafe { device.map_memory(mem.memory, 0, WHOLE_SIZE, MemoryMapFlags::empty()) };
        let data = data.map_err(VulkanError::MapMemory)?;
        let unmap = on_drop(|| unsafe { device.unmap_memory(mem.memory) });
        if !self.coherent {
            let range = whole_range(mem.memory);
            let res = unsafe { device.invalidate_mapped_memory_ranges(slice::from_ref(&range)) };
            res.map_err(VulkanError::InvalidateMemory)?;
        }
        unmap.forget();
        Ok(VulkanBoMapping {
            bo: self,
            memory: mem.memory,
            data: data.cast(),
            size: mem.size as usize,
        })
    }
}

impl VulkanBoMapping<'_> {
    pub fn data(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.data, self.size) }
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.data, self.size) }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

impl Drop for VulkanBoMapping<'_> {
    fn drop(&mut self) {
        let device = &self.bo.allocator.device.device;
        unsafe {
            if !self.bo.coherent {
                let range = whole_range(self.memory);
                if let Err(e) = device.flush_mapped_memory_ranges(slice::from_ref(&range)) {
                    log::error!("Could not flush mapped memory: {}", ErrorFmt(e));
                }
            }
            device.unmap_memory(self.memory);
        }
    }
}

pub(super) fn whole_range(memory: DeviceMemory) -> MappedMemoryRange<'static> {
    MappedMemoryRange::default().memory(memory).size(WHOLE_SIZE)
}
