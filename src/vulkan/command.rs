use {
    crate::{
        utils::errorfmt::ErrorFmt,
        vulkan::{VulkanError, device::VulkanDevice},
    },
    ash::vk::{
        CommandBuffer, CommandBufferAllocateInfo, CommandBufferBeginInfo,
        CommandBufferLevel, CommandBufferResetFlags, CommandBufferSubmitInfo,
        CommandBufferUsageFlags, CommandPool, CommandPoolCreateFlags, CommandPoolCreateInfo,
        Fence, FenceCreateInfo, SubmitInfo2,
    },
    run_on_drop::on_drop,
    std::{
        cell::{Cell, RefCell},
        rc::Rc,
        slice,
    },
};

pub(super) const RING_SIZE: usize = 4;

#[derive(Copy, Clone)]
struct Slot {
    buffer: CommandBuffer,
    fence: Fence,
    pending: bool,
}

/// A fixed number of command buffers that are used in turn.
///
/// Acquiring a slot blocks until the previous submission from that slot has
/// completed.
pub struct VulkanCommandRing {
    device: Rc<VulkanDevice>,
    pool: CommandPool,
    slots: RefCell<[Option<Slot>; RING_SIZE]>,
    next: Cell<usize>,
}

impl VulkanDevice {
    pub(super) fn create_command_ring(self: &Rc<Self>) -> Result<VulkanCommandRing, VulkanError> {
        let info = CommandPoolCreateInfo::default()
            .queue_family_index(self.queue_family_idx)
            .flags(CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let pool = unsafe { self.device.create_command_pool(&info, None) };
        let pool = pool.map_err(VulkanError::AllocateCommandPool)?;
        Ok(VulkanCommandRing {
            device: self.clone(),
            pool,
            slots: Default::default(),
            next: Default::default(),
        })
    }
}

impl VulkanCommandRing {
    fn allocate_slot(&self) -> Result<Slot, VulkanError> {
        let device = &self.device.device;
        let create_info = CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .command_buffer_count(1)
            .level(CommandBufferLevel::PRIMARY);
        let buffers = unsafe { device.allocate_command_buffers(&create_info) };
        let buffers = buffers.map_err(VulkanError::AllocateCommandBuffer)?;
        let buffer = buffers[0];
        let free_buffer = on_drop(|| unsafe { device.free_command_buffers(self.pool, &buffers) });
        let fence = unsafe { device.create_fence(&FenceCreateInfo::default(), None) };
        let fence = fence.map_err(VulkanError::CreateFence)?;
        free_buffer.forget();
        Ok(Slot {
            buffer,
            fence,
            pending: false,
        })
    }

    fn acquire(&self) -> Result<(usize, Slot), VulkanError> {
        let idx = self.next.get();
        let device = &self.device.device;
        let mut slots = self.slots.borrow_mut();
        let slot = match &mut slots[idx] {
            Some(slot) => slot,
            none => none.insert(self.allocate_slot()?),
        };
        unsafe {
            if slot.pending {
                device
                    .wait_for_fences(slice::from_ref(&slot.fence), true, u64::MAX)
                    .map_err(VulkanError::WaitForFence)?;
                device
                    .reset_fences(slice::from_ref(&slot.fence))
                    .map_err(VulkanError::ResetFence)?;
                slot.pending = false;
            }
            device
                .reset_command_buffer(slot.buffer, CommandBufferResetFlags::empty())
                .map_err(VulkanError::ResetCommandBuffer)?;
        }
        Ok((idx, *slot))
    }

    /// Records commands into the next slot, submits them, and waits for them to
    /// complete.
    pub(super) fn execute<F>(&self, f: F) -> Result<(), VulkanError>
    where
        F: FnOnce(CommandBuffer),
    {
        let (idx, slot) = self.acquire()?;
        let device = &self.device.device;
        let cmd = slot.buffer;
        let begin =
            CommandBufferBeginInfo::default().flags(CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        let cmd_buffer_submit_info = CommandBufferSubmitInfo::default().command_buffer(cmd);
        let submit_info =
            SubmitInfo2::default().command_buffer_infos(slice::from_ref(&cmd_buffer_submit_info));
        unsafe {
            device
                .begin_command_buffer(cmd, &begin)
                .map_err(VulkanError::BeginCommandBuffer)?;
            f(cmd);
            device
                .end_command_buffer(cmd)
                .map_err(VulkanError::EndCommandBuffer)?;
            device
                .queue_submit2(self.device.queue, slice::from_ref(&submit_info), slot.fence)
                .map_err(VulkanError::Submit)?;
        }
        if let Some(slot) = &mut self.slots.borrow_mut()[idx] {
            slot.pending = true;
        }
        self.next.set((idx + 1) % RING_SIZE);
        unsafe {
            device
                .wait_for_fences(slice::from_ref(&slot.fence), true, u64::MAX)
                .map_err(VulkanError::WaitForFence)?;
        }
        Ok(())
    }
}

impl Drop for VulkanCommandRing {
    fn drop(&mut self) {
        let device = &self.device.device;
        for slot in self.slots.get_mut().iter().flatten() {
            unsafe {
                if slot.pending {
                    let res = device.wait_for_fences(slice::from_ref(&slot.fence), true, u64::MAX);
                    if let Err(e) = res {
                        log::error!("Could not wait for a fence: {}", ErrorFmt(e));
                    }
                }
                device.destroy_fence(slot.fence, None);
            }
        }
        unsafe {
            device.destroy_command_pool(self.pool, None);
        }
    }
}
