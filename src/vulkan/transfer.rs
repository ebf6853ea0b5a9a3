use {
    crate::{
        utils::errorfmt::ErrorFmt,
        vulkan::{
            VulkanError,
            bo::{BoKind, VulkanBo},
            staging::VulkanStagingBuffer,
        },
    },
    ash::vk::{
        AccessFlags2, BufferImageCopy2, BufferMemoryBarrier2, BufferUsageFlags, CommandBuffer,
        CopyBufferToImageInfo2, CopyImageToBufferInfo2, DependencyInfo, Extent3D, Image,
        ImageAspectFlags, ImageLayout, ImageMemoryBarrier2, ImageSubresourceLayers,
        ImageSubresourceRange, Offset3D, PipelineStageFlags2, QUEUE_FAMILY_FOREIGN_EXT,
        QUEUE_FAMILY_IGNORED, WHOLE_SIZE,
    },
    std::slice,
};


/// The number of staging bytes reserved per texel.
///
/// Large enough for every texel block up to 256 bits.
pub(super) const STAGING_BYTES_PER_TEXEL: u64 = 32;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(super) enum Ownership {
    /// The image stays owned by our queue family.
    Keep,
    /// The image moves from the foreign queue family to our queue family.
    Acquire,
    /// The image moves from our queue family to the foreign queue family.
    Release,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(super) struct Transition {
    pub(super) ownership: Ownership,
    pub(super) old_layout: ImageLayout,
    pub(super) new_layout: ImageLayout,
    pub(super) src_stage: PipelineStageFlags2,
    pub(super) src_access: AccessFlags2,
    pub(super) dst_stage: PipelineStageFlags2,
    pub(super) dst_access: AccessFlags2,
}

/// Barriers around the copy from the image to the staging buffer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(super) struct ReadPlan {
    pub(super) acquire: Transition,
    pub(super) host_access: AccessFlags2,
    pub(super) release: Option<Transition>,
}

/// Barriers around the copy from the staging buffer to the image.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(super) struct WritePlan {
    pub(super) acquire: Transition,
    pub(super) release: Transition,
}

/// The image is in the `GENERAL` layout while it is owned by the foreign queue
/// family.
const ACQUIRE_FROM_FOREIGN: Transition = Transition {
    ownership: Ownership::Acquire,
    old_layout: ImageLayout::GENERAL,
    new_layout: ImageLayout::UNDEFINED,
    src_stage: PipelineStageFlags2::ALL_COMMANDS,
    src_access: AccessFlags2::MEMORY_WRITE,
    dst_stage: PipelineStageFlags2::TRANSFER,
    dst_access: AccessFlags2::NONE,
};

const RELEASE_TO_FOREIGN: Transition = Transition {
    ownership: Ownership::Release,
    old_layout: ImageLayout::UNDEFINED,
    new_layout: ImageLayout::GENERAL,
    src_stage: PipelineStageFlags2::TRANSFER,
    src_access: AccessFlags2::NONE,
    dst_stage: PipelineStageFlags2::ALL_COMMANDS,
    dst_access: AccessFlags2::from_raw(
        AccessFlags2::MEMORY_READ.as_raw() | AccessFlags2::MEMORY_WRITE.as_raw(),
    ),
};

pub(super) fn read_plan(writeback: bool) -> ReadPlan {
    let acquire = Transition {
        new_layout: ImageLayout::TRANSFER_SRC_OPTIMAL,
        dst_access: AccessFlags2::TRANSFER_READ,
        ..ACQUIRE_FROM_FOREIGN
    };
    let mut host_access = AccessFlags2::HOST_READ;
    let mut release = None;
    if writeback {
        host_access |= AccessFlags2::HOST_WRITE;
    } else {
        release = Some(Transition {
            old_layout: ImageLayout::TRANSFER_SRC_OPTIMAL,
            ..RELEASE_TO_FOREIGN
        });
    }
    ReadPlan {
        acquire,
        host_access,
        release,
    }
}

pub(super) fn write_plan(readback: bool) -> WritePlan {
    let acquire = match readback {
        true => Transition {
            ownership: Ownership::Keep,
            old_layout: ImageLayout::TRANSFER_SRC_OPTIMAL,
            new_layout: ImageLayout::TRANSFER_DST_OPTIMAL,
            src_stage: PipelineStageFlags2::TRANSFER,
            src_access: AccessFlags2::NONE,
            dst_stage: PipelineStageFlags2::TRANSFER,
            dst_access: AccessFlags2::TRANSFER_WRITE,
        },
        false => Transition {
            new_layout: ImageLayout::TRANSFER_DST_OPTIMAL,
            dst_access: AccessFlags2::TRANSFER_WRITE,
            ..ACQUIRE_FROM_FOREIGN
        },
    };
    let release = Transition {
        old_layout: ImageLayout::TRANSFER_DST_OPTIMAL,
        src_access: AccessFlags2::TRANSFER_WRITE,
        ..RELEASE_TO_FOREIGN
    };
    WritePlan { acquire, release }
}

/// Returns the size of the staging buffer for a region of the given extent.
pub(super) fn staging_size(width: u32, height: u32) -> Result<u64, VulkanError> {
    if width == 0 || height == 0 {
        return Err(VulkanError::EmptyTransfer);
    }
    (width as u64)
        .checked_mul(height as u64)
        .and_then(|n| n.checked_mul(STAGING_BYTES_PER_TEXEL))
        .ok_or(VulkanError::StagingSize)
}

/// Host access to a region of an image through a staging buffer.
///
/// If the transfer reads the image, the staging buffer contains the region
/// when the transfer is created. If it writes the image, the staging buffer is
/// copied to the image when [`VulkanBoTransfer::finish`] is called or the
/// transfer is dropped.
pub struct VulkanBoTransfer<'a> {
    bo: &'a VulkanBo<'a>,
    image: Image,
    readback: bool,
    writeback: bool,
    aspect: ImageAspectFlags,
    region: BufferImageCopy2<'static>,
    staging: VulkanStagingBuffer,
    finished: bool,
}

impl VulkanBo<'_> {
    /// Maps a region of one aspect of an image.
    ///
    /// `TRANSFER_DST` in `usage` causes the region to be read from the image.
    /// `TRANSFER_SRC` causes the region to be written back to the image.
    pub fn map_transfer(
        &self,
        usage: BufferUsageFlags,
        aspect: ImageAspectFlags,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<VulkanBoTransfer<'_>, VulkanError> {
        let BoKind::Image { image } = self.kind else {
            return Err(VulkanError::NotAnImage);
        };
        if self.protected {
            return Err(VulkanError::ProtectedAccess);
        }
        let readback = usage.contains(BufferUsageFlags::TRANSFER_DST);
        let writeback = usage.contains(BufferUsageFlags::TRANSFER_SRC);
        if !readback && !writeback {
            return Err(VulkanError::NoTransferDirection);
        }
        let size = staging_size(width, height)?;
        let staging_usage =
            usage & (BufferUsageFlags::TRANSFER_SRC | BufferUsageFlags::TRANSFER_DST);
        let staging = self
            .allocator
            .device
            .create_staging_buffer(size, staging_usage)?;
        let region = BufferImageCopy2::default()
            .image_subresource(
                ImageSubresourceLayers::default()
                    .aspect_mask(aspect)
                    .layer_count(1),
            )
            .image_offset(Offset3D {
                x: x as i32,
                y: y as i32,
                z: 0,
            })
            .image_extent(Extent3D {
                width,
                height,
                depth: 1,
            });
        let mut transfer = VulkanBoTransfer {
            bo: self,
            image,
            readback,
            writeback,
            aspect,
            region,
            staging,
            finished: true,
        };
        if readback {
            transfer.read()?;
        }
        transfer.finished = !writeback;
        Ok(transfer)
    }
}

impl VulkanBoTransfer<'_> {
    pub fn data(&self) -> &[u8] {
        self.staging.data()
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.staging.data_mut()
    }

    /// Writes the region back to the image if the transfer writes the image.
    pub fn finish(mut self) -> Result<(), VulkanError> {
        self.finish_()
    }

    fn finish_(&mut self) -> Result<(), VulkanError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.write()
    }

    fn read(&self) -> Result<(), VulkanError> {
        let plan = read_plan(self.writeback);
        let device = &self.bo.allocator.device.device;
        let acquire = self.image_barrier(&plan.acquire);
        let release = plan.release.map(|t| self.image_barrier(&t));
        let buffer_barrier = BufferMemoryBarrier2::default()
            .src_stage_mask(PipelineStageFlags2::TRANSFER)
            .src_access_mask(AccessFlags2::TRANSFER_WRITE)
            .dst_stage_mask(PipelineStageFlags2::HOST)
            .dst_access_mask(plan.host_access)
            .buffer(self.staging.buffer)
            .size(WHOLE_SIZE);
        let initial_dependency_info =
            DependencyInfo::default().image_memory_barriers(slice::from_ref(&acquire));
        let final_dependency_info = DependencyInfo::default()
            .image_memory_barriers(release.as_slice())
            .buffer_memory_barriers(slice::from_ref(&buffer_barrier));
        let copy_info = CopyImageToBufferInfo2::default()
            .src_image(self.image)
            .src_image_layout(ImageLayout::TRANSFER_SRC_OPTIMAL)
            .dst_buffer(self.staging.buffer)
            .regions(slice::from_ref(&self.region));
        self.bo.allocator.ring.execute(|cmd: CommandBuffer| unsafe {
            device.cmd_pipeline_barrier2(cmd, &initial_dependency_info);
            device.cmd_copy_image_to_buffer2(cmd, &copy_info);
            device.cmd_pipeline_barrier2(cmd, &final_dependency_info);
        })?;
        self.staging.invalidate()
    }

    fn write(&mut self) -> Result<(), VulkanError> {
        self.staging.flush()?;
        let plan = write_plan(self.readback);
        let device = &self.bo.allocator.device.device;
        let acquire = self.image_barrier(&plan.acquire);
        let release = self.image_barrier(&plan.release);
        let buffer_barrier = BufferMemoryBarrier2::default()
            .src_stage_mask(PipelineStageFlags2::HOST)
            .src_access_mask(AccessFlags2::HOST_WRITE)
            .dst_stage_mask(PipelineStageFlags2::TRANSFER)
            .dst_access_mask(AccessFlags2::TRANSFER_READ)
            .buffer(self.staging.buffer)
            .size(WHOLE_SIZE);
        let initial_dependency_info = DependencyInfo::default()
            .image_memory_barriers(slice::from_ref(&acquire))
            .buffer_memory_barriers(slice::from_ref(&buffer_barrier));
        let final_dependency_info =
            DependencyInfo::default().image_memory_barriers(slice::from_ref(&release));
        let copy_info = CopyBufferToImageInfo2::default()
            .src_buffer(self.staging.buffer)
            .dst_image(self.image)
            .dst_image_layout(ImageLayout::TRANSFER_DST_OPTIMAL)
            .regions(slice::from_ref(&self.region));
        self.bo.allocator.ring.execute(|cmd: CommandBuffer| unsafe {
            device.cmd_pipeline_barrier2(cmd, &initial_dependency_info);
            device.cmd_copy_buffer_to_image2(cmd, &copy_info);
            device.cmd_pipeline_barrier2(cmd, &final_dependency_info);
        })
    }

    fn image_barrier(&self, transition: &Transition) -> ImageMemoryBarrier2<'static> {
        let queue = self.bo.allocator.device.queue_family_idx;
        let (src_queue, dst_queue) = match transition.ownership {
            Ownership::Keep => (QUEUE_FAMILY_IGNORED, QUEUE_FAMILY_IGNORED),
            Ownership::Acquire => (QUEUE_FAMILY_FOREIGN_EXT, queue),
            Ownership::Release => (queue, QUEUE_FAMILY_FOREIGN_EXT),
        };
        ImageMemoryBarrier2::default()
            .src_queue_family_index(src_queue)
            .dst_queue_family_index(dst_queue)
            .old_layout(transition.old_layout)
            .new_layout(transition.new_layout)
            .src_stage_mask(transition.src_stage)
            .src_access_mask(transition.src_access)
            .dst_stage_mask(transition.dst_stage)
            .dst_access_mask(transition.dst_access)
            .image(self.image)
            .subresource_range(
                ImageSubresourceRange::default()
                    .aspect_mask(self.aspect)
                    .layer_count(1)
                    .level_count(1),
            )
    }
}

impl Drop for VulkanBoTransfer<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.finish_() {
            log::error!("Could not write the transfer region to the image: {}", ErrorFmt(e));
        }
    }
}
