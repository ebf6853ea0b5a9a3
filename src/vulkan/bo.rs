use {
    crate::{
        video::{MAX_PLANES, PlaneLayout, PlaneVec},
        vulkan::{
            VulkanError,
            allocator::{HANDLE_TYPE, VulkanAllocator},
            support::{BufferInfo, ImageInfo},
        },
    },
    ash::vk::{
        BindBufferMemoryInfo, BindImageMemoryInfo, BindImagePlaneMemoryInfo, Buffer,
        BufferCreateFlags, BufferCreateInfo, BufferMemoryRequirementsInfo2, DeviceMemory,
        DeviceSize, ExportMemoryAllocateInfo, Extent3D, ExternalMemoryBufferCreateInfo,
        ExternalMemoryImageCreateInfo, Image, ImageAspectFlags, ImageCreateFlags,
        ImageCreateInfo, ImageDrmFormatModifierExplicitCreateInfoEXT,
        ImageDrmFormatModifierListCreateInfoEXT, ImageLayout, ImageMemoryRequirementsInfo2,
        ImagePlaneMemoryRequirementsInfo, ImageSubresource, ImageTiling, ImageType,
        ImportMemoryFdInfoKHR, MemoryAllocateInfo, MemoryDedicatedAllocateInfo,
        MemoryDedicatedRequirements, MemoryFdPropertiesKHR, MemoryRequirements,
        MemoryRequirements2, SampleCountFlags, SharingMode, SubresourceLayout, TRUE,
    },
    jay_algorithms::layout::{self, Alignment},
    run_on_drop::on_drop,
    std::slice,
    uapi::OwnedFd,
};


const MEMORY_PLANE_ASPECTS: [ImageAspectFlags; MAX_PLANES] = [
    ImageAspectFlags::MEMORY_PLANE_0_EXT,
    ImageAspectFlags::MEMORY_PLANE_1_EXT,
    ImageAspectFlags::MEMORY_PLANE_2_EXT,
    ImageAspectFlags::MEMORY_PLANE_3_EXT,
];

#[derive(Copy, Clone, Debug)]
pub(super) enum BoKind {
    Buffer { buffer: Buffer },
    Image { image: Image },
}

#[derive(Copy, Clone, Debug)]
pub(super) struct BoMemory {
    pub(super) memory: DeviceMemory,
    pub(super) size: DeviceSize,
}

/// A buffer or image whose memory can be exported as dma-bufs.
///
/// Dropping the bo frees its memory and destroys the handle.
pub struct VulkanBo<'a> {
    pub(super) allocator: &'a VulkanAllocator,
    pub(super) kind: BoKind,
    /// One allocation per memory plane for disjoint images, otherwise a single
    /// allocation.
    pub(super) mems: PlaneVec<BoMemory>,
    pub(super) mem_count: usize,
    pub(super) mem_plane_count: usize,
    pub(super) coherent: bool,
    pub(super) protected: bool,
}

impl Drop for VulkanBo<'_> {
    fn drop(&mut self) {
        let device = &self.allocator.device.device;
        unsafe {
            for mem in &self.mems {
                device.free_memory(mem.memory, None);
            }
            match self.kind {
                BoKind::Buffer { buffer } => device.destroy_buffer(buffer, None),
                BoKind::Image { image } => device.destroy_image(image, None),
            }
        }
    }
}

impl VulkanAllocator {
    /// Creates a buffer of `size` bytes.
    ///
    /// If `import` is given, the memory is imported from this dma-buf. The fd
    /// is duplicated and the caller keeps ownership of it.
    pub fn create_buffer(
        &self,
        info: &BufferInfo,
        size: DeviceSize,
        import: Option<&OwnedFd>,
    ) -> Result<VulkanBo<'_>, VulkanError> {
        let device = &self.device.device;
        let buffer = {
            let mut external_info =
                ExternalMemoryBufferCreateInfo::default().handle_types(HANDLE_TYPE);
            let create_info = BufferCreateInfo::default()
                .flags(info.flags)
                .size(size)
                .usage(info.usage)
                .sharing_mode(SharingMode::EXCLUSIVE)
                .push_next(&mut external_info);
            let buffer = unsafe { device.create_buffer(&create_info, None) };
            buffer.map_err(VulkanError::CreateBuffer)?
        };
        let mut bo = VulkanBo {
            allocator: self,
            kind: BoKind::Buffer { buffer },
            mems: PlaneVec::new(),
            mem_count: 1,
            mem_plane_count: 1,
            coherent: info.memory.coherent,
            protected: info.flags.contains(BufferCreateFlags::PROTECTED),
        };
        let reqs = {
            let reqs_info = BufferMemoryRequirementsInfo2::default().buffer(buffer);
            let mut reqs = MemoryRequirements2::default();
            unsafe {
                device.get_buffer_memory_requirements2(&reqs_info, &mut reqs);
            }
            reqs.memory_requirements
        };
        let mem = bo.alloc_memory(&reqs, info.memory.mask, import)?;
        bo.mems.push(mem);
        let bind_info = BindBufferMemoryInfo::default()
            .buffer(buffer)
            .memory(mem.memory);
        let res = unsafe { device.bind_buffer_memory2(slice::from_ref(&bind_info)) };
        res.map_err(VulkanError::BindBufferMemory)?;
        Ok(bo)
    }

    /// Creates an image with the modifier in `info`.
    ///
    /// If the layout chosen by the driver does not satisfy `align`, the image is
    /// recreated with an explicit layout. The explicit layout is a best-effort
    /// guess when a plane other than the last one has to move and all planes
    /// share one allocation. The driver cannot confirm that the guessed plane
    /// sizes are correct.
    ///
    /// If `import` is given, it must contain one fd per allocation: one per
    /// memory plane for disjoint images and one otherwise. The fds are
    /// duplicated and the caller keeps ownership of them.
    pub fn create_image(
        &self,
        info: &ImageInfo,
        width: u32,
        height: u32,
        align: Alignment,
        import: Option<&[OwnedFd]>,
    ) -> Result<VulkanBo<'_>, VulkanError> {
        let device = &self.device.device;
        let mem_plane_count = info.mem_plane_count;
        if mem_plane_count == 0 || mem_plane_count > MAX_PLANES {
            return Err(VulkanError::InvalidPlaneCount(mem_plane_count));
        }
        let mem_count = match info.flags.contains(ImageCreateFlags::DISJOINT) {
            true => mem_plane_count,
            false => 1,
        };
        if let Some(fds) = import {
            if fds.len() != mem_count {
                return Err(VulkanError::ImportFdCount {
                    expected: mem_count,
                    actual: fds.len(),
                });
            }
        }
        let image = {
            let mut modifier_list = ImageDrmFormatModifierListCreateInfoEXT::default()
                .drm_format_modifiers(slice::from_ref(&info.modifier));
            let mut external_info =
                ExternalMemoryImageCreateInfo::default().handle_types(HANDLE_TYPE);
            let create_info = image_create_info(info, width, height)
                .push_next(&mut external_info)
                .push_next(&mut modifier_list);
            let image = unsafe { device.create_image(&create_info, None) };
            image.map_err(VulkanError::CreateImage)?
        };
        let destroy_image = on_drop(|| unsafe { device.destroy_image(image, None) });
        let driver_layout: PlaneVec<_> = (0..mem_plane_count)
            .map(|plane| {
                let layout = self.subresource_layout(image, plane);
                layout::PlaneLayout {
                    offset: layout.offset,
                    pitch: layout.row_pitch,
                    size: layout.size,
                }
            })
            .collect();
        let image = match layout::align_layout(&driver_layout, mem_count, align) {
            None => {
                destroy_image.forget();
                image
            }
            Some(aligned) => {
                for (idx, (old, new)) in driver_layout.iter().zip(aligned.iter()).enumerate() {
                    log::info!(
                        "adjust mem plane {} offset {} -> {}, pitch {} -> {}",
                        idx,
                        old.offset,
                        new.offset,
                        old.pitch,
                        new.pitch,
                    );
                }
                drop(destroy_image);
                let plane_layouts: PlaneVec<_> = aligned
                    .iter()
                    .map(|p| SubresourceLayout::default().offset(p.offset).row_pitch(p.pitch))
                    .collect();
                let mut modifier_info = ImageDrmFormatModifierExplicitCreateInfoEXT::default()
                    .drm_format_modifier(info.modifier)
                    .plane_layouts(&plane_layouts);
                let mut external_info =
                    ExternalMemoryImageCreateInfo::default().handle_types(HANDLE_TYPE);
                let create_info = image_create_info(info, width, height)
                    .push_next(&mut external_info)
                    .push_next(&mut modifier_info);
                let image = unsafe { device.create_image(&create_info, None) };
                image.map_err(VulkanError::CreateImage)?
            }
        };
        let mut bo = VulkanBo {
            allocator: self,
            kind: BoKind::Image { image },
            mems: PlaneVec::new(),
            mem_count,
            mem_plane_count,
            coherent: info.memory.coherent,
            protected: info.flags.contains(ImageCreateFlags::PROTECTED),
        };
        let mut bind_plane_infos = PlaneVec::new();
        for plane in 0..mem_count {
            let mut plane_info;
            let mut reqs_info = ImageMemoryRequirementsInfo2::default().image(image);
            if mem_count > 1 {
                plane_info = ImagePlaneMemoryRequirementsInfo::default()
                    .plane_aspect(MEMORY_PLANE_ASPECTS[plane]);
                reqs_info = reqs_info.push_next(&mut plane_info);
                bind_plane_infos.push(
                    BindImagePlaneMemoryInfo::default().plane_aspect(MEMORY_PLANE_ASPECTS[plane]),
                );
            }
            let mut dedicated_reqs = MemoryDedicatedRequirements::default();
            let mut reqs = MemoryRequirements2::default().push_next(&mut dedicated_reqs);
            unsafe {
                device.get_image_memory_requirements2(&reqs_info, &mut reqs);
            }
            let reqs = reqs.memory_requirements;
            check_dedicated(dedicated_reqs.requires_dedicated_allocation == TRUE, mem_count)?;
            let fd = import.map(|fds| &fds[plane]);
            let mem = bo.alloc_memory(&reqs, info.memory.mask, fd)?;
            bo.mems.push(mem);
        }
        let mut bind_infos = PlaneVec::new();
        let mut bind_plane_infos = bind_plane_infos.iter_mut();
        for mem in &bo.mems {
            let mut bind_info = BindImageMemoryInfo::default()
                .image(image)
                .memory(mem.memory);
            if let Some(plane_info) = bind_plane_infos.next() {
                bind_info = bind_info.push_next(plane_info);
            }
            bind_infos.push(bind_info);
        }
        let res = unsafe { device.bind_image_memory2(&bind_infos) };
        res.map_err(VulkanError::BindImageMemory)?;
        Ok(bo)
    }

    fn subresource_layout(&self, image: Image, plane: usize) -> SubresourceLayout {
        let subresource = ImageSubresource::default().aspect_mask(MEMORY_PLANE_ASPECTS[plane]);
        unsafe {
            self.device
                .device
                .get_image_subresource_layout(image, subresource)
        }
    }
}

impl VulkanBo<'_> {
    pub fn is_image(&self) -> bool {
        matches!(self.kind, BoKind::Image { .. })
    }

    pub fn mem_count(&self) -> usize {
        self.mem_count
    }

    pub fn mem_plane_count(&self) -> usize {
        self.mem_plane_count
    }

    pub fn coherent(&self) -> bool {
        self.coherent
    }

    pub fn protected(&self) -> bool {
        self.protected
    }

    /// Returns the offset and pitch of every memory plane.
    ///
    /// Buffers have a single plane with offset and pitch 0.
    pub fn query_layout(&self) -> PlaneVec<PlaneLayout> {
        let image = match self.kind {
            BoKind::Buffer { .. } => {
                let mut res = PlaneVec::new();
                res.push(PlaneLayout::default());
                return res;
            }
            BoKind::Image { image } => image,
        };
        (0..self.mem_plane_count)
            .map(|plane| {
                let layout = self.allocator.subresource_layout(image, plane);
                PlaneLayout {
                    offset: layout.offset,
                    pitch: layout.row_pitch,
                }
            })
            .collect()
    }

    fn alloc_memory(
        &self,
        reqs: &MemoryRequirements,
        mask: u32,
        import: Option<&OwnedFd>,
    ) -> Result<BoMemory, VulkanError> {
        let device = &self.allocator.device;
        let mut mask = resource_memory_types(mask, reqs.memory_type_bits)?;
        let fd = match import {
            Some(fd) => {
                let mut props = MemoryFdPropertiesKHR::default();
                let res = unsafe {
                    device
                        .external_memory_fd
                        .get_memory_fd_properties(HANDLE_TYPE, fd.raw(), &mut props)
                };
                res.map_err(VulkanError::MemoryFdProperties)?;
                mask = import_memory_types(mask, props.memory_type_bits)?;
                Some(dup_import_fd(fd)?)
            }
            None => None,
        };
        let mut export_info = ExportMemoryAllocateInfo::default().handle_types(HANDLE_TYPE);
        let mut import_info = ImportMemoryFdInfoKHR::default().handle_type(HANDLE_TYPE);
        let mut dedicated_info = MemoryDedicatedAllocateInfo::default();
        let mut allocate_info = MemoryAllocateInfo::default()
            .allocation_size(reqs.size)
            .memory_type_index(mask.trailing_zeros())
            .push_next(&mut export_info);
        if let Some(fd) = &fd {
            import_info = import_info.fd(fd.raw());
            allocate_info = allocate_info.push_next(&mut import_info);
        }
        if self.mem_count == 1 {
            dedicated_info = match self.kind {
                BoKind::Buffer { buffer } => dedicated_info.buffer(buffer),
                BoKind::Image { image } => dedicated_info.image(image),
            };
            allocate_info = allocate_info.push_next(&mut dedicated_info);
        }
        let memory = unsafe { device.device.allocate_memory(&allocate_info, None) };
        let memory = match fd {
            Some(fd) => {
                let memory = memory.map_err(VulkanError::ImportMemory)?;
                fd.unwrap();
                memory
            }
            None => memory.map_err(VulkanError::AllocateMemory)?,
        };
        Ok(BoMemory {
            memory,
            size: reqs.size,
        })
    }
}

/// Dedicated allocations cover the whole image and cannot back a single memory
/// plane of a disjoint image.
pub(super) fn check_dedicated(
    requires_dedicated: bool,
    mem_count: usize,
) -> Result<(), VulkanError> {
    if requires_dedicated && mem_count > 1 {
        return Err(VulkanError::DedicatedDisjoint);
    }
    Ok(())
}

/// Restricts the requested memory types to those supported by the resource.
pub(super) fn resource_memory_types(mask: u32, supported: u32) -> Result<u32, VulkanError> {
    match mask & supported {
        0 => Err(VulkanError::MemoryType),
        mask => Ok(mask),
    }
}

/// Restricts the memory types to those that can import the dma-buf.
pub(super) fn import_memory_types(mask: u32, importable: u32) -> Result<u32, VulkanError> {
    match mask & importable {
        0 => Err(VulkanError::FdMemoryType),
        mask => Ok(mask),
    }
}

/// Duplicates a dma-buf for import.
///
/// A successful import takes ownership of the duplicate. Otherwise it is closed
/// when dropped.
pub(super) fn dup_import_fd(fd: &OwnedFd) -> Result<OwnedFd, VulkanError> {
    uapi::fcntl_dupfd_cloexec(fd.raw(), 0).map_err(|e| VulkanError::Dupfd(e.into()))
}

fn image_create_info<'a>(info: &ImageInfo, width: u32, height: u32) -> ImageCreateInfo<'a> {
    ImageCreateInfo::default()
        .flags(info.flags)
        .image_type(ImageType::TYPE_2D)
        .format(info.format)
        .mip_levels(1)
        .array_layers(1)
        .tiling(ImageTiling::DRM_FORMAT_MODIFIER_EXT)
        .samples(SampleCountFlags::TYPE_1)
        .sharing_mode(SharingMode::EXCLUSIVE)
        .initial_layout(ImageLayout::UNDEFINED)
        .extent(Extent3D {
            width,
            height,
            depth: 1,
        })
        .usage(info.usage)
}
