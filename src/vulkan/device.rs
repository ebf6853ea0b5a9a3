use {
    crate::{
        utils::errorfmt::ErrorFmt,
        vulkan::{
            VulkanError,
            instance::{API_VERSION, Extensions, VersionFmt, VulkanInstance, extension_names},
        },
    },
    arrayvec::ArrayVec,
    ash::{
        Device,
        ext::{
            external_memory_dma_buf, image_drm_format_modifier, physical_device_drm,
            queue_family_foreign,
        },
        khr::{driver_properties, external_memory_fd, image_format_list},
        vk::{
            self, DeviceCreateInfo, DeviceQueueCreateFlags, DeviceQueueCreateInfo,
            DeviceQueueInfo2, MAX_MEMORY_TYPES, MemoryType, PhysicalDevice,
            PhysicalDeviceDriverProperties, PhysicalDeviceDrmPropertiesEXT,
            PhysicalDeviceFeatures2, PhysicalDeviceProperties, PhysicalDeviceProperties2,
            PhysicalDeviceProtectedMemoryFeatures, PhysicalDeviceSynchronization2Features, Queue,
            QueueFlags,
        },
    },
    isnt::std_1::collections::IsntHashMapExt,
    run_on_drop::on_drop,
    std::{ffi::CStr, os::unix::fs::MetadataExt, path::Path, rc::Rc, slice},
    uapi::{Ustr, c::dev_t},
};

pub struct VulkanDevice {
    pub(super) instance: Rc<VulkanInstance>,
    pub(super) physical_device: PhysicalDevice,
    pub(super) device: Device,
    pub(super) external_memory_fd: external_memory_fd::Device,
    pub(super) memory_types: ArrayVec<MemoryType, MAX_MEMORY_TYPES>,
    pub(super) queue: Queue,
    pub(super) queue_family_idx: u32,
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                log::error!("Could not wait for the device to become idle: {}", ErrorFmt(e));
            }
            self.device.destroy_device(None);
        }
    }
}

struct Candidate {
    phy_dev: PhysicalDevice,
    props: PhysicalDeviceProperties,
    /// The primary and render nodes of the device.
    drm_devs: Option<[Option<dev_t>; 2]>,
    driver: Option<(String, String)>,
    extensions: Extensions,
}

impl VulkanInstance {
    fn get_device_extensions(&self, phy_dev: PhysicalDevice) -> Result<Extensions, VulkanError> {
        unsafe {
            self.instance
                .enumerate_device_extension_properties(phy_dev)
                .map(|props| extension_names(&props))
                .map_err(VulkanError::DeviceExtensions)
        }
    }

    fn load_candidate(&self, phy_dev: PhysicalDevice) -> Result<Candidate, VulkanError> {
        let extensions = self.get_device_extensions(phy_dev)?;
        let has_drm_props = extensions.contains_key(physical_device_drm::NAME);
        let has_driver_props = extensions.contains_key(driver_properties::NAME);
        let mut drm_props = PhysicalDeviceDrmPropertiesEXT::default();
        let mut driver_props = PhysicalDeviceDriverProperties::default();
        let mut props2 = PhysicalDeviceProperties2::default();
        if has_drm_props {
            props2 = props2.push_next(&mut drm_props);
        }
        if has_driver_props {
            props2 = props2.push_next(&mut driver_props);
        }
        unsafe {
            self.instance
                .get_physical_device_properties2(phy_dev, &mut props2);
        }
        let props = props2.properties;
        let drm_devs = has_drm_props.then(|| {
            let primary =
                uapi::makedev(drm_props.primary_major as _, drm_props.primary_minor as _);
            let render =
                uapi::makedev(drm_props.render_major as _, drm_props.render_minor as _);
            [
                (drm_props.has_primary == vk::TRUE).then_some(primary),
                (drm_props.has_render == vk::TRUE).then_some(render),
            ]
        });
        let driver = has_driver_props.then(|| unsafe {
            (
                Ustr::from_ptr(driver_props.driver_name.as_ptr())
                    .display()
                    .to_string(),
                Ustr::from_ptr(driver_props.driver_info.as_ptr())
                    .display()
                    .to_string(),
            )
        });
        Ok(Candidate {
            phy_dev,
            props,
            drm_devs,
            driver,
            extensions,
        })
    }

    fn check_candidate(&self, candidate: &Candidate, protected: bool) -> Result<(), VulkanError> {
        if candidate.props.api_version < API_VERSION {
            return Err(VulkanError::NoVulkan13);
        }
        for &ext in REQUIRED_DEVICE_EXTENSIONS {
            if candidate.extensions.not_contains_key(ext) {
                return Err(VulkanError::MissingDeviceExtension(ext));
            }
        }
        let mut synchronization2_features = PhysicalDeviceSynchronization2Features::default();
        let mut protected_features = PhysicalDeviceProtectedMemoryFeatures::default();
        let mut features = PhysicalDeviceFeatures2::default()
            .push_next(&mut synchronization2_features)
            .push_next(&mut protected_features);
        unsafe {
            self.instance
                .get_physical_device_features2(candidate.phy_dev, &mut features);
        }
        if synchronization2_features.synchronization2 != vk::TRUE {
            return Err(VulkanError::NoSynchronization2);
        }
        if protected && protected_features.protected_memory != vk::TRUE {
            return Err(VulkanError::NoProtectedMemory);
        }
        Ok(())
    }

    fn find_dev(&self, dev: Option<dev_t>, protected: bool) -> Result<Candidate, VulkanError> {
        if let Some(dev) = dev {
            log::info!(
                "Searching for vulkan device with devnum {}:{}",
                uapi::major(dev),
                uapi::minor(dev)
            );
        }
        let phy_devs = unsafe { self.instance.enumerate_physical_devices() };
        let phy_devs = phy_devs.map_err(VulkanError::EnumeratePhysicalDevices)?;
        let mut candidates = vec![];
        for phy_dev in phy_devs {
            let candidate = match self.load_candidate(phy_dev) {
                Ok(c) => c,
                Err(e) => {
                    log::error!("Could not load a physical device: {}", ErrorFmt(e));
                    continue;
                }
            };
            let Some(dev) = dev else {
                match self.check_candidate(&candidate, protected) {
                    Ok(()) => {
                        log::info!("Using device with id {}", candidate.props.device_id);
                        log_device(&candidate);
                        return Ok(candidate);
                    }
                    Err(e) => {
                        log::info!(
                            "Device with id {} is not suitable: {}",
                            candidate.props.device_id,
                            ErrorFmt(e)
                        );
                        candidates.push(candidate);
                        continue;
                    }
                }
            };
            let matches = candidate
                .drm_devs
                .is_some_and(|devs| devs.contains(&Some(dev)));
            if matches {
                log::info!("Device with id {} matches", candidate.props.device_id);
                log_device(&candidate);
                self.check_candidate(&candidate, protected)?;
                return Ok(candidate);
            }
            candidates.push(candidate);
        }
        if candidates.is_empty() {
            log::warn!("Found no devices");
        } else {
            log::warn!("Found the following devices but none matches:");
            for candidate in &candidates {
                log::warn!("-----");
                log_device(candidate);
            }
        }
        match dev {
            Some(dev) => Err(VulkanError::NoDeviceFound(dev)),
            None => Err(VulkanError::NoSuitableDevice),
        }
    }

    fn find_queue(&self, phy_dev: PhysicalDevice, protected: bool) -> Result<u32, VulkanError> {
        let props = unsafe {
            self.instance
                .get_physical_device_queue_family_properties(phy_dev)
        };
        let mut required = QueueFlags::GRAPHICS;
        if protected {
            required |= QueueFlags::PROTECTED;
        }
        props
            .iter()
            .position(|p| p.queue_flags.contains(required))
            .map(|v| v as _)
            .ok_or(VulkanError::NoGraphicsQueue)
    }

    /// Creates a device.
    ///
    /// If `render_node` is given, the device must correspond to this DRM node.
    /// Otherwise the first device that supports external memory is used.
    pub fn create_device(
        self: &Rc<Self>,
        render_node: Option<&Path>,
        protected: bool,
    ) -> Result<Rc<VulkanDevice>, VulkanError> {
        let dev = match render_node {
            Some(path) => {
                let md = std::fs::metadata(path);
                let md = md.map_err(|e| VulkanError::StatRenderNode(e.into()))?;
                Some(md.rdev() as dev_t)
            }
            None => None,
        };
        let candidate = self.find_dev(dev, protected)?;
        let phy_dev = candidate.phy_dev;
        let queue_family_idx = self.find_queue(phy_dev, protected)?;
        let mut enabled_extensions: Vec<_> = REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|n| n.as_ptr())
            .collect();
        if dev.is_some() {
            enabled_extensions.push(physical_device_drm::NAME.as_ptr());
        }
        let mut synchronization2_features =
            PhysicalDeviceSynchronization2Features::default().synchronization2(true);
        let mut protected_features =
            PhysicalDeviceProtectedMemoryFeatures::default().protected_memory(protected);
        let mut queue_flags = DeviceQueueCreateFlags::empty();
        if protected {
            queue_flags |= DeviceQueueCreateFlags::PROTECTED;
        }
        let queue_create_info = DeviceQueueCreateInfo::default()
            .flags(queue_flags)
            .queue_family_index(queue_family_idx)
            .queue_priorities(&[1.0]);
        let device_create_info = DeviceCreateInfo::default()
            .push_next(&mut synchronization2_features)
            .push_next(&mut protected_features)
            .queue_create_infos(slice::from_ref(&queue_create_info))
            .enabled_extension_names(&enabled_extensions);
        let device = unsafe {
            self.instance
                .create_device(phy_dev, &device_create_info, None)
        };
        let device = device.map_err(VulkanError::CreateDevice)?;
        let destroy_device = on_drop(|| unsafe { device.destroy_device(None) });
        let external_memory_fd = external_memory_fd::Device::new(&self.instance, &device);
        let memory_properties =
            unsafe { self.instance.get_physical_device_memory_properties(phy_dev) };
        let memory_types = memory_properties.memory_types
            [..memory_properties.memory_type_count as _]
            .iter()
            .copied()
            .collect();
        let queue_info = DeviceQueueInfo2::default()
            .flags(queue_flags)
            .queue_family_index(queue_family_idx)
            .queue_index(0);
        let queue = unsafe { device.get_device_queue2(&queue_info) };
        destroy_device.forget();
        Ok(Rc::new(VulkanDevice {
            instance: self.clone(),
            physical_device: phy_dev,
            device,
            external_memory_fd,
            memory_types,
            queue,
            queue_family_idx,
        }))
    }
}

const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[
    image_drm_format_modifier::NAME,
    image_format_list::NAME,
    external_memory_dma_buf::NAME,
    external_memory_fd::NAME,
    queue_family_foreign::NAME,
];

fn log_device(candidate: &Candidate) {
    let props = &candidate.props;
    log::info!("  api version: {}", VersionFmt(props.api_version));
    log::info!(
        "  driver version: {}",
        VersionFmt(props.driver_version)
    );
    log::info!("  vendor id: {}", props.vendor_id);
    log::info!("  device id: {}", props.device_id);
    log::info!("  device type: {:?}", props.device_type);
    unsafe {
        log::info!(
            "  device name: {}",
            Ustr::from_ptr(props.device_name.as_ptr()).display()
        );
    }
    if props.api_version < API_VERSION {
        log::warn!("  device does not support vulkan 1.3");
    }
    if candidate.drm_devs.is_none() {
        log::warn!("  device does not support the VK_EXT_physical_device_drm extension");
    }
    if let Some((name, info)) = &candidate.driver {
        log::info!("  driver: {} ({})", name, info);
    }
}
