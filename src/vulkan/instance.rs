use {
    crate::vulkan::{VULKAN_VALIDATION, VulkanError},
    ahash::AHashMap,
    ash::{
        Entry, Instance, LoadingError,
        ext::debug_utils,
        vk::{
            API_VERSION_1_3, ApplicationInfo, Bool32, DebugUtilsMessageSeverityFlagsEXT as Severity,
            DebugUtilsMessageTypeFlagsEXT, DebugUtilsMessengerCallbackDataEXT,
            DebugUtilsMessengerCreateInfoEXT, DebugUtilsMessengerEXT, ExtensionProperties, FALSE,
            InstanceCreateInfo, api_version_major, api_version_minor, api_version_patch,
        },
    },
    log::Level,
    run_on_drop::on_drop,
    std::{
        ffi::{CStr, CString, c_void},
        fmt::{Display, Formatter},
        rc::Rc,
        sync::{Arc, LazyLock},
    },
};

pub const API_VERSION: u32 = API_VERSION_1_3;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Extension names and their spec versions.
pub type Extensions = AHashMap<CString, u32>;

pub struct VulkanInstance {
    pub(super) instance: Instance,
    debug_utils: debug_utils::Instance,
    messenger: DebugUtilsMessengerEXT,
}

fn entry() -> Result<&'static Entry, VulkanError> {
    static ENTRY: LazyLock<Result<Entry, Arc<LoadingError>>> =
        LazyLock::new(|| unsafe { Entry::load() }.map_err(Arc::new));
    (*ENTRY).as_ref().map_err(|e| VulkanError::Load(e.clone()))
}

impl VulkanInstance {
    /// Creates an instance that forwards driver messages to the log.
    ///
    /// If `validation` is set and the Khronos validation layer is installed, the
    /// layer is enabled.
    pub fn new(validation: bool) -> Result<Rc<Self>, VulkanError> {
        let entry = entry()?;
        let extensions = unsafe { entry.enumerate_instance_extension_properties(None) };
        let extensions = extensions.map_err(VulkanError::InstanceExtensions)?;
        if !extension_names(&extensions).contains_key(debug_utils::NAME) {
            return Err(VulkanError::MissingInstanceExtension(debug_utils::NAME));
        }
        let mut layers = vec![];
        if validation {
            let available = unsafe { entry.enumerate_instance_layer_properties() };
            let available = available.map_err(VulkanError::InstanceLayers)?;
            let found = available
                .iter()
                .any(|l| l.layer_name_as_c_str() == Ok(VALIDATION_LAYER));
            match found {
                true => layers.push(VALIDATION_LAYER.as_ptr()),
                false => log::warn!("The Vulkan validation layer is not installed"),
            }
        }
        let mut severity = Severity::ERROR | Severity::WARNING;
        if *VULKAN_VALIDATION {
            severity |= Severity::INFO | Severity::VERBOSE;
        }
        let mut debug_info = DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(severity)
            .message_type(
                DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));
        let app_info = ApplicationInfo::default()
            .application_name(c"jay-allocator")
            .api_version(API_VERSION);
        let enabled_extensions = [debug_utils::NAME.as_ptr()];
        let create_info = InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&enabled_extensions)
            .push_next(&mut debug_info);
        let instance = unsafe { entry.create_instance(&create_info, None) };
        let instance = instance.map_err(VulkanError::CreateInstance)?;
        let destroy_instance = on_drop(|| unsafe { instance.destroy_instance(None) });
        let debug_utils = debug_utils::Instance::new(entry, &instance);
        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&debug_info, None) };
        let messenger = messenger.map_err(VulkanError::Messenger)?;
        destroy_instance.forget();
        Ok(Rc::new(Self {
            instance,
            debug_utils,
            messenger,
        }))
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            self.debug_utils
                .destroy_debug_utils_messenger(self.messenger, None);
            self.instance.destroy_instance(None);
        }
    }
}

pub fn extension_names(props: &[ExtensionProperties]) -> Extensions {
    props
        .iter()
        .filter_map(|p| Some((p.extension_name_as_c_str().ok()?.to_owned(), p.spec_version)))
        .collect()
}

unsafe extern "system" fn debug_callback(
    severity: Severity,
    _types: DebugUtilsMessageTypeFlagsEXT,
    data: *const DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> Bool32 {
    let level = if severity.contains(Severity::ERROR) {
        Level::Error
    } else if severity.contains(Severity::WARNING) {
        Level::Warn
    } else if severity.contains(Severity::INFO) {
        Level::Debug
    } else {
        Level::Trace
    };
    let data = unsafe { &*data };
    let message = unsafe { data.message_as_c_str() }.unwrap_or(c"");
    let id = unsafe { data.message_id_name_as_c_str() }.unwrap_or(c"");
    log::log!(level, "vulkan: {} ({})", message.to_string_lossy(), id.to_string_lossy());
    FALSE
}

/// Formats a packed Vulkan version as `major.minor.patch`.
pub struct VersionFmt(pub u32);

impl Display for VersionFmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let v = self.0;
        write!(
            f,
            "{}.{}.{}",
            api_version_major(v),
            api_version_minor(v),
            api_version_patch(v),
        )
    }
}
