mod allocator;
mod bo;
mod command;
mod device;
mod export;
mod instance;
mod mapping;
mod modifiers;
mod staging;
mod support;
mod transfer;

pub use {
    allocator::VulkanAllocator,
    bo::VulkanBo,
    device::VulkanDevice,
    instance::VulkanInstance,
    jay_algorithms::layout::Alignment,
    mapping::VulkanBoMapping,
    modifiers::ModifierProperties,
    support::{BufferInfo, ImageInfo, MemoryTypes},
    transfer::VulkanBoTransfer,
};

use {
    crate::utils::oserror::OsError,
    ash::{LoadingError, vk},
    std::{
        ffi::CStr,
        sync::{Arc, LazyLock},
    },
    thiserror::Error,
    uapi::c::dev_t,
};

#[derive(Debug, Error)]
pub enum VulkanError {
    #[error("Could not load libvulkan.so")]
    Load(#[source] Arc<LoadingError>),
    #[error("Could not list instance extensions")]
    InstanceExtensions(#[source] vk::Result),
    #[error("Could not list instance layers")]
    InstanceLayers(#[source] vk::Result),
    #[error("Could not list device extensions")]
    DeviceExtensions(#[source] vk::Result),
    #[error("Missing required instance extension {0:?}")]
    MissingInstanceExtension(&'static CStr),
    #[error("Missing required device extension {0:?}")]
    MissingDeviceExtension(&'static CStr),
    #[error("Could not create an instance")]
    CreateInstance(#[source] vk::Result),
    #[error("Could not create a debug-utils messenger")]
    Messenger(#[source] vk::Result),
    #[error("Could not stat the render node")]
    StatRenderNode(#[source] OsError),
    #[error("Could not enumerate the physical devices")]
    EnumeratePhysicalDevices(#[source] vk::Result),
    #[error("Could not find a vulkan device that matches dev_t {0}")]
    NoDeviceFound(dev_t),
    #[error("Could not find a vulkan device that supports external memory")]
    NoSuitableDevice,
    #[error("Device does not support vulkan 1.3")]
    NoVulkan13,
    #[error("Device does not support the synchronization2 feature")]
    NoSynchronization2,
    #[error("Device does not support protected memory")]
    NoProtectedMemory,
    #[error("Device does not have a graphics queue")]
    NoGraphicsQueue,
    #[error("Could not create the device")]
    CreateDevice(#[source] vk::Result),
    #[error("Could not allocate a command pool")]
    AllocateCommandPool(#[source] vk::Result),
    #[error("Could not allocate a command buffer")]
    AllocateCommandBuffer(#[source] vk::Result),
    #[error("Could not create a fence")]
    CreateFence(#[source] vk::Result),
    #[error("Could not wait for a fence")]
    WaitForFence(#[source] vk::Result),
    #[error("Could not reset a fence")]
    ResetFence(#[source] vk::Result),
    #[error("Could not reset a command buffer")]
    ResetCommandBuffer(#[source] vk::Result),
    #[error("Could not start a command buffer")]
    BeginCommandBuffer(#[source] vk::Result),
    #[error("Could not end a command buffer")]
    EndCommandBuffer(#[source] vk::Result),
    #[error("Could not submit a command buffer")]
    Submit(#[source] vk::Result),
    #[error("Could not create the buffer")]
    CreateBuffer(#[source] vk::Result),
    #[error("Could not create the image")]
    CreateImage(#[source] vk::Result),
    #[error("The number of memory planes must be between 1 and 4 but is {0}")]
    InvalidPlaneCount(usize),
    #[error("The image requires a dedicated allocation but is disjoint")]
    DedicatedDisjoint,
    #[error("There is no memory type that is valid for the resource")]
    MemoryType,
    #[error("Could not query the memory fd properties")]
    MemoryFdProperties(#[source] vk::Result),
    #[error("There is no memory type that is valid for the fd")]
    FdMemoryType,
    #[error("Expected {expected} fds for import but got {actual}")]
    ImportFdCount { expected: usize, actual: usize },
    #[error("Could not dup a dma-buf")]
    Dupfd(#[source] OsError),
    #[error("Could not allocate memory")]
    AllocateMemory(#[source] vk::Result),
    #[error("Could not import memory")]
    ImportMemory(#[source] vk::Result),
    #[error("Could not bind memory to the buffer")]
    BindBufferMemory(#[source] vk::Result),
    #[error("Could not bind memory to the image")]
    BindImageMemory(#[source] vk::Result),
    #[error("Could not export a dma-buf")]
    GetDmaBuf(#[source] vk::Result),
    #[error("Memory plane {0} does not exist")]
    InvalidMemPlane(usize),
    #[error("Could not map the memory")]
    MapMemory(#[source] vk::Result),
    #[error("Could not flush modified memory")]
    FlushMemory(#[source] vk::Result),
    #[error("Could not invalidate mapped memory")]
    InvalidateMemory(#[source] vk::Result),
    #[error("Protected memory cannot be accessed by the host")]
    ProtectedAccess,
    #[error("Transfers are only supported for images")]
    NotAnImage,
    #[error("The transfer region is empty")]
    EmptyTransfer,
    #[error("The transfer neither reads nor writes the image")]
    NoTransferDirection,
    #[error("Overflow while calculating the staging buffer size")]
    StagingSize,
    #[error("There is no host-visible memory type for the staging buffer")]
    NoHostVisibleMemory,
}

pub static VULKAN_VALIDATION: LazyLock<bool> =
    LazyLock::new(|| std::env::var("JAY_VULKAN_VALIDATION").ok().as_deref() == Some("1"));
