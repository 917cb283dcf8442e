//! Vulkan logical device, queues and the extension capability table.
//!
//! # Overview
//!
//! [`Device::new`] creates the logical device with one queue per unique
//! family and resolves a [`DeviceCapabilities`] table once: the surface and
//! swapchain extension loaders plus the memory and feature facts that later
//! resource creation depends on. Components receive the table through the
//! shared `Arc<Device>` instead of looking extension functions up themselves.
//!
//! # Example
//!
//! ```no_run
//! use texquad_rhi::instance::Instance;
//! use texquad_rhi::physical_device::select_physical_device;
//! use texquad_rhi::device::Device;
//! use ash::vk;
//!
//! # fn example(instance: &Instance, surface: vk::SurfaceKHR) -> Result<(), texquad_rhi::RhiError> {
//! let surface_loader = instance.surface_loader();
//! let info = select_physical_device(instance.handle(), surface, &surface_loader)?;
//! let device = Device::new(instance, &info)?;
//!
//! let graphics_queue = device.graphics_queue();
//! let swapchain_loader = device.capabilities().swapchain();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::memory::find_memory_type;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices, REQUIRED_DEVICE_EXTENSIONS};

/// Maximum sampler anisotropy requested when the feature is available.
pub const MAX_SAMPLER_ANISOTROPY: f32 = 8.0;

/// Extension entry points and device facts resolved at device creation.
pub struct DeviceCapabilities {
    surface: ash::khr::surface::Instance,
    swapchain: ash::khr::swapchain::Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    sampler_anisotropy: Option<f32>,
}

impl DeviceCapabilities {
    /// `VK_KHR_surface` entry points.
    #[inline]
    pub fn surface(&self) -> &ash::khr::surface::Instance {
        &self.surface
    }

    /// `VK_KHR_swapchain` entry points.
    #[inline]
    pub fn swapchain(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain
    }

    /// Memory heaps and types of the physical device.
    #[inline]
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Anisotropy level to request from samplers, `None` if the feature is off.
    #[inline]
    pub fn sampler_anisotropy(&self) -> Option<f32> {
        self.sampler_anisotropy
    }
}

/// Vulkan logical device wrapper.
///
/// Shared through `Arc`; every resource keeps a clone so the device outlives
/// the objects created from it.
pub struct Device {
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Physical device handle.
    physical_device: vk::PhysicalDevice,
    /// Graphics queue handle.
    graphics_queue: vk::Queue,
    /// Presentation queue handle.
    present_queue: vk::Queue,
    /// Queue family indices.
    queue_families: QueueFamilyIndices,
    /// Extension loaders and device facts.
    capabilities: DeviceCapabilities,
}

impl Device {
    /// Creates the logical device for the selected GPU.
    ///
    /// Enables [`REQUIRED_DEVICE_EXTENSIONS`] and, when supported,
    /// `samplerAnisotropy`.
    ///
    /// # Errors
    ///
    /// Returns an error if the selected GPU has no graphics or present family
    /// or if device creation fails.
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
    ) -> Result<Arc<Self>, RhiError> {
        let queue_families = physical_device_info.queue_families;
        let (graphics_family, present_family) =
            match (queue_families.graphics_family, queue_families.present_family) {
                (Some(graphics), Some(present)) => (graphics, present),
                _ => return Err(RhiError::NoSuitableGpu),
            };

        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let anisotropy = physical_device_info.supports_sampler_anisotropy();
        let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(anisotropy);

        let extension_names: Vec<*const std::ffi::c_char> = REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s), sampler anisotropy {}",
            REQUIRED_DEVICE_EXTENSIONS.len(),
            if anisotropy { "on" } else { "off" }
        );

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        debug!(
            "Queues retrieved: graphics family {}, present family {}",
            graphics_family, present_family
        );

        let capabilities = DeviceCapabilities {
            surface: instance.surface_loader(),
            swapchain: ash::khr::swapchain::Device::new(instance.handle(), &device),
            memory_properties: physical_device_info.memory_properties,
            sampler_anisotropy: anisotropy.then(|| {
                MAX_SAMPLER_ANISOTROPY.min(physical_device_info.properties.limits.max_sampler_anisotropy)
            }),
        };

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device_info.device,
            graphics_queue,
            present_queue,
            queue_families,
            capabilities,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the graphics queue handle.
    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Returns the presentation queue handle.
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Returns the queue family indices.
    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Returns the capability table resolved at creation.
    #[inline]
    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// Picks a memory type for a resource on this device.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::NoCompatibleMemoryType`] if nothing matches.
    pub fn find_memory_type(
        &self,
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> RhiResult<u32> {
        find_memory_type(&self.capabilities.memory_properties, type_bits, properties)
    }

    /// Blocks until every queue of the device is idle.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] if the device was lost.
    pub fn wait_idle(&self) -> Result<(), RhiError> {
        unsafe { self.device.device_wait_idle() }.map_err(RhiError::from_vk)
    }

    /// Submits command buffers to the graphics queue.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - All command buffers are valid and recorded
    /// - Referenced semaphores and the fence are not in use by another submission
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] if the device was lost.
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> Result<(), RhiError> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submit_infos, fence)
        }
        .map_err(RhiError::from_vk)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("Failed to wait for device idle during drop: {:?}", e);
            }
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash::Device and the extension loaders are tables of function
// pointers plus a handle; queues are only submitted to from the render thread.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}
