//! Instance, surface and device: the objects every GPU component hangs off.

use std::sync::Arc;

use tracing::info;

use texquad_core::VulkanConfig;
use texquad_platform::{Surface, Window};
use texquad_rhi::device::Device;
use texquad_rhi::instance::{Instance, InstanceDesc};
use texquad_rhi::physical_device::select_physical_device;

use crate::error::RendererResult;

/// Long-lived Vulkan objects for one window.
///
/// Fields drop top to bottom: the device goes first, then the surface, then
/// the instance both were created from.
pub struct RenderContext {
    device: Arc<Device>,
    surface: Surface,
    instance: Instance,
}

impl RenderContext {
    /// Creates the instance, a surface for `window` and the best device that
    /// can present to it.
    ///
    /// # Errors
    ///
    /// Fails if the instance, surface or device cannot be created, or no GPU
    /// qualifies.
    pub fn new(window: &Window, config: &VulkanConfig) -> RendererResult<Self> {
        let surface_extensions = window.required_extensions()?;
        let instance = Instance::new(&InstanceDesc {
            app_name: &config.app_name,
            enable_validation: config.validation,
            surface_extensions: &surface_extensions,
        })?;

        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let surface_loader = instance.surface_loader();
        let device_info =
            select_physical_device(instance.handle(), surface.handle(), &surface_loader)?;
        let device = Device::new(&instance, &device_info)?;

        info!(
            "Render context ready on {} ({})",
            device_info.device_name(),
            device_info.device_type_name()
        );

        Ok(Self {
            device,
            surface,
            instance,
        })
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }
}
