//! Window and presentation surface.

use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use texquad_core::{Error, Result, WindowConfig};

/// Owned `VkSurfaceKHR`.
///
/// The instance it was created from must outlive it.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: created by ash_window::create_surface from the loader's
        // instance, destroyed only here.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}

/// Fixed-size application window.
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
}

impl Window {
    /// Opens a non-resizable window sized and titled from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Window`] if the event loop cannot create it.
    pub fn new(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(config.title.as_str())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(false);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        // The platform may not honor the requested size exactly.
        let size = window.inner_size();
        tracing::info!(
            "Window created: {}x{} (requested {}x{})",
            size.width,
            size.height,
            config.width,
            config.height
        );

        Ok(Self {
            window: Arc::new(window),
            width: size.width,
            height: size.height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Instance extensions needed to present to this window.
    ///
    /// # Errors
    ///
    /// See [`required_extensions`].
    pub fn required_extensions(&self) -> Result<Vec<&'static CStr>> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("failed to get display handle: {e}")))?;
        required_extensions(display_handle.as_raw())
    }

    /// Creates a presentation surface for this window.
    ///
    /// # Errors
    ///
    /// - [`Error::Window`] if the raw handles are unavailable
    /// - [`Error::Surface`] if Vulkan surface creation fails
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("failed to get display handle: {e}")))?;
        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("failed to get window handle: {e}")))?;

        // SAFETY: both handles come from the live winit window and the
        // surface is destroyed in Surface::drop.
        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(|e| Error::Surface(format!("vkCreate*SurfaceKHR failed: {e}")))?;

        tracing::info!("Vulkan surface created");

        Ok(Surface {
            handle,
            surface_loader: ash::khr::surface::Instance::new(entry, instance),
        })
    }
}

/// Surface extensions the platform's window system requires.
///
/// # Errors
///
/// Returns [`Error::Surface`] if the display handle type is not supported.
pub fn required_extensions(display_handle: RawDisplayHandle) -> Result<Vec<&'static CStr>> {
    let extensions = ash_window::enumerate_required_extensions(display_handle)
        .map_err(|e| Error::Surface(format!("unsupported display for Vulkan: {e}")))?;

    // SAFETY: ash_window returns pointers to its own 'static extension names.
    let names: Vec<&'static CStr> = extensions
        .iter()
        .map(|&ext| unsafe { CStr::from_ptr(ext) })
        .collect();

    tracing::debug!("Required surface extensions: {:?}", names);
    Ok(names)
}
