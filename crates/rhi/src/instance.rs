//! Vulkan instance, validation layer and debug messenger.
//!
//! # Overview
//!
//! [`Instance::new`] loads the Vulkan library, enables the surface extensions
//! the window collaborator asks for, and when requested turns on
//! `VK_LAYER_KHRONOS_validation` with a debug messenger that forwards
//! warnings and errors to `tracing`. A missing validation layer is logged and
//! skipped; a missing surface extension is fatal.
//!
//! # Example
//!
//! ```no_run
//! use texquad_rhi::instance::{Instance, InstanceDesc};
//!
//! # fn example() -> Result<(), texquad_rhi::RhiError> {
//! let instance = Instance::new(&InstanceDesc {
//!     app_name: "Vulkan Testing App",
//!     enable_validation: cfg!(debug_assertions),
//!     surface_extensions: &[ash::khr::surface::NAME],
//! })?;
//! let entry = instance.entry();
//! # Ok(())
//! # }
//! ```

use std::ffi::{CStr, CString, c_char};

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::error::RhiError;
use crate::physical_device::{fixed_array_cstr, missing_extensions};

/// The Khronos validation layer name.
pub const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Parameters for [`Instance::new`].
#[derive(Debug, Clone, Copy)]
pub struct InstanceDesc<'a> {
    /// Application name reported to the driver.
    pub app_name: &'a str,
    /// Request the validation layer and debug messenger.
    pub enable_validation: bool,
    /// Instance extensions needed to create a surface on this platform.
    pub surface_extensions: &'a [&'static CStr],
}

/// Vulkan instance wrapper with optional validation layer support.
pub struct Instance {
    /// Vulkan entry point loader
    entry: Entry,
    /// Vulkan instance handle
    instance: ash::Instance,
    /// Debug utils loader and messenger, present when validation is active
    debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl Instance {
    /// Creates a new Vulkan instance targeting API 1.2.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the Vulkan library cannot be loaded
    /// - a surface extension is not available ([`RhiError::MissingExtension`])
    /// - instance or debug messenger creation fails
    pub fn new(desc: &InstanceDesc<'_>) -> Result<Self, RhiError> {
        let entry = unsafe { Entry::load()? };

        let available_extensions = unsafe { entry.enumerate_instance_extension_properties(None)? };
        debug!("Available instance extensions:");
        for extension in &available_extensions {
            if let Some(name) = fixed_array_cstr(&extension.extension_name) {
                debug!("  {}", name.to_string_lossy());
            }
        }

        let missing = missing_extensions(desc.surface_extensions, &available_extensions);
        if let Some(name) = missing.first() {
            return Err(RhiError::MissingExtension(name.to_string_lossy().into_owned()));
        }

        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };
        let validation_available =
            desc.enable_validation && layer_available(VALIDATION_LAYER_NAME, &available_layers);
        if desc.enable_validation && !validation_available {
            warn!(
                "Validation layer {} is not available, proceeding without it",
                VALIDATION_LAYER_NAME.to_string_lossy()
            );
        }

        let app_name = CString::new(desc.app_name).map_err(|_| {
            RhiError::InvalidHandle(format!("application name {:?} contains NUL", desc.app_name))
        })?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"No Engine")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_2);

        let mut extensions: Vec<*const c_char> =
            desc.surface_extensions.iter().map(|ext| ext.as_ptr()).collect();
        if validation_available {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layers = if validation_available {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        info!(
            "Vulkan instance created for '{}' (API version 1.2)",
            desc.app_name
        );

        let debug = if validation_available {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => {
                    info!("Validation layers enabled");
                    Some((debug_utils, messenger))
                }
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            debug,
        })
    }

    /// Returns the Vulkan instance handle.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the Vulkan entry point loader.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Creates a `VK_KHR_surface` function loader for this instance.
    pub fn surface_loader(&self) -> ash::khr::surface::Instance {
        ash::khr::surface::Instance::new(&self.entry, &self.instance)
    }

    /// Returns whether validation layers are enabled.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug.is_some()
    }

    /// Sets up the debug messenger for validation layer callbacks.
    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
    ) -> Result<vk::DebugUtilsMessengerEXT, RhiError> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None)? };
        Ok(messenger)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Returns true if `name` is among `available` layers.
pub fn layer_available(name: &CStr, available: &[vk::LayerProperties]) -> bool {
    available
        .iter()
        .any(|layer| fixed_array_cstr(&layer.layer_name) == Some(name))
}

/// Forwards validation messages to `tracing`.
///
/// # Safety
///
/// Called by the Vulkan loader with a valid or null callback data pointer.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("[Vulkan {}] {}", type_str, message);
    } else {
        warn!("[Vulkan {}] {}", type_str, message);
    }

    vk::FALSE
}
