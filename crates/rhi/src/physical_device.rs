//! Physical device (GPU) selection.
//!
//! # Overview
//!
//! Every enumerated GPU is reduced to a [`DeviceCandidate`] and scored by
//! [`score_device`]:
//! - 0 (rejected) if it lacks a graphics queue family, a family that can
//!   present to the surface, any of [`REQUIRED_DEVICE_EXTENSIONS`], or any
//!   surface format or present mode
//! - otherwise 1000 for a discrete GPU plus `maxImageDimension2D`
//!
//! The highest score wins; ties go to the first enumerated device.
//!
//! # Example
//!
//! ```no_run
//! use texquad_rhi::instance::Instance;
//! use texquad_rhi::physical_device::select_physical_device;
//! use ash::vk;
//!
//! # fn example(instance: &Instance, surface: vk::SurfaceKHR) -> Result<(), texquad_rhi::RhiError> {
//! let surface_loader = instance.surface_loader();
//! let device_info = select_physical_device(instance.handle(), surface, &surface_loader)?;
//! println!("Selected GPU: {}", device_info.device_name());
//! # Ok(())
//! # }
//! ```

use std::ffi::{CStr, c_char};

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;

/// Device extensions the renderer cannot run without.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Score bonus for discrete GPUs.
pub const DISCRETE_GPU_BONUS: u32 = 1000;

/// Queue family indices for the two roles the renderer needs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// First family that supports graphics operations.
    pub graphics_family: Option<u32>,
    /// First family that can present to the target surface.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Checks that both a graphics and a present family were found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Returns the distinct family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);

        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }

        families
    }
}

/// Reads a NUL-terminated name out of a fixed-size Vulkan string array.
pub(crate) fn fixed_array_cstr(raw: &[c_char]) -> Option<&CStr> {
    CStr::from_bytes_until_nul(bytemuck::cast_slice(raw)).ok()
}

/// Returns the entries of `required` that do not appear in `available`.
///
/// Names are compared for exact equality.
pub fn missing_extensions<'a>(
    required: &[&'a CStr],
    available: &[vk::ExtensionProperties],
) -> Vec<&'a CStr> {
    required
        .iter()
        .copied()
        .filter(|&name| {
            !available
                .iter()
                .any(|ext| fixed_array_cstr(&ext.extension_name) == Some(name))
        })
        .collect()
}

/// What the selector knows about one GPU.
#[derive(Clone, Debug)]
pub struct DeviceCandidate {
    pub device_type: vk::PhysicalDeviceType,
    pub max_image_dimension_2d: u32,
    pub queue_families: QueueFamilyIndices,
    pub missing_extensions: Vec<&'static CStr>,
    pub surface_format_count: usize,
    pub present_mode_count: usize,
}

/// Scores a candidate; 0 means it cannot run the renderer.
pub fn score_device(candidate: &DeviceCandidate) -> u32 {
    if candidate.queue_families.graphics_family.is_none()
        || candidate.queue_families.present_family.is_none()
        || !candidate.missing_extensions.is_empty()
        || candidate.surface_format_count == 0
        || candidate.present_mode_count == 0
    {
        return 0;
    }

    let bonus = if candidate.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        DISCRETE_GPU_BONUS
    } else {
        0
    };
    bonus.saturating_add(candidate.max_image_dimension_2d)
}

/// Returns the index of the first highest non-zero score.
pub fn pick_best(scores: &[u32]) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        if score > best.map_or(0, |(_, s)| s) {
            best = Some((index, score));
        }
    }
    best.map(|(index, _)| index)
}

/// Information about the selected physical device.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory heaps and types.
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family indices for graphics and present.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        fixed_array_cstr(&self.properties.device_name)
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        device_type_name(self.properties.device_type)
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Returns true if anisotropic filtering can be enabled on this device.
    #[inline]
    pub fn supports_sampler_anisotropy(&self) -> bool {
        self.features.sampler_anisotropy == vk::TRUE
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

fn device_type_name(device_type: vk::PhysicalDeviceType) -> &'static str {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
        vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
        vk::PhysicalDeviceType::CPU => "CPU",
        _ => "Other",
    }
}

/// Selects the most suitable physical device for presenting to `surface`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no device scores above zero.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let mut inspections = Vec::with_capacity(devices.len());

    for device in devices {
        let (info, candidate) = match inspect_device(instance, device, surface, surface_loader) {
            Ok(inspected) => inspected,
            Err(e) => {
                warn!("Skipping GPU {:?}: capability query failed: {}", device, e);
                inspections.push(Err(e));
                continue;
            }
        };
        let score = score_device(&candidate);

        if score == 0 {
            debug!(
                "GPU '{}' rejected: queues={:?}, missing extensions={:?}, formats={}, present modes={}",
                info.device_name(),
                candidate.queue_families,
                candidate.missing_extensions,
                candidate.surface_format_count,
                candidate.present_mode_count
            );
        } else {
            debug!(
                "GPU '{}' ({}) - Score: {}",
                info.device_name(),
                info.device_type_name(),
                score
            );
        }

        inspections.push(Ok((info, candidate)));
    }

    let (selected, score) = pick_inspected(inspections).ok_or_else(|| {
        warn!("No suitable GPU found with required capabilities");
        RhiError::NoSuitableGpu
    })?;

    let (major, minor, patch) = selected.api_version();
    info!(
        "Picked physical device: '{}' ({}) - Vulkan {}.{}.{}, Score: {}",
        selected.device_name(),
        selected.device_type_name(),
        major,
        minor,
        patch,
        score
    );

    Ok(selected)
}

/// Picks the best inspected device and returns it with its score.
///
/// A device whose inspection failed scores 0, like any other unsuitable
/// device, so one broken driver entry does not hide the others.
pub fn pick_inspected<T>(
    inspections: Vec<Result<(T, DeviceCandidate), RhiError>>,
) -> Option<(T, u32)> {
    let scores: Vec<u32> = inspections
        .iter()
        .map(|inspection| {
            inspection
                .as_ref()
                .map_or(0, |(_, candidate)| score_device(candidate))
        })
        .collect();
    let best = pick_best(&scores)?;
    let (item, _) = inspections.into_iter().nth(best)?.ok()?;
    Some((item, scores[best]))
}

/// Queries everything the selector needs about one device.
fn inspect_device(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<(PhysicalDeviceInfo, DeviceCandidate), RhiError> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
    let queue_families = find_queue_families(instance, device, surface, surface_loader);

    let available = unsafe { instance.enumerate_device_extension_properties(device)? };
    let missing = missing_extensions(REQUIRED_DEVICE_EXTENSIONS, &available);

    // Surface queries are only meaningful once the extension is known to exist
    let (surface_format_count, present_mode_count) = if missing.is_empty() {
        let formats =
            unsafe { surface_loader.get_physical_device_surface_formats(device, surface)? };
        let present_modes =
            unsafe { surface_loader.get_physical_device_surface_present_modes(device, surface)? };
        (formats.len(), present_modes.len())
    } else {
        (0, 0)
    };

    let candidate = DeviceCandidate {
        device_type: properties.device_type,
        max_image_dimension_2d: properties.limits.max_image_dimension2_d,
        queue_families,
        missing_extensions: missing,
        surface_format_count,
        present_mode_count,
    };

    let info = PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_families,
    };

    Ok((info, candidate))
}

/// Finds the first graphics family and the first family that can present.
fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let mut indices = QueueFamilyIndices::default();

    for (i, family) in queue_families.iter().enumerate() {
        let i = i as u32;

        if family.queue_count == 0 {
            continue;
        }

        if indices.graphics_family.is_none()
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        {
            indices.graphics_family = Some(i);
        }

        if indices.present_family.is_none() {
            let present_support = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, i, surface)
                    .unwrap_or(false)
            };

            if present_support {
                indices.present_family = Some(i);
            }
        }

        if indices.is_complete() {
            break;
        }
    }

    indices
}
