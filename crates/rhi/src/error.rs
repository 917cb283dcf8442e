//! RHI-specific error types.

use std::time::Duration;

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// No physical device passed the suitability checks
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// No memory type satisfies both the resource and the requested properties
    #[error("No memory type in bits {type_bits:#b} with properties {properties:?}")]
    NoCompatibleMemoryType {
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    },

    /// A required instance or device extension is not available
    #[error("Missing required extension: {0}")]
    MissingExtension(String),

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle or argument
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Layout pair without a barrier recipe
    #[error("Unsupported image layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },

    /// A host wait on the GPU did not finish in time
    #[error("Timed out after {timeout:?} waiting for {operation}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The device was lost; nothing submitted to it will complete
    #[error("Device lost")]
    DeviceLost,

    /// The caller requested the frame loop to stop
    #[error("Operation cancelled")]
    Cancelled,

    /// An earlier frame acquired an image but never submitted it
    #[error("Frame loop stopped: image {image} was acquired on slot {slot} but never submitted")]
    FrameAbandoned { slot: usize, image: u32 },
}

impl RhiError {
    /// Classifies the result of a bounded host wait.
    ///
    /// `TIMEOUT` and `NOT_READY` become [`RhiError::Timeout`],
    /// `ERROR_DEVICE_LOST` becomes [`RhiError::DeviceLost`], anything else is
    /// a plain [`RhiError::VulkanError`].
    pub fn from_wait(result: vk::Result, operation: &'static str, timeout: Duration) -> Self {
        match result {
            vk::Result::TIMEOUT | vk::Result::NOT_READY => RhiError::Timeout { operation, timeout },
            other => RhiError::from_vk(other),
        }
    }

    /// Like the `From<vk::Result>` conversion, but keeps device loss distinct.
    pub fn from_vk(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => RhiError::DeviceLost,
            other => RhiError::VulkanError(other),
        }
    }

    /// Returns true for errors after which the device cannot be used.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RhiError::DeviceLost | RhiError::Timeout { .. } | RhiError::FrameAbandoned { .. }
        )
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

/// Converts a [`Duration`] into the nanosecond timeout Vulkan expects, saturating.
#[inline]
pub(crate) fn timeout_nanos(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}
