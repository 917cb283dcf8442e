//! Synchronization primitives.
//!
//! - [`Semaphore`] orders work between queue operations on the GPU
//! - [`Fence`] lets the host observe GPU completion
//! - [`FrameSlot`] groups the three objects one in-flight frame needs
//!
//! Host waits are always bounded: [`Fence::wait`] takes a [`Duration`] and
//! reports expiry as [`RhiError::Timeout`] and device loss as
//! [`RhiError::DeviceLost`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use texquad_rhi::device::Device;
//! use texquad_rhi::sync::FrameSlot;
//!
//! # fn example(device: Arc<Device>) -> Result<(), texquad_rhi::RhiError> {
//! let slot = FrameSlot::new(device)?;
//!
//! // Created signaled, so the first wait returns immediately
//! slot.in_flight_fence().wait(Duration::from_secs(1))?;
//! slot.in_flight_fence().reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult, timeout_nanos};

/// Number of frames the host may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Vulkan semaphore wrapper.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates an unsignaled binary semaphore.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Vulkan fence wrapper.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence, optionally already signaled.
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` expires.
    ///
    /// # Errors
    ///
    /// - [`RhiError::Timeout`] if the fence is still unsignaled after `timeout`
    /// - [`RhiError::DeviceLost`] if the device was lost while waiting
    pub fn wait(&self, timeout: Duration) -> RhiResult<()> {
        wait_for_fences(&self.device, &[self.fence], timeout)
    }

    /// Returns the fence to the unsignaled state.
    ///
    /// The fence must not be referenced by a pending submission.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.fence]) }.map_err(RhiError::from_vk)
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Waits for all `fences` with a bounded timeout.
///
/// # Errors
///
/// See [`Fence::wait`].
pub fn wait_for_fences(device: &Device, fences: &[vk::Fence], timeout: Duration) -> RhiResult<()> {
    unsafe {
        device
            .handle()
            .wait_for_fences(fences, true, timeout_nanos(timeout))
    }
    .map_err(|e| RhiError::from_wait(e, "fence", timeout))
}

/// Synchronization objects owned by one in-flight frame.
///
/// ```text
/// wait(in_flight) -> acquire(signal image_available)
///   -> reset(in_flight) -> submit(wait image_available, signal render_finished + in_flight)
///   -> present(wait render_finished)
/// ```
pub struct FrameSlot {
    image_available: Semaphore,
    render_finished: Semaphore,
    in_flight: Fence,
}

impl FrameSlot {
    /// Creates the slot with its fence signaled so the first wait passes.
    ///
    /// # Errors
    ///
    /// Returns an error if any object creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device, true)?;

        debug!("Created frame slot");

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// Signaled by image acquisition, waited on by the submission.
    #[inline]
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }

    /// Signaled by the submission, waited on by presentation.
    #[inline]
    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }

    /// Signaled when the slot's submission completes on the GPU.
    #[inline]
    pub fn in_flight_fence(&self) -> &Fence {
        &self.in_flight
    }
}
