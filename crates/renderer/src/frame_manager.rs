//! Frame pacing across a fixed number of in-flight slots.
//!
//! [`FrameSynchronizer`] owns the per-frame ordering and nothing else. The
//! GPU work behind each step lives in a [`FrameBackend`], so the ordering can
//! be driven by the Vulkan renderer or by a recording test double.
//!
//! # Per-frame sequence
//!
//! ```text
//! slot s = frame % slots
//! 1. wait(fence s)
//! 2. image i = acquire(image_available s)
//! 3. if table[i] == Some(t) and t != s: wait(fence t)
//! 4. table[i] = s
//! 5. update uniforms of image i
//! 6. reset(fence s); submit(command buffer i, signals fence s)
//! 7. present(i)
//! 8. frame += 1
//! ```
//!
//! Every host wait is bounded by the configured timeout and the cancellation
//! token is checked before each one.
//!
//! A failure before step 2 leaves nothing pending and the frame can be
//! retried. A failure in steps 3-6 leaves the slot's image-available
//! semaphore signaled with no submission to consume it. Acquiring on that
//! slot again is invalid, so the synchronizer stops: every later
//! [`FrameSynchronizer::draw_frame`] returns [`RhiError::FrameAbandoned`]
//! and only [`FrameSynchronizer::shutdown`] remains usable.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use texquad_rhi::{RhiError, RhiResult};

/// GPU-side operations the frame loop sequences.
///
/// `slot` is always below [`FrameBackend::slot_count`] and `image` below
/// [`FrameBackend::image_count`].
pub trait FrameBackend {
    /// Number of frames that may be in flight at once.
    fn slot_count(&self) -> usize;

    /// Number of presentable images.
    fn image_count(&self) -> usize;

    /// Blocks until the slot's last submission has completed.
    fn wait_slot(&mut self, slot: usize, timeout: Duration) -> RhiResult<()>;

    /// Unsignals the slot's fence ahead of a new submission.
    fn reset_slot(&mut self, slot: usize) -> RhiResult<()>;

    /// Acquires an image, signaling the slot's image-available semaphore.
    fn acquire(&mut self, slot: usize, timeout: Duration) -> RhiResult<u32>;

    /// Writes this frame's uniforms into the image's buffer.
    fn update_uniforms(&mut self, image: u32) -> RhiResult<()>;

    /// Submits the image's commands, signaling the slot's fence.
    fn submit(&mut self, slot: usize, image: u32) -> RhiResult<()>;

    fn present(&mut self, slot: usize, image: u32) -> RhiResult<()>;

    /// Blocks until the device has no pending work.
    fn wait_idle(&mut self) -> RhiResult<()>;
}

/// Shared stop flag for the frame loop.
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn check(&self) -> RhiResult<()> {
        if self.is_cancelled() {
            Err(RhiError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Which slot last submitted work targeting each image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInUseTable {
    owners: Vec<Option<usize>>,
}

impl ImageInUseTable {
    pub fn new(image_count: usize) -> Self {
        Self {
            owners: vec![None; image_count],
        }
    }

    /// Slot that last used `image`, if any.
    pub fn owner(&self, image: usize) -> Option<usize> {
        self.owners.get(image).copied().flatten()
    }

    /// Records `slot` as the user of `image` and returns the previous owner.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] for an image outside the table.
    pub fn claim(&mut self, image: usize, slot: usize) -> RhiResult<Option<usize>> {
        let len = self.owners.len();
        let entry = self.owners.get_mut(image).ok_or_else(|| {
            RhiError::InvalidHandle(format!("image index {image} out of range ({len} images)"))
        })?;
        Ok(entry.replace(slot))
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// Drives a [`FrameBackend`] through the per-frame sequence.
pub struct FrameSynchronizer<B: FrameBackend> {
    backend: B,
    images_in_flight: ImageInUseTable,
    frame: usize,
    timeout: Duration,
    cancel: CancellationToken,
    abandoned: Option<(usize, u32)>,
}

impl<B: FrameBackend> FrameSynchronizer<B> {
    pub fn new(backend: B, timeout: Duration, cancel: CancellationToken) -> Self {
        let images_in_flight = ImageInUseTable::new(backend.image_count());

        info!(
            "Frame synchronizer: {} slots, {} images, timeout {:?}",
            backend.slot_count(),
            backend.image_count(),
            timeout
        );

        Self {
            backend,
            images_in_flight,
            frame: 0,
            timeout,
            cancel,
            abandoned: None,
        }
    }

    /// Renders and presents one frame. Returns the image index used.
    ///
    /// On error the frame counter does not advance. An error between the
    /// acquire and the submit stops the loop for good.
    ///
    /// # Errors
    ///
    /// - [`RhiError::Cancelled`] if the token was cancelled before a wait
    /// - [`RhiError::Timeout`] if a fence wait or the acquire timed out
    /// - [`RhiError::DeviceLost`] if the device was lost
    /// - [`RhiError::FrameAbandoned`] if an earlier frame failed after its acquire
    /// - any other backend error
    pub fn draw_frame(&mut self) -> RhiResult<u32> {
        if let Some((slot, image)) = self.abandoned {
            return Err(RhiError::FrameAbandoned { slot, image });
        }
        let slot = self.current_slot();

        self.cancel.check()?;
        self.backend.wait_slot(slot, self.timeout)?;

        self.cancel.check()?;
        let image = self.backend.acquire(slot, self.timeout)?;

        if let Err(e) = self.submit_acquired(slot, image) {
            warn!(
                "Frame on slot {} failed after acquiring image {}, stopping: {}",
                slot, image, e
            );
            self.abandoned = Some((slot, image));
            return Err(e);
        }
        self.backend.present(slot, image)?;

        self.frame = (self.frame + 1) % self.backend.slot_count();
        Ok(image)
    }

    /// Steps 3-6: everything between a successful acquire and the submit
    /// that consumes its semaphore.
    fn submit_acquired(&mut self, slot: usize, image: u32) -> RhiResult<()> {
        let previous = self.images_in_flight.owner(image as usize);
        if let Some(owner) = previous
            && owner != slot
        {
            trace!("Image {} still owned by slot {}, waiting", image, owner);
            self.cancel.check()?;
            self.backend.wait_slot(owner, self.timeout)?;
        }
        self.images_in_flight.claim(image as usize, slot)?;

        self.backend.update_uniforms(image)?;

        self.backend.reset_slot(slot)?;
        self.backend.submit(slot, image)
    }

    /// Waits for all GPU work so resources can be released.
    ///
    /// Runs even if the token is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] if the device was lost.
    pub fn shutdown(&mut self) -> RhiResult<()> {
        debug!("Frame synchronizer draining device");
        self.backend.wait_idle()
    }

    /// True once a frame failed between its acquire and its submit.
    #[inline]
    pub fn is_abandoned(&self) -> bool {
        self.abandoned.is_some()
    }

    /// Slot the next [`draw_frame`](Self::draw_frame) will use.
    #[inline]
    pub fn current_slot(&self) -> usize {
        self.frame
    }

    #[inline]
    pub fn images_in_flight(&self) -> &ImageInUseTable {
        &self.images_in_flight
    }

    #[inline]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use texquad_rhi::vk;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Reset(usize),
        Acquire(usize),
        Update(u32),
        Submit(usize, u32),
        Present(u32),
        Idle,
    }

    /// Hands out images round-robin and can be told to fail one call.
    struct ScriptedBackend {
        images: usize,
        next_image: u32,
        calls: Vec<Call>,
        fail_wait: Option<RhiError>,
        fail_acquire: Option<RhiError>,
        fail_update: Option<RhiError>,
    }

    impl ScriptedBackend {
        fn new(images: usize) -> Self {
            Self {
                images,
                next_image: 0,
                calls: Vec::new(),
                fail_wait: None,
                fail_acquire: None,
                fail_update: None,
            }
        }
    }

    impl FrameBackend for ScriptedBackend {
        fn slot_count(&self) -> usize {
            2
        }

        fn image_count(&self) -> usize {
            self.images
        }

        fn wait_slot(&mut self, slot: usize, _timeout: Duration) -> RhiResult<()> {
            self.calls.push(Call::Wait(slot));
            match self.fail_wait.take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        fn reset_slot(&mut self, slot: usize) -> RhiResult<()> {
            self.calls.push(Call::Reset(slot));
            Ok(())
        }

        fn acquire(&mut self, slot: usize, _timeout: Duration) -> RhiResult<u32> {
            self.calls.push(Call::Acquire(slot));
            if let Some(e) = self.fail_acquire.take() {
                return Err(e);
            }
            let image = self.next_image;
            self.next_image = (self.next_image + 1) % self.images as u32;
            Ok(image)
        }

        fn update_uniforms(&mut self, image: u32) -> RhiResult<()> {
            self.calls.push(Call::Update(image));
            match self.fail_update.take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        fn submit(&mut self, slot: usize, image: u32) -> RhiResult<()> {
            self.calls.push(Call::Submit(slot, image));
            Ok(())
        }

        fn present(&mut self, _slot: usize, image: u32) -> RhiResult<()> {
            self.calls.push(Call::Present(image));
            Ok(())
        }

        fn wait_idle(&mut self) -> RhiResult<()> {
            self.calls.push(Call::Idle);
            Ok(())
        }
    }

    fn synchronizer(images: usize) -> FrameSynchronizer<ScriptedBackend> {
        FrameSynchronizer::new(
            ScriptedBackend::new(images),
            Duration::from_millis(100),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_first_frame_sequence() {
        let mut sync = synchronizer(3);
        assert_eq!(sync.draw_frame().unwrap(), 0);

        assert_eq!(
            sync.backend().calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Update(0),
                Call::Reset(0),
                Call::Submit(0, 0),
                Call::Present(0),
            ]
        );
        assert_eq!(sync.images_in_flight().owner(0), Some(0));
        assert_eq!(sync.current_slot(), 1);
    }

    #[test]
    fn test_reacquired_image_waits_on_previous_owner() {
        let mut sync = synchronizer(3);
        for _ in 0..3 {
            sync.draw_frame().unwrap();
        }
        sync.backend_mut().calls.clear();

        // Fourth frame: slot 1 gets image 0, last used by slot 0
        assert_eq!(sync.draw_frame().unwrap(), 0);
        assert_eq!(
            &sync.backend().calls[..3],
            &[Call::Wait(1), Call::Acquire(1), Call::Wait(0)]
        );
        assert_eq!(sync.images_in_flight().owner(0), Some(1));
    }

    #[test]
    fn test_same_slot_owner_needs_no_extra_wait() {
        // Two images and two slots: slot s always gets image s back
        let mut sync = synchronizer(2);
        for _ in 0..4 {
            sync.draw_frame().unwrap();
        }

        let waits = sync
            .backend()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Wait(_)))
            .count();
        assert_eq!(waits, 4);
    }

    #[test]
    fn test_timeout_propagates_without_advancing() {
        let mut sync = synchronizer(3);
        sync.backend_mut().fail_wait = Some(RhiError::Timeout {
            operation: "fence",
            timeout: Duration::from_millis(100),
        });

        let err = sync.draw_frame().unwrap_err();
        assert!(matches!(err, RhiError::Timeout { .. }));
        assert_eq!(sync.current_slot(), 0);
        assert_eq!(sync.backend().calls, vec![Call::Wait(0)]);
    }

    #[test]
    fn test_device_lost_on_acquire_skips_submit() {
        let mut sync = synchronizer(3);
        sync.backend_mut().fail_acquire = Some(RhiError::DeviceLost);

        assert!(matches!(sync.draw_frame(), Err(RhiError::DeviceLost)));
        assert!(
            !sync
                .backend()
                .calls
                .iter()
                .any(|c| matches!(c, Call::Reset(_) | Call::Submit(..)))
        );
        assert_eq!(sync.images_in_flight().owner(0), None);
    }

    #[test]
    fn test_failure_after_acquire_stops_the_loop() {
        let mut sync = synchronizer(3);
        sync.backend_mut().fail_update = Some(RhiError::VulkanError(
            vk::Result::ERROR_MEMORY_MAP_FAILED,
        ));

        assert!(matches!(
            sync.draw_frame(),
            Err(RhiError::VulkanError(vk::Result::ERROR_MEMORY_MAP_FAILED))
        ));
        assert!(sync.is_abandoned());
        assert_eq!(sync.current_slot(), 0);

        // The retry must not acquire on slot 0 again
        sync.backend_mut().calls.clear();
        let err = sync.draw_frame().unwrap_err();
        assert!(matches!(err, RhiError::FrameAbandoned { slot: 0, image: 0 }));
        assert!(err.is_fatal());
        assert!(sync.backend().calls.is_empty());

        sync.shutdown().unwrap();
        assert_eq!(sync.backend().calls, vec![Call::Idle]);
    }

    #[test]
    fn test_failure_before_acquire_can_retry() {
        let mut sync = synchronizer(3);
        sync.backend_mut().fail_wait = Some(RhiError::Timeout {
            operation: "fence",
            timeout: Duration::from_millis(100),
        });

        assert!(sync.draw_frame().is_err());
        assert!(!sync.is_abandoned());
        assert_eq!(sync.draw_frame().unwrap(), 0);
    }

    #[test]
    fn test_cancelled_before_first_wait() {
        let mut sync = synchronizer(3);
        sync.cancellation_token().clone().cancel();

        assert!(matches!(sync.draw_frame(), Err(RhiError::Cancelled)));
        assert!(sync.backend().calls.is_empty());

        // Shutdown still drains the device
        sync.shutdown().unwrap();
        assert_eq!(sync.backend().calls, vec![Call::Idle]);
    }

    #[test]
    fn test_image_table_claim() {
        let mut table = ImageInUseTable::new(3);
        assert_eq!(table.len(), 3);
        assert_eq!(table.owner(2), None);

        assert_eq!(table.claim(2, 0).unwrap(), None);
        assert_eq!(table.claim(2, 1).unwrap(), Some(0));
        assert_eq!(table.owner(2), Some(1));

        assert!(matches!(
            table.claim(3, 0),
            Err(RhiError::InvalidHandle(_))
        ));
        assert_eq!(table.owner(3), None);
    }

    #[test]
    fn test_cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
