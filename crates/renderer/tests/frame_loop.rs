//! Frame loop ordering against a simulated GPU.
//!
//! The simulated backend tracks fence state, which image each slot's
//! pending submission renders to, and whether each slot's image-available
//! semaphore has a signal no submission has consumed yet. It fails the test
//! on any ordering that would be a hazard on real hardware.

use std::time::Duration;

use texquad_renderer::{CancellationToken, FrameBackend, FrameSynchronizer};
use texquad_rhi::{RhiError, RhiResult};

const SLOTS: usize = 2;
const IMAGES: usize = 3;
const TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Wait(usize),
    Reset(usize),
    Acquire(usize, u32),
    Submit(usize, u32),
    Present(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Unsignaled,
    Pending(u32),
}

struct SimulatedGpu {
    fences: [FenceState; SLOTS],
    image_available_signaled: [bool; SLOTS],
    acquire_order: Vec<u32>,
    acquired: usize,
    events: Vec<Event>,
    fail_next_wait: Option<RhiError>,
    fail_owner_wait: Option<RhiError>,
    cancel_on_acquire: Option<CancellationToken>,
}

impl SimulatedGpu {
    fn new(acquire_order: Vec<u32>) -> Self {
        Self {
            fences: [FenceState::Signaled; SLOTS],
            image_available_signaled: [false; SLOTS],
            acquire_order,
            acquired: 0,
            events: Vec::new(),
            fail_next_wait: None,
            fail_owner_wait: None,
            cancel_on_acquire: None,
        }
    }

    fn pending_image(&self, slot: usize) -> Option<u32> {
        match self.fences[slot] {
            FenceState::Pending(image) => Some(image),
            _ => None,
        }
    }
}

impl FrameBackend for SimulatedGpu {
    fn slot_count(&self) -> usize {
        SLOTS
    }

    fn image_count(&self) -> usize {
        IMAGES
    }

    fn wait_slot(&mut self, slot: usize, _timeout: Duration) -> RhiResult<()> {
        let after_acquire = matches!(self.events.last(), Some(Event::Acquire(..)));
        self.events.push(Event::Wait(slot));
        if let Some(e) = self.fail_next_wait.take() {
            return Err(e);
        }
        if after_acquire && let Some(e) = self.fail_owner_wait.take() {
            return Err(e);
        }
        assert_ne!(
            self.fences[slot],
            FenceState::Unsignaled,
            "waiting on a reset fence with nothing submitted would hang"
        );
        self.fences[slot] = FenceState::Signaled;
        Ok(())
    }

    fn reset_slot(&mut self, slot: usize) -> RhiResult<()> {
        self.events.push(Event::Reset(slot));
        assert_eq!(
            self.fences[slot],
            FenceState::Signaled,
            "slot {slot} reset before its previous submission was waited on"
        );
        self.fences[slot] = FenceState::Unsignaled;
        Ok(())
    }

    fn acquire(&mut self, slot: usize, _timeout: Duration) -> RhiResult<u32> {
        let image = self.acquire_order[self.acquired % self.acquire_order.len()];
        self.acquired += 1;
        self.events.push(Event::Acquire(slot, image));
        assert!(
            !self.image_available_signaled[slot],
            "acquire on slot {slot} while its semaphore still has an unconsumed signal"
        );
        self.image_available_signaled[slot] = true;
        if let Some(token) = self.cancel_on_acquire.take() {
            token.cancel();
        }
        Ok(image)
    }

    fn update_uniforms(&mut self, image: u32) -> RhiResult<()> {
        for slot in 0..SLOTS {
            assert_ne!(
                self.pending_image(slot),
                Some(image),
                "uniforms of image {image} written while slot {slot} still reads them"
            );
        }
        Ok(())
    }

    fn submit(&mut self, slot: usize, image: u32) -> RhiResult<()> {
        self.events.push(Event::Submit(slot, image));
        assert_eq!(self.fences[slot], FenceState::Unsignaled);
        assert!(
            self.image_available_signaled[slot],
            "submit on slot {slot} without an acquired image"
        );
        self.image_available_signaled[slot] = false;
        self.fences[slot] = FenceState::Pending(image);
        Ok(())
    }

    fn present(&mut self, _slot: usize, image: u32) -> RhiResult<()> {
        self.events.push(Event::Present(image));
        Ok(())
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        self.fences = [FenceState::Signaled; SLOTS];
        Ok(())
    }
}

fn synchronizer(acquire_order: Vec<u32>) -> FrameSynchronizer<SimulatedGpu> {
    FrameSynchronizer::new(
        SimulatedGpu::new(acquire_order),
        TIMEOUT,
        CancellationToken::new(),
    )
}

#[test]
fn slots_alternate_over_many_frames() {
    let mut frames = synchronizer(vec![0, 1, 2]);

    let mut slots = Vec::new();
    for _ in 0..10 {
        slots.push(frames.current_slot());
        frames.draw_frame().unwrap();
    }

    assert_eq!(slots, [0, 1, 0, 1, 0, 1, 0, 1, 0, 1]);
}

#[test]
fn every_reset_follows_a_wait_on_the_same_slot() {
    let mut frames = synchronizer(vec![0, 1, 2]);
    for _ in 0..10 {
        frames.draw_frame().unwrap();
    }

    let events = &frames.backend().events;
    for (i, event) in events.iter().enumerate() {
        if let Event::Reset(slot) = *event {
            let last_submit = events[..i]
                .iter()
                .rposition(|e| matches!(e, Event::Submit(s, _) if *s == slot));
            let start = last_submit.map_or(0, |p| p + 1);
            assert!(
                events[start..i].contains(&Event::Wait(slot)),
                "reset of slot {slot} at event {i} without a wait"
            );
        }
    }
}

#[test]
fn out_of_order_images_wait_on_their_previous_owner() {
    // Frame 5 runs on slot 1 and gets image 1, last submitted by slot 0
    let mut frames = synchronizer(vec![0, 2, 1, 2, 0, 1]);
    for _ in 0..12 {
        frames.draw_frame().unwrap();
    }

    let events = &frames.backend().events;
    let start = events
        .iter()
        .position(|e| *e == Event::Acquire(1, 1))
        .unwrap()
        - 1;
    assert_eq!(
        &events[start..start + 5],
        &[
            Event::Wait(1),
            Event::Acquire(1, 1),
            Event::Wait(0),
            Event::Reset(1),
            Event::Submit(1, 1),
        ]
    );

    let acquire_then_wait = events
        .windows(2)
        .filter(|w| matches!(w, [Event::Acquire(s, _), Event::Wait(t)] if s != t))
        .count();
    assert!(acquire_then_wait > 0);

    for w in events.windows(2) {
        if let [Event::Acquire(slot, _), Event::Wait(owner)] = *w {
            assert_ne!(slot, owner);
        }
    }
}

#[test]
fn table_records_claim_before_next_acquire() {
    let mut frames = synchronizer(vec![0, 1, 2]);

    for expected_slot in [0, 1, 0, 1, 0] {
        let image = frames.draw_frame().unwrap();
        assert_eq!(
            frames.images_in_flight().owner(image as usize),
            Some(expected_slot)
        );
    }
    assert_eq!(frames.images_in_flight().len(), IMAGES);
}

#[test]
fn shutdown_drains_all_slots() {
    let mut frames = synchronizer(vec![0, 1, 2]);
    frames.draw_frame().unwrap();
    frames.draw_frame().unwrap();

    frames.shutdown().unwrap();
    assert!(
        frames
            .backend()
            .fences
            .iter()
            .all(|f| *f == FenceState::Signaled)
    );
}

#[test]
fn timeout_before_acquire_can_retry() {
    let mut frames = synchronizer(vec![0, 1, 2]);
    frames.draw_frame().unwrap();

    frames.backend_mut().fail_next_wait = Some(RhiError::Timeout {
        operation: "fence",
        timeout: TIMEOUT,
    });
    let err = frames.draw_frame().unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, RhiError::Timeout { .. }));
    assert_eq!(frames.current_slot(), 1);
    assert!(!frames.is_abandoned());

    // Nothing was acquired or reset, so the retry succeeds
    frames.draw_frame().unwrap();
    assert_eq!(frames.current_slot(), 0);
}

#[test]
fn owner_wait_timeout_refuses_to_reacquire_on_the_slot() {
    // Frame 3 on slot 0 gets image 1, owned by slot 1
    let mut frames = synchronizer(vec![0, 1, 1, 2]);
    frames.draw_frame().unwrap();
    frames.draw_frame().unwrap();

    frames.backend_mut().fail_owner_wait = Some(RhiError::Timeout {
        operation: "fence",
        timeout: TIMEOUT,
    });
    frames.backend_mut().events.clear();

    let err = frames.draw_frame().unwrap_err();
    assert!(matches!(err, RhiError::Timeout { .. }));
    assert_eq!(
        frames.backend().events,
        vec![Event::Wait(0), Event::Acquire(0, 1), Event::Wait(1)]
    );
    assert!(frames.backend().image_available_signaled[0]);
    assert!(frames.is_abandoned());

    // Acquiring on slot 0 again would reuse a signaled semaphore
    frames.backend_mut().events.clear();
    let err = frames.draw_frame().unwrap_err();
    assert!(matches!(err, RhiError::FrameAbandoned { slot: 0, image: 1 }));
    assert!(err.is_fatal());
    assert!(frames.backend().events.is_empty());

    frames.shutdown().unwrap();
}

#[test]
fn device_lost_is_distinct_and_fatal() {
    let mut frames = synchronizer(vec![0, 1, 2]);
    frames.backend_mut().fail_next_wait = Some(RhiError::DeviceLost);

    let err = frames.draw_frame().unwrap_err();
    assert!(matches!(err, RhiError::DeviceLost));
    assert!(err.is_fatal());
}

#[test]
fn cancelled_before_first_wait_touches_nothing() {
    let mut frames = synchronizer(vec![0, 1, 2]);
    frames.cancellation_token().cancel();

    assert!(matches!(frames.draw_frame(), Err(RhiError::Cancelled)));
    assert!(frames.backend().events.is_empty());
}

#[test]
fn cancelled_mid_frame_stops_before_owner_wait() {
    // Frame 3 on slot 0 gets image 1, owned by slot 1
    let mut frames = synchronizer(vec![0, 1, 1]);
    frames.draw_frame().unwrap();
    frames.draw_frame().unwrap();

    let token = frames.cancellation_token().clone();
    frames.backend_mut().cancel_on_acquire = Some(token);
    frames.backend_mut().events.clear();

    assert!(matches!(frames.draw_frame(), Err(RhiError::Cancelled)));
    assert_eq!(
        frames.backend().events,
        vec![Event::Wait(0), Event::Acquire(0, 1)]
    );
    assert!(
        !frames
            .backend()
            .events
            .iter()
            .any(|e| matches!(e, Event::Submit(..)))
    );

    frames.backend_mut().events.clear();
    assert!(matches!(
        frames.draw_frame(),
        Err(RhiError::FrameAbandoned { slot: 0, image: 1 })
    ));
    assert!(frames.backend().events.is_empty());
}
