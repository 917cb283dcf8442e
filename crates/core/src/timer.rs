//! Frame timing: animation clock and FPS reporting.

use std::time::{Duration, Instant};

/// Interval between FPS reports.
pub const FPS_REPORT_INTERVAL: Duration = Duration::from_secs(3);

/// Monotonic clock measuring time since creation and between ticks.
#[derive(Debug, Clone)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
        }
    }

    /// Total time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Seconds since the timer was created. Drives the quad rotation.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Time since the previous `tick()` (or creation).
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        delta
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts presented frames and yields an average rate once per interval.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    interval: Duration,
    window_start: Instant,
    frames: u32,
}

impl FpsCounter {
    /// Creates a counter reporting every [`FPS_REPORT_INTERVAL`].
    pub fn new() -> Self {
        Self::with_interval(FPS_REPORT_INTERVAL, Instant::now())
    }

    /// Creates a counter with a custom interval whose first window opens at `start`.
    pub fn with_interval(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            window_start: start,
            frames: 0,
        }
    }

    /// Records one frame finished at `now`.
    ///
    /// Returns the frames-per-second of the window that just closed when at
    /// least one interval has elapsed, and starts a new window.
    pub fn record_frame_at(&mut self, now: Instant) -> Option<f32> {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }

        let fps = self.frames as f32 / elapsed.as_secs_f32();
        self.frames = 0;
        self.window_start = now;
        Some(fps)
    }

    /// Records one frame finished now.
    pub fn record_frame(&mut self) -> Option<f32> {
        self.record_frame_at(Instant::now())
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}
