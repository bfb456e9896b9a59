//! Frame timing.

use std::time::{Duration, Instant};

/// Longest frame delta handed to the simulation. Longer stalls (window
/// drags, breakpoints) would otherwise make the camera jump.
pub const MAX_FRAME_DELTA: Duration = Duration::from_millis(250);

/// Measures frame deltas and a once-per-second frame rate.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
    window_start: Instant,
    window_frames: u32,
}

impl Timer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            window_start: now,
            window_frames: 0,
        }
    }

    /// Seconds since the timer was created.
    pub fn elapsed_secs(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }

    /// Seconds since the previous call, capped at [`MAX_FRAME_DELTA`].
    pub fn delta_secs(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    /// Counts a frame; returns the average frame rate once a second has
    /// passed since the last report.
    pub fn frame_rate(&mut self) -> Option<f32> {
        self.count_frame_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> f32 {
        let delta = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        delta.min(MAX_FRAME_DELTA).as_secs_f32()
    }

    fn count_frame_at(&mut self, now: Instant) -> Option<f32> {
        self.window_frames += 1;
        let window = now.saturating_duration_since(self.window_start);
        if window < Duration::from_secs(1) {
            return None;
        }
        let fps = self.window_frames as f32 / window.as_secs_f32();
        self.window_start = now;
        self.window_frames = 0;
        Some(fps)
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
