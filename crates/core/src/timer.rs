//! Frame timing for the render loop.

use std::time::{Duration, Instant};

/// Measures frame deltas and periodically reports the average frame time.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    last_tick: Instant,
    window_start: Instant,
    window_frames: u32,
    report_interval: Duration,
}

/// Averages over one reporting window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameStats {
    pub frames: u32,
    pub avg_frame_ms: f64,
    pub fps: f64,
}

impl FrameTimer {
    /// Create a timer reporting every `report_interval`.
    pub fn new(report_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            window_start: now,
            window_frames: 0,
            report_interval,
        }
    }

    /// Total time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Marks the end of a frame and returns the time since the previous one.
    pub fn tick(&mut self) -> Duration {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> Duration {
        let delta = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.window_frames += 1;
        delta
    }

    /// Returns the stats of the current window once it is older than the
    /// report interval, and starts a new window.
    pub fn take_report(&mut self) -> Option<FrameStats> {
        self.take_report_at(Instant::now())
    }

    fn take_report_at(&mut self, now: Instant) -> Option<FrameStats> {
        let span = now.saturating_duration_since(self.window_start);
        if span < self.report_interval || self.window_frames == 0 {
            return None;
        }

        let secs = span.as_secs_f64();
        let stats = FrameStats {
            frames: self.window_frames,
            avg_frame_ms: secs * 1000.0 / f64::from(self.window_frames),
            fps: f64::from(self.window_frames) / secs,
        };

        self.window_start = now;
        self.window_frames = 0;
        Some(stats)
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}
