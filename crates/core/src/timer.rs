//! Frame timer used by the main loop to report frame pacing.

use std::time::{Duration, Instant};

/// Averages produced by [`Timer::report`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    /// Frames counted during the reporting window.
    pub frames: u32,
    /// Length of the reporting window.
    pub window: Duration,
}

impl FrameReport {
    /// Average frames per second over the window.
    pub fn fps(&self) -> f64 {
        if self.window.is_zero() {
            return 0.0;
        }
        f64::from(self.frames) / self.window.as_secs_f64()
    }

    /// Average frame time in milliseconds over the window.
    pub fn frame_time_ms(&self) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        self.window.as_secs_f64() * 1000.0 / f64::from(self.frames)
    }
}

/// Frame timer measuring per-frame deltas and windowed averages.
#[derive(Debug)]
pub struct Timer {
    last_tick: Instant,
    window_start: Instant,
    frames_in_window: u32,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            last_tick: now,
            window_start: now,
            frames_in_window: 0,
        }
    }

    /// Mark the end of a frame and return the time since the previous one.
    pub fn tick(&mut self) -> Duration {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> Duration {
        let delta = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.frames_in_window += 1;
        delta
    }

    /// Returns a report once at least `interval` has passed since the last one,
    /// and starts a new window.
    pub fn report(&mut self, interval: Duration) -> Option<FrameReport> {
        self.report_at(Instant::now(), interval)
    }

    fn report_at(&mut self, now: Instant, interval: Duration) -> Option<FrameReport> {
        let window = now.saturating_duration_since(self.window_start);
        if window < interval {
            return None;
        }

        let report = FrameReport {
            frames: self.frames_in_window,
            window,
        };
        self.window_start = now;
        self.frames_in_window = 0;
        Some(report)
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_counts_frames_and_measures_delta() {
        let mut timer = Timer::new();
        let start = timer.last_tick;

        let delta = timer.tick_at(start + Duration::from_millis(16));
        assert_eq!(delta, Duration::from_millis(16));

        let delta = timer.tick_at(start + Duration::from_millis(40));
        assert_eq!(delta, Duration::from_millis(24));
        assert_eq!(timer.frames_in_window, 2);
    }

    #[test]
    fn test_report_waits_for_interval() {
        let mut timer = Timer::new();
        let start = timer.window_start;
        for i in 1..=30 {
            timer.tick_at(start + Duration::from_millis(i * 10));
        }

        assert!(
            timer
                .report_at(start + Duration::from_millis(300), Duration::from_secs(1))
                .is_none()
        );

        let report = timer
            .report_at(start + Duration::from_secs(1), Duration::from_secs(1))
            .expect("interval elapsed");
        assert_eq!(report.frames, 30);
        assert!((report.fps() - 30.0).abs() < 1e-9);
        assert!((report.frame_time_ms() - 1000.0 / 30.0).abs() < 1e-9);

        // A new window starts after each report
        assert_eq!(timer.frames_in_window, 0);
    }

    #[test]
    fn test_empty_report_is_zero() {
        let report = FrameReport {
            frames: 0,
            window: Duration::ZERO,
        };
        assert_eq!(report.fps(), 0.0);
        assert_eq!(report.frame_time_ms(), 0.0);
    }
}
