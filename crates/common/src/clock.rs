//! Clock and timing utilities for frame synchronization.
//!
//! Every render walks an output timeline at a fixed frame rate while
//! driving one or two source timelines. This module provides utilities for:
//! - Converting between frame indices and timestamps
//! - Counting frames for a duration without float drift
//! - Measuring how far a source landed from its seek target
//! - Throttling progress reports to every N frames

/// Tolerance used when snapping `duration * fps` to whole frames.
const FRAME_EPSILON: f64 = 1e-6;

/// A fixed-rate output clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameClock {
    fps: u32,
}

impl FrameClock {
    /// Create a clock ticking at `fps` frames per second (minimum 1).
    pub fn new(fps: u32) -> Self {
        Self { fps: fps.max(1) }
    }

    /// Frames per second.
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Duration of one frame in seconds.
    pub fn interval_secs(&self) -> f64 {
        1.0 / self.fps as f64
    }

    /// Timestamp of frame `index` relative to the clock origin.
    pub fn time_of(&self, index: u64) -> f64 {
        index as f64 / self.fps as f64
    }

    /// Number of whole frames covering `duration_secs`, rounded to nearest.
    pub fn frames_rounded(&self, duration_secs: f64) -> u64 {
        if duration_secs <= 0.0 {
            return 0;
        }
        (duration_secs * self.fps as f64).round() as u64
    }

    /// Number of frames needed so that `duration_secs` is fully covered.
    ///
    /// Products within [`FRAME_EPSILON`] of an integer are snapped first so
    /// that e.g. `1.0 * 30` never becomes 31 frames.
    pub fn frames_covering(&self, duration_secs: f64) -> u64 {
        if duration_secs <= 0.0 {
            return 0;
        }
        let exact = duration_secs * self.fps as f64;
        let nearest = exact.round();
        if (exact - nearest).abs() < FRAME_EPSILON {
            nearest as u64
        } else {
            exact.ceil() as u64
        }
    }
}

/// Drift between where a source was asked to seek and where it landed.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    /// Requested position (seconds).
    pub target_secs: f64,
    /// Reported position after the seek (seconds).
    pub landed_secs: f64,
}

impl DriftMeasurement {
    /// Drift in seconds (positive = landed ahead of target).
    pub fn drift_secs(&self) -> f64 {
        self.landed_secs - self.target_secs
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_secs() * 1000.0
    }

    /// Whether drift exceeds half a frame interval at the given clock.
    pub fn exceeds_half_frame(&self, clock: &FrameClock) -> bool {
        self.drift_secs().abs() > clock.interval_secs() / 2.0
    }
}

/// Throttles progress reports to once every `interval` frames.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: u64,
    last_reported: Option<u64>,
}

impl ProgressThrottle {
    /// Create a throttle firing every `interval` frames (minimum 1).
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            last_reported: None,
        }
    }

    /// Returns true when `frames_done` is due for a report.
    /// The final frame always reports so observers see completion.
    pub fn should_report(&mut self, frames_done: u64, total_frames: u64) -> bool {
        let due = frames_done % self.interval == 0 || frames_done == total_frames;
        if due && self.last_reported != Some(frames_done) {
            self.last_reported = Some(frames_done);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_times() {
        let clock = FrameClock::new(30);
        assert!((clock.time_of(45) - 1.5).abs() < 1e-12);
        assert!((clock.interval_secs() - 1.0 / 30.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_fps_is_clamped() {
        assert_eq!(FrameClock::new(0).fps(), 1);
    }

    #[test]
    fn test_frames_rounded() {
        let clock = FrameClock::new(30);
        assert_eq!(clock.frames_rounded(3.0), 90);
        assert_eq!(clock.frames_rounded(0.0), 0);
        assert_eq!(clock.frames_rounded(-1.0), 0);
        assert_eq!(clock.frames_rounded(0.049), 1);
    }

    #[test]
    fn test_frames_covering_snaps_float_noise() {
        let clock = FrameClock::new(30);
        // 0.1 * 3 * 30 is 9.000000000000002 in f64
        assert_eq!(clock.frames_covering(0.1 * 3.0), 9);
        assert_eq!(clock.frames_covering(1.0), 30);
        assert_eq!(clock.frames_covering(1.01), 31);
    }

    #[test]
    fn test_drift_measurement() {
        let clock = FrameClock::new(30);
        let drift = DriftMeasurement {
            target_secs: 1.0,
            landed_secs: 1.05,
        };
        assert!((drift.drift_ms() - 50.0).abs() < 1e-9);
        assert!(drift.exceeds_half_frame(&clock));

        let close = DriftMeasurement {
            target_secs: 1.0,
            landed_secs: 1.01,
        };
        assert!(!close.exceeds_half_frame(&clock));
    }

    #[test]
    fn test_progress_throttle() {
        let mut throttle = ProgressThrottle::new(10);
        assert!(!throttle.should_report(1, 25));
        assert!(throttle.should_report(10, 25));
        assert!(!throttle.should_report(10, 25)); // no duplicate report
        assert!(throttle.should_report(20, 25));
        assert!(throttle.should_report(25, 25)); // final frame always reports
    }
}
