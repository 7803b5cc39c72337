//! FFmpeg progress parsing and normalization.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Raw progress information from FFmpeg's `-progress` key/value stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Normalize against the job's total duration.
    pub fn normalized(&self, total_seconds: f64) -> EncodeProgress {
        let current_seconds = (self.out_time_ms as f64 / 1000.0).max(0.0);
        let percent = if total_seconds > 0.0 {
            ((current_seconds / total_seconds) * 100.0).min(100.0)
        } else {
            0.0
        };

        let eta_seconds = if self.speed > 0.0 && total_seconds > current_seconds {
            Some((total_seconds - current_seconds) / self.speed)
        } else if self.is_complete {
            Some(0.0)
        } else {
            None
        };

        EncodeProgress {
            percent: if self.is_complete { 100.0 } else { percent },
            current_seconds,
            total_seconds,
            eta_seconds,
        }
    }
}

/// Normalized progress emitted to observers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncodeProgress {
    /// Completion percentage (0-100)
    pub percent: f64,
    /// Seconds of output produced so far
    pub current_seconds: f64,
    /// Total output duration in seconds
    pub total_seconds: f64,
    /// Estimated seconds remaining at current speed
    pub eta_seconds: Option<f64>,
}

/// Bounded-rate admission for progress emissions.
///
/// FFmpeg reports progress far more often than consumers want to hear
/// about it; this gate admits at most one update per interval, always
/// letting the final update through.
#[derive(Debug)]
pub struct ProgressThrottle {
    min_interval: Duration,
    last_emit: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_emit: None,
        }
    }

    /// Whether this update should be forwarded to the observer.
    pub fn admit(&mut self, is_final: bool) -> bool {
        if is_final {
            self.last_emit = Some(Instant::now());
            return true;
        }
        match self.last_emit {
            Some(last) if last.elapsed() < self.min_interval => false,
            _ => {
                self.last_emit = Some(Instant::now());
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_progress() {
        let raw = FfmpegProgress {
            out_time_ms: 5000,
            speed: 2.0,
            ..Default::default()
        };
        let progress = raw.normalized(10.0);

        assert!((progress.percent - 50.0).abs() < 0.01);
        assert!((progress.current_seconds - 5.0).abs() < 0.01);
        // 5 seconds remaining at 2x speed
        assert!((progress.eta_seconds.unwrap() - 2.5).abs() < 0.01);
    }

    #[test]
    fn test_completion_clamps_to_hundred() {
        let raw = FfmpegProgress {
            out_time_ms: 9000,
            is_complete: true,
            ..Default::default()
        };
        let progress = raw.normalized(10.0);
        assert!((progress.percent - 100.0).abs() < 0.01);
        assert_eq!(progress.eta_seconds, Some(0.0));
    }

    #[test]
    fn test_zero_duration_is_defensive() {
        let raw = FfmpegProgress {
            out_time_ms: 1000,
            ..Default::default()
        };
        let progress = raw.normalized(0.0);
        assert_eq!(progress.percent, 0.0);
    }

    #[test]
    fn test_throttle_bounds_rate() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(60));
        assert!(throttle.admit(false));
        assert!(!throttle.admit(false));
        assert!(!throttle.admit(false));
        // Final update always passes
        assert!(throttle.admit(true));
    }

    #[test]
    fn test_throttle_zero_interval_admits_all() {
        let mut throttle = ProgressThrottle::new(Duration::ZERO);
        assert!(throttle.admit(false));
        assert!(throttle.admit(false));
    }
}
