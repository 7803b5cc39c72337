//! Batch configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Batch run configuration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum encode attempts per job (including the first)
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub retry_delay: Duration,
    /// Per-invocation process timeout
    pub job_timeout: Duration,
    /// Minimum output size for skip checks and verification
    pub min_output_bytes: u64,
    /// Directory for job-scoped scratch dirs
    pub work_dir: PathBuf,
    /// Minimum interval between progress emissions
    pub progress_interval: Duration,
    /// Whether to probe outputs for a duration sanity check
    pub verify_duration: bool,
    /// Allowed output duration deviation in seconds
    pub duration_tolerance: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay: Duration::from_secs(2),
            job_timeout: Duration::from_secs(1800),
            min_output_bytes: 1024 * 1024, // outputs under 1 MiB are treated as partial writes
            work_dir: std::env::temp_dir().join("reframe"),
            progress_interval: Duration::from_millis(500),
            verify_duration: true,
            duration_tolerance: 2.0,
        }
    }
}

impl BatchConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_parse("REFRAME_MAX_ATTEMPTS", defaults.max_attempts),
            retry_delay: Duration::from_secs(env_parse(
                "REFRAME_RETRY_DELAY_SECS",
                defaults.retry_delay.as_secs(),
            )),
            job_timeout: Duration::from_secs(env_parse(
                "REFRAME_JOB_TIMEOUT_SECS",
                defaults.job_timeout.as_secs(),
            )),
            min_output_bytes: env_parse("REFRAME_MIN_OUTPUT_BYTES", defaults.min_output_bytes),
            work_dir: std::env::var("REFRAME_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            progress_interval: Duration::from_millis(env_parse(
                "REFRAME_PROGRESS_INTERVAL_MS",
                defaults.progress_interval.as_millis() as u64,
            )),
            verify_duration: env_parse("REFRAME_VERIFY_DURATION", 1u8) != 0,
            duration_tolerance: env_parse(
                "REFRAME_DURATION_TOLERANCE_SECS",
                defaults.duration_tolerance,
            ),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BatchConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.retry_delay, Duration::from_secs(2));
        assert_eq!(config.min_output_bytes, 1024 * 1024);
    }
}
