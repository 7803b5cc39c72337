//! Structured job logging utilities.

use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing with an env-filter, colored output by default and
/// JSON when `LOG_FORMAT=json`.
pub fn init_logging() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("reframe=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Job logger with consistent contextual fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    placement_id: u32,
    operation: &'static str,
}

impl JobLogger {
    pub fn new(placement_id: u32, operation: &'static str) -> Self {
        Self {
            placement_id,
            operation,
        }
    }

    pub fn log_start(&self, source: &std::path::Path) {
        info!(
            placement_id = self.placement_id,
            operation = self.operation,
            "Job started: {}",
            source.display()
        );
    }

    pub fn log_skip(&self, size_bytes: u64) {
        info!(
            placement_id = self.placement_id,
            operation = self.operation,
            "Output already present ({:.2} MB), skipping",
            size_bytes as f64 / (1024.0 * 1024.0)
        );
    }

    pub fn log_retry(&self, attempt: u32, max_attempts: u32, delay: Duration) {
        warn!(
            placement_id = self.placement_id,
            operation = self.operation,
            "Retrying (attempt {}/{}) after {:?}",
            attempt,
            max_attempts,
            delay
        );
    }

    pub fn log_failure(&self, attempt: u32, error: &dyn std::fmt::Display) {
        warn!(
            placement_id = self.placement_id,
            operation = self.operation,
            "Attempt {} failed: {}",
            attempt,
            error
        );
    }

    pub fn log_completion(&self, size_bytes: u64, elapsed: Duration) {
        info!(
            placement_id = self.placement_id,
            operation = self.operation,
            "Job succeeded: {:.2} MB in {:.1}s",
            size_bytes as f64 / (1024.0 * 1024.0),
            elapsed.as_secs_f64()
        );
    }
}
