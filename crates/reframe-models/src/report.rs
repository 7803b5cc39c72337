//! Per-job results and batch reports.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ClipRequest;

/// Outcome of a single transform job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Output produced and verified
    Succeeded,
    /// Output already existed and passed the size check
    Skipped,
    /// All attempts exhausted (or cancelled)
    Failed,
    /// Attempt failed, another attempt is pending
    Retrying,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Succeeded => "succeeded",
            JobStatus::Skipped => "skipped",
            JobStatus::Failed => "failed",
            JobStatus::Retrying => "retrying",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Retrying)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one clip transform job. The batch coordinator retains the
/// latest result per placement id.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobResult {
    /// The request this result belongs to
    pub request: ClipRequest,
    /// Final status
    pub status: JobStatus,
    /// Size of the produced output in bytes (0 on failure)
    pub output_size_bytes: u64,
    /// Source file size in bytes
    pub input_size_bytes: u64,
    /// Wall time spent on this job across all attempts
    pub elapsed: Duration,
    /// Number of attempts made (0 when skipped)
    pub attempts: u32,
    /// Error detail for failed jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl JobResult {
    /// Create a skipped result for an already-materialized output.
    pub fn skipped(request: ClipRequest, output_size_bytes: u64, input_size_bytes: u64) -> Self {
        Self {
            request,
            status: JobStatus::Skipped,
            output_size_bytes,
            input_size_bytes,
            elapsed: Duration::ZERO,
            attempts: 0,
            error_detail: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Failed
    }
}

/// Aggregate outcome of a batch run.
///
/// Built incrementally as job results arrive; finalized after all jobs
/// (including the randomized retry pass) resolve. A batch with zero
/// successes still produces a complete, well-formed report.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchReport {
    pub total_requested: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_input_bytes: u64,
    pub total_output_bytes: u64,
    pub wall_clock: Duration,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    /// Start an empty report for the given request count.
    pub fn begin(total_requested: usize) -> Self {
        let now = Utc::now();
        Self {
            total_requested,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            total_input_bytes: 0,
            total_output_bytes: 0,
            wall_clock: Duration::ZERO,
            started_at: now,
            finished_at: now,
        }
    }

    /// Fold one job result into the running totals.
    ///
    /// Skipped jobs count toward `skipped` but not `succeeded`; their
    /// byte totals are still included since the output is present.
    pub fn record(&mut self, result: &JobResult) {
        match result.status {
            JobStatus::Succeeded => self.succeeded += 1,
            JobStatus::Skipped => self.skipped += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Retrying => {}
        }
        self.total_input_bytes += result.input_size_bytes;
        self.total_output_bytes += result.output_size_bytes;
    }

    /// Remove a previously recorded failure so a retry-pass result can
    /// replace it.
    pub fn unrecord_failure(&mut self, result: &JobResult) {
        if result.is_failed() && self.failed > 0 {
            self.failed -= 1;
            self.total_input_bytes = self.total_input_bytes.saturating_sub(result.input_size_bytes);
        }
    }

    /// Close the report, stamping wall-clock time.
    pub fn finalize(&mut self) {
        self.finished_at = Utc::now();
        self.wall_clock = (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
    }

    /// Ratio of output bytes to input bytes, if any input was counted.
    pub fn size_ratio(&self) -> Option<f64> {
        if self.total_input_bytes == 0 {
            return None;
        }
        Some(self.total_output_bytes as f64 / self.total_input_bytes as f64)
    }

    /// Flat scalar field mapping for logging/CLI consumption.
    pub fn as_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("total_requested", self.total_requested.to_string()),
            ("succeeded", self.succeeded.to_string()),
            ("skipped", self.skipped.to_string()),
            ("failed", self.failed.to_string()),
            ("total_input_bytes", self.total_input_bytes.to_string()),
            ("total_output_bytes", self.total_output_bytes.to_string()),
            ("wall_clock_secs", format!("{:.1}", self.wall_clock.as_secs_f64())),
            ("started_at", self.started_at.to_rfc3339()),
            ("finished_at", self.finished_at.to_rfc3339()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SideBias;

    fn request(id: u32) -> ClipRequest {
        ClipRequest::new("in.mp4", id, SideBias::Center, "out.mp4")
    }

    fn result(id: u32, status: JobStatus) -> JobResult {
        JobResult {
            request: request(id),
            status,
            output_size_bytes: 100,
            input_size_bytes: 400,
            elapsed: Duration::from_secs(1),
            attempts: 1,
            error_detail: None,
        }
    }

    #[test]
    fn test_record_and_finalize() {
        let mut report = BatchReport::begin(3);
        report.record(&result(1, JobStatus::Succeeded));
        report.record(&result(2, JobStatus::Skipped));
        report.record(&result(3, JobStatus::Failed));
        report.finalize();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.total_input_bytes, 1200);
        assert_eq!(report.total_output_bytes, 300);
    }

    #[test]
    fn test_retry_replaces_failure() {
        let mut report = BatchReport::begin(1);
        let failed = result(1, JobStatus::Failed);
        report.record(&failed);
        assert_eq!(report.failed, 1);

        report.unrecord_failure(&failed);
        report.record(&result(1, JobStatus::Succeeded));
        assert_eq!(report.failed, 0);
        assert_eq!(report.succeeded, 1);
    }

    #[test]
    fn test_size_ratio() {
        let mut report = BatchReport::begin(1);
        assert!(report.size_ratio().is_none());
        report.record(&result(1, JobStatus::Succeeded));
        assert!((report.size_ratio().unwrap() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_as_fields_is_flat() {
        let report = BatchReport::begin(0);
        let fields = report.as_fields();
        assert!(fields.iter().any(|(k, _)| *k == "succeeded"));
        assert!(fields.iter().any(|(k, _)| *k == "wall_clock_secs"));
    }
}
