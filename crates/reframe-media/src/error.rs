//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use reframe_models::GeometryError;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr_tail: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    ProbeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Encoder probe failed: {0}")]
    BackendProbe(String),

    #[error("Output verification failed: {0}")]
    OutputVerification(String),

    #[error("Invalid geometry: {0}")]
    Geometry(#[from] GeometryError),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr_tail: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr_tail,
            exit_code,
        }
    }

    /// Create an output verification error.
    pub fn verification(message: impl Into<String>) -> Self {
        Self::OutputVerification(message.into())
    }

    /// Whether a failed job may be retried with the same parameters.
    ///
    /// Transient encode failures, timeouts, and post-write verification
    /// failures are retryable. Missing tools, geometry problems, and
    /// cancellation are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MediaError::FfmpegFailed { .. }
                | MediaError::Timeout(_)
                | MediaError::OutputVerification(_)
                | MediaError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(MediaError::ffmpeg_failed("boom", None, Some(1)).is_retryable());
        assert!(MediaError::Timeout(30).is_retryable());
        assert!(MediaError::verification("short file").is_retryable());
        assert!(!MediaError::Cancelled.is_retryable());
        assert!(!MediaError::FfmpegNotFound.is_retryable());
    }
}
