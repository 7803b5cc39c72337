//! Error types for batch coordination.
//!
//! Per-job failures are contained inside [`crate::JobExecutor`] and
//! recorded in job results; only configuration-time problems (invalid
//! geometry, missing external tools) surface through `BatchError`.

use thiserror::Error;

use reframe_media::MediaError;
use reframe_models::GeometryError;

/// Result type for batch operations.
pub type BatchResult<T> = Result<T, BatchError>;

/// Fatal errors that abort a batch before any job runs.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Invalid geometry configuration: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Media tooling error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Batch has no requests")]
    EmptyBatch,
}
