//! Sequential batch execution for the Reframe clip pipeline.
//!
//! This crate provides:
//! - The per-job state machine (skip, run, verify, retry) over the
//!   transcoder seam
//! - The batch coordinator: ordered execution, degraded-mode encoder
//!   fallback, a randomized second-chance retry pass, and report
//!   finalization
//! - Run-level cancellation and crash-recovery scratch cleanup

pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod logging;

pub use config::BatchConfig;
pub use coordinator::{BatchCoordinator, CancelHandle};
pub use error::{BatchError, BatchResult};
pub use executor::{sweep_stale_scratch, JobContext, JobExecutor, ProgressObserver, SCRATCH_PREFIX};
pub use logging::{init_logging, JobLogger};
