//! Per-job execution state machine.
//!
//! A job moves `Pending -> Running -> {Succeeded, Failed}`; a failure
//! re-enters `Running` while attempts remain, otherwise it is terminal.
//! The skip check runs before anything else so re-runs are idempotent.
//!
//! Jobs execute strictly sequentially within a batch: concurrent encodes
//! contend for the same hardware encoder and the shared scratch
//! mechanism, so the coordinator never overlaps them.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use reframe_media::fs_utils::{file_size, move_file};
use reframe_media::{EncodeJob, EncodeProgress, FilterGraph, MediaError, ProgressThrottle, Transcoder};
use reframe_models::{ClipRequest, EncoderProfile, JobResult, JobStatus};

use crate::config::BatchConfig;
use crate::logging::JobLogger;

/// Prefix for job-scoped scratch directories under the work dir.
pub const SCRATCH_PREFIX: &str = "reframe-job-";

/// Observer for normalized progress, keyed by placement id.
pub type ProgressObserver = Arc<dyn Fn(u32, EncodeProgress) + Send + Sync + 'static>;

/// Everything the executor needs to run one job.
///
/// The graph and inputs are fixed before execution; retries re-run the
/// identical invocation with no parameter mutation between attempts.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub request: ClipRequest,
    pub inputs: Vec<PathBuf>,
    pub graph: FilterGraph,
    pub total_duration: f64,
    pub input_size_bytes: u64,
}

/// Executes single jobs against the transcoder seam.
pub struct JobExecutor {
    config: BatchConfig,
    transcoder: Arc<dyn Transcoder>,
    cancel_rx: watch::Receiver<bool>,
    observer: Option<ProgressObserver>,
}

impl JobExecutor {
    pub fn new(
        config: BatchConfig,
        transcoder: Arc<dyn Transcoder>,
        cancel_rx: watch::Receiver<bool>,
        observer: Option<ProgressObserver>,
    ) -> Self {
        Self {
            config,
            transcoder,
            cancel_rx,
            observer,
        }
    }

    /// Run one job to a terminal state. Per-job errors never escape;
    /// they are folded into the returned [`JobResult`].
    pub async fn execute(&self, ctx: &JobContext, profile: &EncoderProfile) -> JobResult {
        let started = Instant::now();
        let logger = JobLogger::new(ctx.request.placement_id, "clip_transform");

        // Skip check: an existing output above the size floor means a
        // prior run already materialized this job.
        if let Some(size) = file_size(&ctx.request.output_path).await {
            if size >= self.config.min_output_bytes {
                logger.log_skip(size);
                return JobResult::skipped(ctx.request.clone(), size, ctx.input_size_bytes);
            }
            warn!(
                placement_id = ctx.request.placement_id,
                "Replacing incomplete output ({} bytes)", size
            );
        }

        logger.log_start(&ctx.request.source_path);

        let mut last_error: Option<MediaError> = None;
        let mut attempts = 0u32;

        while attempts < self.config.max_attempts {
            if *self.cancel_rx.borrow() {
                last_error = Some(MediaError::Cancelled);
                break;
            }
            if attempts > 0 {
                logger.log_retry(attempts + 1, self.config.max_attempts, self.config.retry_delay);
                tokio::time::sleep(self.config.retry_delay).await;
            }
            attempts += 1;

            match self.run_attempt(ctx, profile).await {
                Ok(output_size) => {
                    logger.log_completion(output_size, started.elapsed());
                    return JobResult {
                        request: ctx.request.clone(),
                        status: JobStatus::Succeeded,
                        output_size_bytes: output_size,
                        input_size_bytes: ctx.input_size_bytes,
                        elapsed: started.elapsed(),
                        attempts,
                        error_detail: None,
                    };
                }
                Err(e) => {
                    logger.log_failure(attempts, &e);
                    let retryable = e.is_retryable();
                    last_error = Some(e);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        JobResult {
            request: ctx.request.clone(),
            status: JobStatus::Failed,
            output_size_bytes: 0,
            input_size_bytes: ctx.input_size_bytes,
            elapsed: started.elapsed(),
            attempts,
            error_detail: Some(
                last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no attempts made".to_string()),
            ),
        }
    }

    /// One `Running` transition: encode to scratch, verify, materialize.
    async fn run_attempt(&self, ctx: &JobContext, profile: &EncoderProfile) -> Result<u64, MediaError> {
        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&self.config.work_dir)?;

        let scratch_out = scratch
            .path()
            .join(format!("clip{:03}.mp4", ctx.request.placement_id));

        let job = EncodeJob {
            inputs: ctx.inputs.clone(),
            graph: ctx.graph.clone(),
            profile: profile.clone(),
            output: scratch_out.clone(),
            scratch_dir: scratch.path().to_path_buf(),
            total_duration: ctx.total_duration,
        };

        let sink = self.progress_sink(ctx);
        self.transcoder
            .encode(&job, sink, self.cancel_rx.clone())
            .await?;

        let size = self.verify_output(&scratch_out, ctx).await?;
        move_file(&scratch_out, &ctx.request.output_path).await?;
        debug!(
            placement_id = ctx.request.placement_id,
            "Materialized {}", ctx.request.output_path.display()
        );
        Ok(size)
        // Scratch dir (graph payload included) is removed on drop, on
        // every exit path.
    }

    /// Bounded-rate progress forwarding to the observer.
    fn progress_sink(&self, ctx: &JobContext) -> reframe_media::ProgressSink {
        let observer = self.observer.clone();
        let placement_id = ctx.request.placement_id;
        let total = ctx.total_duration;
        let throttle = Mutex::new(ProgressThrottle::new(self.config.progress_interval));

        Box::new(move |raw| {
            let Some(observer) = &observer else { return };
            let admit = throttle
                .lock()
                .map(|mut t| t.admit(raw.is_complete))
                .unwrap_or(false);
            if admit {
                observer(placement_id, raw.normalized(total));
            }
        })
    }

    /// Post-write sanity check: size floor plus an optional duration
    /// probe. Failures here count as encode failures for retry purposes.
    async fn verify_output(&self, path: &Path, ctx: &JobContext) -> Result<u64, MediaError> {
        let size = file_size(path)
            .await
            .ok_or_else(|| MediaError::verification("output file missing after encode"))?;

        if size < self.config.min_output_bytes {
            return Err(MediaError::verification(format!(
                "output is {size} bytes, below the {}-byte floor",
                self.config.min_output_bytes
            )));
        }

        if self.config.verify_duration {
            let info = self
                .transcoder
                .probe(path)
                .await
                .map_err(|e| MediaError::verification(format!("probe of output failed: {e}")))?;
            let drift = (info.duration - ctx.total_duration).abs();
            if drift > self.config.duration_tolerance {
                return Err(MediaError::verification(format!(
                    "output duration {:.2}s deviates {:.2}s from expected {:.2}s",
                    info.duration, drift, ctx.total_duration
                )));
            }
        }

        Ok(size)
    }
}

/// Remove scratch dirs left behind by a crashed run.
///
/// Called at batch start; live runs never leave scratch dirs behind
/// because they are removed on every job exit path.
pub async fn sweep_stale_scratch(work_dir: &Path) -> usize {
    let Ok(mut entries) = tokio::fs::read_dir(work_dir).await else {
        return 0;
    };

    let mut removed = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(SCRATCH_PREFIX)
            && tokio::fs::remove_dir_all(entry.path()).await.is_ok()
        {
            removed += 1;
        }
    }

    if removed > 0 {
        info!("Swept {removed} stale scratch dir(s) from {}", work_dir.display());
    }
    removed
}
