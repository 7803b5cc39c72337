//! Batch coordination.
//!
//! The coordinator owns one batch run: it validates configuration and
//! selects the encoder backend before any job starts, executes jobs
//! strictly in submission order, downgrades to the software encoder
//! after a mid-batch hardware failure, gives terminally-failed jobs one
//! randomized second-chance pass, and finalizes the report. Per-job
//! failures never abort the run.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio::sync::watch;
use tracing::{info, warn};

use reframe_media::{
    compute_crop, fallback_profile, select_backend, validate_for_source, FilterGraph,
    FfmpegTranscoder, GraphInput, MediaError, Transcoder, VideoInfo,
};
use reframe_models::{
    BatchReport, ClipRequest, EncoderProfile, GeometryProfile, JobResult, JobStatus,
    TransitionSpec,
};

use crate::config::BatchConfig;
use crate::error::{BatchError, BatchResult};
use crate::executor::{sweep_stale_scratch, JobContext, JobExecutor, ProgressObserver};

/// Placement id used for the single compilation job.
pub const COMPILATION_PLACEMENT_ID: u32 = 0;

/// Handle for signalling run-level cancellation.
///
/// The executor observes the flag between progress updates and performs
/// orderly process termination; cancelled jobs report `Failed` with a
/// cancellation detail and are never retried.
#[derive(Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// Drives a batch of clip transform jobs to completion.
pub struct BatchCoordinator {
    config: BatchConfig,
    geometry: GeometryProfile,
    transitions: TransitionSpec,
    transcoder: Arc<dyn Transcoder>,
    encoders: Option<(EncoderProfile, EncoderProfile)>,
    observer: Option<ProgressObserver>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl BatchCoordinator {
    /// Create a coordinator over an explicit transcoder seam.
    ///
    /// The geometry profile is validated here, before any job can run.
    pub fn new(
        config: BatchConfig,
        geometry: GeometryProfile,
        transcoder: Arc<dyn Transcoder>,
    ) -> BatchResult<Self> {
        geometry.validate()?;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Ok(Self {
            config,
            geometry,
            transitions: TransitionSpec::default(),
            transcoder,
            encoders: None,
            observer: None,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        })
    }

    /// Create a coordinator backed by the real FFmpeg tooling, with the
    /// configured per-job timeout applied to each invocation.
    pub fn with_ffmpeg(config: BatchConfig, geometry: GeometryProfile) -> BatchResult<Self> {
        let timeout = config.job_timeout.as_secs();
        Self::new(
            config,
            geometry,
            Arc::new(FfmpegTranscoder::new().with_timeout(timeout)),
        )
    }

    /// Set the transition spec used by compilation mode.
    pub fn with_transitions(mut self, transitions: TransitionSpec) -> Self {
        self.transitions = transitions;
        self
    }

    /// Inject the encoder profiles instead of probing for them.
    pub fn with_encoders(mut self, primary: EncoderProfile, fallback: EncoderProfile) -> Self {
        self.encoders = Some((primary, fallback));
        self
    }

    /// Attach a bounded-rate progress observer.
    pub fn with_observer(mut self, observer: ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Handle for cancelling this run.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel_tx))
    }

    /// Transform each request into its own output file.
    pub async fn run(&self, requests: &[ClipRequest]) -> BatchResult<BatchReport> {
        self.run_collecting(requests).await.map(|(report, _)| report)
    }

    /// As [`run`](Self::run), also returning the latest result per
    /// placement id.
    pub async fn run_collecting(
        &self,
        requests: &[ClipRequest],
    ) -> BatchResult<(BatchReport, Vec<JobResult>)> {
        let (primary, fallback) = self.prepare_run().await?;

        let mut report = BatchReport::begin(requests.len());
        let mut results: BTreeMap<u32, JobResult> = BTreeMap::new();
        let mut prepared: BTreeMap<u32, VideoInfo> = BTreeMap::new();

        // Probe pass: sources that cannot be read fail their job up
        // front; geometry is validated against real frame dimensions
        // before the first encode.
        let mut first_validated = false;
        for request in requests {
            match self.transcoder.probe(&request.source_path).await {
                Ok(info) => {
                    if !first_validated {
                        validate_for_source(&self.geometry, info.width, info.height)?;
                        first_validated = true;
                    }
                    prepared.insert(request.placement_id, info);
                }
                Err(e) => {
                    warn!(
                        placement_id = request.placement_id,
                        "Probe failed for {}: {e}",
                        request.source_path.display()
                    );
                    let result = failed_result(request.clone(), format!("probe failed: {e}"));
                    report.record(&result);
                    results.insert(request.placement_id, result);
                }
            }
        }

        let executor = JobExecutor::new(
            self.config.clone(),
            Arc::clone(&self.transcoder),
            self.cancel_rx.clone(),
            self.observer.clone(),
        );

        // Primary pass, strictly sequential in submission order.
        let mut active = primary;
        let mut degraded = false;
        for request in requests {
            // Probe failures already hold a recorded result.
            let Some(info) = prepared.get(&request.placement_id) else {
                continue;
            };

            let result = if *self.cancel_rx.borrow() {
                failed_result(request.clone(), "cancelled before start".to_string())
            } else {
                self.execute_one(&executor, request, info, &active).await
            };

            if result.status == JobStatus::Failed
                && active.hardware
                && !degraded
                && !*self.cancel_rx.borrow()
            {
                warn!(
                    placement_id = request.placement_id,
                    "Hardware encode failure; switching subsequent jobs to software (degraded mode)"
                );
                active = fallback.clone();
                degraded = true;
            }

            report.record(&result);
            results.insert(request.placement_id, result);
        }

        // One second-chance pass over terminal failures, randomized so
        // order-dependent transient conditions do not repeat verbatim.
        let mut retry_ids: Vec<u32> = results
            .values()
            .filter(|r| r.is_failed())
            .map(|r| r.request.placement_id)
            .collect();
        if !retry_ids.is_empty() && !*self.cancel_rx.borrow() {
            retry_ids.shuffle(&mut rand::rng());
            info!("Retry pass over {} failed job(s)", retry_ids.len());

            for placement_id in retry_ids {
                let request = results[&placement_id].request.clone();
                let info = match prepared.get(&placement_id) {
                    Some(info) => info.clone(),
                    None => {
                        // Probe failed in the primary pass; try once more.
                        match self.transcoder.probe(&request.source_path).await {
                            Ok(info) => info,
                            Err(_) => continue,
                        }
                    }
                };

                let result = self.execute_one(&executor, &request, &info, &active).await;
                if let Some(old) = results.get(&placement_id) {
                    report.unrecord_failure(old);
                }
                report.record(&result);
                results.insert(placement_id, result);
            }
        }

        report.finalize();
        info!(
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed,
            "Batch complete"
        );
        Ok((report, results.into_values().collect()))
    }

    /// Concatenate every request into one compiled output file.
    ///
    /// All clips share one multi-input graph with transitions; the whole
    /// compilation runs as a single job whose report counts one job
    /// outcome against `requests.len()` requested clips.
    pub async fn run_compilation(
        &self,
        requests: &[ClipRequest],
        output_path: PathBuf,
    ) -> BatchResult<BatchReport> {
        if requests.is_empty() {
            return Err(BatchError::EmptyBatch);
        }

        let (primary, fallback) = self.prepare_run().await?;

        let mut report = BatchReport::begin(requests.len());
        let mut graph_inputs = Vec::new();
        let mut input_paths = Vec::new();
        let mut input_bytes = 0u64;

        let mut first_validated = false;
        for request in requests {
            let info = match self.transcoder.probe(&request.source_path).await {
                Ok(info) => info,
                Err(e) => {
                    warn!(
                        placement_id = request.placement_id,
                        "Dropping unreadable clip from compilation: {e}"
                    );
                    report.record(&failed_result(
                        request.clone(),
                        format!("probe failed: {e}"),
                    ));
                    continue;
                }
            };
            if !first_validated {
                validate_for_source(&self.geometry, info.width, info.height)?;
                first_validated = true;
            }
            let crop = match compute_crop(info.width, info.height, &self.geometry, request.side_bias)
            {
                Ok(crop) => crop,
                Err(e) => {
                    report.record(&failed_result(request.clone(), e.to_string()));
                    continue;
                }
            };
            graph_inputs.push(GraphInput {
                crop,
                duration: info.duration,
                has_audio: info.has_audio,
                overlay_text: request.overlay_text.clone(),
            });
            input_paths.push(request.source_path.clone());
            input_bytes += info.size;
        }

        if graph_inputs.is_empty() {
            report.finalize();
            return Ok(report);
        }

        let graph = FilterGraph::build(&graph_inputs, &self.geometry, &self.transitions);
        let ctx = JobContext {
            request: ClipRequest::new(
                input_paths[0].clone(),
                COMPILATION_PLACEMENT_ID,
                Default::default(),
                output_path,
            ),
            inputs: input_paths,
            total_duration: graph.total_duration(),
            graph,
            input_size_bytes: input_bytes,
        };

        let executor = JobExecutor::new(
            self.config.clone(),
            Arc::clone(&self.transcoder),
            self.cancel_rx.clone(),
            self.observer.clone(),
        );

        let mut result = executor.execute(&ctx, &primary).await;
        if result.is_failed() && primary.hardware && !*self.cancel_rx.borrow() {
            warn!("Hardware compilation encode failed; retrying with software (degraded mode)");
            result = executor.execute(&ctx, &fallback).await;
        }

        report.record(&result);
        report.finalize();
        Ok(report)
    }

    /// Startup work shared by both run modes: tool preflight, encoder
    /// selection, scratch sweep. Failures here abort before any job.
    async fn prepare_run(&self) -> BatchResult<(EncoderProfile, EncoderProfile)> {
        self.transcoder.preflight().await?;

        let pair = match &self.encoders {
            Some((primary, fallback)) => (primary.clone(), fallback.clone()),
            None => (select_backend().await?, fallback_profile()),
        };

        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        sweep_stale_scratch(&self.config.work_dir).await;

        info!(
            codec = %pair.0.codec,
            hardware = pair.0.hardware,
            "Encoder backend selected"
        );
        Ok(pair)
    }

    async fn execute_one(
        &self,
        executor: &JobExecutor,
        request: &ClipRequest,
        info: &VideoInfo,
        profile: &EncoderProfile,
    ) -> JobResult {
        match self.build_context(request, info) {
            Ok(ctx) => executor.execute(&ctx, profile).await,
            Err(e) => failed_result(request.clone(), e.to_string()),
        }
    }

    /// Geometry and graph for one single-clip job. Individual clips get
    /// no fades; transitions only apply between concatenated clips.
    fn build_context(
        &self,
        request: &ClipRequest,
        info: &VideoInfo,
    ) -> Result<JobContext, MediaError> {
        let crop = compute_crop(info.width, info.height, &self.geometry, request.side_bias)?;
        let graph = FilterGraph::build(
            &[GraphInput {
                crop,
                duration: info.duration,
                has_audio: info.has_audio,
                overlay_text: request.overlay_text.clone(),
            }],
            &self.geometry,
            &TransitionSpec::none(),
        );
        Ok(JobContext {
            request: request.clone(),
            inputs: vec![request.source_path.clone()],
            total_duration: info.duration,
            graph,
            input_size_bytes: info.size,
        })
    }
}

fn failed_result(request: ClipRequest, detail: String) -> JobResult {
    JobResult {
        request,
        status: JobStatus::Failed,
        output_size_bytes: 0,
        input_size_bytes: 0,
        elapsed: std::time::Duration::ZERO,
        attempts: 0,
        error_detail: Some(detail),
    }
}
