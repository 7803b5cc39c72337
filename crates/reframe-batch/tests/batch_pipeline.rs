//! End-to-end pipeline tests over a scripted transcoder seam.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::watch;

use reframe_batch::{BatchConfig, BatchCoordinator};
use reframe_media::{
    EncodeJob, FfmpegProgress, MediaError, MediaResult, ProgressSink, Transcoder, VideoInfo,
};
use reframe_models::{ClipRequest, EncoderProfile, GeometryProfile, JobStatus, SideBias};

/// Scripted transcoder: succeeds by writing a plausible output file,
/// fails for configured sources, optionally refuses hardware profiles.
struct ScriptedTranscoder {
    invocations: AtomicU32,
    hardware_invocations: AtomicU32,
    fail_sources: Vec<PathBuf>,
    refuse_hardware: bool,
}

impl ScriptedTranscoder {
    fn succeeding() -> Self {
        Self {
            invocations: AtomicU32::new(0),
            hardware_invocations: AtomicU32::new(0),
            fail_sources: Vec::new(),
            refuse_hardware: false,
        }
    }

    fn failing_for(sources: Vec<PathBuf>) -> Self {
        Self {
            fail_sources: sources,
            ..Self::succeeding()
        }
    }

    fn hardware_allergic() -> Self {
        Self {
            refuse_hardware: true,
            ..Self::succeeding()
        }
    }

    fn count(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for ScriptedTranscoder {
    async fn preflight(&self) -> MediaResult<()> {
        Ok(())
    }

    async fn probe(&self, _path: &Path) -> MediaResult<VideoInfo> {
        Ok(VideoInfo {
            duration: 10.0,
            width: 1920,
            height: 1080,
            fps: 30.0,
            codec: "h264".to_string(),
            size: 2048,
            has_audio: true,
        })
    }

    async fn encode(
        &self,
        job: &EncodeJob,
        on_progress: ProgressSink,
        _cancel: watch::Receiver<bool>,
    ) -> MediaResult<()> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if job.profile.hardware {
            self.hardware_invocations.fetch_add(1, Ordering::SeqCst);
            if self.refuse_hardware {
                return Err(MediaError::ffmpeg_failed(
                    "device creation failed",
                    Some("No capable devices found".to_string()),
                    Some(1),
                ));
            }
        }
        if job.inputs.iter().any(|i| self.fail_sources.contains(i)) {
            return Err(MediaError::ffmpeg_failed("decode error", None, Some(1)));
        }

        on_progress(FfmpegProgress {
            out_time_ms: (job.total_duration * 500.0) as i64,
            speed: 2.0,
            ..Default::default()
        });
        on_progress(FfmpegProgress {
            out_time_ms: (job.total_duration * 1000.0) as i64,
            is_complete: true,
            ..Default::default()
        });

        tokio::fs::write(&job.output, vec![0u8; 64]).await?;
        Ok(())
    }
}

fn config(dir: &Path) -> BatchConfig {
    BatchConfig {
        max_attempts: 2,
        retry_delay: Duration::from_millis(1),
        min_output_bytes: 16,
        work_dir: dir.join("work"),
        progress_interval: Duration::ZERO,
        verify_duration: true,
        ..BatchConfig::default()
    }
}

fn requests(dir: &Path, count: u32) -> Vec<ClipRequest> {
    (1..=count)
        .map(|i| {
            ClipRequest::new(
                format!("src{i}.mp4"),
                i,
                SideBias::Left,
                dir.join(format!("out{i}.mp4")),
            )
        })
        .collect()
}

fn coordinator(
    dir: &Path,
    transcoder: Arc<ScriptedTranscoder>,
) -> BatchCoordinator {
    BatchCoordinator::new(
        config(dir),
        GeometryProfile::vertical_letterbox(),
        transcoder,
    )
    .unwrap()
    .with_encoders(EncoderProfile::x264(), EncoderProfile::x264())
}

#[tokio::test]
async fn partial_failure_does_not_abort_the_batch() {
    let dir = TempDir::new().unwrap();
    let transcoder = Arc::new(ScriptedTranscoder::failing_for(vec![PathBuf::from(
        "src5.mp4",
    )]));
    let coordinator = coordinator(dir.path(), Arc::clone(&transcoder));
    let requests = requests(dir.path(), 10);

    let (report, results) = coordinator.run_collecting(&requests).await.unwrap();

    assert_eq!(report.total_requested, 10);
    assert_eq!(report.succeeded, 9);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 0);

    for i in (1..=10u32).filter(|i| *i != 5) {
        assert!(dir.path().join(format!("out{i}.mp4")).exists());
    }
    assert!(!dir.path().join("out5.mp4").exists());

    let failed = results.iter().find(|r| r.request.placement_id == 5).unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error_detail.is_some());
}

#[tokio::test]
async fn rerun_skips_materialized_outputs_without_invoking_the_process() {
    let dir = TempDir::new().unwrap();
    let transcoder = Arc::new(ScriptedTranscoder::succeeding());
    let coordinator = coordinator(dir.path(), Arc::clone(&transcoder));
    let requests = requests(dir.path(), 3);

    let report = coordinator.run(&requests).await.unwrap();
    assert_eq!(report.succeeded, 3);
    let first_run_invocations = transcoder.count();

    let (report, results) = coordinator.run_collecting(&requests).await.unwrap();
    assert_eq!(report.skipped, 3);
    assert_eq!(report.succeeded, 0);
    assert_eq!(transcoder.count(), first_run_invocations, "skip must be process-free");
    assert!(results.iter().all(|r| r.status == JobStatus::Skipped));
}

#[tokio::test]
async fn hardware_failure_degrades_once_and_retry_pass_recovers() {
    let dir = TempDir::new().unwrap();
    let transcoder = Arc::new(ScriptedTranscoder::hardware_allergic());
    let coordinator = BatchCoordinator::new(
        config(dir.path()),
        GeometryProfile::vertical_letterbox(),
        Arc::clone(&transcoder) as Arc<dyn Transcoder>,
    )
    .unwrap()
    .with_encoders(EncoderProfile::nvenc(), EncoderProfile::x264());

    let requests = requests(dir.path(), 3);
    let report = coordinator.run(&requests).await.unwrap();

    // Job 1 exhausts hardware attempts, the run degrades to software,
    // jobs 2-3 succeed, and the retry pass recovers job 1.
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(
        transcoder.hardware_invocations.load(Ordering::SeqCst),
        2,
        "only the first job's attempts should ever touch hardware"
    );
}

#[tokio::test]
async fn cancelled_run_reports_every_job_failed() {
    let dir = TempDir::new().unwrap();
    let transcoder = Arc::new(ScriptedTranscoder::succeeding());
    let coordinator = coordinator(dir.path(), Arc::clone(&transcoder));
    coordinator.cancel_handle().cancel();

    let (report, results) = coordinator
        .run_collecting(&requests(dir.path(), 4))
        .await
        .unwrap();

    assert_eq!(report.failed, 4);
    assert_eq!(report.succeeded, 0);
    assert_eq!(transcoder.count(), 0);
    assert!(results
        .iter()
        .all(|r| r.error_detail.as_deref().unwrap_or("").contains("cancelled")));
}

#[tokio::test]
async fn compilation_concatenates_all_clips_into_one_job() {
    let dir = TempDir::new().unwrap();
    let transcoder = Arc::new(ScriptedTranscoder::succeeding());
    let mut cfg = config(dir.path());
    // The compiled output's duration is the sum of its clips; the
    // scripted probe cannot report that, so skip the duration check.
    cfg.verify_duration = false;
    let coordinator = BatchCoordinator::new(
        cfg,
        GeometryProfile::vertical_letterbox(),
        Arc::clone(&transcoder) as Arc<dyn Transcoder>,
    )
    .unwrap()
    .with_encoders(EncoderProfile::x264(), EncoderProfile::x264());

    let output = dir.path().join("compilation.mp4");
    let report = coordinator
        .run_compilation(&requests(dir.path(), 3), output.clone())
        .await
        .unwrap();

    assert_eq!(report.total_requested, 3);
    assert_eq!(report.succeeded, 1);
    assert!(output.exists());
    assert_eq!(transcoder.count(), 1);
}

#[tokio::test]
async fn observer_receives_normalized_progress() {
    let dir = TempDir::new().unwrap();
    let transcoder = Arc::new(ScriptedTranscoder::succeeding());
    let seen: Arc<Mutex<Vec<(u32, f64)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let coordinator = coordinator(dir.path(), Arc::clone(&transcoder)).with_observer(Arc::new(
        move |placement_id, progress| {
            sink.lock().unwrap().push((placement_id, progress.percent));
        },
    ));

    coordinator.run(&requests(dir.path(), 1)).await.unwrap();

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|(id, _)| *id == 1));
    // Mid-encode and final updates arrive normalized.
    assert!(seen.iter().any(|(_, pct)| (*pct - 50.0).abs() < 0.01));
    assert!(seen.iter().any(|(_, pct)| (*pct - 100.0).abs() < 0.01));
}
