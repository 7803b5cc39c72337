//! The transcoder seam between the pipeline and the external tool.
//!
//! The batch layer drives everything through the [`Transcoder`] trait so
//! job-state logic can be exercised without a real FFmpeg install; the
//! production implementation shells out via [`FfmpegRunner`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::watch;

use reframe_models::EncoderProfile;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::graph::FilterGraph;
use crate::probe::{probe_video, VideoInfo};
use crate::progress::FfmpegProgress;

/// Raw progress callback handed to an encode invocation.
pub type ProgressSink = Box<dyn Fn(FfmpegProgress) + Send + Sync + 'static>;

/// One encode invocation: a filter graph bound to an encoder profile.
///
/// The graph and profile are fixed for the lifetime of the job; retries
/// re-run the identical invocation.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    /// Input files in graph order
    pub inputs: Vec<PathBuf>,
    /// The filter graph to apply
    pub graph: FilterGraph,
    /// Encoder settings for this run
    pub profile: EncoderProfile,
    /// Scratch output path (moved to the final path after verification)
    pub output: PathBuf,
    /// Job-scoped scratch directory for graph payloads
    pub scratch_dir: PathBuf,
    /// Expected output duration in seconds
    pub total_duration: f64,
}

/// External encode/probe contract.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Verify the external tooling is reachable before any job runs.
    async fn preflight(&self) -> MediaResult<()>;

    /// Probe a media file.
    async fn probe(&self, path: &Path) -> MediaResult<VideoInfo>;

    /// Execute one encode invocation, streaming raw progress updates.
    async fn encode(
        &self,
        job: &EncodeJob,
        on_progress: ProgressSink,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<()>;
}

/// Production transcoder shelling out to FFmpeg.
#[derive(Debug, Clone, Default)]
pub struct FfmpegTranscoder {
    /// Per-invocation timeout in seconds
    timeout_secs: Option<u64>,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self { timeout_secs: None }
    }

    /// Set a ceiling on each encode invocation.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn preflight(&self) -> MediaResult<()> {
        crate::command::check_ffmpeg()?;
        crate::command::check_ffprobe()?;
        Ok(())
    }

    async fn probe(&self, path: &Path) -> MediaResult<VideoInfo> {
        probe_video(path).await
    }

    async fn encode(
        &self,
        job: &EncodeJob,
        on_progress: ProgressSink,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<()> {
        // Graph goes out-of-band; argv stays bounded regardless of
        // batch size.
        let script = job.graph.write_script(&job.scratch_dir).await?;

        let mut cmd = FfmpegCommand::with_inputs(job.inputs.clone(), &job.output)
            .filter_script(script)
            .output_args(job.profile.to_ffmpeg_args())
            .output_arg("-pix_fmt")
            .output_arg("yuv420p")
            .output_arg("-movflags")
            .output_arg("+faststart");

        for label in job.graph.output_maps() {
            cmd = cmd.map(label);
        }

        let mut runner = FfmpegRunner::new().with_cancel(cancel);
        if let Some(secs) = self.timeout_secs {
            runner = runner.with_timeout(secs);
        }

        runner
            .run_with_progress(&cmd, move |p| on_progress(p))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::compute_crop;
    use crate::graph::GraphInput;
    use reframe_models::{GeometryProfile, SideBias, TransitionSpec};

    #[test]
    fn test_encode_job_is_cloneable_for_retries() {
        let profile = GeometryProfile::vertical_letterbox();
        let crop = compute_crop(1920, 1080, &profile, SideBias::Center).unwrap();
        let graph = FilterGraph::build(
            &[GraphInput { crop, duration: 3.0, has_audio: true, overlay_text: None }],
            &profile,
            &TransitionSpec::none(),
        );

        let job = EncodeJob {
            inputs: vec![PathBuf::from("in.mp4")],
            graph,
            profile: EncoderProfile::x264(),
            output: PathBuf::from("scratch/out.mp4"),
            scratch_dir: PathBuf::from("scratch"),
            total_duration: 3.0,
        };

        // Retries re-enter with the same graph and profile.
        let again = job.clone();
        assert_eq!(again.graph, job.graph);
        assert_eq!(again.profile, job.profile);
    }
}
