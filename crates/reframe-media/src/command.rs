//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::FfmpegProgress;

/// Number of diagnostic stderr lines retained for error detail.
pub const STDERR_TAIL_LINES: usize = 30;

/// Builder for FFmpeg commands.
///
/// Supports any number of inputs; the filter graph is attached either
/// inline or as a script file path for graphs too large for argv.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file paths, in graph order
    inputs: Vec<PathBuf>,
    /// Output file path
    output: PathBuf,
    /// Arguments placed before the inputs
    input_args: Vec<String>,
    /// Arguments placed after the inputs
    output_args: Vec<String>,
    /// Inline filter graph
    filter_complex: Option<String>,
    /// Out-of-band filter graph payload
    filter_script: Option<PathBuf>,
    /// Output stream labels to map
    maps: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a command with a single input.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self::with_inputs([input.as_ref().to_path_buf()], output)
    }

    /// Create a command over an ordered set of inputs.
    pub fn with_inputs(
        inputs: impl IntoIterator<Item = PathBuf>,
        output: impl AsRef<Path>,
    ) -> Self {
        Self {
            inputs: inputs.into_iter().collect(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            filter_complex: None,
            filter_script: None,
            maps: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add an argument placed before the inputs.
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add an argument placed after the inputs.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Attach an inline filter graph.
    pub fn filter_complex(mut self, filter: impl Into<String>) -> Self {
        self.filter_complex = Some(filter.into());
        self
    }

    /// Attach a filter graph script file (`-filter_complex_script`).
    pub fn filter_script(mut self, path: impl AsRef<Path>) -> Self {
        self.filter_script = Some(path.as_ref().to_path_buf());
        self
    }

    /// Map an output stream label (e.g. `[vout]`).
    pub fn map(mut self, label: impl Into<String>) -> Self {
        self.maps.push(label.into());
        self
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Progress key/value stream to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.extend(self.input_args.clone());

        for input in &self.inputs {
            args.push("-i".to_string());
            args.push(input.to_string_lossy().to_string());
        }

        // Script file takes precedence: large graphs must never be
        // inlined into a length-limited invocation string.
        if let Some(script) = &self.filter_script {
            args.push("-filter_complex_script".to_string());
            args.push(script.to_string_lossy().to_string());
        } else if let Some(filter) = &self.filter_complex {
            args.push("-filter_complex".to_string());
            args.push(filter.clone());
        }

        for label in &self.maps {
            args.push("-map".to_string());
            args.push(label.clone());
        }

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with progress tracking, timeout, and
/// cancellation.
pub struct FfmpegRunner {
    cancel_rx: Option<watch::Receiver<bool>>,
    timeout_secs: Option<u64>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self {
            cancel_rx: None,
            timeout_secs: None,
        }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set process timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command without progress reporting.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run an FFmpeg command, forwarding raw progress updates.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, progress_callback: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child.stderr.take().ok_or_else(|| {
            MediaError::ffmpeg_failed("stderr not captured", None, None)
        })?;

        // Diagnostic lines (non-progress) kept for error detail.
        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let tail_writer = Arc::clone(&tail);

        let progress_handle = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            let mut current = FfmpegProgress::default();

            while let Ok(Some(line)) = reader.next_line().await {
                if is_progress_line(&line) {
                    if let Some(progress) = parse_progress_line(&line, &mut current) {
                        progress_callback(progress);
                    }
                } else if !line.trim().is_empty() {
                    let mut tail = tail_writer.lock().expect("stderr tail lock");
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
        });

        let wait_result = self.wait_for_completion(&mut child).await;

        // Reader ends once the process's stderr closes.
        let _ = progress_handle.await;

        let status = wait_result?;
        if status.success() {
            Ok(())
        } else {
            let tail = tail.lock().expect("stderr tail lock");
            let detail: Vec<String> = tail.iter().cloned().collect();
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                (!detail.is_empty()).then(|| detail.join("\n")),
                status.code(),
            ))
        }
    }

    /// Wait for the child, honoring cancellation and timeout with
    /// orderly process termination on both.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<std::process::ExitStatus> {
        enum Outcome {
            Exited(std::io::Result<std::process::ExitStatus>),
            Cancelled,
            TimedOut,
        }

        let mut cancel_rx = self.cancel_rx.clone();
        let has_timeout = self.timeout_secs.is_some();
        let timeout_secs = self.timeout_secs.unwrap_or(0);
        let sleep = tokio::time::sleep(Duration::from_secs(timeout_secs));
        tokio::pin!(sleep);

        // The wait future's borrow of the child must end before kill.
        let outcome = {
            let wait = child.wait();
            tokio::pin!(wait);
            tokio::select! {
                status = &mut wait => Outcome::Exited(status),
                _ = wait_cancelled(&mut cancel_rx) => Outcome::Cancelled,
                _ = &mut sleep, if has_timeout => Outcome::TimedOut,
            }
        };

        match outcome {
            Outcome::Exited(status) => Ok(status?),
            Outcome::Cancelled => {
                info!("Encode cancelled, terminating FFmpeg");
                let _ = child.kill().await;
                Err(MediaError::Cancelled)
            }
            Outcome::TimedOut => {
                warn!("FFmpeg timed out after {timeout_secs}s, terminating");
                let _ = child.kill().await;
                Err(MediaError::Timeout(timeout_secs))
            }
        }
    }
}

/// Resolve only when a true cancellation signal arrives; pend forever
/// otherwise (no signal configured, or the sender went away).
async fn wait_cancelled(rx: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = rx.as_mut() {
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }
    std::future::pending::<()>().await;
}

/// Whether a stderr line belongs to the `-progress` key/value stream.
fn is_progress_line(line: &str) -> bool {
    match line.split_once('=') {
        Some((key, _)) => {
            !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        }
        None => false,
    }
}

/// Parse a line from FFmpeg's `-progress` output into the running state.
///
/// Returns a snapshot when a `progress=` terminator arrives.
fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let (key, value) = line.trim().split_once('=')?;

    match key {
        "out_time_ms" | "out_time_us" => {
            // Both keys report microseconds in modern FFmpeg builds.
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "fps" => {
            if let Ok(fps) = value.parse() {
                current.fps = fps;
            }
        }
        "speed" => {
            if value != "N/A" {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.parse().ok()) {
                    current.speed = speed;
                }
            }
        }
        "progress" => {
            if value == "end" {
                current.is_complete = true;
            }
            return Some(current.clone());
        }
        _ => {}
    }

    None
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_input_args_ordering() {
        let cmd = FfmpegCommand::with_inputs(
            [PathBuf::from("a.mp4"), PathBuf::from("b.mp4")],
            "out.mp4",
        )
        .filter_script("/tmp/graph.txt")
        .map("[vout]")
        .map("[aout]")
        .output_args(["-c:v", "libx264"]);

        let args = cmd.build_args();
        let a = args.iter().position(|s| s == "a.mp4").unwrap();
        let b = args.iter().position(|s| s == "b.mp4").unwrap();
        assert!(a < b);
        assert!(args.contains(&"-filter_complex_script".to_string()));
        assert!(args.contains(&"-map".to_string()));
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn test_script_takes_precedence_over_inline() {
        let cmd = FfmpegCommand::new("in.mp4", "out.mp4")
            .filter_complex("[0:v]scale=1080:1920[vout]")
            .filter_script("/tmp/graph.txt");

        let args = cmd.build_args();
        assert!(args.contains(&"-filter_complex_script".to_string()));
        assert!(!args.contains(&"-filter_complex".to_string()));
    }

    #[test]
    fn test_progress_line_detection() {
        assert!(is_progress_line("out_time_us=5000000"));
        assert!(is_progress_line("progress=continue"));
        assert!(!is_progress_line("Error opening output file"));
        assert!(!is_progress_line("[libx264 @ 0x5] broken header"));
    }

    #[test]
    fn test_progress_parsing() {
        let mut progress = FfmpegProgress::default();

        parse_progress_line("out_time_us=5000000", &mut progress);
        assert_eq!(progress.out_time_ms, 5000);

        parse_progress_line("speed=1.5x", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        assert!(parse_progress_line("frame=120", &mut progress).is_none());

        let snapshot = parse_progress_line("progress=end", &mut progress);
        assert!(snapshot.is_some());
        assert!(progress.is_complete);
    }
}
