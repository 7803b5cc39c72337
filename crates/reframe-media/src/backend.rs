//! Encoder backend probing and selection.
//!
//! The backend is decided once per batch run so every output in the run
//! shares the same encoder characteristics. Probe failures of any kind
//! fall back to the software profile; they never abort the run.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{info, warn};

use reframe_models::EncoderProfile;

use crate::error::{MediaError, MediaResult};

/// NVENC H.264 encoder name as reported by `ffmpeg -encoders`.
pub const NVENC_ENCODER: &str = "h264_nvenc";

/// Probe timeout; a wedged driver should not stall batch startup.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// The set of encoder names a local FFmpeg build supports.
#[derive(Debug, Clone, Default)]
pub struct EncoderCatalog {
    names: Vec<String>,
}

impl EncoderCatalog {
    /// Enumerate encoders by running `ffmpeg -hide_banner -encoders`.
    pub async fn detect() -> MediaResult<Self> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let output = tokio::time::timeout(
            PROBE_TIMEOUT,
            Command::new("ffmpeg")
                .args(["-hide_banner", "-encoders"])
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .output(),
        )
        .await
        .map_err(|_| MediaError::BackendProbe("encoder enumeration timed out".to_string()))?
        .map_err(|e| MediaError::BackendProbe(format!("failed to run ffmpeg: {e}")))?;

        if !output.status.success() {
            return Err(MediaError::BackendProbe(format!(
                "ffmpeg -encoders exited with {:?}",
                output.status.code()
            )));
        }

        Ok(Self::parse(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Parse `ffmpeg -encoders` output.
    ///
    /// Encoder lines follow the `------` separator and look like
    /// ` V....D h264_nvenc  NVIDIA NVENC H.264 encoder`.
    pub fn parse(stdout: &str) -> Self {
        let mut names = Vec::new();
        let mut in_list = false;

        for line in stdout.lines() {
            if !in_list {
                if line.trim_start().starts_with("---") {
                    in_list = true;
                }
                continue;
            }
            let mut tokens = line.split_whitespace();
            let (Some(flags), Some(name)) = (tokens.next(), tokens.next()) else {
                continue;
            };
            // Video/audio/subtitle flag column, then the encoder name.
            if flags.starts_with('V') || flags.starts_with('A') || flags.starts_with('S') {
                names.push(name.to_string());
            }
        }

        Self { names }
    }

    pub fn supports(&self, encoder: &str) -> bool {
        self.names.iter().any(|n| n == encoder)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Pick the encode profile for a catalog: hardware when NVENC is
/// available, software otherwise.
pub fn select_profile(catalog: &EncoderCatalog) -> EncoderProfile {
    if catalog.supports(NVENC_ENCODER) {
        EncoderProfile::nvenc()
    } else {
        EncoderProfile::x264()
    }
}

/// The software profile used as fallback after probe or mid-run
/// hardware failure.
pub fn fallback_profile() -> EncoderProfile {
    EncoderProfile::x264()
}

/// Probe the local FFmpeg build and select an encoder profile.
///
/// A missing ffmpeg binary is fatal (nothing can encode); every other
/// probe failure logs and falls back to software.
pub async fn select_backend() -> MediaResult<EncoderProfile> {
    match EncoderCatalog::detect().await {
        Ok(catalog) => {
            let profile = select_profile(&catalog);
            if profile.hardware {
                info!("NVENC detected, hardware encoding enabled");
            } else {
                info!("No hardware encoder detected, using software encoding");
            }
            Ok(profile)
        }
        Err(MediaError::FfmpegNotFound) => Err(MediaError::FfmpegNotFound),
        Err(e) => {
            warn!("Encoder probe failed ({e}), falling back to software encoding");
            Ok(fallback_profile())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Encoders:
 V..... = Video
 A..... = Audio
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 V....D h264_nvenc           NVIDIA NVENC H.264 encoder (codec h264)
 A....D aac                  AAC (Advanced Audio Coding)
";

    #[test]
    fn test_parse_encoder_list() {
        let catalog = EncoderCatalog::parse(SAMPLE);
        assert_eq!(catalog.len(), 3);
        assert!(catalog.supports("h264_nvenc"));
        assert!(catalog.supports("libx264"));
        assert!(!catalog.supports("hevc_videotoolbox"));
    }

    #[test]
    fn test_parse_ignores_legend() {
        let catalog = EncoderCatalog::parse("Encoders:\n V..... = Video\n");
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_select_hardware_when_present() {
        let catalog = EncoderCatalog::parse(SAMPLE);
        let profile = select_profile(&catalog);
        assert!(profile.hardware);
        assert_eq!(profile.codec, "h264_nvenc");
    }

    #[test]
    fn test_select_software_when_absent() {
        let catalog = EncoderCatalog::parse(
            "Encoders:\n ------\n V....D libx264   libx264 H.264 (codec h264)\n",
        );
        let profile = select_profile(&catalog);
        assert!(!profile.hardware);
        assert_eq!(profile.codec, "libx264");
    }
}
