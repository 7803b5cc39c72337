//! Encoder profile configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default audio codec for both backends.
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default audio bitrate.
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";
/// Default output frame rate.
pub const DEFAULT_FPS: u32 = 30;

/// NVENC constant-quality value for the hardware profile.
pub const NVENC_DEFAULT_CQ: u8 = 23;
/// Software thread count when no override is given.
pub const X264_DEFAULT_THREADS: u32 = 4;

/// Fixed CQ -> CRF equivalence table.
///
/// NVENC CQ and x264 CRF scales are not numerically identical; these
/// pairs were tuned empirically to land both backends in the same
/// output size band. Unmapped values fall back to the offset implied
/// by the nearest pair.
const CQ_CRF_TABLE: &[(u8, u8)] = &[(19, 15), (23, 19), (28, 24)];

/// Map an NVENC CQ value to the x264 CRF producing similar quality.
pub fn crf_for_cq(cq: u8) -> u8 {
    if let Some(&(_, crf)) = CQ_CRF_TABLE.iter().find(|&&(c, _)| c == cq) {
        return crf;
    }
    // Nearest table entry, shifted by the distance from its CQ.
    let &(near_cq, near_crf) = CQ_CRF_TABLE
        .iter()
        .min_by_key(|&&(c, _)| c.abs_diff(cq))
        .unwrap_or(&(23, 19));
    let crf = near_crf as i16 + (cq as i16 - near_cq as i16);
    crf.clamp(0, 51) as u8
}

/// Rate-control strategy for an encoder profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "mode", content = "value")]
pub enum RateControl {
    /// Constant-quality encoding (`-cq` for NVENC, `-crf` for x264).
    ConstantQuality(u8),
    /// Bounded-bitrate encoding (`-b:v`).
    BoundedBitrate(String),
}

/// Encoder backend configuration, selected once per batch run.
///
/// One hardware instance plus one software fallback instance are chosen
/// before any job starts; both are immutable for the run's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncoderProfile {
    /// Video codec (e.g., "libx264", "h264_nvenc")
    pub codec: String,

    /// Encoding preset ("p4" for NVENC, "veryfast" for x264)
    pub preset: String,

    /// Rate-control strategy
    pub rate_control: RateControl,

    /// Target bitrate hint (`-b:v`), hardware only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_bitrate: Option<String>,

    /// Maximum bitrate ceiling (`-maxrate`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bitrate: Option<String>,

    /// Rate-control buffer size (`-bufsize`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<String>,

    /// Encoder thread count, software only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<u32>,

    /// Audio codec
    pub audio_codec: String,

    /// Audio bitrate
    pub audio_bitrate: String,

    /// Output frame rate
    pub fps: u32,

    /// Whether this profile uses a hardware encoder
    pub hardware: bool,
}

impl EncoderProfile {
    /// Hardware profile: NVENC tuned for throughput within a fixed
    /// output size band (VBR with a CQ floor plus bitrate caps).
    pub fn nvenc() -> Self {
        Self {
            codec: "h264_nvenc".to_string(),
            preset: "p4".to_string(),
            rate_control: RateControl::ConstantQuality(NVENC_DEFAULT_CQ),
            target_bitrate: Some("15M".to_string()),
            max_bitrate: Some("30M".to_string()),
            buffer_size: Some("60M".to_string()),
            threads: None,
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            fps: DEFAULT_FPS,
            hardware: true,
        }
    }

    /// Software fallback: multi-threaded x264 with a CRF chosen from the
    /// CQ equivalence table to approximate the hardware size band.
    pub fn x264() -> Self {
        Self {
            codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            rate_control: RateControl::ConstantQuality(crf_for_cq(NVENC_DEFAULT_CQ)),
            target_bitrate: None,
            max_bitrate: None,
            buffer_size: None,
            threads: Some(X264_DEFAULT_THREADS),
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            fps: DEFAULT_FPS,
            hardware: false,
        }
    }

    /// Returns a new profile with an overridden quality value.
    pub fn with_quality(mut self, value: u8) -> Self {
        self.rate_control = RateControl::ConstantQuality(value);
        self
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
        ];

        match &self.rate_control {
            RateControl::ConstantQuality(q) => {
                // NVENC rejects -crf; it uses VBR with a CQ target.
                if self.hardware {
                    args.extend_from_slice(&[
                        "-rc".to_string(),
                        "vbr".to_string(),
                        "-cq".to_string(),
                        q.to_string(),
                    ]);
                } else {
                    args.extend_from_slice(&["-crf".to_string(), q.to_string()]);
                }
            }
            RateControl::BoundedBitrate(bitrate) => {
                args.extend_from_slice(&["-b:v".to_string(), bitrate.clone()]);
            }
        }

        if let Some(bitrate) = &self.target_bitrate {
            args.extend_from_slice(&["-b:v".to_string(), bitrate.clone()]);
        }
        if let Some(maxrate) = &self.max_bitrate {
            args.extend_from_slice(&["-maxrate".to_string(), maxrate.clone()]);
        }
        if let Some(bufsize) = &self.buffer_size {
            args.extend_from_slice(&["-bufsize".to_string(), bufsize.clone()]);
        }
        if let Some(threads) = self.threads {
            args.extend_from_slice(&["-threads".to_string(), threads.to_string()]);
        }

        args.extend_from_slice(&[
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
            "-r".to_string(),
            self.fps.to_string(),
        ]);

        args
    }
}
