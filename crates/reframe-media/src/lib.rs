#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for the Reframe clip pipeline.
//!
//! This crate provides:
//! - Pure crop-zoom geometry (crop rectangles, letterbox layout)
//! - Backend-agnostic filter graph construction and serialization
//! - Encoder backend probing with software fallback
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2` with bounded-rate emission
//! - Cancellation and timeout support via tokio

pub mod backend;
pub mod command;
pub mod error;
pub mod fs_utils;
pub mod geometry;
pub mod graph;
pub mod probe;
pub mod progress;
pub mod transcoder;

pub use backend::{fallback_profile, select_backend, select_profile, EncoderCatalog};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use geometry::{compute_crop, compute_layout, validate_for_source, ScaledLayout};
pub use graph::{AudioSource, FilterGraph, FilterStep, GraphInput, InputChain};
pub use probe::{probe_video, VideoInfo};
pub use progress::{EncodeProgress, FfmpegProgress, ProgressThrottle};
pub use transcoder::{EncodeJob, FfmpegTranscoder, ProgressSink, Transcoder};
