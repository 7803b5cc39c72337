//! Backend-agnostic filter graph construction.
//!
//! A [`FilterGraph`] is an in-memory description of the per-input filter
//! chains (crop, scale, pad, text overlay, fades) and the concatenation
//! joining them. Construction is purely computational and unit-testable
//! against structure; rendering to FFmpeg's `filter_complex` syntax is a
//! separate step, and large graphs are handed to the process as a script
//! file rather than an argv string.

use std::path::{Path, PathBuf};

use reframe_models::{CropRect, GeometryProfile, OverlayAnchor, TransitionSpec};

use crate::error::MediaResult;
use crate::geometry::compute_layout;

/// Silent-audio synthesis parameters for inputs without an audio track.
pub const SILENT_CHANNEL_LAYOUT: &str = "stereo";
pub const SILENT_SAMPLE_RATE: u32 = 44_100;

/// Default overlay font size and edge margin.
pub const OVERLAY_FONT_SIZE: u32 = 48;
pub const OVERLAY_MARGIN: u32 = 48;

/// One step of a per-input video filter chain.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterStep {
    Crop(CropRect),
    Scale { width: u32, height: u32 },
    Pad { width: u32, height: u32, x: u32, y: u32 },
    DrawText { text: String, anchor: OverlayAnchor, font_size: u32 },
    FadeIn { duration: f64 },
    FadeOut { start: f64, duration: f64 },
}

/// Audio handling for one input.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    /// Pass the input's own audio stream through
    Stream,
    /// Synthesize silence of the given duration (seconds)
    Silence { duration: f64 },
}

/// The filter chain for a single input clip.
#[derive(Debug, Clone, PartialEq)]
pub struct InputChain {
    pub steps: Vec<FilterStep>,
    pub audio: AudioSource,
    pub duration: f64,
}

/// Everything the builder needs to know about one input.
#[derive(Debug, Clone)]
pub struct GraphInput {
    pub crop: CropRect,
    pub duration: f64,
    pub has_audio: bool,
    pub overlay_text: Option<String>,
}

/// An ordered set of per-input chains plus a concatenation plan.
///
/// Owned by the builder for the duration of one job; never mutated
/// after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGraph {
    chains: Vec<InputChain>,
}

impl FilterGraph {
    /// Build the graph for a sequence of inputs under one profile.
    ///
    /// Chains are emitted in submission order and the concat node joins
    /// them in that same order. Inputs without audio get a synthesized
    /// silent track so the concat stream counts stay consistent across
    /// mixed-audio batches.
    pub fn build(
        inputs: &[GraphInput],
        profile: &GeometryProfile,
        transitions: &TransitionSpec,
    ) -> Self {
        let chains = inputs
            .iter()
            .map(|input| {
                let layout = compute_layout(&input.crop, profile);
                let mut steps = vec![
                    FilterStep::Crop(input.crop),
                    FilterStep::Scale {
                        width: layout.scale_width,
                        height: layout.scale_height,
                    },
                ];

                if layout.padded {
                    steps.push(FilterStep::Pad {
                        width: profile.output_width,
                        height: profile.output_height,
                        x: layout.pad_x,
                        y: layout.pad_y,
                    });
                }

                if let Some(text) = &input.overlay_text {
                    steps.push(FilterStep::DrawText {
                        text: text.clone(),
                        anchor: OverlayAnchor::default(),
                        font_size: OVERLAY_FONT_SIZE,
                    });
                }

                if transitions.enabled() && inputs.len() > 1 {
                    let fade = transitions.fade_duration.min(input.duration / 2.0);
                    steps.push(FilterStep::FadeIn { duration: fade });
                    steps.push(FilterStep::FadeOut {
                        start: (input.duration - fade).max(0.0),
                        duration: fade,
                    });
                }

                InputChain {
                    steps,
                    audio: if input.has_audio {
                        AudioSource::Stream
                    } else {
                        AudioSource::Silence {
                            duration: input.duration,
                        }
                    },
                    duration: input.duration,
                }
            })
            .collect();

        Self { chains }
    }

    pub fn chains(&self) -> &[InputChain] {
        &self.chains
    }

    pub fn input_count(&self) -> usize {
        self.chains.len()
    }

    /// Whether the graph ends in a concat node (more than one input).
    pub fn is_concatenated(&self) -> bool {
        self.chains.len() > 1
    }

    /// Total output duration across all chains.
    pub fn total_duration(&self) -> f64 {
        self.chains.iter().map(|c| c.duration).sum()
    }

    /// Output stream labels to map in the encode invocation.
    pub fn output_maps(&self) -> Vec<String> {
        vec!["[vout]".to_string(), "[aout]".to_string()]
    }

    /// Render the graph to FFmpeg `filter_complex` syntax.
    ///
    /// Every graph exposes `[vout]`/`[aout]` so the invocation's stream
    /// mapping is identical for single-clip and concatenated jobs.
    pub fn render_filter_complex(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        for (i, chain) in self.chains.iter().enumerate() {
            let video_label = self.video_label(i);
            let steps: Vec<String> = chain.steps.iter().map(render_step).collect();
            parts.push(format!("[{i}:v]{}{video_label}", steps.join(",")));

            let audio_label = self.audio_label(i);
            match &chain.audio {
                AudioSource::Stream => {
                    parts.push(format!("[{i}:a]anull{audio_label}"));
                }
                AudioSource::Silence { duration } => {
                    parts.push(format!(
                        "anullsrc=channel_layout={SILENT_CHANNEL_LAYOUT}:sample_rate={SILENT_SAMPLE_RATE},atrim=duration={duration:.3}{audio_label}"
                    ));
                }
            }
        }

        if self.is_concatenated() {
            let mut concat_inputs = String::new();
            for i in 0..self.chains.len() {
                concat_inputs.push_str(&format!("[v{i}][a{i}]"));
            }
            parts.push(format!(
                "{concat_inputs}concat=n={}:v=1:a=1[vout][aout]",
                self.chains.len()
            ));
        }

        parts.join(";")
    }

    /// Materialize the rendered graph as a `-filter_complex_script`
    /// payload so unbounded graphs never hit argv length limits.
    pub async fn write_script(&self, dir: impl AsRef<Path>) -> MediaResult<PathBuf> {
        let path = dir.as_ref().join("filter_graph.txt");
        tokio::fs::write(&path, self.render_filter_complex()).await?;
        Ok(path)
    }

    fn video_label(&self, i: usize) -> String {
        if self.is_concatenated() {
            format!("[v{i}]")
        } else {
            "[vout]".to_string()
        }
    }

    fn audio_label(&self, i: usize) -> String {
        if self.is_concatenated() {
            format!("[a{i}]")
        } else {
            "[aout]".to_string()
        }
    }
}

fn render_step(step: &FilterStep) -> String {
    match step {
        FilterStep::Crop(rect) => {
            format!("crop={}:{}:{}:{}", rect.width, rect.height, rect.x, rect.y)
        }
        FilterStep::Scale { width, height } => format!("scale={width}:{height}"),
        FilterStep::Pad { width, height, x, y } => format!("pad={width}:{height}:{x}:{y}"),
        FilterStep::DrawText { text, anchor, font_size } => {
            let (x, y) = anchor.position_exprs(OVERLAY_MARGIN);
            format!(
                "drawtext=text='{}':fontsize={font_size}:fontcolor=white:\
                 borderw=3:bordercolor=black:x={x}:y={y}",
                escape_drawtext(text)
            )
        }
        FilterStep::FadeIn { duration } => format!("fade=t=in:st=0:d={duration:.3}"),
        FilterStep::FadeOut { start, duration } => {
            format!("fade=t=out:st={start:.3}:d={duration:.3}")
        }
    }
}

/// Escape text for FFmpeg's drawtext filter syntax.
fn escape_drawtext(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            ':' => out.push_str("\\:"),
            '%' => out.push_str("\\%"),
            _ => out.push(c),
        }
    }
    out
}
