//! Clip transform requests.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::SideBias;

/// A single clip transform request.
///
/// Created once per source clip by the metadata layer; immutable once
/// submitted to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipRequest {
    /// Path to the source clip
    pub source_path: PathBuf,

    /// Placement number, unique within a batch run
    pub placement_id: u32,

    /// Which side of the frame to keep when trimming
    #[serde(default)]
    pub side_bias: SideBias,

    /// Optional text drawn over the clip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay_text: Option<String>,

    /// Where the transformed clip is written
    pub output_path: PathBuf,
}

impl ClipRequest {
    pub fn new(
        source_path: impl Into<PathBuf>,
        placement_id: u32,
        side_bias: SideBias,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            placement_id,
            side_bias,
            overlay_text: None,
            output_path: output_path.into(),
        }
    }

    /// Returns a new request with overlay text attached.
    pub fn with_overlay(mut self, text: impl Into<String>) -> Self {
        self.overlay_text = Some(text.into());
        self
    }
}

/// Named anchor for overlay text placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlayAnchor {
    TopLeft,
    TopCenter,
    TopRight,
    Center,
    BottomLeft,
    #[default]
    BottomCenter,
    BottomRight,
}

impl OverlayAnchor {
    /// FFmpeg drawtext x/y expressions for this anchor.
    ///
    /// `tw`/`th` are the rendered text dimensions, `w`/`h` the frame
    /// dimensions; the margin keeps text off the frame edge.
    pub fn position_exprs(&self, margin: u32) -> (String, String) {
        let m = margin;
        let (x, y) = match self {
            OverlayAnchor::TopLeft => (format!("{m}"), format!("{m}")),
            OverlayAnchor::TopCenter => ("(w-tw)/2".to_string(), format!("{m}")),
            OverlayAnchor::TopRight => (format!("w-tw-{m}"), format!("{m}")),
            OverlayAnchor::Center => ("(w-tw)/2".to_string(), "(h-th)/2".to_string()),
            OverlayAnchor::BottomLeft => (format!("{m}"), format!("h-th-{m}")),
            OverlayAnchor::BottomCenter => ("(w-tw)/2".to_string(), format!("h-th-{m}")),
            OverlayAnchor::BottomRight => (format!("w-tw-{m}"), format!("h-th-{m}")),
        };
        (x, y)
    }
}

/// Transition behavior between concatenated clips.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TransitionSpec {
    /// Fade in/out duration in seconds; 0 disables transitions.
    pub fade_duration: f64,
}

impl TransitionSpec {
    /// No transitions.
    pub fn none() -> Self {
        Self { fade_duration: 0.0 }
    }

    /// Fade transitions with the given duration.
    pub fn fade(duration: f64) -> Self {
        Self {
            fade_duration: duration.max(0.0),
        }
    }

    pub fn enabled(&self) -> bool {
        self.fade_duration > 0.0
    }
}

impl Default for TransitionSpec {
    fn default() -> Self {
        Self { fade_duration: 0.5 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = ClipRequest::new("in.mp4", 7, SideBias::Left, "out.mp4")
            .with_overlay("Game point");
        assert_eq!(req.placement_id, 7);
        assert_eq!(req.overlay_text.as_deref(), Some("Game point"));
    }

    #[test]
    fn test_anchor_exprs() {
        let (x, y) = OverlayAnchor::BottomCenter.position_exprs(24);
        assert_eq!(x, "(w-tw)/2");
        assert_eq!(y, "h-th-24");

        let (x, y) = OverlayAnchor::TopRight.position_exprs(16);
        assert_eq!(x, "w-tw-16");
        assert_eq!(y, "16");
    }

    #[test]
    fn test_transition_spec() {
        assert!(!TransitionSpec::none().enabled());
        assert!(TransitionSpec::fade(0.5).enabled());
        assert!(!TransitionSpec::fade(-1.0).enabled());
    }
}
