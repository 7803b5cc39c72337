//! Geometry profiles and crop rectangles.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum zoom factor (1.0 means no zoom, which defeats crop-zoom).
pub const MIN_ZOOM_FACTOR: f64 = 1.0;

/// Default vertical output canvas (9:16).
pub const VERTICAL_WIDTH: u32 = 1080;
pub const VERTICAL_HEIGHT: u32 = 1920;

/// Default horizontal output canvas (16:9).
pub const HORIZONTAL_WIDTH: u32 = 1920;
pub const HORIZONTAL_HEIGHT: u32 = 1080;

/// A named, reusable crop-zoom configuration.
///
/// The profile describes how much of the source frame to keep (zoom),
/// how much of the kept width to trim away from the side opposite the
/// bias, and the output canvas the result is scaled onto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GeometryProfile {
    /// Zoom factor (> 1.0). 1.10 keeps 1/1.10 = 90.9% of each dimension.
    pub zoom_factor: f64,

    /// Fraction of the *cropped* width removed from the side opposite
    /// the bias, in [0, 1).
    pub opposite_side_trim: f64,

    /// Output canvas width in pixels.
    pub output_width: u32,

    /// Output canvas height in pixels.
    pub output_height: u32,

    /// If true, scale to fill output width only and pad the remaining
    /// height with bars. If false, scale to exactly fill both output
    /// dimensions (per-axis zoom drift accepted).
    pub letterbox: bool,
}

impl GeometryProfile {
    /// Vertical 9:16 letterbox profile used for Reels/Stories/TikTok.
    pub fn vertical_letterbox() -> Self {
        Self {
            zoom_factor: 1.10,
            opposite_side_trim: 0.30,
            output_width: VERTICAL_WIDTH,
            output_height: VERTICAL_HEIGHT,
            letterbox: true,
        }
    }

    /// Horizontal 16:9 fill profile with enhanced zoom for YouTube.
    pub fn horizontal_enhanced() -> Self {
        Self {
            zoom_factor: 1.15,
            opposite_side_trim: 0.15,
            output_width: HORIZONTAL_WIDTH,
            output_height: HORIZONTAL_HEIGHT,
            letterbox: false,
        }
    }

    /// Validate the profile's own parameter ranges.
    ///
    /// Source-dependent invariants (the crop keeping at least one pixel)
    /// are checked against real frame dimensions by the geometry engine
    /// when the profile is registered for a run.
    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.zoom_factor <= MIN_ZOOM_FACTOR || !self.zoom_factor.is_finite() {
            return Err(GeometryError::InvalidZoom(self.zoom_factor));
        }
        if !(0.0..1.0).contains(&self.opposite_side_trim) {
            return Err(GeometryError::InvalidTrim(self.opposite_side_trim));
        }
        if self.output_width == 0 || self.output_height == 0 {
            return Err(GeometryError::InvalidCanvas {
                width: self.output_width,
                height: self.output_height,
            });
        }
        Ok(())
    }
}

/// A crop rectangle in source-pixel coordinates.
///
/// Always derived fresh from (profile, source dimensions, bias) by the
/// geometry engine; never persisted independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Check the rectangle fits within the given source dimensions.
    pub fn fits_within(&self, source_width: u32, source_height: u32) -> bool {
        self.width >= 1
            && self.height >= 1
            && self.x + self.width <= source_width
            && self.y + self.height <= source_height
    }
}

/// Errors from invalid crop/zoom/bias combinations.
///
/// These are configuration-time errors: a profile is validated eagerly
/// when registered for a run, so per-clip crop computation cannot fail
/// for a validated profile.
#[derive(Debug, Clone, Error)]
pub enum GeometryError {
    #[error("Zoom factor {0} is out of range (must be > 1.0 and finite)")]
    InvalidZoom(f64),

    #[error("Opposite-side trim {0} is out of range [0, 1)")]
    InvalidTrim(f64),

    #[error("Output canvas {width}x{height} has a zero dimension")]
    InvalidCanvas { width: u32, height: u32 },

    #[error(
        "Profile over-trims {source_width}x{source_height} source to \
         {kept_width}x{kept_height} (each dimension must keep >= 1px)"
    )]
    OverTrimmed {
        source_width: u32,
        source_height: u32,
        kept_width: u32,
        kept_height: u32,
    },

    #[error("Source dimensions {0}x{1} are invalid")]
    InvalidSource(u32, u32),
}
