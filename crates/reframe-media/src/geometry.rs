//! Crop-zoom geometry.
//!
//! All arithmetic happens in integer pixel space. Fractional results are
//! rounded by flooring, uniformly, so identical inputs always produce
//! identical rectangles and re-runs stay idempotent.

use reframe_models::{CropRect, GeometryError, GeometryProfile, SideBias};

/// Compute the crop rectangle for one source frame.
///
/// The crop fraction is `1 / zoom_factor`, applied to both axes so the
/// cropped region keeps the source aspect ratio. The bias trim then
/// removes `opposite_side_trim` of the *cropped* width from the side
/// opposite the bias: `Left` keeps the left edge and trims the right,
/// `Right` the reverse, `Center` splits the trim across both edges.
pub fn compute_crop(
    source_width: u32,
    source_height: u32,
    profile: &GeometryProfile,
    bias: SideBias,
) -> Result<CropRect, GeometryError> {
    if source_width == 0 || source_height == 0 {
        return Err(GeometryError::InvalidSource(source_width, source_height));
    }
    profile.validate()?;

    let cropped_width = (source_width as f64 / profile.zoom_factor).floor() as u32;
    let cropped_height = (source_height as f64 / profile.zoom_factor).floor() as u32;
    let kept_width = (cropped_width as f64 * (1.0 - profile.opposite_side_trim)).floor() as u32;

    if kept_width == 0 || cropped_height == 0 {
        return Err(GeometryError::OverTrimmed {
            source_width,
            source_height,
            kept_width,
            kept_height: cropped_height,
        });
    }

    let y = (source_height - cropped_height) / 2;
    let x = match bias {
        SideBias::Left => 0,
        SideBias::Right => source_width - kept_width,
        SideBias::Center => (source_width - kept_width) / 2,
    };

    Ok(CropRect::new(x, y, kept_width, cropped_height))
}

/// Validate a profile against real source dimensions.
///
/// Called once when a profile is registered for a run; a profile that
/// passes here cannot fail `compute_crop` for the same dimensions, so
/// per-clip calls are infallible in practice.
pub fn validate_for_source(
    profile: &GeometryProfile,
    source_width: u32,
    source_height: u32,
) -> Result<(), GeometryError> {
    for bias in SideBias::ALL {
        compute_crop(source_width, source_height, profile, *bias)?;
    }
    Ok(())
}

/// How a cropped region is scaled onto the output canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaledLayout {
    /// Scale target width
    pub scale_width: u32,
    /// Scale target height
    pub scale_height: u32,
    /// Horizontal pad offset (0 unless pillarboxing)
    pub pad_x: u32,
    /// Vertical pad offset for letterbox bars
    pub pad_y: u32,
    /// Whether a pad step is needed at all
    pub padded: bool,
}

/// Compute the scale/pad layout for a crop under the given profile.
///
/// Letterbox mode scales to fill the output width only and centers the
/// result vertically between bars. Fill mode scales to exactly the
/// output canvas, accepting independent per-axis zoom.
pub fn compute_layout(crop: &CropRect, profile: &GeometryProfile) -> ScaledLayout {
    if !profile.letterbox {
        return ScaledLayout {
            scale_width: even(profile.output_width),
            scale_height: even(profile.output_height),
            pad_x: 0,
            pad_y: 0,
            padded: false,
        };
    }

    let scale_width = even(profile.output_width);
    // Width-fit scale; yuv420p needs even dimensions.
    let scaled_height = (crop.height as u64 * scale_width as u64 / crop.width as u64) as u32;
    let scale_height = even(scaled_height.min(profile.output_height));

    if scale_height >= profile.output_height {
        // Cropped region already fills the canvas; no bars.
        return ScaledLayout {
            scale_width,
            scale_height: even(profile.output_height),
            pad_x: 0,
            pad_y: 0,
            padded: false,
        };
    }

    ScaledLayout {
        scale_width,
        scale_height,
        pad_x: 0,
        pad_y: (profile.output_height - scale_height) / 2,
        padded: true,
    }
}

/// Round down to the nearest even value (minimum 2).
fn even(v: u32) -> u32 {
    (v & !1).max(2)
}
