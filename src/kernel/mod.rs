//! Correlation kernel implementations.
//!
//! Direct kernels evaluate ZNCC placement by placement and are exact but scale
//! with the template area. The FFT kernel computes the whole correlation
//! surface at once and is the default for the large templates seal matching
//! produces.

use crate::candidate::topk::Peak;
use crate::image::OwnedImage;
use crate::template::TemplatePlan;
use crate::util::{SealMatchError, SealMatchResult};
use crate::ImageView;

/// Scan configuration for kernel evaluations.
#[derive(Clone, Copy, Debug)]
pub struct ScanParams {
    /// Maximum number of peaks to retain.
    pub topk: usize,
    /// Minimum sum of squared deviations for an image window to be scored.
    ///
    /// Flat windows have no defined correlation and are skipped.
    pub min_var_i: f64,
    /// Minimum score threshold (discard below this value).
    pub min_score: f32,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            topk: 1,
            min_var_i: 1e-6,
            min_score: f32::NEG_INFINITY,
        }
    }
}

/// Kernel trait for scoring and scan operations.
pub trait Kernel {
    type Plan;

    /// Computes the score at a single placement (top-left coordinates).
    ///
    /// Returns `f32::NEG_INFINITY` for invalid placements and flat windows.
    fn score_at(
        image: ImageView<'_, u8>,
        plan: &Self::Plan,
        x: usize,
        y: usize,
        min_var_i: f64,
    ) -> f32;

    /// Scans the full valid placement range and returns top-K peaks.
    fn scan_full(
        image: ImageView<'_, u8>,
        plan: &Self::Plan,
        params: ScanParams,
    ) -> SealMatchResult<Vec<Peak>>;
}

/// Final ZNCC division shared by all kernels.
#[inline]
pub(crate) fn zncc_score(dot: f64, var_t: f64, var_i: f64, min_var_i: f64) -> Option<f32> {
    if var_i <= min_var_i {
        return None;
    }
    let score = dot / (var_t * var_i).sqrt();
    // Beyond rounding slack the value is a numerical artifact of a near-flat window.
    if score.is_finite() && score.abs() <= 1.0 + 1e-3 {
        Some(score.clamp(-1.0, 1.0) as f32)
    } else {
        None
    }
}

/// Verifies that the direct and FFT kernels find a known patch.
///
/// Correlates a 16x16 patch cut from a synthetic 48x40 texture and checks
/// that both backends report it at its source position with a near-unit
/// score.
pub fn self_check() -> SealMatchResult<()> {
    let (width, height) = (48usize, 40usize);
    let (px, py, side) = (21usize, 13usize, 16usize);
    let mut data = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            data.push((((x * 29) ^ (y * 17) ^ (x * y)) & 0xFF) as u8);
        }
    }
    let mut patch = Vec::with_capacity(side * side);
    for y in py..py + side {
        patch.extend_from_slice(&data[y * width + px..y * width + px + side]);
    }

    let image = OwnedImage::new(data, width, height)?;
    let plan = TemplatePlan::from_view(ImageView::from_slice(&patch, side, side)?)?;
    let params = ScanParams::default();
    let direct = scalar::ZnccScalar::scan_full(image.view(), &plan, params)?;
    let spectral = fft::ImageSpectrum::build(&image)?.scan_full(&plan, params)?;

    for peaks in [direct, spectral] {
        match peaks.first() {
            Some(peak) if (peak.x, peak.y) == (px, py) && peak.score > 0.999 => {}
            _ => return Err(SealMatchError::InvalidInput("kernel self-check failed")),
        }
    }
    Ok(())
}

pub mod fft;
pub mod scalar;

#[cfg(feature = "simd")]
pub mod simd;

#[cfg(feature = "rayon")]
pub mod rayon;
