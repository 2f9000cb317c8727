//! Template scale factors relative to the working image's shorter side.

use crate::util::math::round_px;
use crate::util::{SealMatchError, SealMatchResult};

/// Scale factors searched by default.
///
/// Pictograms on real labels mostly occupy 2–20 % of the limiting image
/// dimension, so sampling is densest there.
pub const REFERENCE_SCALES: [f32; 16] = [
    0.02, 0.03, 0.04, 0.05, 0.06, 0.07, 0.08, 0.10, 0.12, 0.14, 0.17, 0.20, 0.24, 0.30, 0.35, 0.40,
];

/// Ordered list of template scale factors.
#[derive(Clone, Debug, PartialEq)]
pub struct ScaleSet {
    factors: Vec<f32>,
}

impl ScaleSet {
    /// Creates a scale set; factors must be finite and in `(0, 1]`.
    pub fn new(factors: Vec<f32>) -> SealMatchResult<Self> {
        if factors.is_empty() {
            return Err(SealMatchError::InvalidScaleSet {
                reason: "at least one scale factor is required",
            });
        }
        if factors
            .iter()
            .any(|f| !f.is_finite() || *f <= 0.0 || *f > 1.0)
        {
            return Err(SealMatchError::InvalidScaleSet {
                reason: "scale factors must lie in (0, 1]",
            });
        }
        Ok(Self { factors })
    }

    /// Returns the number of factors.
    pub fn len(&self) -> usize {
        self.factors.len()
    }

    /// Returns true if the set has no factors.
    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Returns the factors in search order.
    pub fn factors(&self) -> &[f32] {
        &self.factors
    }

    /// Returns the template side for `factor` against a shorter side.
    pub fn side_for(factor: f32, shorter_side: usize) -> usize {
        round_px(shorter_side as f64 * f64::from(factor))
    }

    /// Returns `(factor, side)` pairs that yield a usable template.
    ///
    /// A side is skipped when it is below `min_px` (correlation on so few
    /// pixels is noise-dominated), at least as large as the shorter side, or
    /// above `max_px` when one is set. Search order is preserved.
    pub fn sides(
        &self,
        shorter_side: usize,
        min_px: usize,
        max_px: Option<usize>,
    ) -> Vec<(f32, usize)> {
        self.factors
            .iter()
            .map(|&factor| (factor, Self::side_for(factor, shorter_side)))
            .filter(|&(_, side)| {
                side >= min_px && side < shorter_side && max_px.map_or(true, |max| side <= max)
            })
            .collect()
    }
}

impl Default for ScaleSet {
    fn default() -> Self {
        Self {
            factors: REFERENCE_SCALES.to_vec(),
        }
    }
}
