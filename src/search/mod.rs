//! Multi-scale seal search and the localization entry point.
//!
//! `matcher` scans one reference template across the scale set in grayscale
//! and edge space; `locate` sequences preprocessing, per-seal matching and
//! cross-seal suppression into per-seal records.

pub mod locate;
pub mod matcher;
pub mod scales;

use crate::candidate::bbox::BoundingBox;
use crate::util::{SealMatchError, SealMatchResult};

pub use locate::{
    requires_human_review, LocalizationStatus, LocateConfig, SealLocalization, SealLocator,
    SealOutcome,
};
pub use matcher::{match_seal, SealScan, SearchSpace};
pub use scales::ScaleSet;

/// Correlation backend used for full-image scans.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// Direct per-placement evaluation (scalar, SIMD or row-parallel).
    Direct,
    /// Whole-surface correlation through the image spectrum.
    Fft,
}

/// Image representation a match was found in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Grayscale intensities.
    Gray,
    /// Binary Canny edge maps.
    Edge,
}

impl Strategy {
    /// Lower-case name used in diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Gray => "gray",
            Strategy::Edge => "edge",
        }
    }
}

/// Best correlation found for one strategy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchHit {
    /// Strategy that produced the hit.
    pub strategy: Strategy,
    /// ZNCC score in `[-1, 1]`.
    pub score: f32,
    /// Scale factor the template was resized with.
    pub scale: f32,
    /// Template side length in working pixels.
    pub side_px: usize,
    /// Normalized location of the template.
    pub bbox: BoundingBox,
}

/// Multi-scale matcher configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchConfig {
    /// Scale factors in search order.
    pub scales: ScaleSet,
    /// Smallest template side in pixels.
    pub min_template_px: usize,
    /// Largest template side in pixels; `None` bounds only by the image.
    pub max_template_px: Option<usize>,
    /// Correlation backend.
    pub backend: Backend,
    /// Row-parallel direct scans (requires the `rayon` feature).
    pub parallel_scan: bool,
    /// Minimum window variance for a placement to be scored.
    pub min_var_i: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            scales: ScaleSet::default(),
            min_template_px: 16,
            max_template_px: None,
            backend: Backend::Fft,
            parallel_scan: false,
            min_var_i: 1e-6,
        }
    }
}

impl MatchConfig {
    /// Checks parameter ranges.
    pub fn validate(&self) -> SealMatchResult<()> {
        if self.min_template_px == 0 {
            return Err(SealMatchError::InvalidConfig {
                reason: "min_template_px must be > 0",
            });
        }
        if let Some(max) = self.max_template_px {
            if max < self.min_template_px {
                return Err(SealMatchError::InvalidConfig {
                    reason: "max_template_px must be >= min_template_px",
                });
            }
        }
        if !self.min_var_i.is_finite() || self.min_var_i < 0.0 {
            return Err(SealMatchError::InvalidConfig {
                reason: "min_var_i must be finite and >= 0",
            });
        }
        Ok(())
    }
}
