//! Working-resolution preprocessing of the target image.
//!
//! A request decodes its image once, downsamples it so the longer side does
//! not exceed a cap (never upsampling, which would only invent detail), and
//! derives the grayscale and Canny edge planes every seal is matched against.

use crate::image::io::{decode_bytes, flatten_to_gray, WHITE};
use crate::image::ops::{canny_edges, resize_gray};
use crate::image::OwnedImage;
use crate::trace::{trace_event, trace_span};
use crate::util::math::round_px;
use crate::util::{SealMatchError, SealMatchResult};
use image::DynamicImage;

/// Preprocessing parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct PrepareConfig {
    /// Longest side of the working image in pixels.
    pub max_image_dim: usize,
    /// Canny low hysteresis threshold.
    pub canny_low: f32,
    /// Canny high hysteresis threshold.
    pub canny_high: f32,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            max_image_dim: 1000,
            canny_low: 50.0,
            canny_high: 150.0,
        }
    }
}

impl PrepareConfig {
    /// Checks parameter ranges.
    pub fn validate(&self) -> SealMatchResult<()> {
        if self.max_image_dim == 0 {
            return Err(SealMatchError::InvalidConfig {
                reason: "max_image_dim must be > 0",
            });
        }
        if !(self.canny_low.is_finite() && self.canny_high.is_finite())
            || self.canny_low < 0.0
            || self.canny_high < self.canny_low
        {
            return Err(SealMatchError::InvalidConfig {
                reason: "canny thresholds must satisfy 0 <= low <= high",
            });
        }
        Ok(())
    }
}

/// The downsampled target image in grayscale and edge form.
#[derive(Clone, Debug)]
pub struct WorkingImage {
    original_width: usize,
    original_height: usize,
    factor: f64,
    gray: OwnedImage,
    edges: OwnedImage,
    canny_low: f32,
    canny_high: f32,
}

impl WorkingImage {
    /// Returns the decoded image width before downsampling.
    pub fn original_width(&self) -> usize {
        self.original_width
    }

    /// Returns the decoded image height before downsampling.
    pub fn original_height(&self) -> usize {
        self.original_height
    }

    /// Returns the downscale factor (1.0 when no downsampling happened).
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Returns the working width in pixels.
    pub fn width(&self) -> usize {
        self.gray.width()
    }

    /// Returns the working height in pixels.
    pub fn height(&self) -> usize {
        self.gray.height()
    }

    /// Returns the shorter working side, the reference length for template scales.
    pub fn shorter_side(&self) -> usize {
        self.width().min(self.height())
    }

    /// Returns the grayscale plane.
    pub fn gray(&self) -> &OwnedImage {
        &self.gray
    }

    /// Returns the binary edge plane (0 or 255).
    pub fn edges(&self) -> &OwnedImage {
        &self.edges
    }

    /// Returns the Canny thresholds the edge plane was built with.
    ///
    /// Templates must be edge-detected with the same values.
    pub fn canny_thresholds(&self) -> (f32, f32) {
        (self.canny_low, self.canny_high)
    }
}

/// Computes the downscale factor and working size for an image.
pub fn working_size(width: usize, height: usize, max_image_dim: usize) -> (f64, usize, usize) {
    let longest = width.max(height);
    let factor = if longest > max_image_dim {
        max_image_dim as f64 / longest as f64
    } else {
        1.0
    };
    let w = round_px(width as f64 * factor).max(1);
    let h = round_px(height as f64 * factor).max(1);
    (factor, w, h)
}

/// Decodes `bytes` and builds the working image.
///
/// Fails with [`SealMatchError::Decode`] when the bytes are not a supported
/// raster format.
pub fn prepare(bytes: &[u8], cfg: &PrepareConfig) -> SealMatchResult<WorkingImage> {
    let img = decode_bytes(bytes)?;
    prepare_image(&img, cfg)
}

/// Builds the working image from an already decoded image.
pub fn prepare_image(img: &DynamicImage, cfg: &PrepareConfig) -> SealMatchResult<WorkingImage> {
    cfg.validate()?;
    let original_width = img.width() as usize;
    let original_height = img.height() as usize;
    let _span = trace_span!(
        "prepare",
        width = original_width,
        height = original_height
    )
    .entered();

    let full = flatten_to_gray(img, WHITE)?;
    let (factor, width, height) = working_size(original_width, original_height, cfg.max_image_dim);
    let gray = resize_gray(&full, width, height)?;
    let edges = canny_edges(&gray, cfg.canny_low, cfg.canny_high)?;

    trace_event!(
        "working_image",
        width = width,
        height = height,
        factor = factor
    );

    Ok(WorkingImage {
        original_width,
        original_height,
        factor,
        gray,
        edges,
        canny_low: cfg.canny_low,
        canny_high: cfg.canny_high,
    })
}
