//! Resampling and edge detection.

use crate::image::io::{gray_image_from_owned, owned_from_gray_image};
use crate::image::OwnedImage;
use crate::util::{SealMatchError, SealMatchResult};
use image::imageops::{self, FilterType};

/// Resizes a grayscale image to exactly `width x height` with a triangle filter.
///
/// The aspect ratio is not preserved; pictogram templates are forced square.
/// Returns a clone when the size is unchanged.
pub fn resize_gray(src: &OwnedImage, width: usize, height: usize) -> SealMatchResult<OwnedImage> {
    if width == 0 || height == 0 {
        return Err(SealMatchError::InvalidDimensions { width, height });
    }
    if width == src.width() && height == src.height() {
        return Ok(src.clone());
    }
    let gray = gray_image_from_owned(src)?;
    let resized = imageops::resize(&gray, width as u32, height as u32, FilterType::Triangle);
    owned_from_gray_image(resized)
}

/// Runs the two-threshold Canny detector; the output holds 0 or 255 per pixel.
pub fn canny_edges(src: &OwnedImage, low: f32, high: f32) -> SealMatchResult<OwnedImage> {
    if !(low.is_finite() && high.is_finite()) || low < 0.0 || high < low {
        return Err(SealMatchError::InvalidInput(
            "canny thresholds must satisfy 0 <= low <= high",
        ));
    }
    let gray = gray_image_from_owned(src)?;
    owned_from_gray_image(imageproc::edges::canny(&gray, low, high))
}
