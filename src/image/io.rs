//! Decoding helpers built on the `image` crate.
//!
//! Every raster entering the matcher goes through [`flatten_to_gray`], which
//! composites transparency over an opaque background before the luma
//! conversion. A transparent pictogram corner would otherwise decode as black
//! and produce strong spurious edges around the template.

use crate::image::OwnedImage;
use crate::util::{SealMatchError, SealMatchResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, GrayImage, RgbImage};
use std::path::Path;

/// Background intensity used when flattening transparency.
pub const WHITE: u8 = 255;

/// Decodes an encoded raster (PNG, JPEG, GIF, WebP, BMP) from memory.
pub fn decode_bytes(bytes: &[u8]) -> SealMatchResult<DynamicImage> {
    if bytes.is_empty() {
        return Err(SealMatchError::Decode {
            reason: "image data is empty".to_string(),
        });
    }
    image::load_from_memory(bytes).map_err(|err| SealMatchError::Decode {
        reason: err.to_string(),
    })
}

/// Decodes a data URL (`data:image/png;base64,...`) or a bare base64 string.
pub fn decode_base64_payload(payload: &str) -> SealMatchResult<Vec<u8>> {
    let trimmed = payload.trim();
    let encoded = match trimmed.strip_prefix("data:") {
        Some(rest) => {
            let (header, body) = rest.split_once(',').ok_or_else(|| SealMatchError::Base64 {
                reason: "data URL has no payload separator".to_string(),
            })?;
            if !header.ends_with(";base64") {
                return Err(SealMatchError::Base64 {
                    reason: format!("data URL is not base64 encoded ({header})"),
                });
            }
            body
        }
        None => trimmed,
    };
    STANDARD
        .decode(encoded)
        .map_err(|err| SealMatchError::Base64 {
            reason: err.to_string(),
        })
}

/// Composites any alpha channel over `background` and converts to 8-bit luma.
pub fn flatten_to_gray(img: &DynamicImage, background: u8) -> SealMatchResult<OwnedImage> {
    if !img.color().has_alpha() {
        return owned_from_gray_image(img.to_luma8());
    }

    let rgba = img.to_rgba8();
    let bg = u32::from(background);
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (src, dst) in rgba.pixels().zip(rgb.pixels_mut()) {
        let [r, g, b, a] = src.0;
        let a = u32::from(a);
        let blend = |c: u8| ((u32::from(c) * a + bg * (255 - a) + 127) / 255) as u8;
        dst.0 = [blend(r), blend(g), blend(b)];
    }
    owned_from_gray_image(DynamicImage::ImageRgb8(rgb).into_luma8())
}

/// Creates an owned image from a grayscale image buffer without copying.
pub fn owned_from_gray_image(img: GrayImage) -> SealMatchResult<OwnedImage> {
    let width = img.width() as usize;
    let height = img.height() as usize;
    OwnedImage::new(img.into_raw(), width, height)
}

/// Copies an owned image into an `image::GrayImage`.
pub fn gray_image_from_owned(img: &OwnedImage) -> SealMatchResult<GrayImage> {
    GrayImage::from_raw(img.width() as u32, img.height() as u32, img.data().to_vec()).ok_or(
        SealMatchError::InvalidDimensions {
            width: img.width(),
            height: img.height(),
        },
    )
}

/// Loads an image from disk and flattens it to an opaque grayscale image.
pub fn load_gray_image<P: AsRef<Path>>(path: P) -> SealMatchResult<OwnedImage> {
    let img = image::open(path).map_err(|err| SealMatchError::Decode {
        reason: err.to_string(),
    })?;
    flatten_to_gray(&img, WHITE)
}
