//! Error types for sealmatch.

use thiserror::Error;

/// Result alias for sealmatch operations.
pub type SealMatchResult<T> = std::result::Result<T, SealMatchError>;

/// Errors that can occur while preparing images or localizing seals.
///
/// Only [`SealMatchError::Decode`], [`SealMatchError::Base64`] and the
/// configuration variants abort a localization request. The remaining
/// variants are raised inside a single seal's scan and are converted into a
/// not-localized record by the locator.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SealMatchError {
    /// The input data or parameters are invalid.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Image dimensions are zero or overflow.
    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// Stride is smaller than the row width.
    #[error("invalid stride {stride} for width {width}")]
    InvalidStride { width: usize, stride: usize },
    /// Backing buffer is shorter than the view requires.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// Template cannot be correlated (e.g. zero variance).
    #[error("degenerate template: {reason}")]
    DegenerateTemplate { reason: &'static str },
    /// Template is larger than the search image.
    #[error("template {tpl_width}x{tpl_height} exceeds image {img_width}x{img_height}")]
    TemplateTooLarge {
        tpl_width: usize,
        tpl_height: usize,
        img_width: usize,
        img_height: usize,
    },
    /// Scale factor list is empty or contains invalid entries.
    #[error("invalid scale set: {reason}")]
    InvalidScaleSet { reason: &'static str },
    /// Locator configuration is out of range.
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: &'static str },
    /// The supplied bytes are not a supported raster image.
    #[error("failed to decode image: {reason}")]
    Decode { reason: String },
    /// The supplied string is not valid base64.
    #[error("invalid base64 image payload: {reason}")]
    Base64 { reason: String },
    /// A reference template could not be read or decoded.
    #[error("failed to load template for {seal_id} from {path}: {reason}")]
    TemplateLoad {
        seal_id: String,
        path: String,
        reason: String,
    },
    /// The request time budget was exhausted.
    #[error("time budget exhausted")]
    TimedOut,
}
