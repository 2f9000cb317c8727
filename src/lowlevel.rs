//! Low-level building blocks for custom matching pipelines.
//!
//! These expose template plans, kernel traits and suppression helpers for
//! callers that drive correlation themselves. Most users should prefer
//! [`crate::SealLocator`].

pub use crate::candidate::nms::{keep, suppress, NmsCandidate, NmsVerdict};
pub use crate::candidate::topk::{Peak, TopK};
pub use crate::image::integral::IntegralImage;
pub use crate::kernel::fft::ImageSpectrum;
#[cfg(feature = "rayon")]
pub use crate::kernel::rayon::scan_full_par;
pub use crate::kernel::scalar::ZnccScalar;
#[cfg(feature = "simd")]
pub use crate::kernel::simd::ZnccSimd;
pub use crate::kernel::{self_check, Kernel, ScanParams};
pub use crate::template::{ScaledTemplate, TemplatePlan};
