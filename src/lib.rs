//! sealmatch locates hazard pictograms (GHS seals) in product-label images.
//!
//! Each requested seal's reference image is matched against a downsampled
//! copy of the label with multi-scale ZNCC template matching, in grayscale and
//! in Canny edge space. Accepted matches that overlap across seals are reduced
//! with IoU-based non-maximum suppression.
//!
//! Seal ids are scored on the rayon pool with the `rayon` feature; the `simd`
//! feature accelerates the direct correlation kernel and `tracing` emits
//! spans for every request stage.

pub mod candidate;
pub mod image;
pub mod kernel;
pub mod lowlevel;
pub mod prepare;
pub mod search;
pub mod store;
pub mod template;
mod trace;
pub mod util;

pub use candidate::bbox::BoundingBox;
pub use crate::image::{ImageView, OwnedImage};
pub use prepare::{prepare, PrepareConfig, WorkingImage};
pub use search::{
    match_seal, requires_human_review, Backend, LocalizationStatus, LocateConfig, MatchConfig,
    MatchHit, ScaleSet, SealLocalization, SealLocator, SealOutcome, SealScan, SearchSpace,
    Strategy,
};
pub use store::{
    HazardCategory, PreloadReport, ReferenceTemplate, SealCatalog, SealSpec, TemplateStore,
};
pub use util::{SealMatchError, SealMatchResult};
