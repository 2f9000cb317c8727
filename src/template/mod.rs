//! Scaled template construction and ZNCC plans.

use crate::image::ops::{canny_edges, resize_gray};
use crate::image::OwnedImage;
use crate::util::{SealMatchError, SealMatchResult};

mod plan;

pub use plan::TemplatePlan;

/// A reference template resized to one square side length.
///
/// Holds the grayscale and edge renditions together with their ZNCC plans.
/// `edge_plan` is `None` when the resized template has no edges, in which
/// case only grayscale matching runs at this scale.
pub struct ScaledTemplate {
    side: usize,
    gray: OwnedImage,
    edges: OwnedImage,
    gray_plan: TemplatePlan,
    edge_plan: Option<TemplatePlan>,
}

impl ScaledTemplate {
    /// Resizes `reference` to `side x side` and precomputes both plans.
    ///
    /// The edge rendition uses the same Canny thresholds as the working image
    /// so that edge maps are comparable.
    pub fn build(
        reference: &OwnedImage,
        side: usize,
        canny_low: f32,
        canny_high: f32,
    ) -> SealMatchResult<Self> {
        let gray = resize_gray(reference, side, side)?;
        let edges = canny_edges(&gray, canny_low, canny_high)?;
        let gray_plan = TemplatePlan::from_view(gray.view())?;
        let edge_plan = match TemplatePlan::from_view(edges.view()) {
            Ok(plan) => Some(plan),
            Err(SealMatchError::DegenerateTemplate { .. }) => None,
            Err(err) => return Err(err),
        };
        Ok(Self {
            side,
            gray,
            edges,
            gray_plan,
            edge_plan,
        })
    }

    /// Returns the square side length in pixels.
    pub fn side(&self) -> usize {
        self.side
    }

    /// Returns the resized grayscale template.
    pub fn gray(&self) -> &OwnedImage {
        &self.gray
    }

    /// Returns the edge map of the resized template.
    pub fn edges(&self) -> &OwnedImage {
        &self.edges
    }

    /// Returns the grayscale ZNCC plan.
    pub fn gray_plan(&self) -> &TemplatePlan {
        &self.gray_plan
    }

    /// Returns the edge ZNCC plan, if the template has edges at this scale.
    pub fn edge_plan(&self) -> Option<&TemplatePlan> {
        self.edge_plan.as_ref()
    }
}
