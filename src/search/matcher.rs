//! Multi-scale ZNCC matching of one reference template.
//!
//! The template is resized to a square of `round(shorter_side * factor)` for
//! every factor in the scale set and correlated against the working image in
//! grayscale and in edge space. Each strategy keeps its own best placement.

use crate::candidate::bbox::BoundingBox;
use crate::candidate::topk::Peak;
use crate::image::OwnedImage;
use crate::kernel::fft::ImageSpectrum;
use crate::kernel::{Kernel, ScanParams};
use crate::prepare::WorkingImage;
use crate::search::{Backend, MatchConfig, MatchHit, Strategy};
use crate::template::{ScaledTemplate, TemplatePlan};
use crate::trace::{trace_event, trace_span};
use crate::util::{SealMatchError, SealMatchResult};
use std::sync::OnceLock;
use std::time::Instant;

#[cfg(not(feature = "simd"))]
use crate::kernel::scalar::ZnccScalar as ZnccDirect;
#[cfg(feature = "simd")]
use crate::kernel::simd::ZnccSimd as ZnccDirect;

/// A working image prepared for repeated template scans.
///
/// With the FFT backend the spectrum of each plane is computed on its first
/// scan and reused by every later seal and scale of the request. A plane
/// that is never scanned is never transformed.
pub struct SearchSpace<'a> {
    working: &'a WorkingImage,
    backend: Backend,
    gray_spectrum: OnceLock<SealMatchResult<ImageSpectrum>>,
    edge_spectrum: OnceLock<SealMatchResult<ImageSpectrum>>,
}

impl<'a> SearchSpace<'a> {
    /// Wraps `working` for the configured backend.
    pub fn new(working: &'a WorkingImage, backend: Backend) -> SealMatchResult<Self> {
        Ok(Self {
            working,
            backend,
            gray_spectrum: OnceLock::new(),
            edge_spectrum: OnceLock::new(),
        })
    }

    /// Returns true once the spectrum of `strategy`'s plane has been built.
    pub fn spectrum_ready(&self, strategy: Strategy) -> bool {
        let slot = match strategy {
            Strategy::Gray => &self.gray_spectrum,
            Strategy::Edge => &self.edge_spectrum,
        };
        matches!(slot.get(), Some(Ok(_)))
    }

    /// Returns the underlying working image.
    pub fn working(&self) -> &WorkingImage {
        self.working
    }

    fn plane(
        &self,
        strategy: Strategy,
    ) -> SealMatchResult<(&OwnedImage, Option<&ImageSpectrum>)> {
        let (image, slot) = match strategy {
            Strategy::Gray => (self.working.gray(), &self.gray_spectrum),
            Strategy::Edge => (self.working.edges(), &self.edge_spectrum),
        };
        if self.backend == Backend::Direct {
            return Ok((image, None));
        }
        let spectrum = slot.get_or_init(|| {
            let _span = trace_span!("image_spectrum", strategy = strategy.as_str()).entered();
            ImageSpectrum::build(image)
        });
        match spectrum {
            Ok(spectrum) => Ok((image, Some(spectrum))),
            Err(err) => Err(err.clone()),
        }
    }

    /// Returns the global ZNCC maximum of `plan` over one plane.
    ///
    /// Ties resolve to the first placement in raster order.
    pub(crate) fn best_peak(
        &self,
        strategy: Strategy,
        plan: &TemplatePlan,
        cfg: &MatchConfig,
    ) -> SealMatchResult<Option<Peak>> {
        let params = ScanParams {
            topk: 1,
            min_var_i: cfg.min_var_i,
            min_score: f32::NEG_INFINITY,
        };
        let (image, spectrum) = self.plane(strategy)?;
        let peaks = match spectrum {
            Some(spectrum) => spectrum.scan_full(plan, params)?,
            None => scan_direct(image, plan, params, cfg.parallel_scan)?,
        };
        Ok(peaks.into_iter().next())
    }
}

#[cfg(feature = "rayon")]
fn scan_direct(
    image: &OwnedImage,
    plan: &TemplatePlan,
    params: ScanParams,
    parallel: bool,
) -> SealMatchResult<Vec<Peak>> {
    if parallel {
        crate::kernel::rayon::scan_full_par::<ZnccDirect>(image.view(), plan, params)
    } else {
        <ZnccDirect as Kernel>::scan_full(image.view(), plan, params)
    }
}

#[cfg(not(feature = "rayon"))]
fn scan_direct(
    image: &OwnedImage,
    plan: &TemplatePlan,
    params: ScanParams,
    _parallel: bool,
) -> SealMatchResult<Vec<Peak>> {
    <ZnccDirect as Kernel>::scan_full(image.view(), plan, params)
}

/// Per-strategy best matches of one seal.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SealScan {
    /// Best grayscale match, if any placement scored above zero.
    pub gray: Option<MatchHit>,
    /// Best edge match, if any placement scored above zero.
    pub edge: Option<MatchHit>,
    /// Number of scales whose template fit the image.
    pub scales_tried: usize,
}

impl SealScan {
    /// Returns the higher-scoring strategy's hit; grayscale wins ties.
    pub fn best(&self) -> Option<MatchHit> {
        match (self.gray, self.edge) {
            (Some(gray), Some(edge)) if edge.score > gray.score => Some(edge),
            (Some(gray), _) => Some(gray),
            (None, edge) => edge,
        }
    }

    /// Returns the best score, or zero when nothing matched.
    pub fn best_score(&self) -> f32 {
        self.best().map_or(0.0, |hit| hit.score)
    }

    fn offer(&mut self, hit: MatchHit) {
        let slot = match hit.strategy {
            Strategy::Gray => &mut self.gray,
            Strategy::Edge => &mut self.edge,
        };
        let current = slot.map_or(0.0, |best| best.score);
        if hit.score > current {
            *slot = Some(hit);
        }
    }
}

/// Scans `reference` over every usable scale and returns the best matches.
///
/// Scales whose side falls outside `[min_template_px, shorter_side)` (or
/// above `max_template_px`) are skipped. `deadline` is checked before each
/// scale; once it has passed the scan stops with [`SealMatchError::TimedOut`].
pub fn match_seal(
    space: &SearchSpace<'_>,
    reference: &OwnedImage,
    cfg: &MatchConfig,
    deadline: Option<Instant>,
) -> SealMatchResult<SealScan> {
    let working = space.working();
    let (width, height) = (working.width(), working.height());
    let (canny_low, canny_high) = working.canny_thresholds();
    let sides = cfg
        .scales
        .sides(working.shorter_side(), cfg.min_template_px, cfg.max_template_px);

    let _span = trace_span!("match_seal", scales = sides.len()).entered();

    let mut scan = SealScan::default();
    for (scale, side) in sides {
        if deadline.is_some_and(|limit| Instant::now() >= limit) {
            return Err(SealMatchError::TimedOut);
        }
        let template = ScaledTemplate::build(reference, side, canny_low, canny_high)?;
        scan.scales_tried += 1;

        let passes = [
            (Strategy::Gray, Some(template.gray_plan())),
            (Strategy::Edge, template.edge_plan()),
        ];
        for (strategy, plan) in passes {
            let Some(plan) = plan else {
                continue;
            };
            if let Some(peak) = space.best_peak(strategy, plan, cfg)? {
                scan.offer(MatchHit {
                    strategy,
                    score: peak.score,
                    scale,
                    side_px: side,
                    bbox: BoundingBox::from_pixels(peak.x, peak.y, side, side, width, height),
                });
            }
        }
    }

    trace_event!(
        "seal_scan",
        gray = scan.gray.map_or(0.0, |hit| hit.score),
        edge = scan.edge.map_or(0.0, |hit| hit.score),
        scales = scan.scales_tried
    );
    Ok(scan)
}

#[cfg(test)]
mod tests {
    use super::{match_seal, SealScan, SearchSpace};
    use crate::candidate::bbox::BoundingBox;
    use crate::image::OwnedImage;
    use crate::prepare::{prepare_image, PrepareConfig};
    use crate::search::{Backend, MatchConfig, MatchHit, ScaleSet, Strategy};
    use crate::util::SealMatchError;
    use image::{DynamicImage, GrayImage, Luma};
    use std::time::Instant;

    fn hit(strategy: Strategy, score: f32) -> MatchHit {
        MatchHit {
            strategy,
            score,
            scale: 0.1,
            side_px: 20,
            bbox: BoundingBox::from_pixels(0, 0, 20, 20, 100, 100),
        }
    }

    fn glyph(side: u32) -> GrayImage {
        GrayImage::from_fn(side, side, |x, y| {
            let cx = x as i32 - side as i32 / 2;
            let cy = y as i32 - side as i32 / 2;
            let ring = (cx * cx + cy * cy) as u32 / (side * side / 40).max(1);
            Luma([if (ring + x / 4) % 2 == 0 { 30 } else { 220 }])
        })
    }

    fn scene_with_glyph(width: u32, height: u32, side: u32, at: (u32, u32)) -> GrayImage {
        let mut scene = GrayImage::from_pixel(width, height, Luma([235]));
        let tpl = glyph(side);
        image::imageops::replace(&mut scene, &tpl, i64::from(at.0), i64::from(at.1));
        scene
    }

    #[test]
    fn best_prefers_gray_on_ties() {
        let scan = SealScan {
            gray: Some(hit(Strategy::Gray, 0.5)),
            edge: Some(hit(Strategy::Edge, 0.5)),
            scales_tried: 1,
        };
        assert_eq!(scan.best().unwrap().strategy, Strategy::Gray);

        let scan = SealScan {
            gray: Some(hit(Strategy::Gray, 0.4)),
            edge: Some(hit(Strategy::Edge, 0.6)),
            scales_tried: 1,
        };
        assert_eq!(scan.best().unwrap().strategy, Strategy::Edge);
        assert_eq!(SealScan::default().best_score(), 0.0);
    }

    #[test]
    fn offer_replaces_only_on_strictly_greater_scores() {
        let mut scan = SealScan::default();
        scan.offer(hit(Strategy::Gray, 0.0));
        assert!(scan.gray.is_none());
        scan.offer(hit(Strategy::Gray, 0.3));
        let mut later = hit(Strategy::Gray, 0.3);
        later.scale = 0.2;
        scan.offer(later);
        assert_eq!(scan.gray.unwrap().scale, 0.1);
    }

    #[test]
    fn exact_copy_is_found_with_both_backends() {
        // Shorter side 200, factor 0.2 -> 40 px template.
        let scene = scene_with_glyph(300, 200, 40, (120, 70));
        let working =
            prepare_image(&DynamicImage::ImageLuma8(scene), &PrepareConfig::default()).unwrap();
        let reference = OwnedImage::new(glyph(40).into_raw(), 40, 40).unwrap();

        for backend in [Backend::Fft, Backend::Direct] {
            let cfg = MatchConfig {
                scales: ScaleSet::new(vec![0.1, 0.2, 0.3]).unwrap(),
                backend,
                ..MatchConfig::default()
            };
            let space = SearchSpace::new(&working, backend).unwrap();
            let scan = match_seal(&space, &reference, &cfg, None).unwrap();
            assert_eq!(scan.scales_tried, 3);
            let gray = scan.gray.unwrap();
            assert!(gray.score > 0.999, "score {}", gray.score);
            assert_eq!(gray.side_px, 40);
            assert_eq!(gray.bbox, BoundingBox::from_pixels(120, 70, 40, 40, 300, 200));
        }
    }

    #[test]
    fn uniform_image_yields_no_hits() {
        let scene = GrayImage::from_pixel(200, 160, Luma([128]));
        let working =
            prepare_image(&DynamicImage::ImageLuma8(scene), &PrepareConfig::default()).unwrap();
        let reference = OwnedImage::new(glyph(40).into_raw(), 40, 40).unwrap();
        let cfg = MatchConfig::default();
        let space = SearchSpace::new(&working, cfg.backend).unwrap();
        let scan = match_seal(&space, &reference, &cfg, None).unwrap();
        assert!(scan.best().is_none());
        assert!(scan.scales_tried > 0);
    }

    #[test]
    fn flat_reference_is_an_error() {
        let scene = scene_with_glyph(200, 160, 32, (10, 10));
        let working =
            prepare_image(&DynamicImage::ImageLuma8(scene), &PrepareConfig::default()).unwrap();
        let reference = OwnedImage::filled(64, 64, 255).unwrap();
        let cfg = MatchConfig::default();
        let space = SearchSpace::new(&working, cfg.backend).unwrap();
        let err = match_seal(&space, &reference, &cfg, None).unwrap_err();
        assert!(matches!(err, SealMatchError::DegenerateTemplate { .. }));
    }

    #[test]
    fn spectra_are_built_only_for_scanned_planes() {
        let scene = scene_with_glyph(200, 160, 32, (10, 10));
        let working =
            prepare_image(&DynamicImage::ImageLuma8(scene), &PrepareConfig::default()).unwrap();
        let cfg = MatchConfig::default();
        let space = SearchSpace::new(&working, Backend::Fft).unwrap();
        assert!(!space.spectrum_ready(Strategy::Gray));
        assert!(!space.spectrum_ready(Strategy::Edge));

        // No scale fits a template this large: nothing is scanned.
        let tiny = MatchConfig {
            min_template_px: 500,
            ..MatchConfig::default()
        };
        let reference = OwnedImage::new(glyph(32).into_raw(), 32, 32).unwrap();
        let scan = match_seal(&space, &reference, &tiny, None).unwrap();
        assert_eq!(scan.scales_tried, 0);
        assert!(!space.spectrum_ready(Strategy::Gray));

        match_seal(&space, &reference, &cfg, None).unwrap();
        assert!(space.spectrum_ready(Strategy::Gray));
        assert!(space.spectrum_ready(Strategy::Edge));

        let direct = SearchSpace::new(&working, Backend::Direct).unwrap();
        match_seal(&direct, &reference, &cfg, None).unwrap();
        assert!(!direct.spectrum_ready(Strategy::Gray));
    }

    #[test]
    fn expired_deadline_stops_the_scan() {
        let scene = scene_with_glyph(200, 160, 32, (10, 10));
        let working =
            prepare_image(&DynamicImage::ImageLuma8(scene), &PrepareConfig::default()).unwrap();
        let reference = OwnedImage::new(glyph(32).into_raw(), 32, 32).unwrap();
        let cfg = MatchConfig::default();
        let space = SearchSpace::new(&working, cfg.backend).unwrap();
        let err = match_seal(&space, &reference, &cfg, Some(Instant::now())).unwrap_err();
        assert_eq!(err, SealMatchError::TimedOut);
    }
}
