//! Request-level seal localization.
//!
//! [`SealLocator`] prepares the target image once, matches every requested
//! seal against it, accepts matches at or above the score threshold and then
//! retracts accepted seals whose boxes overlap a higher-scoring one.

use crate::candidate::bbox::BoundingBox;
use crate::candidate::nms::{suppress, NmsCandidate, NmsVerdict};
use crate::image::io::decode_base64_payload;
use crate::prepare::{prepare, prepare_image, PrepareConfig, WorkingImage};
use crate::search::matcher::{match_seal, SealScan, SearchSpace};
use crate::search::{MatchConfig, MatchHit};
use crate::store::{PreloadReport, TemplateStore};
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::math::round2;
use crate::util::{SealMatchError, SealMatchResult};
use image::DynamicImage;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Request-level configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct LocateConfig {
    /// Target image preprocessing.
    pub prepare: PrepareConfig,
    /// Multi-scale matching.
    pub matching: MatchConfig,
    /// Minimum best score for a seal to count as localized; a multiple of
    /// 0.01 so every localized record reports a score at or above it.
    pub match_threshold: f32,
    /// IoU above which the lower-scoring of two localized seals is retracted.
    pub nms_iou_threshold: f32,
    /// Score seals on the rayon pool (requires the `rayon` feature).
    pub parallel: bool,
    /// Wall-clock budget per request; `None` is unbounded.
    pub time_budget: Option<Duration>,
}

impl Default for LocateConfig {
    fn default() -> Self {
        Self {
            prepare: PrepareConfig::default(),
            matching: MatchConfig::default(),
            match_threshold: 0.15,
            nms_iou_threshold: 0.3,
            parallel: false,
            time_budget: None,
        }
    }
}

impl LocateConfig {
    /// Checks every nested parameter range.
    pub fn validate(&self) -> SealMatchResult<()> {
        self.prepare.validate()?;
        self.matching.validate()?;
        if !self.match_threshold.is_finite() || !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(SealMatchError::InvalidConfig {
                reason: "match_threshold must lie in [0, 1]",
            });
        }
        if (self.match_threshold * 100.0 - (self.match_threshold * 100.0).round()).abs() > 1e-3 {
            return Err(SealMatchError::InvalidConfig {
                reason: "match_threshold must be a multiple of 0.01",
            });
        }
        if !self.nms_iou_threshold.is_finite() || !(0.0..=1.0).contains(&self.nms_iou_threshold) {
            return Err(SealMatchError::InvalidConfig {
                reason: "nms_iou_threshold must lie in [0, 1]",
            });
        }
        Ok(())
    }
}

/// Per-seal result of a localization request.
#[derive(Clone, Debug, PartialEq)]
pub enum SealOutcome {
    /// Best score reached the threshold and survived suppression.
    Localized(MatchHit),
    /// Matched below the threshold; the best-effort hit is kept as a hint.
    Unlocalized { best: Option<MatchHit> },
    /// Was localized but overlapped the higher-scoring seal `by`.
    Suppressed { score: f32, by: String },
    /// The id has no reference template.
    UnknownSeal,
    /// Loading or matching the template failed.
    Failed { reason: String },
    /// The request budget ran out before this seal was scored.
    TimedOut,
}

/// Short status tag of a [`SealOutcome`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LocalizationStatus {
    Localized,
    BelowThreshold,
    Suppressed,
    UnknownSeal,
    Failed,
    TimedOut,
}

impl LocalizationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LocalizationStatus::Localized => "localized",
            LocalizationStatus::BelowThreshold => "below_threshold",
            LocalizationStatus::Suppressed => "suppressed",
            LocalizationStatus::UnknownSeal => "unknown_seal",
            LocalizationStatus::Failed => "failed",
            LocalizationStatus::TimedOut => "timed_out",
        }
    }
}

/// Localization record for one requested seal id.
#[derive(Clone, Debug, PartialEq)]
pub struct SealLocalization {
    /// Upper-cased seal id.
    pub seal_id: String,
    pub outcome: SealOutcome,
    /// Per-strategy matches, present when the seal was scanned.
    pub scan: Option<SealScan>,
}

impl SealLocalization {
    fn new(seal_id: String, outcome: SealOutcome) -> Self {
        Self {
            seal_id,
            outcome,
            scan: None,
        }
    }

    pub fn is_localized(&self) -> bool {
        matches!(self.outcome, SealOutcome::Localized(_))
    }

    /// Returns the reported box: the match for localized seals, the
    /// best-effort hint for sub-threshold ones and `None` otherwise.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        match &self.outcome {
            SealOutcome::Localized(hit) => Some(hit.bbox),
            SealOutcome::Unlocalized { best } => best.map(|hit| hit.bbox),
            _ => None,
        }
    }

    /// Returns the reported score rounded to two decimals.
    pub fn match_score(&self) -> f32 {
        let raw = match &self.outcome {
            SealOutcome::Localized(hit) => hit.score,
            SealOutcome::Unlocalized { best } => best.map_or(0.0, |hit| hit.score),
            SealOutcome::Suppressed { score, .. } => *score,
            SealOutcome::UnknownSeal | SealOutcome::Failed { .. } | SealOutcome::TimedOut => 0.0,
        };
        round2(raw)
    }

    pub fn status(&self) -> LocalizationStatus {
        match self.outcome {
            SealOutcome::Localized(_) => LocalizationStatus::Localized,
            SealOutcome::Unlocalized { .. } => LocalizationStatus::BelowThreshold,
            SealOutcome::Suppressed { .. } => LocalizationStatus::Suppressed,
            SealOutcome::UnknownSeal => LocalizationStatus::UnknownSeal,
            SealOutcome::Failed { .. } => LocalizationStatus::Failed,
            SealOutcome::TimedOut => LocalizationStatus::TimedOut,
        }
    }
}

/// Returns true when any requested seal was not localized.
///
/// Such seals were claimed present upstream and need manual confirmation.
pub fn requires_human_review(results: &[SealLocalization]) -> bool {
    results.iter().any(|record| !record.is_localized())
}

/// Localizes seals in label images against a shared template store.
pub struct SealLocator {
    store: Arc<TemplateStore>,
    cfg: LocateConfig,
}

impl SealLocator {
    /// Creates a locator after validating `cfg`.
    pub fn new(store: Arc<TemplateStore>, cfg: LocateConfig) -> SealMatchResult<Self> {
        cfg.validate()?;
        Ok(Self { store, cfg })
    }

    pub fn config(&self) -> &LocateConfig {
        &self.cfg
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    /// Warms the template cache and checks the correlation kernels.
    pub fn preload(&self) -> PreloadReport {
        self.store.preload()
    }

    /// Localizes `seal_ids` in an encoded image.
    ///
    /// Returns one record per id in input order. Only an undecodable image
    /// fails the request; per-seal problems become not-localized records.
    pub fn locate_seals<S>(
        &self,
        image_bytes: &[u8],
        seal_ids: &[S],
    ) -> SealMatchResult<Vec<SealLocalization>>
    where
        S: AsRef<str> + Sync,
    {
        let started = Instant::now();
        let _span = trace_span!("locate_seals", seals = seal_ids.len()).entered();
        let working = prepare(image_bytes, &self.cfg.prepare)?;
        self.locate_working(&working, seal_ids, started)
    }

    /// Localizes `seal_ids` in a base64 payload or `data:` URL.
    pub fn locate_base64<S>(
        &self,
        payload: &str,
        seal_ids: &[S],
    ) -> SealMatchResult<Vec<SealLocalization>>
    where
        S: AsRef<str> + Sync,
    {
        let bytes = decode_base64_payload(payload)?;
        self.locate_seals(&bytes, seal_ids)
    }

    /// Localizes `seal_ids` in an already decoded image.
    pub fn locate_image<S>(
        &self,
        image: &DynamicImage,
        seal_ids: &[S],
    ) -> SealMatchResult<Vec<SealLocalization>>
    where
        S: AsRef<str> + Sync,
    {
        let started = Instant::now();
        let _span = trace_span!("locate_seals", seals = seal_ids.len()).entered();
        let working = prepare_image(image, &self.cfg.prepare)?;
        self.locate_working(&working, seal_ids, started)
    }

    fn locate_working<S>(
        &self,
        working: &WorkingImage,
        seal_ids: &[S],
        started: Instant,
    ) -> SealMatchResult<Vec<SealLocalization>>
    where
        S: AsRef<str> + Sync,
    {
        let deadline = self
            .cfg
            .time_budget
            .and_then(|budget| started.checked_add(budget));
        let space = SearchSpace::new(working, self.cfg.matching.backend)?;
        let score = |id: &S| self.score_seal(&space, id.as_ref(), deadline);

        #[cfg(feature = "rayon")]
        let mut records: Vec<SealLocalization> = if self.cfg.parallel {
            seal_ids.par_iter().map(score).collect()
        } else {
            seal_ids.iter().map(score).collect()
        };
        #[cfg(not(feature = "rayon"))]
        let mut records: Vec<SealLocalization> = seal_ids.iter().map(score).collect();

        self.retract_overlaps(&mut records);
        Ok(records)
    }

    fn score_seal(
        &self,
        space: &SearchSpace<'_>,
        raw_id: &str,
        deadline: Option<Instant>,
    ) -> SealLocalization {
        let seal_id = raw_id.to_uppercase();
        if !self.store.contains(&seal_id) {
            trace_warn!("unknown_seal", seal = seal_id);
            return SealLocalization::new(seal_id, SealOutcome::UnknownSeal);
        }
        if deadline.is_some_and(|limit| Instant::now() >= limit) {
            trace_warn!("seal_timed_out", seal = seal_id);
            return SealLocalization::new(seal_id, SealOutcome::TimedOut);
        }

        let template = match self.store.get(&seal_id) {
            Ok(Some(template)) => template,
            Ok(None) => return SealLocalization::new(seal_id, SealOutcome::UnknownSeal),
            Err(err) => {
                trace_warn!("template_load_failed", seal = seal_id, error = err);
                let reason = err.to_string();
                return SealLocalization::new(seal_id, SealOutcome::Failed { reason });
            }
        };

        let scan = match match_seal(space, template.image(), &self.cfg.matching, deadline) {
            Ok(scan) => scan,
            Err(SealMatchError::TimedOut) => {
                trace_warn!("seal_timed_out", seal = seal_id);
                return SealLocalization::new(seal_id, SealOutcome::TimedOut);
            }
            Err(err) => {
                trace_warn!("matching_failed", seal = seal_id, error = err);
                let reason = err.to_string();
                return SealLocalization::new(seal_id, SealOutcome::Failed { reason });
            }
        };

        let best = scan.best();
        let outcome = match best {
            Some(hit) if hit.score >= self.cfg.match_threshold => SealOutcome::Localized(hit),
            _ => SealOutcome::Unlocalized { best },
        };
        trace_event!(
            "seal_scored",
            seal = seal_id.as_str(),
            score = scan.best_score(),
            localized = matches!(outcome, SealOutcome::Localized(_))
        );
        SealLocalization {
            seal_id,
            outcome,
            scan: Some(scan),
        }
    }

    /// Demotes localized records that overlap a higher-scoring one.
    ///
    /// Suppression ranks by the reported (rounded) scores.
    fn retract_overlaps(&self, records: &mut [SealLocalization]) {
        let mut accepted = Vec::new();
        let mut candidates = Vec::new();
        for (idx, record) in records.iter().enumerate() {
            if let SealOutcome::Localized(hit) = record.outcome {
                accepted.push((idx, hit.score));
                candidates.push(NmsCandidate {
                    seal_id: record.seal_id.clone(),
                    score: round2(hit.score),
                    bbox: hit.bbox,
                });
            }
        }

        let verdicts = suppress(&candidates, self.cfg.nms_iou_threshold);
        for (pos, verdict) in verdicts.into_iter().enumerate() {
            let NmsVerdict::Suppressed { by } = verdict else {
                continue;
            };
            let (idx, score) = accepted[pos];
            let by = candidates[by].seal_id.clone();
            trace_event!(
                "seal_suppressed",
                seal = candidates[pos].seal_id.as_str(),
                by = by.as_str()
            );
            records[idx].outcome = SealOutcome::Suppressed { score, by };
        }
    }
}
