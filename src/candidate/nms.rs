//! Cross-seal non-maximum suppression.
//!
//! Different seal identifiers can match the same image region, typically two
//! pictograms sharing the diamond border at a coarse scale. Greedy IoU-based
//! suppression keeps one seal per overlapping cluster without encoding which
//! seals may legitimately coexist.

use crate::candidate::bbox::BoundingBox;
use crate::trace::trace_span;

/// A localized seal entering suppression.
#[derive(Clone, Debug, PartialEq)]
pub struct NmsCandidate {
    pub seal_id: String,
    pub score: f32,
    pub bbox: BoundingBox,
}

/// Outcome of suppression for one input candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NmsVerdict {
    /// The candidate survives.
    Kept,
    /// The candidate overlaps the kept candidate at input index `by`.
    Suppressed { by: usize },
}

/// Runs greedy NMS and returns one verdict per input candidate, in input order.
///
/// Candidates are visited by descending score; equal scores keep input order.
/// Each kept candidate discards every remaining candidate whose IoU with it
/// exceeds `iou_threshold`. Zero or one candidate is a no-op.
pub fn suppress(candidates: &[NmsCandidate], iou_threshold: f32) -> Vec<NmsVerdict> {
    let mut verdicts = vec![NmsVerdict::Kept; candidates.len()];
    if candidates.len() < 2 {
        return verdicts;
    }

    let _span = trace_span!("nms", candidates = candidates.len()).entered();

    let mut order: Vec<usize> = (0..candidates.len()).collect();
    // `sort_by` is stable, which makes ties resolve by input position.
    order.sort_by(|&a, &b| candidates[b].score.total_cmp(&candidates[a].score));

    let mut discarded = vec![false; candidates.len()];
    for (rank, &keep_idx) in order.iter().enumerate() {
        if discarded[keep_idx] {
            continue;
        }
        let kept_box = &candidates[keep_idx].bbox;
        for &other_idx in &order[rank + 1..] {
            if discarded[other_idx] {
                continue;
            }
            if kept_box.iou(&candidates[other_idx].bbox) > iou_threshold {
                discarded[other_idx] = true;
                verdicts[other_idx] = NmsVerdict::Suppressed { by: keep_idx };
            }
        }
    }

    verdicts
}

/// Returns the surviving candidates ordered by descending score.
pub fn keep(candidates: &[NmsCandidate], iou_threshold: f32) -> Vec<NmsCandidate> {
    let verdicts = suppress(candidates, iou_threshold);
    let mut kept: Vec<NmsCandidate> = candidates
        .iter()
        .zip(verdicts)
        .filter(|(_, verdict)| *verdict == NmsVerdict::Kept)
        .map(|(cand, _)| cand.clone())
        .collect();
    kept.sort_by(|a, b| b.score.total_cmp(&a.score));
    kept
}
