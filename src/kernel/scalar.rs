//! Scalar reference kernel for direct ZNCC evaluation.

use crate::candidate::topk::{Peak, TopK};
use crate::kernel::{zncc_score, Kernel, ScanParams};
use crate::template::TemplatePlan;
use crate::util::{SealMatchError, SealMatchResult};
use crate::ImageView;

/// Scalar unmasked ZNCC kernel.
pub struct ZnccScalar;

/// Accumulates `(sum(t' * i), sum(i), sum(i^2))` for one placement.
///
/// Image sums are integers so flat windows yield exactly zero variance.
#[inline]
pub(crate) fn window_terms(
    image: ImageView<'_, u8>,
    tpl: &TemplatePlan,
    x: usize,
    y: usize,
) -> Option<(f64, u64, u64)> {
    let tpl_width = tpl.width();
    let t_prime = tpl.t_prime();
    let mut dot = 0.0f32;
    let mut sum_i = 0u64;
    let mut sum_i2 = 0u64;

    for ty in 0..tpl.height() {
        let img_row = image.row(y + ty)?;
        let base = ty * tpl_width;
        let window = img_row.get(x..x + tpl_width)?;
        for (tx, &value) in window.iter().enumerate() {
            let v = u64::from(value);
            dot += t_prime[base + tx] * value as f32;
            sum_i += v;
            sum_i2 += v * v;
        }
    }
    Some((f64::from(dot), sum_i, sum_i2))
}

#[inline]
pub(crate) fn window_variance(sum_i: u64, sum_i2: u64, n: f64) -> f64 {
    let s = sum_i as f64;
    (sum_i2 as f64 - s * s / n).max(0.0)
}

pub(crate) fn check_fits(image: ImageView<'_, u8>, tpl: &TemplatePlan) -> SealMatchResult<(usize, usize)> {
    let img_width = image.width();
    let img_height = image.height();
    let tpl_width = tpl.width();
    let tpl_height = tpl.height();
    if img_width < tpl_width || img_height < tpl_height {
        return Err(SealMatchError::TemplateTooLarge {
            tpl_width,
            tpl_height,
            img_width,
            img_height,
        });
    }
    Ok((img_width - tpl_width, img_height - tpl_height))
}

impl Kernel for ZnccScalar {
    type Plan = TemplatePlan;

    fn score_at(
        image: ImageView<'_, u8>,
        tpl: &Self::Plan,
        x: usize,
        y: usize,
        min_var_i: f64,
    ) -> f32 {
        let (max_x, max_y) = match check_fits(image, tpl) {
            Ok(bounds) => bounds,
            Err(_) => return f32::NEG_INFINITY,
        };
        if x > max_x || y > max_y {
            return f32::NEG_INFINITY;
        }
        let n = tpl.len() as f64;
        window_terms(image, tpl, x, y)
            .and_then(|(dot, sum_i, sum_i2)| {
                zncc_score(dot, tpl.var_t(), window_variance(sum_i, sum_i2, n), min_var_i)
            })
            .unwrap_or(f32::NEG_INFINITY)
    }

    fn scan_full(
        image: ImageView<'_, u8>,
        tpl: &Self::Plan,
        params: ScanParams,
    ) -> SealMatchResult<Vec<Peak>> {
        if params.topk == 0 {
            return Ok(Vec::new());
        }
        let (max_x, max_y) = check_fits(image, tpl)?;
        let n = tpl.len() as f64;
        let var_t = tpl.var_t();

        let mut topk = TopK::new(params.topk);
        for y in 0..=max_y {
            for x in 0..=max_x {
                let Some((dot, sum_i, sum_i2)) = window_terms(image, tpl, x, y) else {
                    continue;
                };
                let var_i = window_variance(sum_i, sum_i2, n);
                if let Some(score) = zncc_score(dot, var_t, var_i, params.min_var_i) {
                    if score >= params.min_score {
                        topk.push(Peak { x, y, score });
                    }
                }
            }
        }

        Ok(topk.into_sorted_desc())
    }
}
