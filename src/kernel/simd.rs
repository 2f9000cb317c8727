//! SIMD-accelerated direct ZNCC kernel using the `wide` crate.
//!
//! The dot product over each template row is vectorized to process 8 pixels
//! at a time using `f32x8`. Window sums stay in integers, as in the scalar
//! kernel, so flat windows are rejected identically.

use crate::candidate::topk::{Peak, TopK};
use crate::kernel::scalar::{check_fits, window_variance};
use crate::kernel::{zncc_score, Kernel, ScanParams};
use crate::template::TemplatePlan;
use crate::util::SealMatchResult;
use crate::ImageView;
use wide::f32x8;

const LANES: usize = 8;

/// Load 8 u8 values and convert to f32x8.
#[inline]
fn load_u8x8_as_f32x8(slice: &[u8]) -> f32x8 {
    f32x8::from([
        slice[0] as f32,
        slice[1] as f32,
        slice[2] as f32,
        slice[3] as f32,
        slice[4] as f32,
        slice[5] as f32,
        slice[6] as f32,
        slice[7] as f32,
    ])
}

/// Load 8 f32 values into f32x8.
#[inline]
fn load_f32x8(slice: &[f32]) -> f32x8 {
    f32x8::from([
        slice[0], slice[1], slice[2], slice[3], slice[4], slice[5], slice[6], slice[7],
    ])
}

/// Horizontal sum of f32x8.
#[inline]
fn hsum(v: f32x8) -> f32 {
    v.to_array().iter().sum()
}

/// SIMD-accelerated unmasked ZNCC kernel.
pub struct ZnccSimd;

impl ZnccSimd {
    fn score_at_simd(
        image: ImageView<'_, u8>,
        tpl: &TemplatePlan,
        x: usize,
        y: usize,
        min_var_i: f64,
    ) -> Option<f32> {
        let tpl_width = tpl.width();
        let t_prime = tpl.t_prime();
        let simd_end = tpl_width / LANES * LANES;

        let mut dot_vec = f32x8::ZERO;
        let mut dot_s = 0.0f32;
        let mut sum_i = 0u64;
        let mut sum_i2 = 0u64;

        for ty in 0..tpl.height() {
            let img_row = image.row(y + ty)?;
            let window = img_row.get(x..x + tpl_width)?;
            let tpl_row = &t_prime[ty * tpl_width..(ty + 1) * tpl_width];

            let mut tx = 0;
            while tx < simd_end {
                let img_vals = load_u8x8_as_f32x8(&window[tx..]);
                let tpl_vals = load_f32x8(&tpl_row[tx..]);
                dot_vec += tpl_vals * img_vals;
                tx += LANES;
            }
            while tx < tpl_width {
                dot_s += tpl_row[tx] * window[tx] as f32;
                tx += 1;
            }
            for &value in window {
                let v = u64::from(value);
                sum_i += v;
                sum_i2 += v * v;
            }
        }

        let dot = f64::from(hsum(dot_vec) + dot_s);
        let var_i = window_variance(sum_i, sum_i2, tpl.len() as f64);
        zncc_score(dot, tpl.var_t(), var_i, min_var_i)
    }
}

impl Kernel for ZnccSimd {
    type Plan = TemplatePlan;

    fn score_at(
        image: ImageView<'_, u8>,
        tpl: &Self::Plan,
        x: usize,
        y: usize,
        min_var_i: f64,
    ) -> f32 {
        match check_fits(image, tpl) {
            Ok((max_x, max_y)) if x <= max_x && y <= max_y => {
                Self::score_at_simd(image, tpl, x, y, min_var_i).unwrap_or(f32::NEG_INFINITY)
            }
            _ => f32::NEG_INFINITY,
        }
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

        let mut topk = TopK::new(params.topk);
        for y in 0..=max_y {
            for x in 0..=max_x {
                if let Some(score) = Self::score_at_simd(image, tpl, x, y, params.min_var_i) {
                    if score >= params.min_score {
                        topk.push(Peak { x, y, score });
                    }
                }
            }
        }
        Ok(topk.into_sorted_desc())
    }
}
