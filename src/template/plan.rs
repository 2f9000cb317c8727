//! Template plan precomputation for ZNCC.

use crate::image::ImageView;
use crate::util::{SealMatchError, SealMatchResult};

/// Precomputed statistics and zero-mean buffer for ZNCC matching.
///
/// With `t' = t - mean(t)` and `var_t = sum(t'^2)`, the coefficient-normalized
/// correlation at a placement is `sum(t' * i) / sqrt(var_t * var_i)`, where
/// `var_i` is the sum of squared deviations of the covered image window.
#[derive(Clone, Debug)]
pub struct TemplatePlan {
    width: usize,
    height: usize,
    var_t: f64,
    t_prime: Vec<f32>,
}

impl TemplatePlan {
    /// Builds a plan from a template view.
    ///
    /// Fails with [`SealMatchError::DegenerateTemplate`] for a flat template,
    /// which has no defined correlation with anything.
    pub fn from_view(tpl: ImageView<'_, u8>) -> SealMatchResult<Self> {
        let width = tpl.width();
        let height = tpl.height();
        let count = width
            .checked_mul(height)
            .ok_or(SealMatchError::InvalidDimensions { width, height })?;

        let mut sum = 0u64;
        let mut sum_sq = 0u64;
        for y in 0..height {
            let row = tpl.row(y).ok_or(SealMatchError::BufferTooSmall {
                needed: (y + 1) * tpl.stride(),
                got: tpl.as_slice().len(),
            })?;
            for &value in row {
                let v = u64::from(value);
                sum += v;
                sum_sq += v * v;
            }
        }

        let count_f = count as f64;
        let mean = sum as f64 / count_f;
        let var_t = sum_sq as f64 - (sum as f64) * mean;
        if var_t <= 1e-8 {
            return Err(SealMatchError::DegenerateTemplate {
                reason: "zero variance",
            });
        }

        let mut t_prime = Vec::with_capacity(count);
        for y in 0..height {
            if let Some(row) = tpl.row(y) {
                t_prime.extend(row.iter().map(|&v| (f64::from(v) - mean) as f32));
            }
        }

        Ok(Self {
            width,
            height,
            var_t,
            t_prime,
        })
    }

    /// Returns the template width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the template height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the number of template pixels.
    pub fn len(&self) -> usize {
        self.t_prime.len()
    }

    /// Returns true when the plan holds no pixels.
    pub fn is_empty(&self) -> bool {
        self.t_prime.is_empty()
    }

    /// Returns the sum of squared deviations of the template.
    pub fn var_t(&self) -> f64 {
        self.var_t
    }

    /// Returns the zero-mean template buffer in row-major order.
    pub fn t_prime(&self) -> &[f32] {
        &self.t_prime
    }
}
