//! Rayon-parallel direct scan (feature-gated).
//!
//! Parallelizes any direct kernel over placement rows, with each task
//! keeping its own Top-K and the partial results merged at the end. Scores
//! are bit-identical to the kernel's sequential scan.

use crate::candidate::topk::{Peak, TopK};
use crate::kernel::scalar::check_fits;
use crate::kernel::{Kernel, ScanParams};
use crate::template::TemplatePlan;
use crate::util::SealMatchResult;
use crate::ImageView;
use rayon::prelude::*;

/// Row-parallel full scan for a direct ZNCC kernel.
pub fn scan_full_par<K>(
    image: ImageView<'_, u8>,
    tpl: &TemplatePlan,
    params: ScanParams,
) -> SealMatchResult<Vec<Peak>>
where
    K: Kernel<Plan = TemplatePlan>,
{
    if params.topk == 0 {
        return Ok(Vec::new());
    }
    let (max_x, max_y) = check_fits(image, tpl)?;

    let merged = (0..=max_y)
        .into_par_iter()
        .map(|y| {
            let mut row_topk = TopK::new(params.topk);
            for x in 0..=max_x {
                let score = K::score_at(image, tpl, x, y, params.min_var_i);
                if score.is_finite() && score >= params.min_score {
                    row_topk.push(Peak { x, y, score });
                }
            }
            row_topk
        })
        .reduce(
            || TopK::new(params.topk),
            |mut acc, part| {
                acc.merge(part);
                acc
            },
        );

    Ok(merged.into_sorted_desc())
}

#[cfg(test)]
mod tests {
    use super::scan_full_par;
    use crate::kernel::scalar::ZnccScalar;
    use crate::kernel::{Kernel, ScanParams};
    use crate::template::TemplatePlan;
    use crate::ImageView;

    #[test]
    fn parallel_scan_matches_scalar() {
        let (img_width, img_height) = (48, 36);
        let mut image = Vec::with_capacity(img_width * img_height);
        for y in 0..img_height {
            for x in 0..img_width {
                image.push((((x * 11) ^ (y * 3) ^ (x * y)) & 0xFF) as u8);
            }
        }
        let mut tpl = Vec::new();
        for y in 20..32 {
            tpl.extend_from_slice(&image[y * img_width + 5..y * img_width + 17]);
        }
        let image_view = ImageView::from_slice(&image, img_width, img_height).unwrap();
        let plan = TemplatePlan::from_view(ImageView::from_slice(&tpl, 12, 12).unwrap()).unwrap();

        let params = ScanParams {
            topk: 3,
            ..ScanParams::default()
        };
        let seq = ZnccScalar::scan_full(image_view, &plan, params).unwrap();
        let par = scan_full_par::<ZnccScalar>(image_view, &plan, params).unwrap();
        assert_eq!(seq, par);
    }
}
