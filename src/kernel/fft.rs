//! FFT-based ZNCC over a whole search image.
//!
//! The numerator `sum(t' * i)` for every placement is one circular
//! cross-correlation, computed as `ifft(fft(i) * conj(fft(t')))`. The image is
//! transformed once as a flat buffer of `width * height` samples with row
//! stride `width`; a template embedded at the same stride never wraps for
//! valid placements because `x + tx < width` and `y + ty < height`. Window
//! variances come from exact integral images.

use crate::candidate::topk::{Peak, TopK};
use crate::image::integral::IntegralImage;
use crate::image::OwnedImage;
use crate::kernel::{zncc_score, ScanParams};
use crate::template::TemplatePlan;
use crate::util::{SealMatchError, SealMatchResult};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Forward spectrum of a search image plus the plans to correlate against it.
///
/// Built once per request and image plane; shared read-only by every seal
/// and scale scanned against that plane.
pub struct ImageSpectrum {
    width: usize,
    height: usize,
    spectrum: Vec<Complex<f64>>,
    integral: IntegralImage,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl ImageSpectrum {
    /// Transforms `image` and builds its integral tables.
    pub fn build(image: &OwnedImage) -> SealMatchResult<Self> {
        let width = image.width();
        let height = image.height();
        let len = width
            .checked_mul(height)
            .ok_or(SealMatchError::InvalidDimensions { width, height })?;

        let mean = image.data().iter().map(|&v| u64::from(v)).sum::<u64>() as f64 / len as f64;
        let mut spectrum: Vec<Complex<f64>> = image
            .data()
            .iter()
            .map(|&v| Complex::new(f64::from(v) - mean, 0.0))
            .collect();

        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(len);
        let inverse = planner.plan_fft_inverse(len);
        forward.process(&mut spectrum);

        Ok(Self {
            width,
            height,
            spectrum,
            integral: IntegralImage::build(image.view()),
            forward,
            inverse,
        })
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Computes the raw correlation numerator for every flat index.
    fn correlate(&self, tpl: &TemplatePlan) -> Vec<f64> {
        let len = self.spectrum.len();
        let mut buf = vec![Complex::new(0.0f64, 0.0); len];
        let tpl_width = tpl.width();
        for (ty, row) in tpl.t_prime().chunks_exact(tpl_width).enumerate() {
            let base = ty * self.width;
            for (tx, &value) in row.iter().enumerate() {
                buf[base + tx] = Complex::new(f64::from(value), 0.0);
            }
        }

        self.forward.process(&mut buf);
        for (t, &i) in buf.iter_mut().zip(self.spectrum.iter()) {
            *t = i * t.conj();
        }
        self.inverse.process(&mut buf);

        let scale = 1.0 / len as f64;
        buf.into_iter().map(|c| c.re * scale).collect()
    }

    /// Scans every valid placement and returns the top-K ZNCC peaks.
    pub fn scan_full(&self, tpl: &TemplatePlan, params: ScanParams) -> SealMatchResult<Vec<Peak>> {
        if params.topk == 0 {
            return Ok(Vec::new());
        }
        let tpl_width = tpl.width();
        let tpl_height = tpl.height();
        if self.width < tpl_width || self.height < tpl_height {
            return Err(SealMatchError::TemplateTooLarge {
                tpl_width,
                tpl_height,
                img_width: self.width,
                img_height: self.height,
            });
        }

        let numerators = self.correlate(tpl);
        let var_t = tpl.var_t();
        let mut topk = TopK::new(params.topk);
        for y in 0..=(self.height - tpl_height) {
            for x in 0..=(self.width - tpl_width) {
                let var_i = self.integral.window_variance(x, y, tpl_width, tpl_height);
                let dot = numerators[y * self.width + x];
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

#[cfg(test)]
mod tests {
    use super::ImageSpectrum;
    use crate::image::OwnedImage;
    use crate::kernel::scalar::ZnccScalar;
    use crate::kernel::{Kernel, ScanParams};
    use crate::template::TemplatePlan;
    use crate::ImageView;

    fn textured(width: usize, height: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push((((x * 13) ^ (y * 7) ^ (x * y)) & 0xFF) as u8);
            }
        }
        data
    }

    #[test]
    fn fft_scores_match_direct_kernel() {
        let (img_width, img_height) = (37, 29);
        let data = textured(img_width, img_height);
        let image = OwnedImage::new(data.clone(), img_width, img_height).unwrap();
        let mut tpl = Vec::new();
        for y in 8..18 {
            tpl.extend_from_slice(&data[y * img_width + 14..y * img_width + 26]);
        }
        let plan = TemplatePlan::from_view(ImageView::from_slice(&tpl, 12, 10).unwrap()).unwrap();

        let spectrum = ImageSpectrum::build(&image).unwrap();
        let params = ScanParams {
            topk: 5,
            ..ScanParams::default()
        };
        let fft = spectrum.scan_full(&plan, params).unwrap();
        let direct = ZnccScalar::scan_full(image.view(), &plan, params).unwrap();

        assert_eq!((fft[0].x, fft[0].y), (14, 8));
        assert_eq!((direct[0].x, direct[0].y), (14, 8));
        assert!(fft[0].score > 0.9999);
        for peak in &fft {
            let reference = ZnccScalar::score_at(image.view(), &plan, peak.x, peak.y, 1e-6);
            assert!((peak.score - reference).abs() < 1e-3);
        }
    }

    #[test]
    fn placements_touching_the_last_row_and_column_are_scored() {
        let (img_width, img_height) = (24, 20);
        let data = textured(img_width, img_height);
        let image = OwnedImage::new(data.clone(), img_width, img_height).unwrap();
        let (tw, th) = (8, 6);
        let (x0, y0) = (img_width - tw, img_height - th);
        let mut tpl = Vec::new();
        for y in y0..y0 + th {
            tpl.extend_from_slice(&data[y * img_width + x0..y * img_width + x0 + tw]);
        }
        let plan = TemplatePlan::from_view(ImageView::from_slice(&tpl, tw, th).unwrap()).unwrap();
        let spectrum = ImageSpectrum::build(&image).unwrap();
        let best = spectrum.scan_full(&plan, ScanParams::default()).unwrap();
        assert_eq!((best[0].x, best[0].y), (x0, y0));
    }

    #[test]
    fn oversized_template_is_rejected() {
        let image = OwnedImage::new(textured(8, 8), 8, 8).unwrap();
        let tpl = textured(9, 4);
        let plan = TemplatePlan::from_view(ImageView::from_slice(&tpl, 9, 4).unwrap()).unwrap();
        let spectrum = ImageSpectrum::build(&image).unwrap();
        assert!(spectrum.scan_full(&plan, ScanParams::default()).is_err());
    }
}
