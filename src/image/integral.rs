//! Summed-area tables for constant-time window statistics.

use crate::image::ImageView;

/// Integral images of intensities and squared intensities.
///
/// Both tables have `(width + 1) * (height + 1)` entries with a zero first row
/// and column, so window sums need no boundary checks. Sums are exact in
/// `u64`, which keeps the variance of perfectly flat windows at exactly zero.
#[derive(Clone, Debug)]
pub struct IntegralImage {
    width: usize,
    height: usize,
    sum: Vec<u64>,
    sum_sq: Vec<u64>,
}

impl IntegralImage {
    /// Builds the tables for an image view.
    pub fn build(image: ImageView<'_, u8>) -> Self {
        let width = image.width();
        let height = image.height();
        let stride = width + 1;
        let mut sum = vec![0u64; stride * (height + 1)];
        let mut sum_sq = vec![0u64; stride * (height + 1)];

        for y in 0..height {
            let row = match image.row(y) {
                Some(row) => row,
                None => break,
            };
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for (x, &value) in row.iter().enumerate() {
                let v = u64::from(value);
                row_sum += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = sum[idx - stride] + row_sum;
                sum_sq[idx] = sum_sq[idx - stride] + row_sq;
            }
        }

        Self {
            width,
            height,
            sum,
            sum_sq,
        }
    }

    /// Returns the image width the tables were built from.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height the tables were built from.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns `(sum, sum of squares)` over the window with top-left `(x, y)`.
    ///
    /// The caller guarantees the window lies inside the image.
    pub fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (u64, u64) {
        debug_assert!(x + w <= self.width && y + h <= self.height);
        let stride = self.width + 1;
        let a = y * stride + x;
        let b = y * stride + x + w;
        let c = (y + h) * stride + x;
        let d = (y + h) * stride + x + w;
        (
            self.sum[d] + self.sum[a] - self.sum[b] - self.sum[c],
            self.sum_sq[d] + self.sum_sq[a] - self.sum_sq[b] - self.sum_sq[c],
        )
    }

    /// Returns the sum of squared deviations from the mean over a window.
    pub fn window_variance(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        let (sum, sum_sq) = self.window(x, y, w, h);
        let n = (w * h) as f64;
        let sum = sum as f64;
        (sum_sq as f64 - sum * sum / n).max(0.0)
    }
}
