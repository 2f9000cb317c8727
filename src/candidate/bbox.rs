//! Normalized axis-aligned boxes.

/// Axis-aligned box with all fields normalized to `[0, 1]` of the image size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Builds a normalized box from a pixel placement in an image of
    /// `img_width x img_height`.
    pub fn from_pixels(
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        img_width: usize,
        img_height: usize,
    ) -> Self {
        let iw = img_width.max(1) as f32;
        let ih = img_height.max(1) as f32;
        Self {
            x: x as f32 / iw,
            y: y as f32 / ih,
            width: width as f32 / iw,
            height: height as f32 / ih,
        }
    }

    /// Returns the box area.
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union; zero when the union is empty.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);
        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BoundingBox;

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
        }
    }

    #[test]
    fn identical_boxes_have_unit_iou() {
        let a = bbox(0.1, 0.2, 0.3, 0.3);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn disjoint_and_touching_boxes_have_zero_iou() {
        let a = bbox(0.0, 0.0, 0.2, 0.2);
        assert_eq!(a.iou(&bbox(0.5, 0.5, 0.2, 0.2)), 0.0);
        assert_eq!(a.iou(&bbox(0.2, 0.0, 0.2, 0.2)), 0.0);
    }

    #[test]
    fn half_overlap_matches_closed_form() {
        let a = bbox(0.0, 0.0, 0.2, 0.2);
        let b = bbox(0.1, 0.0, 0.2, 0.2);
        // Intersection 0.02, union 0.06.
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn degenerate_boxes_have_zero_iou() {
        let a = bbox(0.1, 0.1, 0.0, 0.0);
        assert_eq!(a.iou(&a), 0.0);
    }

    #[test]
    fn pixel_boxes_normalize_by_image_size() {
        let b = BoundingBox::from_pixels(50, 25, 20, 20, 200, 100);
        assert_eq!(b, bbox(0.25, 0.25, 0.1, 0.2));
    }
}
