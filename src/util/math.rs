//! Numeric helpers shared by the matcher and the locator.

/// Rounds `value` to two decimal places, as reported in match scores.
pub(crate) fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

/// Rounds a non-negative real length to the nearest pixel count.
pub(crate) fn round_px(value: f64) -> usize {
    if value.is_finite() && value > 0.0 {
        value.round() as usize
    } else {
        0
    }
}
