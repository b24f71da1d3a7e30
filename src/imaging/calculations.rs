//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Scale factor that brings the longer edge down to `max_edge`.
///
/// Never above 1.0: images already within the bound are not upscaled.
pub fn scale_factor(original: (u32, u32), max_edge: u32) -> f64 {
    let longer_edge = original.0.max(original.1);
    if longer_edge == 0 {
        return 1.0;
    }
    (max_edge as f64 / longer_edge as f64).min(1.0)
}

/// Calculate dimensions bounded by `max_edge` on the longer side.
///
/// When scaling down, the longer edge is set to exactly `max_edge` and the
/// other edge is scaled by the same factor, rounded to the nearest pixel
/// (never below 1). Images within the bound keep their dimensions.
///
/// # Examples
/// ```
/// # use cloakjob::imaging::bounded_dimensions;
/// // 4000x3000 landscape bounded to 2048 → 2048x1536
/// assert_eq!(bounded_dimensions((4000, 3000), 2048), (2048, 1536));
///
/// // Already small enough: unchanged
/// assert_eq!(bounded_dimensions((640, 480), 2048), (640, 480));
/// ```
pub fn bounded_dimensions(original: (u32, u32), max_edge: u32) -> (u32, u32) {
    let (orig_w, orig_h) = original;
    let scale = scale_factor(original, max_edge);
    if scale >= 1.0 {
        return original;
    }

    let scaled = |edge: u32| ((edge as f64 * scale).round() as u32).max(1);
    if orig_w >= orig_h {
        // Landscape or square
        (max_edge, scaled(orig_h))
    } else {
        // Portrait
        (scaled(orig_w), max_edge)
    }
}
