//! Flat-torus distance.
//!
//! Per axis the separation is the minimum image min(d, 1 - d); the axes
//! combine as an L2 norm.

use crate::embedding::EmbeddingPoint;
use crate::error::ResonanceError;

/// Wrap-around separation of two coordinates in [0, 1).
#[inline]
pub fn wrapped_delta(a: f64, b: f64) -> f64 {
    let d = (a - b).abs();
    d.min(1.0 - d)
}

/// Periodic L2 distance between two embedded points of equal dimension.
pub fn periodic_distance(a: &EmbeddingPoint, b: &EmbeddingPoint) -> Result<f64, ResonanceError> {
    if a.dimension() != b.dimension() {
        return Err(ResonanceError::ShapeMismatch {
            left: a.dimension(),
            right: b.dimension(),
        });
    }
    let sum: f64 = a
        .coords()
        .iter()
        .zip(b.coords())
        .map(|(&x, &y)| {
            let d = wrapped_delta(x, y);
            d * d
        })
        .sum();
    Ok(sum.sqrt())
}
