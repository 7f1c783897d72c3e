//! Analysis window applied before the transform.

use std::f32::consts::PI;

/// Periodic Hann (raised-cosine) coefficients for an `n`-point frame.
pub fn hann(n: usize) -> Box<[f32]> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / n as f32).cos()))
        .collect()
}
