//! In-place radix-2 decimation-in-time FFT over `Complex32`.
//! Slice lengths must be a power of two; callers guarantee it at compile time.

use num_complex::Complex32;
use std::f32::consts::PI;

/// Forward twiddle factors `e^(-2πi·k/n)` for k in 0..n/2.
pub fn twiddles(n: usize) -> Box<[Complex32]> {
    (0..n / 2)
        .map(|k| Complex32::from_polar(1.0, -2.0 * PI * k as f32 / n as f32))
        .collect()
}

/// Permute `data` into bit-reversed index order.
pub fn reorder(data: &mut [Complex32]) {
    let n = data.len();
    debug_assert!(n.is_power_of_two());
    if n < 2 {
        return;
    }
    let shift = usize::BITS - n.trailing_zeros();
    for i in 0..n {
        let j = i.reverse_bits() >> shift;
        if j > i {
            data.swap(i, j);
        }
    }
}

/// Butterfly passes over bit-reversed input. `twiddles` comes from [`twiddles`]
/// for the same length.
pub fn run(data: &mut [Complex32], twiddles: &[Complex32]) {
    let n = data.len();
    debug_assert_eq!(twiddles.len(), n / 2);

    let mut span = 2;
    while span <= n {
        let half = span / 2;
        let stride = n / span;
        for block in data.chunks_exact_mut(span) {
            let (lo, hi) = block.split_at_mut(half);
            for (k, (a, b)) in lo.iter_mut().zip(hi.iter_mut()).enumerate() {
                let t = *b * twiddles[k * stride];
                *b = *a - t;
                *a += t;
            }
        }
        span <<= 1;
    }
}

/// Linear magnitudes of the first `out.len()` bins, scaled by 1/n, rounded to
/// nearest (ties away from zero) and saturated to u16.
pub fn magnitudes(data: &[Complex32], out: &mut [u16]) {
    let scale = 1.0 / data.len() as f32;
    for (m, c) in out.iter_mut().zip(data) {
        // Float-to-int `as` saturates.
        *m = (c.norm() * scale).round() as u16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reorder_matches_bit_reversal_for_eight_points() {
        let mut data: Vec<Complex32> = (0..8).map(|i| Complex32::new(i as f32, 0.0)).collect();
        reorder(&mut data);
        let order: Vec<u32> = data.iter().map(|c| c.re as u32).collect();
        assert_eq!(order, vec![0, 4, 2, 6, 1, 5, 3, 7]);
    }

    #[test]
    fn impulse_has_flat_spectrum() {
        let mut data = vec![Complex32::new(0.0, 0.0); 16];
        data[0] = Complex32::new(1.0, 0.0);
        reorder(&mut data);
        run(&mut data, &twiddles(16));
        for c in &data {
            assert!((c.re - 1.0).abs() < 1e-6 && c.im.abs() < 1e-6, "{c}");
        }
    }

    #[test]
    fn matches_reference_fft() {
        use rustfft::{Fft, FftPlanner};

        const N: usize = 64;
        let input: Vec<Complex32> = (0..N)
            .map(|i| {
                let t = i as f32;
                Complex32::new((0.3 * t).sin() * 700.0 + (1.7 * t).cos() * 90.0 - 12.0, 0.0)
            })
            .collect();

        let mut expected = input.clone();
        FftPlanner::<f32>::new()
            .plan_fft_forward(N)
            .process(&mut expected);

        let mut ours = input;
        reorder(&mut ours);
        run(&mut ours, &twiddles(N));

        for (a, b) in ours.iter().zip(&expected) {
            assert!((a - b).norm() < 1e-2, "{a} vs {b}");
        }
    }

    #[test]
    fn magnitudes_scale_round_and_saturate() {
        let data = [
            Complex32::new(3.0, 4.0),
            Complex32::new(2.0, 0.0),
            Complex32::new(1e9, 0.0),
            Complex32::new(0.0, 0.0),
        ];
        let mut out = [0u16; 3];
        magnitudes(&data, &mut out);
        // |3+4i| / 4 = 1.25 -> 1; 2 / 4 = 0.5 -> 1 (ties away from zero).
        assert_eq!(out, [1, 1, u16::MAX]);
    }
}
