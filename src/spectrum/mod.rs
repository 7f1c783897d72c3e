//! Spectral transform: snapshot → Hann window → bit-reversal reorder →
//! radix-2 DIT FFT → linear magnitude of the first N/2 bins.
//!
//! Numeric convention: all arithmetic is `f32`. Magnitudes are `|X_k| / N`,
//! the same range a fixed-point butterfly network reaches by halving at each
//! of its log2(N) stages. They are rounded to nearest (ties away from zero)
//! and saturated into `u16`.

pub mod fft;
pub mod window;

use num_complex::Complex32;

use crate::acquisition::snapshot::Snapshot;

/// Linear magnitude per frequency bin, bin 0 up to just below Nyquist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spectrum {
    bins: Vec<u16>,
}

impl Spectrum {
    pub fn from_bins(bins: Vec<u16>) -> Self {
        Self { bins }
    }

    /// All-zero spectrum with `len` bins, for reuse with [`SpectralTransform::transform_into`].
    pub fn zeroed(len: usize) -> Self {
        Self { bins: vec![0; len] }
    }

    pub fn bins(&self) -> &[u16] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Bin with the largest magnitude, ignoring DC. Lowest index wins ties.
    pub fn peak_bin(&self) -> Option<usize> {
        self.bins
            .iter()
            .enumerate()
            .skip(1)
            .fold(None, |best: Option<(usize, u16)>, (i, &m)| match best {
                Some((_, top)) if top >= m => best,
                _ => Some((i, m)),
            })
            .map(|(i, _)| i)
    }
}

/// Precomputed window and twiddles for an `N`-point transform.
pub struct SpectralTransform<const N: usize> {
    window: Box<[f32]>,
    twiddles: Box<[Complex32]>,
}

impl<const N: usize> SpectralTransform<N> {
    const VALID_SIZE: () = assert!(
        N >= 2 && N.is_power_of_two(),
        "transform size must be a power of two and at least 2"
    );

    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_SIZE;
        Self {
            window: window::hann(N),
            twiddles: fft::twiddles(N),
        }
    }

    /// Pure and deterministic: the same snapshot always gives the same spectrum.
    pub fn transform(&self, snapshot: &Snapshot<N>) -> Spectrum {
        let mut spectrum = Spectrum::zeroed(N / 2);
        self.transform_into(snapshot, &mut spectrum);
        spectrum
    }

    /// Same as [`transform`](Self::transform), writing into `out`. Does not
    /// allocate once `out` holds N/2 bins.
    pub fn transform_into(&self, snapshot: &Snapshot<N>, out: &mut Spectrum) {
        let mut data = [Complex32::new(0.0, 0.0); N];
        for (c, &[re, im]) in data.iter_mut().zip(snapshot.pairs()) {
            *c = Complex32::new(re as f32, im as f32);
        }

        self.apply_window(&mut data);
        fft::reorder(&mut data);
        fft::run(&mut data, &self.twiddles);

        out.bins.resize(N / 2, 0);
        fft::magnitudes(&data, &mut out.bins);
    }

    fn apply_window(&self, data: &mut [Complex32; N]) {
        for (c, &w) in data.iter_mut().zip(self.window.iter()) {
            c.re *= w;
        }
    }
}

impl<const N: usize> Default for SpectralTransform<N> {
    fn default() -> Self {
        Self::new()
    }
}
