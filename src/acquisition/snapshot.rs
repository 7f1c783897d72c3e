//! Snapshot types handed from the acquisition side to the analysis cycle.

use serde::Serialize;

/// Scalar headset readings. Last write wins, no smoothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionMetrics {
    pub battery_level: u8,
    pub poor_signal: u8,
    pub attention: u8,
    pub meditation: u8,
    /// Raw samples received this session. Wraps.
    pub sample_count: u16,
}

/// Point-in-time copy of the ring and metrics.
///
/// Holds `N` complex samples as interleaved `[re, im]` pairs, oldest first.
/// Imaginary parts are zero for snapshots taken from the ring.
#[derive(Debug, Clone)]
pub struct Snapshot<const N: usize> {
    input: [[i16; 2]; N],
    metrics: SessionMetrics,
}

impl<const N: usize> Snapshot<N> {
    pub(crate) fn empty() -> Self {
        Self {
            input: [[0; 2]; N],
            metrics: SessionMetrics::default(),
        }
    }

    /// Build a snapshot from already interleaved values.
    pub fn from_interleaved(input: [[i16; 2]; N], metrics: SessionMetrics) -> Self {
        Self { input, metrics }
    }

    pub(crate) fn input_mut(&mut self) -> &mut [[i16; 2]; N] {
        &mut self.input
    }

    pub(crate) fn set_metrics(&mut self, metrics: SessionMetrics) {
        self.metrics = metrics;
    }

    /// The `[re, im]` pairs.
    pub fn pairs(&self) -> &[[i16; 2]; N] {
        &self.input
    }

    /// All 2N values in storage order: re0, im0, re1, im1, ...
    pub fn interleaved(&self) -> impl Iterator<Item = i16> + '_ {
        self.input.iter().flat_map(|pair| pair.iter().copied())
    }

    /// Real parts only, oldest to newest.
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.input.iter().map(|pair| pair[0])
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }
}
