//! Acquisition side of the pipeline.
//! Manages: decoded headset fields → ingress adapter → sample ring + metrics → snapshot.
//! The ingress adapter runs in the producer (receive interrupt) context.
//! Snapshots are taken from the main loop under the same short lock.

pub mod ingress;
pub mod ring_buffer;
pub mod session;
pub mod snapshot;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use parking_lot::Mutex;

use ring_buffer::SampleRing;
use snapshot::{SessionMetrics, Snapshot};

/// Why the pipeline stopped for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// A RAW field arrived with a payload length other than 2 bytes.
    RawPayloadLength(usize),
}

impl HaltReason {
    /// Short operator-facing diagnostic, sized for a 16-column display.
    pub fn diagnostic(&self) -> String {
        match self {
            HaltReason::RawPayloadLength(len) => format!("raw>2!: {len}"),
        }
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::RawPayloadLength(len) => {
                write!(f, "raw signal payload of {len} bytes, expected 2")
            }
        }
    }
}

/// Single-slot "buffer ready" flag. Raised by the producer, cleared by the consumer.
#[derive(Debug, Default)]
pub struct ReadyFlag {
    raised: AtomicBool,
}

impl ReadyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    /// Clear the flag, returning whether it was raised.
    #[inline]
    pub fn take(&self) -> bool {
        self.raised.swap(false, Ordering::AcqRel)
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}

struct AcquisitionState<const N: usize> {
    ring: SampleRing<N>,
    metrics: SessionMetrics,
}

/// State shared between the producer and the analysis cycle.
///
/// The ring and metrics are private: the producer reaches them only through
/// [`ingress::IngressAdapter`], the consumer only through [`Self::snapshot`].
pub struct SharedAcquisition<const N: usize> {
    state: Mutex<AcquisitionState<N>>,
    ready: ReadyFlag,
    halted: AtomicBool,
    halt_reason: OnceLock<HaltReason>,
}

impl<const N: usize> SharedAcquisition<N> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AcquisitionState {
                ring: SampleRing::new(),
                metrics: SessionMetrics::default(),
            }),
            ready: ReadyFlag::new(),
            halted: AtomicBool::new(false),
            halt_reason: OnceLock::new(),
        }
    }

    /// Consistent copy of the ring (oldest first) and metrics.
    pub fn snapshot(&self) -> Snapshot<N> {
        let mut snapshot = Snapshot::empty();
        self.snapshot_into(&mut snapshot);
        snapshot
    }

    /// Same as [`Self::snapshot`], reusing the caller's storage.
    pub fn snapshot_into(&self, snapshot: &mut Snapshot<N>) {
        let state = self.state.lock();
        state.ring.linearize_into(snapshot.input_mut());
        snapshot.set_metrics(state.metrics);
    }

    #[inline]
    pub(crate) fn record_sample(&self, sample: i16) {
        let wrapped = {
            let mut state = self.state.lock();
            state.metrics.sample_count = state.metrics.sample_count.wrapping_add(1);
            state.ring.write(sample)
        };
        if wrapped {
            self.ready.raise();
        }
    }

    #[inline]
    pub(crate) fn update_metrics(&self, update: impl FnOnce(&mut SessionMetrics)) {
        update(&mut self.state.lock().metrics);
    }

    /// Back to baseline metrics. The ring keeps its contents.
    pub(crate) fn reset_metrics(&self) {
        self.state.lock().metrics = SessionMetrics::default();
    }

    /// Enter the halted state. Only the first reason is kept.
    pub(crate) fn halt(&self, reason: HaltReason) {
        let _ = self.halt_reason.set(reason);
        self.halted.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    pub fn halt_reason(&self) -> Option<HaltReason> {
        self.halt_reason.get().copied()
    }

    /// Consume the buffer-ready flag.
    pub fn take_ready(&self) -> bool {
        self.ready.take()
    }
}

impl<const N: usize> Default for SharedAcquisition<N> {
    fn default() -> Self {
        Self::new()
    }
}
