//! Cycle timing metrics.
//! Each stage of the analysis cycle gets a fixed-size window of recent
//! durations. The loop also counts idle polls and dropped telemetry frames.
//! Recording never allocates; percentiles are computed only when summarized.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

/// Timed stages of one analysis cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Snapshot,
    Transform,
    Telemetry,
    Actuate,
    /// Whole cycle, snapshot to actuator.
    Cycle,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Snapshot,
        Stage::Transform,
        Stage::Telemetry,
        Stage::Actuate,
        Stage::Cycle,
    ];
}

/// Most recent durations of one stage, in microseconds.
struct StageWindow {
    recent_us: Box<[u32]>,
    next: usize,
    filled: usize,
    max_us: u32,
}

impl StageWindow {
    fn new(len: usize) -> Self {
        Self {
            recent_us: vec![0; len].into_boxed_slice(),
            next: 0,
            filled: 0,
            max_us: 0,
        }
    }

    fn push(&mut self, us: u32) {
        self.recent_us[self.next] = us;
        self.next = (self.next + 1) % self.recent_us.len();
        self.filled = (self.filled + 1).min(self.recent_us.len());
        self.max_us = self.max_us.max(us);
    }

    /// Nearest-rank percentile over the window. `scratch` is reused between calls.
    fn percentile(&self, p: f64, scratch: &mut Vec<u32>) -> Option<u32> {
        if self.filled == 0 {
            return None;
        }
        scratch.clear();
        scratch.extend_from_slice(&self.recent_us[..self.filled]);
        let rank = ((p / 100.0) * self.filled as f64).ceil() as usize;
        let idx = rank.clamp(1, self.filled) - 1;
        Some(*scratch.select_nth_unstable(idx).1)
    }
}

/// Per-stage timing windows plus loop counters, shared between the loop and
/// whoever reports at shutdown.
pub struct MetricsRegistry {
    stages: Mutex<[StageWindow; Stage::ALL.len()]>,
    idle_polls: AtomicU64,
    telemetry_drops: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_window(1024)
    }

    pub fn with_window(len: usize) -> Self {
        let len = len.max(1);
        Self {
            stages: Mutex::new(std::array::from_fn(|_| StageWindow::new(len))),
            idle_polls: AtomicU64::new(0),
            telemetry_drops: AtomicU64::new(0),
        }
    }

    pub fn record(&self, stage: Stage, elapsed: Duration) {
        let us = u32::try_from(elapsed.as_micros()).unwrap_or(u32::MAX);
        self.stages.lock()[stage as usize].push(us);
        tracing::trace!(?stage, us, "stage_timed");
    }

    /// The loop checked the ready flag and found nothing to do.
    pub fn idle_poll(&self) {
        self.idle_polls.fetch_add(1, Ordering::Relaxed);
    }

    /// A telemetry frame could not be written.
    pub fn telemetry_dropped(&self) {
        self.telemetry_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Percentile (0-100) of the recent durations of `stage`, in microseconds.
    pub fn percentile(&self, stage: Stage, p: f64) -> Option<u32> {
        self.stages.lock()[stage as usize].percentile(p, &mut Vec::new())
    }

    pub fn summary(&self) -> CycleStats {
        let stages = self.stages.lock();
        let mut scratch = Vec::new();
        let timings = Stage::ALL
            .iter()
            .zip(stages.iter())
            .filter(|(_, window)| window.filled > 0)
            .map(|(&stage, window)| {
                let mut at = |p| window.percentile(p, &mut scratch).unwrap_or(0);
                StageTiming {
                    stage,
                    samples: window.filled,
                    p50_us: at(50.0),
                    p95_us: at(95.0),
                    p99_us: at(99.0),
                    max_us: window.max_us,
                }
            })
            .collect();
        CycleStats {
            stages: timings,
            idle_polls: self.idle_polls.load(Ordering::Relaxed),
            telemetry_drops: self.telemetry_drops.load(Ordering::Relaxed),
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageTiming {
    pub stage: Stage,
    /// Durations currently in the window.
    pub samples: usize,
    pub p50_us: u32,
    pub p95_us: u32,
    pub p99_us: u32,
    /// Worst duration since start, not just within the window.
    pub max_us: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    pub stages: Vec<StageTiming>,
    pub idle_polls: u64,
    pub telemetry_drops: u64,
}

impl CycleStats {
    pub fn stage(&self, stage: Stage) -> Option<&StageTiming> {
        self.stages.iter().find(|t| t.stage == stage)
    }
}
