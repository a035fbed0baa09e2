//! Run metrics.
//!
//! Timings and counters collected by [`Reconciler::run`](super::pipeline::Reconciler::run)
//! for the CLI summary and for profiling. They describe a run and never feed
//! back into its output, so two runs with different timings still produce the
//! same blockfaces.

use serde::Serialize;
use std::time::{Duration, Instant};

// --- Metrics -----------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct RunMetrics {
    pub stages: StageTimings,
    pub counts: RunCounts,
}

/// Wall-clock time per pipeline stage.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct StageTimings {
    /// Curb-line offsets for every segment side.
    pub geometry: Duration,
    /// Record placement, including spatial fallback.
    pub join: Duration,
    /// Rule classification, schedule parsing and interpretation.
    pub assemble: Duration,
    pub validate: Duration,
    pub total: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub segments: usize,
    pub records: usize,
    pub blockfaces: usize,
    pub primary_matches: usize,
    pub spatial_matches: usize,
    pub dropped: usize,
    pub degraded_geometries: usize,
    pub interpreted: usize,
}

/// Runs `f` and adds its elapsed time to `slot`.
pub(crate) fn timed<T>(slot: &mut Duration, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    *slot += start.elapsed();
    out
}
