//! Reconciliation engine.
//!
//! This module is the entry point for everything between "records are in
//! memory" and "blockfaces plus anomalies come out". It is split into focused
//! submodules under `src/engine/` while keeping public paths flat (for example
//! `crate::engine::Reconciler` and `crate::engine::Checks`).
//!
//! ## How the parts work together
//!
//! ```text
//! StreetSegment ── offset_curb (offset.rs, planar.rs) ──┐ curb lines
//!                                                       │
//! RegulationRecord ── Joiner (join.rs) ◀────────────────┘ rstar index
//!                        │ (cnn, side) → records
//!                        v
//!               Reconciler::assemble (pipeline.rs)
//!                 - merge address ranges
//!                 - Classifier::route      (classify.rs)
//!                 - schedule parsing       (schedule.rs)
//!                 - optional interpreter
//!                        │
//!                        v
//!               validate_batch (validate.rs)
//!                        │
//!                        v
//!             blockfaces + anomaly report + RunMetrics (metrics.rs)
//! ```
//!
//! ## Responsibilities by module
//!
//! - `planar.rs`: self-intersection tests over `geo` lines and the local meter
//!   projection used for spatial matching.
//! - `offset.rs`: curb-line derivation with direction normalization and the
//!   degrade-to-centerline fallback.
//! - `join.rs`: record placement (primary key, then spatial fallback over an
//!   `rstar` tree of curb segments) and address range merging.
//! - `classify.rs`: PARSER/AI routing with the GENERAL whitelist.
//! - `schedule.rs`: day and time-window parsing for PARSER rules.
//! - `validate.rs`: per-blockface and batch consistency checks.
//! - `pipeline.rs`: stage orchestration and parallelism.
//! - `metrics.rs`: per-stage timings and counters.
//!
//! ## Debugging
//!
//! Set `CURBSIDE_LOG=curbside=debug` when running the binary to log every
//! anomaly as it is recorded.

#[path = "engine/classify.rs"]
mod classify;
#[path = "engine/join.rs"]
mod join;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/offset.rs"]
mod offset;
#[path = "engine/pipeline.rs"]
mod pipeline;
#[path = "engine/planar.rs"]
mod planar;
#[path = "engine/schedule.rs"]
mod schedule;
#[path = "engine/validate.rs"]
mod validate;

pub use classify::{Classifier, Routing, TextPattern, classify};
pub use metrics::{RunCounts, RunMetrics, StageTimings};
pub use offset::{CurbGeometry, offset_curb};
pub use pipeline::Reconciler;
pub use schedule::{Schedule, TimeWindow, parse_days, parse_time, parse_window_text, schedule_from_fields};
pub use validate::{Checks, validate_batch, validate_blockface};
