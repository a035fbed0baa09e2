//! Error kinds.
//!
//! Only [`ReconcileError`] is fatal. Everything else describes a single record
//! or segment and is folded into the anomaly report by the engine.

use thiserror::Error;

/// Conditions that abort a run before any blockface is emitted.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("no street segments in input")]
    NoSegments,
    #[error("no regulation records from any source")]
    NoRegulationSources,
    #[error("invalid whitelist pattern `{name}`: {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SideError {
    /// The side field carries a value no decoder recognizes.
    #[error("unrecognized side encoding `{0}`")]
    Unrecognized(String),
    /// No usable side information; the record needs spatial matching.
    #[error("side unresolved: {0}")]
    Unresolved(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("degenerate geometry: {0}")]
    Degenerate(&'static str),
    #[error("invalid offset geometry: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("no schedule fields present")]
    Missing,
    #[error("unrecognized day expression `{0}`")]
    Days(String),
    #[error("unrecognized time `{0}`")]
    Time(String),
    #[error("no time window in `{0}`")]
    Window(String),
}
