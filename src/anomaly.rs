//! Structured findings collected during a run.
//!
//! Every per-record or per-blockface problem ends up here instead of aborting
//! the batch. The report is sorted before it is returned, so two runs over the
//! same input produce the same list.

use crate::{BlockfaceKey, Cnn, SourceKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What an anomaly is about.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum EntityKey {
    Blockface(BlockfaceKey),
    Segment { cnn: Cnn },
    Record { source: SourceKind, index: usize },
    Source { source: SourceKind },
}

impl EntityKey {
    pub fn record(source: &SourceKind, index: usize) -> Self {
        EntityKey::Record { source: source.clone(), index }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Blockface(key) => write!(f, "blockface {key}"),
            EntityKey::Segment { cnn } => write!(f, "segment {cnn}"),
            EntityKey::Record { source, index } => write!(f, "{source}#{index}"),
            EntityKey::Source { source } => write!(f, "source {source}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    // Normalization
    UnrecognizedSideEncoding,
    SideUnresolved,
    CnnUnparseable,
    UnmappedSource,
    // Geometry
    DegenerateGeometry,
    GeometryInvalid,
    // Join
    JoinDropped,
    AddressRangeReversed,
    // Assembly
    ScheduleUnparsed,
    InterpretationFailed,
    // Validation
    MissingGeometry,
    AddressOrder,
    RuleTagMismatch,
    DuplicateKey,
    NoRules,
}

impl AnomalyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AnomalyKind::UnrecognizedSideEncoding => "unrecognized_side_encoding",
            AnomalyKind::SideUnresolved => "side_unresolved",
            AnomalyKind::CnnUnparseable => "cnn_unparseable",
            AnomalyKind::UnmappedSource => "unmapped_source",
            AnomalyKind::DegenerateGeometry => "degenerate_geometry",
            AnomalyKind::GeometryInvalid => "geometry_invalid",
            AnomalyKind::JoinDropped => "join_dropped",
            AnomalyKind::AddressRangeReversed => "address_range_reversed",
            AnomalyKind::ScheduleUnparsed => "schedule_unparsed",
            AnomalyKind::InterpretationFailed => "interpretation_failed",
            AnomalyKind::MissingGeometry => "missing_geometry",
            AnomalyKind::AddressOrder => "address_order",
            AnomalyKind::RuleTagMismatch => "rule_tag_mismatch",
            AnomalyKind::DuplicateKey => "duplicate_key",
            AnomalyKind::NoRules => "no_rules",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(entity key, anomaly kind, detail)` finding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Anomaly {
    pub key: EntityKey,
    pub kind: AnomalyKind,
    pub detail: String,
}

impl Anomaly {
    pub fn new(key: EntityKey, kind: AnomalyKind, detail: impl Into<String>) -> Self {
        let anomaly = Anomaly { key, kind, detail: detail.into() };
        tracing::debug!(key = %anomaly.key, kind = %anomaly.kind, detail = %anomaly.detail, "anomaly");
        anomaly
    }
}
