//! Reconciliation of street centerlines and curb regulation feeds into blockfaces.
//!
//! A *blockface* is one side of one street segment. This crate takes centerline
//! segments plus three independently maintained regulation feeds (parking
//! meters, street sweeping, general parking regulations), normalizes their
//! identifiers and side encodings, joins them onto `(cnn, side)` keys, derives a
//! curb-line geometry per side, classifies every rule for downstream parsing and
//! validates the assembled result.
//!
//! ```text
//! segments ─────────────┐
//! feeds ── ingest ── records ── join ── assemble ── validate ── ReconcileResult
//!                       │        │         │
//!                     side.rs  offset   classify + schedule + interpret
//! ```
//!
//! The public surface lives in [`api`]: [`reconcile`] and [`reconcile_with`].

extern crate self as curbside;

#[macro_use]
mod macros;
mod anomaly;
mod api;
mod config;
mod engine;
mod error;
mod ingest;
mod interpret;
mod lonlat;
mod side;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use anomaly::{Anomaly, AnomalyKind, EntityKey};
pub use api::{Options, ReconcileInput, ReconcileResult, reconcile, reconcile_with};
pub use config::{
    AddressFields, LocationFields, ReconcileConfig, ScheduleFields, SideConvention, SourceFields, WhitelistPattern,
};
pub use engine::{
    Checks, Classifier, CurbGeometry, Reconciler, Routing, RunCounts, RunMetrics, Schedule, StageTimings, TextPattern,
    TimeWindow, classify, offset_curb, parse_days, parse_time, parse_window_text, schedule_from_fields,
    validate_batch, validate_blockface,
};
pub use error::{GeometryError, ReconcileError, ScheduleError, SideError};
pub use geo::{Coord, LineString, Point};
pub use ingest::{Dataset, SourceRow, records_from_dataset, records_from_rows};
pub use interpret::{InterpretError, Interpreter};
pub use side::{SideDecoders, bearing_degrees, cardinal_direction, decode_compass, decode_digitized, facing_bearing};

// --- Identifiers ------------------------------------------------------------

/// City centerline network identifier.
///
/// Ordering is numeric, which is what spatial tie-breaks rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "u64")]
pub struct Cnn(pub u64);

impl Cnn {
    /// Canonicalize a textual identifier: `"1234000"`, `" 1234000 "`, `"1234000.0"`.
    pub fn parse(raw: &str) -> Option<Cnn> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Ok(v) = trimmed.parse::<u64>() {
            return Some(Cnn(v));
        }
        // Float-typed exports ("1234000.0"); only whole values are identifiers.
        let v: f64 = trimmed.parse().ok()?;
        if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 {
            Some(Cnn(v as u64))
        } else {
            None
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Option<Cnn> {
        match value {
            serde_json::Value::Number(n) => match n.as_u64() {
                Some(v) => Some(Cnn(v)),
                None => Cnn::parse(&n.to_string()),
            },
            serde_json::Value::String(s) => Cnn::parse(s),
            _ => None,
        }
    }
}

impl TryFrom<serde_json::Value> for Cnn {
    type Error = String;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        Cnn::from_json(&value).ok_or_else(|| format!("invalid cnn `{value}`"))
    }
}

impl From<Cnn> for u64 {
    fn from(cnn: Cnn) -> u64 {
        cnn.0
    }
}

impl fmt::Display for Cnn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// --- Sides ------------------------------------------------------------------

/// Side of a centerline relative to its digitized point order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Left, Side::Right];

    /// +1 for LEFT (counter-clockwise normal), -1 for RIGHT.
    pub fn sign(self) -> f64 {
        match self {
            Side::Left => 1.0,
            Side::Right => -1.0,
        }
    }

    pub fn code(self) -> char {
        match self {
            Side::Left => 'L',
            Side::Right => 'R',
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Left => "LEFT",
            Side::Right => "RIGHT",
        })
    }
}

/// Compass label a blockface faces. Display only; never used for joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CardinalDirection {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl CardinalDirection {
    /// Clockwise order starting at north; index * 45 is the bucket center.
    pub const CLOCKWISE: [CardinalDirection; 8] = [
        CardinalDirection::N,
        CardinalDirection::NE,
        CardinalDirection::E,
        CardinalDirection::SE,
        CardinalDirection::S,
        CardinalDirection::SW,
        CardinalDirection::W,
        CardinalDirection::NW,
    ];

    fn index(self) -> usize {
        Self::CLOCKWISE.iter().position(|c| *c == self).unwrap_or(0)
    }

    pub fn bearing(self) -> f64 {
        self.index() as f64 * 45.0
    }

    pub fn opposite(self) -> Self {
        Self::CLOCKWISE[(self.index() + 4) % 8]
    }
}

impl fmt::Display for CardinalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// --- Sources ----------------------------------------------------------------

/// Regulation feed a record came from.
///
/// Variant order is the display order of rules on a blockface.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceKind {
    Meter,
    Sweeping,
    General,
    /// Any feed label this crate has no table entry for.
    Other(String),
}

impl SourceKind {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "meter" | "meters" => SourceKind::Meter,
            "sweeping" | "street_sweeping" | "street-sweeping" => SourceKind::Sweeping,
            "general" | "regulation" | "regulations" => SourceKind::General,
            _ => SourceKind::Other(label.trim().to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            SourceKind::Meter => "meter",
            SourceKind::Sweeping => "sweeping",
            SourceKind::General => "general",
            SourceKind::Other(label) => label,
        }
    }

    pub fn rule_type(&self) -> RuleType {
        match self {
            SourceKind::Meter => RuleType::Meter,
            SourceKind::Sweeping => RuleType::StreetSweeping,
            SourceKind::General | SourceKind::Other(_) => RuleType::ParkingRegulation,
        }
    }
}

impl From<String> for SourceKind {
    fn from(label: String) -> Self {
        SourceKind::from_label(&label)
    }
}

impl From<SourceKind> for String {
    fn from(kind: SourceKind) -> Self {
        kind.label().to_string()
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// --- Inputs -----------------------------------------------------------------

/// A centerline segment as published upstream. Read-only to this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreetSegment {
    pub cnn: Cnn,
    /// Centerline in `(lon, lat)`, digitized order.
    #[serde(with = "crate::lonlat::line")]
    pub line: LineString<f64>,
    pub street: String,
    #[serde(default)]
    pub from_street: Option<String>,
    #[serde(default)]
    pub to_street: Option<String>,
}

/// A raw regulation row after field mapping, before any joining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulationRecord {
    pub kind: SourceKind,
    /// Position of the row in its feed.
    pub index: usize,
    pub cnn: Option<Cnn>,
    /// Raw side indicator, decoded per the feed's [`SideConvention`].
    pub side: Option<String>,
    pub from_address: Option<i64>,
    pub to_address: Option<i64>,
    #[serde(default, with = "crate::lonlat::opt_point")]
    pub location: Option<Point<f64>>,
    /// Free-text regulation string, when the feed has one.
    pub text: Option<String>,
    pub payload: BTreeMap<String, String>,
}

impl RegulationRecord {
    pub fn new(kind: SourceKind, index: usize) -> Self {
        RegulationRecord {
            kind,
            index,
            cnn: None,
            side: None,
            from_address: None,
            to_address: None,
            location: None,
            text: None,
            payload: BTreeMap::new(),
        }
    }

    /// Stable ordering key: feed order first, then row order.
    pub fn source_order(&self) -> (&SourceKind, usize) {
        (&self.kind, self.index)
    }
}

// --- Outputs ----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockfaceKey {
    pub cnn: Cnn,
    pub side: Side,
}

impl fmt::Display for BlockfaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cnn, self.side.code())
    }
}

/// Routing decision for a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Classification {
    Parser,
    Ai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleType {
    StreetSweeping,
    ParkingRegulation,
    Meter,
}

/// How a rule's record reached its blockface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum MatchKind {
    Primary,
    Spatial { distance_m: f64 },
}

/// One regulatory constraint attached to a blockface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub source: SourceKind,
    pub source_index: usize,
    pub rule_type: RuleType,
    pub classification: Classification,
    /// Whitelist pattern that promoted a GENERAL record to the parser.
    pub matched_pattern: Option<String>,
    pub matched_by: MatchKind,
    pub text: Option<String>,
    pub payload: BTreeMap<String, String>,
    pub schedule: Option<Schedule>,
    pub interpretation: Option<serde_json::Value>,
}

/// Canonical per-side entity, keyed by `(cnn, side)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blockface {
    #[serde(flatten)]
    pub key: BlockfaceKey,
    pub street: String,
    pub from_street: Option<String>,
    pub to_street: Option<String>,
    pub cardinal: Option<CardinalDirection>,
    pub from_address: Option<i64>,
    pub to_address: Option<i64>,
    #[serde(default, with = "crate::lonlat::opt_line")]
    pub geometry: Option<LineString<f64>>,
    /// Set when the offset failed validity checks and `geometry` is the raw centerline.
    pub geometry_degraded: bool,
    pub rules: Vec<Rule>,
}
