//! Identifier and side normalization.
//!
//! Feeds disagree on how they say "which side of the street". This module turns
//! every encoding into a [`Side`] through one decoder per [`SideConvention`],
//! selected by a per-source table ([`SideDecoders`]). Call sites never compare
//! side strings themselves.
//!
//! ```text
//! Digitized  "L" / "right"   ── pass through ───────────────┐
//! Compass    "North", "SW"   ── bearing lookup vs segment ──┼─▶ Ok(Side)
//! Spatial    (no field)      ── Unresolved ─────────────────┘   Err(SideError) -> spatial fallback
//! ```
//!
//! Bearings are compass degrees (0 = north, clockwise), computed in a local
//! equirectangular frame so that longitude spacing is scaled by `cos(lat)`.
//!
//! Display labels come from the bearing's quadrant, not from rounding the
//! facing direction: on the upper half circle (`[0°, 180°)`) LEFT faces W
//! until the line turns past north-east, then N; RIGHT is always the opposite
//! label, and the lower half circle mirrors the upper one.

use crate::config::{ReconcileConfig, SideConvention};
use crate::{CardinalDirection, Side, SideError, SourceKind};
use geo::LineString;
use std::collections::BTreeMap;

/// Angular tolerance (degrees) under which a compass label is equally close to both sides.
const AMBIGUOUS_EPSILON: f64 = 1e-6;

/// Per-source decoder table.
#[derive(Debug, Clone, Default)]
pub struct SideDecoders {
    table: BTreeMap<SourceKind, SideConvention>,
}

impl SideDecoders {
    pub fn from_config(config: &ReconcileConfig) -> Self {
        let table = config
            .sources
            .iter()
            .map(|(kind, fields)| {
                // A convention without a field to read degrades to spatial.
                let convention =
                    if fields.side_field.is_some() { fields.side_convention } else { SideConvention::Spatial };
                (kind.clone(), convention)
            })
            .collect();
        SideDecoders { table }
    }

    pub fn convention(&self, kind: &SourceKind) -> SideConvention {
        self.table.get(kind).copied().unwrap_or(SideConvention::Spatial)
    }

    /// Decode `raw` for a record of `kind` lying on a segment with the given bearing.
    ///
    /// `bearing` is `None` when the record's segment is unknown; compass labels
    /// cannot be decoded without it.
    pub fn decode(&self, kind: &SourceKind, raw: Option<&str>, bearing: Option<f64>) -> Result<Side, SideError> {
        let raw = raw.map(str::trim).filter(|s| !s.is_empty());
        match self.convention(kind) {
            SideConvention::Digitized => decode_digitized(raw.ok_or(SideError::Unresolved("side field absent"))?),
            SideConvention::Compass => {
                let raw = raw.ok_or(SideError::Unresolved("side field absent"))?;
                let bearing = bearing.ok_or(SideError::Unresolved("segment unknown, compass side needs a bearing"))?;
                decode_compass(raw, bearing)
            }
            SideConvention::Spatial => Err(SideError::Unresolved("source carries no side field")),
        }
    }
}

/// `L`/`R` codes already expressed against the digitized direction.
pub fn decode_digitized(raw: &str) -> Result<Side, SideError> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "L" | "LEFT" | "LT" => Ok(Side::Left),
        "R" | "RIGHT" | "RT" => Ok(Side::Right),
        _ => Err(SideError::Unrecognized(raw.to_string())),
    }
}

/// Lookup table from free-text compass labels to bearings.
fn compass_bearing(raw: &str) -> Option<f64> {
    let key: String =
        raw.chars().filter(|c| !c.is_whitespace() && *c != '-' && *c != '_').collect::<String>().to_ascii_lowercase();
    let key = key.strip_suffix("side").unwrap_or(&key);
    let direction = match key {
        "north" | "n" => CardinalDirection::N,
        "northeast" | "ne" => CardinalDirection::NE,
        "east" | "e" => CardinalDirection::E,
        "southeast" | "se" => CardinalDirection::SE,
        "south" | "s" => CardinalDirection::S,
        "southwest" | "sw" => CardinalDirection::SW,
        "west" | "w" => CardinalDirection::W,
        "northwest" | "nw" => CardinalDirection::NW,
        _ => return None,
    };
    Some(direction.bearing())
}

/// Resolve a compass label against a segment bearing.
///
/// The side whose facing direction is angularly closest to the label wins.
pub fn decode_compass(raw: &str, bearing: f64) -> Result<Side, SideError> {
    let target = compass_bearing(raw).ok_or_else(|| SideError::Unrecognized(raw.to_string()))?;
    let left = angular_distance(facing_bearing(bearing, Side::Left), target);
    let right = angular_distance(facing_bearing(bearing, Side::Right), target);
    if (left - right).abs() < AMBIGUOUS_EPSILON {
        return Err(SideError::Unresolved("compass side runs parallel to the segment"));
    }
    Ok(if left < right { Side::Left } else { Side::Right })
}

/// Compass direction the curb of `side` faces, away from the centerline.
pub fn facing_bearing(bearing: f64, side: Side) -> f64 {
    match side {
        Side::Left => (bearing - 90.0).rem_euclid(360.0),
        Side::Right => (bearing + 90.0).rem_euclid(360.0),
    }
}

fn angular_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

/// Compass bearing from the first to the last distinct point of `line`.
///
/// Returns `None` for lines without two distinct points.
pub fn bearing_degrees(line: &LineString<f64>) -> Option<f64> {
    let first = line.0.first()?;
    let last = line.0.iter().rev().find(|c| *c != first)?;
    let (first, last) = (geo::Point::from(*first), geo::Point::from(*last));
    let mid_lat = ((first.y() + last.y()) / 2.0).to_radians();
    let dx = (last.x() - first.x()) * mid_lat.cos();
    let dy = last.y() - first.y();
    if dx == 0.0 && dy == 0.0 {
        return None;
    }
    Some(dx.atan2(dy).to_degrees().rem_euclid(360.0))
}

/// Display direction of `side` for a segment with the given bearing.
pub fn cardinal_direction(bearing: f64, side: Side) -> CardinalDirection {
    let upper_left = |b: f64| if b < 45.0 { CardinalDirection::W } else { CardinalDirection::N };
    let b = bearing.rem_euclid(360.0);
    let left = if b < 180.0 { upper_left(b) } else { upper_left(b - 180.0).opposite() };
    match side {
        Side::Left => left,
        Side::Right => left.opposite(),
    }
}
