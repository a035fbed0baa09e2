//! Run configuration.
//!
//! Holds the two tuning constants (offset distance, fallback threshold) and the
//! per-source field-name mapping table. The defaults describe the public feeds
//! this crate was built against; every name can be overridden from JSON.
//!
//! ```json
//! {
//!   "offset_distance": 0.00005,
//!   "fallback_threshold_m": 20.0,
//!   "sources": {
//!     "sweeping": { "cnn_field": "cnn", "side_field": "blockside", "side_convention": "compass" }
//!   },
//!   "general_whitelist": [{ "name": "tow-away-window", "pattern": "(?i)^tow away \\d+\\s*(am|pm)-\\d+\\s*(am|pm)$" }]
//! }
//! ```

use crate::{ReconcileError, SourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default lateral offset, in coordinate units (degrees). Roughly 5.5 m north-south.
pub const DEFAULT_OFFSET_DISTANCE: f64 = 0.00005;
/// Default spatial-fallback radius in meters.
pub const DEFAULT_FALLBACK_THRESHOLD_M: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileConfig {
    /// Curb offset from the centerline, in input coordinate units.
    pub offset_distance: f64,
    /// Maximum distance (meters) between a record and a curb line for spatial matching.
    pub fallback_threshold_m: f64,
    /// Field-name mapping table, one entry per source kind.
    pub sources: BTreeMap<SourceKind, SourceFields>,
    /// Extra patterns that promote GENERAL records to the parser.
    pub general_whitelist: Vec<WhitelistPattern>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        let mut sources = BTreeMap::new();
        sources.insert(SourceKind::Meter, SourceFields::meter());
        sources.insert(SourceKind::Sweeping, SourceFields::sweeping());
        sources.insert(SourceKind::General, SourceFields::general());
        ReconcileConfig {
            offset_distance: DEFAULT_OFFSET_DISTANCE,
            fallback_threshold_m: DEFAULT_FALLBACK_THRESHOLD_M,
            sources,
            general_whitelist: Vec::new(),
        }
    }
}

impl ReconcileConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ReconcileError> {
        let config: ReconcileConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ReconcileError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ReconcileError::Io { path: path.display().to_string(), source })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ReconcileError> {
        if !self.offset_distance.is_finite() || self.offset_distance <= 0.0 {
            return Err(ReconcileError::InvalidConfig(format!(
                "offset_distance must be a positive number, got {}",
                self.offset_distance
            )));
        }
        if !self.fallback_threshold_m.is_finite() || self.fallback_threshold_m < 0.0 {
            return Err(ReconcileError::InvalidConfig(format!(
                "fallback_threshold_m must be a non-negative number, got {}",
                self.fallback_threshold_m
            )));
        }
        Ok(())
    }

    /// Field mapping for `kind`; unmapped kinds get an empty mapping.
    pub fn fields(&self, kind: &SourceKind) -> Option<&SourceFields> {
        self.sources.get(kind)
    }
}

/// How a feed encodes the side of the street.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideConvention {
    /// `L`/`R` relative to the centerline's digitized direction.
    Digitized,
    /// Compass text such as `"North"` or `"SouthWest"`.
    Compass,
    /// No side field; records are placed spatially.
    #[default]
    Spatial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddressFields {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationFields {
    pub lon: String,
    pub lat: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleFields {
    pub days: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// `{side_field, cnn_field, address_fields, payload_fields}` for one source kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct SourceFields {
    pub cnn_field: Option<String>,
    pub side_field: Option<String>,
    pub side_convention: SideConvention,
    pub address_fields: Option<AddressFields>,
    pub location_fields: Option<LocationFields>,
    pub text_field: Option<String>,
    pub schedule_fields: Option<ScheduleFields>,
    /// Fields copied verbatim onto the rule.
    pub payload_fields: Vec<String>,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn location() -> Option<LocationFields> {
    Some(LocationFields { lon: "longitude".into(), lat: "latitude".into() })
}

impl SourceFields {
    pub fn meter() -> Self {
        SourceFields {
            cnn_field: Some("street_seg_ctrln_id".into()),
            side_field: Some("side".into()),
            side_convention: SideConvention::Digitized,
            address_fields: None,
            location_fields: location(),
            text_field: None,
            schedule_fields: Some(ScheduleFields {
                days: Some("days".into()),
                start: Some("from_time".into()),
                end: Some("to_time".into()),
            }),
            payload_fields: names(&["post_id", "cap_color", "rate_area", "days", "from_time", "to_time"]),
        }
    }

    pub fn sweeping() -> Self {
        SourceFields {
            cnn_field: Some("cnn".into()),
            side_field: Some("blockside".into()),
            side_convention: SideConvention::Compass,
            address_fields: Some(AddressFields { from: "from_address".into(), to: "to_address".into() }),
            location_fields: None,
            text_field: Some("fullname".into()),
            schedule_fields: Some(ScheduleFields {
                days: Some("weekday".into()),
                start: Some("fromhour".into()),
                end: Some("tohour".into()),
            }),
            payload_fields: names(&["corridor", "limits", "weekday", "fromhour", "tohour", "holidays"]),
        }
    }

    pub fn general() -> Self {
        SourceFields {
            cnn_field: Some("cnn".into()),
            side_field: None,
            side_convention: SideConvention::Spatial,
            address_fields: None,
            location_fields: location(),
            text_field: Some("regulation".into()),
            schedule_fields: None,
            payload_fields: names(&["regulation", "days", "hrs_begin", "hrs_end", "hrlimit", "rpparea1"]),
        }
    }
}

/// A named regex added to the GENERAL whitelist from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WhitelistPattern {
    pub name: String,
    pub pattern: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_all_three_feeds() {
        let config = ReconcileConfig::default();
        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.fields(&SourceKind::Sweeping).unwrap().side_convention, SideConvention::Compass);
        assert_eq!(config.fields(&SourceKind::General).unwrap().side_convention, SideConvention::Spatial);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ReconcileConfig::from_json_str(r#"{ "fallback_threshold_m": 12.5 }"#).unwrap();
        assert_eq!(config.fallback_threshold_m, 12.5);
        assert_eq!(config.offset_distance, DEFAULT_OFFSET_DISTANCE);
        assert_eq!(config.sources.len(), 3);
    }

    #[test]
    fn source_table_is_keyed_by_label() {
        let config = ReconcileConfig::from_json_str(
            r#"{ "sources": {
                "meter": { "cnn_field": "cnn", "side_field": "side", "side_convention": "digitized" }
            } }"#,
        )
        .unwrap();
        let meter = config.fields(&SourceKind::Meter).unwrap();
        assert_eq!(meter.cnn_field.as_deref(), Some("cnn"));
        assert!(meter.payload_fields.is_empty());
        // Replacing the table drops the other defaults.
        assert!(config.fields(&SourceKind::General).is_none());
    }

    #[test]
    fn rejects_non_positive_offset() {
        let err = ReconcileConfig::from_json_str(r#"{ "offset_distance": 0 }"#).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(ReconcileConfig::from_json_str(r#"{ "offset": 1 }"#).is_err());
    }
}
