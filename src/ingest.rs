//! Source adapters: raw feed rows to [`RegulationRecord`]s.
//!
//! Each feed is a list of JSON objects with its own field names. The mapping
//! table in [`ReconcileConfig::sources`] says where the cnn, side, addresses,
//! location, text and schedule live; this module applies it and nothing else.
//! Field values are accepted as strings or numbers because the upstream
//! exports are not consistent about either.

use crate::anomaly::{Anomaly, AnomalyKind, EntityKey};
use crate::config::{ReconcileConfig, SourceFields};
use crate::{Cnn, RegulationRecord, SourceKind, StreetSegment};
use geo::Point;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub type SourceRow = serde_json::Map<String, Value>;

/// Everything a run consumes, as read from disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub segments: Vec<StreetSegment>,
    #[serde(default)]
    pub sources: BTreeMap<SourceKind, Vec<SourceRow>>,
}

/// Text form of a scalar field; empty strings count as absent.
pub(crate) fn field_text(row: &SourceRow, name: &str) -> Option<String> {
    let text = match row.get(name)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() { None } else { Some(text) }
}

fn field_number(row: &SourceRow, name: &str) -> Option<f64> {
    match row.get(name)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|v: &f64| v.is_finite())
}

/// House numbers: integers, or whole-valued floats.
fn field_address(row: &SourceRow, name: &str) -> Option<i64> {
    let v = field_number(row, name)?;
    if v.fract() == 0.0 && v.abs() < i64::MAX as f64 { Some(v as i64) } else { None }
}

/// Map one feed's rows through its field table.
///
/// Rows keep their position in the feed as `index`.
pub fn records_from_rows(
    kind: &SourceKind,
    rows: &[SourceRow],
    fields: &SourceFields,
) -> (Vec<RegulationRecord>, Vec<Anomaly>) {
    let mut anomalies = Vec::new();
    let records = rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let mut record = RegulationRecord::new(kind.clone(), index);

            if let Some(name) = &fields.cnn_field {
                if let Some(value) = row.get(name).filter(|v| !v.is_null()) {
                    record.cnn = Cnn::from_json(value);
                    let blank = matches!(value, Value::String(s) if s.trim().is_empty());
                    if record.cnn.is_none() && !blank {
                        anomalies.push(Anomaly::new(
                            EntityKey::record(kind, index),
                            AnomalyKind::CnnUnparseable,
                            format!("{name} = {value}"),
                        ));
                    }
                }
            }

            record.side = fields.side_field.as_deref().and_then(|name| field_text(row, name));

            if let Some(addr) = &fields.address_fields {
                record.from_address = field_address(row, &addr.from);
                record.to_address = field_address(row, &addr.to);
            }

            if let Some(loc) = &fields.location_fields {
                if let (Some(lon), Some(lat)) = (field_number(row, &loc.lon), field_number(row, &loc.lat)) {
                    record.location = Some(Point::new(lon, lat));
                }
            }

            record.text = fields.text_field.as_deref().and_then(|name| field_text(row, name));

            let schedule_names = fields
                .schedule_fields
                .iter()
                .flat_map(|s| [s.days.as_ref(), s.start.as_ref(), s.end.as_ref()])
                .flatten();
            for name in fields.payload_fields.iter().chain(schedule_names) {
                if let Some(value) = field_text(row, name) {
                    record.payload.insert(name.clone(), value);
                }
            }

            record
        })
        .collect();
    (records, anomalies)
}

/// Map every feed in `dataset`.
///
/// Feeds with no entry in the mapping table are reported once and skipped.
pub fn records_from_dataset(dataset: &Dataset, config: &ReconcileConfig) -> (Vec<RegulationRecord>, Vec<Anomaly>) {
    let mut records = Vec::new();
    let mut anomalies = Vec::new();
    for (kind, rows) in &dataset.sources {
        let Some(fields) = config.fields(kind) else {
            tracing::warn!(source = %kind, rows = rows.len(), "no field mapping for source, skipping");
            anomalies.push(Anomaly::new(
                EntityKey::Source { source: kind.clone() },
                AnomalyKind::UnmappedSource,
                format!("{} rows skipped", rows.len()),
            ));
            continue;
        };
        let (mut mapped, mut found) = records_from_rows(kind, rows, fields);
        tracing::debug!(source = %kind, records = mapped.len(), "mapped feed");
        records.append(&mut mapped);
        anomalies.append(&mut found);
    }
    (records, anomalies)
}
