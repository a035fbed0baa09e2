//! Consistency checks over assembled blockfaces.
//!
//! Nothing here rejects output. Each violation becomes an [`Anomaly`] and the
//! blockface is emitted regardless; the caller decides what to do with the
//! report.

use super::classify::expected_classification;
use crate::anomaly::{Anomaly, AnomalyKind, EntityKey};
use crate::{Blockface, BlockfaceKey};
use geo::EuclideanLength;
use std::collections::BTreeMap;

bitflags::bitflags! {
    /// Which checks [`validate_blockface`] and [`validate_batch`] run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Checks: u8 {
        /// Geometry present and non-degenerate unless flagged degraded.
        const GEOMETRY       = 1 << 0;
        /// `from_address <= to_address` when both are present.
        const ADDRESS_ORDER  = 1 << 1;
        /// Rule classification agrees with its type.
        const RULE_TAGS      = 1 << 2;
        /// `(cnn, side)` appears once across the batch.
        const KEY_UNIQUENESS = 1 << 3;
        /// At least one rule; empty blockfaces are valid but flagged for review.
        const RULE_PRESENCE  = 1 << 4;
    }
}

impl Default for Checks {
    fn default() -> Self {
        Checks::all()
    }
}

/// Per-blockface checks. Key uniqueness needs the whole batch; see [`validate_batch`].
pub fn validate_blockface(blockface: &Blockface, checks: Checks) -> Vec<Anomaly> {
    let key = EntityKey::Blockface(blockface.key);
    let mut out = Vec::new();

    if checks.contains(Checks::GEOMETRY) && !blockface.geometry_degraded {
        match &blockface.geometry {
            None => out.push(Anomaly::new(key.clone(), AnomalyKind::MissingGeometry, "no curb geometry")),
            Some(line) => {
                // NaN coordinates or a single distinct point.
                let length = line.euclidean_length();
                if !(length.is_finite() && length > 0.0) {
                    out.push(Anomaly::new(
                        key.clone(),
                        AnomalyKind::DegenerateGeometry,
                        format!("curb geometry of {} points has length {length}", line.0.len()),
                    ));
                }
            }
        }
    }

    if checks.contains(Checks::ADDRESS_ORDER) {
        if let (Some(from), Some(to)) = (blockface.from_address, blockface.to_address) {
            if from > to {
                out.push(Anomaly::new(key.clone(), AnomalyKind::AddressOrder, format!("from {from} > to {to}")));
            }
        }
    }

    if checks.contains(Checks::RULE_TAGS) {
        for rule in &blockface.rules {
            let rule_type = rule.source.rule_type();
            let expected = expected_classification(rule.rule_type, rule.matched_pattern.is_some());
            if rule.rule_type != rule_type || rule.classification != expected {
                out.push(Anomaly::new(
                    key.clone(),
                    AnomalyKind::RuleTagMismatch,
                    format!(
                        "{}#{}: {:?}/{:?}, expected {:?}/{:?}",
                        rule.source, rule.source_index, rule.rule_type, rule.classification, rule_type, expected
                    ),
                ));
            }
        }
    }

    if checks.contains(Checks::RULE_PRESENCE) && blockface.rules.is_empty() {
        out.push(Anomaly::new(key, AnomalyKind::NoRules, "no rules attached"));
    }

    out
}

/// All checks across a batch, including key uniqueness.
pub fn validate_batch(blockfaces: &[Blockface], checks: Checks) -> Vec<Anomaly> {
    let mut out: Vec<Anomaly> = blockfaces.iter().flat_map(|b| validate_blockface(b, checks)).collect();

    if checks.contains(Checks::KEY_UNIQUENESS) {
        let mut seen: BTreeMap<BlockfaceKey, usize> = BTreeMap::new();
        for blockface in blockfaces {
            *seen.entry(blockface.key).or_default() += 1;
        }
        for (key, count) in seen.into_iter().filter(|(_, n)| *n > 1) {
            out.push(Anomaly::new(
                EntityKey::Blockface(key),
                AnomalyKind::DuplicateKey,
                format!("{count} blockfaces share this key"),
            ));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Classification, Cnn, MatchKind, Rule, RuleType, Side, SourceKind};
    use geo::LineString;

    fn blockface(cnn: u64, side: Side) -> Blockface {
        Blockface {
            key: BlockfaceKey { cnn: Cnn(cnn), side },
            street: "MAIN ST".into(),
            from_street: None,
            to_street: None,
            cardinal: None,
            from_address: None,
            to_address: None,
            geometry: Some(LineString::from(vec![(0.0, 0.0), (0.001, 0.0)])),
            geometry_degraded: false,
            rules: vec![rule(SourceKind::Meter, Classification::Parser)],
        }
    }

    fn rule(source: SourceKind, classification: Classification) -> Rule {
        Rule {
            rule_type: source.rule_type(),
            source,
            source_index: 0,
            classification,
            matched_pattern: None,
            matched_by: MatchKind::Primary,
            text: None,
            payload: BTreeMap::new(),
            schedule: None,
            interpretation: None,
        }
    }

    fn kinds(anomalies: &[Anomaly]) -> Vec<AnomalyKind> {
        anomalies.iter().map(|a| a.kind).collect()
    }

    #[test]
    fn clean_blockface_has_no_findings() {
        assert!(validate_blockface(&blockface(1, Side::Left), Checks::all()).is_empty());
    }

    #[test]
    fn missing_geometry_is_flagged_unless_degraded() {
        let mut b = blockface(1, Side::Left);
        b.geometry = None;
        assert_eq!(kinds(&validate_blockface(&b, Checks::all())), vec![AnomalyKind::MissingGeometry]);

        b.geometry = Some(LineString::from(vec![(1.0, 1.0), (1.0, 1.0)]));
        assert_eq!(kinds(&validate_blockface(&b, Checks::all())), vec![AnomalyKind::DegenerateGeometry]);

        b.geometry = Some(LineString::from(vec![(1.0, 1.0), (f64::NAN, 1.0)]));
        assert_eq!(kinds(&validate_blockface(&b, Checks::all())), vec![AnomalyKind::DegenerateGeometry]);

        b.geometry_degraded = true;
        assert!(validate_blockface(&b, Checks::all()).is_empty());
    }

    #[test]
    fn reversed_addresses_are_flagged() {
        let mut b = blockface(1, Side::Left);
        (b.from_address, b.to_address) = (Some(200), Some(100));
        assert_eq!(kinds(&validate_blockface(&b, Checks::all())), vec![AnomalyKind::AddressOrder]);
        b.to_address = None;
        assert!(validate_blockface(&b, Checks::all()).is_empty());
    }

    #[test]
    fn rule_tags_follow_the_classification_table() {
        let mut b = blockface(1, Side::Left);
        b.rules = vec![
            rule(SourceKind::Sweeping, Classification::Ai),
            rule(SourceKind::General, Classification::Parser),
            rule(SourceKind::General, Classification::Ai),
        ];
        let mut promoted = rule(SourceKind::General, Classification::Parser);
        promoted.matched_pattern = Some("single-time-window".into());
        b.rules.push(promoted);
        let mut mislabeled = rule(SourceKind::Meter, Classification::Parser);
        mislabeled.rule_type = RuleType::StreetSweeping;
        b.rules.push(mislabeled);

        let found = validate_blockface(&b, Checks::RULE_TAGS);
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|a| a.kind == AnomalyKind::RuleTagMismatch));
    }

    #[test]
    fn empty_blockface_is_flagged_for_review() {
        let mut b = blockface(1, Side::Right);
        b.rules.clear();
        assert_eq!(kinds(&validate_blockface(&b, Checks::all())), vec![AnomalyKind::NoRules]);
        assert!(validate_blockface(&b, Checks::all() - Checks::RULE_PRESENCE).is_empty());
    }

    #[test]
    fn duplicate_keys_are_reported_once() {
        let batch = vec![blockface(1, Side::Left), blockface(1, Side::Right), blockface(1, Side::Left)];
        let found = validate_batch(&batch, Checks::all());
        assert_eq!(kinds(&found), vec![AnomalyKind::DuplicateKey]);
        assert_eq!(found[0].key, EntityKey::Blockface(BlockfaceKey { cnn: Cnn(1), side: Side::Left }));
        assert!(validate_batch(&batch, Checks::empty()).is_empty());
    }
}
