//! Source join: regulation records onto `(cnn, side)` blockface keys.
//!
//! Every record is placed exactly once, independently of every other record:
//!
//! ```text
//! record ── cnn known? ──yes── decode side ──ok──▶ Primary(cnn, side)
//!              │                    │
//!              no                 error
//!              │                    │  (candidates: this segment's two sides)
//!              ▼                    ▼
//!        spatial fallback ◀─────────┘
//!        nearest curb line within threshold ──▶ Spatial(key, distance)
//!              │ none / no location
//!              ▼
//!           Dropped (counted, reported)
//! ```
//!
//! ## Design notes
//!
//! - Placement is a pure function of the record plus read-only lookup tables,
//!   so records are placed in parallel and collected in input order.
//! - Spatial candidates are the individual segments of every projected curb
//!   line, bulk-loaded into an `rstar` tree. Each segment costs one entry
//!   whatever its length, so a stray vertex far from the city does not inflate
//!   the index.
//! - Ties on distance go to the smaller `cnn`, then LEFT before RIGHT.

use super::offset::CurbGeometry;
use super::planar::{LocalProjection, is_finite};
use crate::anomaly::{Anomaly, AnomalyKind, EntityKey};
use crate::side::{SideDecoders, bearing_degrees};
use crate::{BlockfaceKey, Cnn, MatchKind, RegulationRecord, SideConvention, SideError, StreetSegment};
use geo::{EuclideanDistance, Line, Point};
use rayon::prelude::*;
use rstar::{AABB, PointDistance, RTree, RTreeObject};
use std::collections::BTreeMap;

/// Where one record ended up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Placement {
    Matched(BlockfaceKey, MatchKind),
    Dropped(&'static str),
}

/// A record attached to a blockface, with how it got there.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Joined<'a> {
    pub record: &'a RegulationRecord,
    pub matched_by: MatchKind,
}

#[derive(Debug, Default)]
pub(crate) struct JoinOutcome<'a> {
    /// Records per key, in source order.
    pub by_key: BTreeMap<BlockfaceKey, Vec<Joined<'a>>>,
    pub primary: usize,
    pub spatial: usize,
    pub dropped: usize,
    pub anomalies: Vec<Anomaly>,
}

// --- Spatial index -----------------------------------------------------------

/// One projected segment of a curb line, in meters.
#[derive(Debug, Clone, Copy)]
struct CurbSpan {
    key: BlockfaceKey,
    line: Line<f64>,
}

impl RTreeObject for CurbSpan {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        let (a, b) = (self.line.start, self.line.end);
        AABB::from_corners([a.x, a.y], [b.x, b.y])
    }
}

impl PointDistance for CurbSpan {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let d = Point::new(point[0], point[1]).euclidean_distance(&self.line);
        d * d
    }
}

/// R-tree over projected curb segments.
pub(crate) struct SpatialIndex {
    projection: Option<LocalProjection>,
    tree: RTree<CurbSpan>,
}

impl SpatialIndex {
    /// Index every segment of every curb line in `curbs`.
    pub(crate) fn build(curbs: &BTreeMap<BlockfaceKey, CurbGeometry>) -> Self {
        // Anchor at the smallest key so the frame does not depend on input order.
        let projection = curbs.values().find_map(|c| c.line.0.first().copied()).map(LocalProjection::new);
        let Some(frame) = projection else {
            return SpatialIndex { projection, tree: RTree::new() };
        };

        let mut spans = Vec::new();
        for (key, curb) in curbs {
            let projected = frame.project_line(&curb.line);
            if projected.0.len() < 2 || !projected.coords().all(|c| is_finite(*c)) {
                continue;
            }
            spans.extend(projected.lines().map(|line| CurbSpan { key: *key, line }));
        }
        SpatialIndex { projection, tree: RTree::bulk_load(spans) }
    }

    /// Nearest curb line to `location` within `threshold_m`, restricted by `accept`.
    pub(crate) fn nearest(
        &self,
        location: Point<f64>,
        threshold_m: f64,
        accept: impl Fn(&BlockfaceKey) -> bool,
    ) -> Option<(BlockfaceKey, f64)> {
        let p = self.projection?.project(location.0);
        if !is_finite(p) {
            return None;
        }
        let query = Point::from(p);
        self.tree
            .locate_within_distance([p.x, p.y], threshold_m * threshold_m)
            .filter(|span| accept(&span.key))
            .map(|span| (span.key, query.euclidean_distance(&span.line)))
            .filter(|(_, d)| *d <= threshold_m)
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
    }
}

// --- Join --------------------------------------------------------------------

/// Read-only lookup tables shared by every placement.
pub(crate) struct Joiner<'a> {
    segments: BTreeMap<Cnn, &'a StreetSegment>,
    decoders: &'a SideDecoders,
    index: SpatialIndex,
    threshold_m: f64,
}

impl<'a> Joiner<'a> {
    pub(crate) fn new(
        segments: &'a [StreetSegment],
        curbs: &BTreeMap<BlockfaceKey, CurbGeometry>,
        decoders: &'a SideDecoders,
        threshold_m: f64,
    ) -> Self {
        let mut by_cnn = BTreeMap::new();
        for segment in segments {
            // Duplicate cnns are reported by validation; the first one owns the key.
            by_cnn.entry(segment.cnn).or_insert(segment);
        }
        Joiner { segments: by_cnn, decoders, index: SpatialIndex::build(curbs), threshold_m }
    }

    /// Place one record. Pure: the same record always lands in the same place.
    pub(crate) fn place(&self, record: &RegulationRecord) -> (Placement, Vec<Anomaly>) {
        let mut anomalies = Vec::new();
        let segment = record.cnn.and_then(|cnn| self.segments.get(&cnn).copied());
        let bearing = segment.and_then(|s| bearing_degrees(&s.line));

        match self.decoders.decode(&record.kind, record.side.as_deref(), bearing) {
            Ok(side) => {
                if let Some(segment) = segment {
                    let key = BlockfaceKey { cnn: segment.cnn, side };
                    return (Placement::Matched(key, MatchKind::Primary), anomalies);
                }
            }
            Err(err @ SideError::Unrecognized(_)) => {
                anomalies.push(Anomaly::new(
                    EntityKey::record(&record.kind, record.index),
                    AnomalyKind::UnrecognizedSideEncoding,
                    err.to_string(),
                ));
            }
            Err(err @ SideError::Unresolved(_)) => {
                // Feeds without a side field are always spatial; only flag the ones that should have had one.
                if segment.is_some() && self.decoders.convention(&record.kind) != SideConvention::Spatial {
                    anomalies.push(Anomaly::new(
                        EntityKey::record(&record.kind, record.index),
                        AnomalyKind::SideUnresolved,
                        err.to_string(),
                    ));
                }
            }
        }

        (self.fallback(record, segment.map(|s| s.cnn), &mut anomalies), anomalies)
    }

    fn fallback(&self, record: &RegulationRecord, known: Option<Cnn>, anomalies: &mut Vec<Anomaly>) -> Placement {
        let placement = match record.location {
            None => Placement::Dropped("no location for spatial fallback"),
            Some(location) => {
                let accept = |key: &BlockfaceKey| known.is_none_or(|cnn| key.cnn == cnn);
                match self.index.nearest(location, self.threshold_m, accept) {
                    Some((key, distance_m)) => Placement::Matched(key, MatchKind::Spatial { distance_m }),
                    None => Placement::Dropped("no curb line within threshold"),
                }
            }
        };
        if let Placement::Dropped(reason) = placement {
            anomalies.push(Anomaly::new(
                EntityKey::record(&record.kind, record.index),
                AnomalyKind::JoinDropped,
                reason,
            ));
        }
        placement
    }

    /// Place every record and group the results by key.
    pub(crate) fn join(&self, records: &'a [RegulationRecord]) -> JoinOutcome<'a> {
        let placed: Vec<(Placement, Vec<Anomaly>)> = records.par_iter().map(|r| self.place(r)).collect();

        let mut outcome = JoinOutcome::default();
        for (record, (placement, mut anomalies)) in records.iter().zip(placed) {
            outcome.anomalies.append(&mut anomalies);
            match placement {
                Placement::Matched(key, matched_by) => {
                    match matched_by {
                        MatchKind::Primary => outcome.primary += 1,
                        MatchKind::Spatial { .. } => outcome.spatial += 1,
                    }
                    outcome.by_key.entry(key).or_default().push(Joined { record, matched_by });
                }
                Placement::Dropped(_) => outcome.dropped += 1,
            }
        }
        for joined in outcome.by_key.values_mut() {
            joined.sort_by(|a, b| a.record.source_order().cmp(&b.record.source_order()));
        }
        tracing::debug!(
            primary = outcome.primary,
            spatial = outcome.spatial,
            dropped = outcome.dropped,
            "join complete"
        );
        outcome
    }
}

// --- Address ranges ----------------------------------------------------------

/// Widest inclusive range across `joined`, with `from <= to` guaranteed.
pub(crate) fn merge_address_range(
    key: BlockfaceKey,
    joined: &[Joined<'_>],
    anomalies: &mut Vec<Anomaly>,
) -> (Option<i64>, Option<i64>) {
    let mut from: Option<i64> = None;
    let mut to: Option<i64> = None;
    for Joined { record, .. } in joined {
        let (mut lo, mut hi) = (record.from_address, record.to_address);
        if let (Some(a), Some(b)) = (lo, hi) {
            if a > b {
                anomalies.push(Anomaly::new(
                    EntityKey::record(&record.kind, record.index),
                    AnomalyKind::AddressRangeReversed,
                    format!("{a} > {b}, swapped"),
                ));
                (lo, hi) = (Some(b), Some(a));
            }
        }
        from = match (from, lo) {
            (Some(x), Some(y)) => Some(x.min(y)),
            (x, y) => x.or(y),
        };
        to = match (to, hi) {
            (Some(x), Some(y)) => Some(x.max(y)),
            (x, y) => x.or(y),
        };
    }
    if let (Some(a), Some(b)) = (from, to) {
        if a > b {
            anomalies.push(Anomaly::new(
                EntityKey::Blockface(key),
                AnomalyKind::AddressRangeReversed,
                format!("merged range {a} > {b}, swapped"),
            ));
            return (Some(b), Some(a));
        }
    }
    (from, to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconcileConfig;
    use crate::engine::offset::offset_curb;
    use crate::{Side, SourceKind};
    use geo::LineString;

    const OFFSET: f64 = 0.00005;

    fn keys_for(cnn: Cnn) -> [BlockfaceKey; 2] {
        Side::ALL.map(|side| BlockfaceKey { cnn, side })
    }

    fn segment(cnn: u64, line: &[(f64, f64)]) -> StreetSegment {
        StreetSegment {
            cnn: Cnn(cnn),
            line: LineString::from(line.to_vec()),
            street: format!("STREET {cnn}"),
            from_street: None,
            to_street: None,
        }
    }

    fn curbs(segments: &[StreetSegment]) -> BTreeMap<BlockfaceKey, CurbGeometry> {
        let mut out = BTreeMap::new();
        for s in segments {
            for key in keys_for(s.cnn) {
                if let Ok(curb) = offset_curb(&s.line, key.side, OFFSET) {
                    out.insert(key, curb);
                }
            }
        }
        out
    }

    fn record(kind: SourceKind, index: usize, cnn: Option<u64>, side: Option<&str>) -> RegulationRecord {
        let mut r = RegulationRecord::new(kind, index);
        r.cnn = cnn.map(Cnn);
        r.side = side.map(str::to_string);
        r
    }

    fn key(cnn: u64, side: Side) -> BlockfaceKey {
        BlockfaceKey { cnn: Cnn(cnn), side }
    }

    /// Eastward segment X at lat 37.7592, and Y far to the north.
    fn fixture() -> Vec<StreetSegment> {
        vec![
            segment(100, &[(-122.4098, 37.7592), (-122.4089, 37.7592)]),
            segment(200, &[(-122.4098, 37.7602), (-122.4089, 37.7602)]),
        ]
    }

    #[test]
    fn digitized_and_compass_records_match_primary() {
        let segments = fixture();
        let curbs = curbs(&segments);
        let decoders = SideDecoders::from_config(&ReconcileConfig::default());
        let joiner = Joiner::new(&segments, &curbs, &decoders, 20.0);

        let meter = record(SourceKind::Meter, 0, Some(100), Some("R"));
        assert_eq!(joiner.place(&meter).0, Placement::Matched(key(100, Side::Right), MatchKind::Primary));

        let sweep = record(SourceKind::Sweeping, 0, Some(100), Some("North"));
        assert_eq!(joiner.place(&sweep).0, Placement::Matched(key(100, Side::Left), MatchKind::Primary));
    }

    #[test]
    fn spatial_fallback_picks_nearest_within_threshold() {
        let segments = fixture();
        let curbs = curbs(&segments);
        let decoders = SideDecoders::from_config(&ReconcileConfig::default());
        let joiner = Joiner::new(&segments, &curbs, &decoders, 20.0);

        // ~6 m south of X's right curb (the curb itself sits ~5.6 m south of the centerline).
        let mut general = record(SourceKind::General, 0, None, None);
        general.location = Some(Point::new(-122.40935, 37.7592 - OFFSET - 0.000054));
        let (placement, anomalies) = joiner.place(&general);
        match placement {
            Placement::Matched(k, MatchKind::Spatial { distance_m }) => {
                assert_eq!(k, key(100, Side::Right));
                assert!((distance_m - 6.0).abs() < 0.5, "{distance_m}");
            }
            other => panic!("unexpected placement {other:?}"),
        }
        assert!(anomalies.is_empty());
    }

    #[test]
    fn records_beyond_threshold_are_dropped_and_reported() {
        let segments = fixture();
        let curbs = curbs(&segments);
        let decoders = SideDecoders::from_config(&ReconcileConfig::default());
        let joiner = Joiner::new(&segments, &curbs, &decoders, 20.0);

        let mut far = record(SourceKind::General, 3, None, None);
        far.location = Some(Point::new(-122.40935, 37.7580));
        let no_location = record(SourceKind::General, 4, None, None);
        let records = vec![far, no_location];

        let outcome = joiner.join(&records);
        assert_eq!(outcome.dropped, 2);
        assert!(outcome.by_key.is_empty());
        assert_eq!(outcome.anomalies.len(), 2);
        assert!(outcome.anomalies.iter().all(|a| a.kind == AnomalyKind::JoinDropped));
    }

    #[test]
    fn unresolved_side_is_restricted_to_its_segment() {
        let segments = fixture();
        let curbs = curbs(&segments);
        let decoders = SideDecoders::from_config(&ReconcileConfig::default());
        let joiner = Joiner::new(&segments, &curbs, &decoders, 200.0);

        // Closer to Y's left curb, but the record names X.
        let mut meter = record(SourceKind::Meter, 0, Some(100), Some("?"));
        meter.location = Some(Point::new(-122.40935, 37.7601));
        let (placement, anomalies) = joiner.place(&meter);
        assert!(matches!(placement, Placement::Matched(k, MatchKind::Spatial { .. }) if k == key(100, Side::Left)));
        assert_eq!(anomalies[0].kind, AnomalyKind::UnrecognizedSideEncoding);
    }

    #[test]
    fn unknown_cnn_falls_back_to_any_segment() {
        let segments = fixture();
        let curbs = curbs(&segments);
        let decoders = SideDecoders::from_config(&ReconcileConfig::default());
        let joiner = Joiner::new(&segments, &curbs, &decoders, 20.0);

        let mut meter = record(SourceKind::Meter, 0, Some(999), Some("L"));
        meter.location = Some(Point::new(-122.40935, 37.76025 + OFFSET));
        let (placement, _) = joiner.place(&meter);
        assert!(matches!(placement, Placement::Matched(k, MatchKind::Spatial { .. }) if k == key(200, Side::Left)));
    }

    #[test]
    fn equidistant_candidates_prefer_smaller_cnn() {
        // Two identical segments; every point is equally close to both.
        let segments = vec![
            segment(7, &[(-122.4098, 37.7592), (-122.4089, 37.7592)]),
            segment(3, &[(-122.4098, 37.7592), (-122.4089, 37.7592)]),
        ];
        let curbs = curbs(&segments);
        let decoders = SideDecoders::from_config(&ReconcileConfig::default());
        let joiner = Joiner::new(&segments, &curbs, &decoders, 20.0);

        let mut general = record(SourceKind::General, 0, None, None);
        general.location = Some(Point::new(-122.40935, 37.7592 + OFFSET));
        let (placement, _) = joiner.place(&general);
        assert!(matches!(placement, Placement::Matched(k, _) if k == key(3, Side::Left)));
    }

    #[test]
    fn stray_vertex_costs_one_index_entry_per_segment() {
        // A vertex mistyped as (0, 0), thousands of kilometers from the rest of the line.
        let segments = vec![
            segment(100, &[(-122.4098, 37.7592), (-122.4089, 37.7592), (0.0, 0.0)]),
            segment(200, &[(-122.4098, 37.7602), (-122.4089, 37.7602)]),
        ];
        let curbs = curbs(&segments);
        let index = SpatialIndex::build(&curbs);
        let spans: usize = curbs.values().map(|c| c.line.0.len() - 1).sum();
        assert_eq!(index.tree.size(), spans);

        let (k, d) = index.nearest(Point::new(-122.40935, 37.7602 + OFFSET), 20.0, |_| true).unwrap();
        assert_eq!(k, key(200, Side::Left));
        assert!(d < 0.5, "{d}");
    }

    #[test]
    fn join_groups_in_source_order_and_never_duplicates() {
        let segments = fixture();
        let curbs = curbs(&segments);
        let decoders = SideDecoders::from_config(&ReconcileConfig::default());
        let joiner = Joiner::new(&segments, &curbs, &decoders, 20.0);

        let records = vec![
            record(SourceKind::Sweeping, 1, Some(100), Some("South")),
            record(SourceKind::Meter, 5, Some(100), Some("R")),
            record(SourceKind::Meter, 2, Some(100), Some("RIGHT")),
        ];
        let outcome = joiner.join(&records);
        assert_eq!(outcome.primary, 3);
        let right = &outcome.by_key[&key(100, Side::Right)];
        let order: Vec<_> = right.iter().map(|j| j.record.source_order()).collect();
        assert_eq!(order, vec![(&SourceKind::Meter, 2), (&SourceKind::Meter, 5), (&SourceKind::Sweeping, 1)]);
        let total: usize = outcome.by_key.values().map(Vec::len).sum();
        assert_eq!(total, records.len());
    }

    #[test]
    fn address_range_is_widest_and_ordered() {
        let mut a = record(SourceKind::Sweeping, 0, Some(1), None);
        (a.from_address, a.to_address) = (Some(120), Some(140));
        let mut b = record(SourceKind::Sweeping, 1, Some(1), None);
        (b.from_address, b.to_address) = (Some(198), Some(100));
        let c = record(SourceKind::Meter, 0, Some(1), None);
        let joined: Vec<Joined<'_>> =
            [&a, &b, &c].into_iter().map(|record| Joined { record, matched_by: MatchKind::Primary }).collect();

        let mut anomalies = Vec::new();
        let range = merge_address_range(key(1, Side::Left), &joined, &mut anomalies);
        assert_eq!(range, (Some(100), Some(198)));
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].key, EntityKey::record(&SourceKind::Sweeping, 1));
    }

    #[test]
    fn inverted_merge_is_swapped() {
        let mut a = record(SourceKind::Sweeping, 0, Some(1), None);
        a.from_address = Some(300);
        let mut b = record(SourceKind::Sweeping, 1, Some(1), None);
        b.to_address = Some(200);
        let joined = [
            Joined { record: &a, matched_by: MatchKind::Primary },
            Joined { record: &b, matched_by: MatchKind::Primary },
        ];
        let mut anomalies = Vec::new();
        assert_eq!(merge_address_range(key(1, Side::Right), &joined, &mut anomalies), (Some(200), Some(300)));
        assert_eq!(anomalies[0].key, EntityKey::Blockface(key(1, Side::Right)));
    }

    #[test]
    fn no_addresses_means_no_range() {
        let a = record(SourceKind::General, 0, None, None);
        let joined = [Joined { record: &a, matched_by: MatchKind::Primary }];
        assert_eq!(merge_address_range(key(1, Side::Left), &joined, &mut Vec::new()), (None, None));
    }
}
