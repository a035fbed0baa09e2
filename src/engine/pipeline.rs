//! Batch orchestration.
//!
//! A run is four stages over fully materialized input:
//!
//! ```text
//! (1) geometry   segments ── offset_curb × {LEFT, RIGHT} ──▶ curb lines   (parallel)
//! (2) join       records  ── Joiner::place ─────────────────▶ (cnn, side) → records
//! (3) assemble   per blockface: addresses, cardinal, rules   (parallel)
//!                  rule = route ─┬─ PARSER ── schedule
//!                                └─ AI ────── interpreter (optional)
//! (4) validate   validate_batch, then sort the anomaly report
//! ```
//!
//! Each stage reads only the previous stage's output plus read-only input, so
//! the parallel stages share no mutable state. Results are collected in input
//! order and keyed collections are `BTreeMap`s; the output does not depend on
//! how rayon schedules work.
//!
//! ## Design notes
//!
//! - A segment with a duplicate `cnn` still gets blockfaces, but only the first
//!   segment with that `cnn` receives records. Validation reports the clash.
//! - Geometry failures never remove a blockface: a degenerate centerline leaves
//!   `geometry` unset and the rules stay attached.

use super::classify::Classifier;
use super::join::{Joined, Joiner, merge_address_range};
use super::metrics::{RunCounts, RunMetrics, timed};
use super::offset::{CurbGeometry, offset_curb};
use super::schedule::{Schedule, parse_window_text, schedule_from_fields};
use super::validate::{Checks, validate_batch};
use crate::anomaly::{Anomaly, AnomalyKind, EntityKey};
use crate::config::ReconcileConfig;
use crate::interpret::Interpreter;
use crate::side::{SideDecoders, bearing_degrees, cardinal_direction};
use crate::{
    Blockface, BlockfaceKey, Classification, GeometryError, ReconcileResult, RegulationRecord, Rule, ScheduleError,
    Side, StreetSegment,
};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::Instant;

type SideGeometry = [Result<CurbGeometry, GeometryError>; 2];

/// One blockface's worth of assembly work.
struct Job<'s> {
    segment: &'s StreetSegment,
    side: Side,
    curb: Option<&'s CurbGeometry>,
    joined: Vec<Joined<'s>>,
}

/// Assembly output for one blockface.
struct Assembled {
    blockface: Blockface,
    anomalies: Vec<Anomaly>,
    interpreted: usize,
}

/// Runs the reconciliation stages with a fixed configuration.
///
/// Usage: `Reconciler::new(&config, classifier)` then `run(&segments, &records)`.
pub struct Reconciler<'a> {
    config: &'a ReconcileConfig,
    classifier: Classifier,
    decoders: SideDecoders,
    checks: Checks,
    interpreter: Option<&'a dyn Interpreter>,
}

impl<'a> Reconciler<'a> {
    pub fn new(config: &'a ReconcileConfig, classifier: Classifier) -> Self {
        Reconciler {
            config,
            classifier,
            decoders: SideDecoders::from_config(config),
            checks: Checks::default(),
            interpreter: None,
        }
    }

    pub fn with_checks(mut self, checks: Checks) -> Self {
        self.checks = checks;
        self
    }

    pub fn with_interpreter(mut self, interpreter: Option<&'a dyn Interpreter>) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// Run every stage. Per-record problems end up in the anomaly report.
    pub fn run(&self, segments: &[StreetSegment], records: &[RegulationRecord]) -> ReconcileResult {
        let started = Instant::now();
        let mut metrics = RunMetrics::default();
        let mut anomalies = Vec::new();

        // (1) geometry
        let geometry: Vec<SideGeometry> = timed(&mut metrics.stages.geometry, || {
            segments
                .par_iter()
                .map(|s| Side::ALL.map(|side| offset_curb(&s.line, side, self.config.offset_distance)))
                .collect()
        });
        let curbs = self.collect_curbs(segments, &geometry, &mut anomalies);
        tracing::debug!(segments = segments.len(), curbs = curbs.len(), "geometry stage done");

        // (2) join
        let joiner = Joiner::new(segments, &curbs, &self.decoders, self.config.fallback_threshold_m);
        let outcome = timed(&mut metrics.stages.join, || joiner.join(records));
        anomalies.extend(outcome.anomalies);
        let mut by_key = outcome.by_key;

        // (3) assemble
        let jobs: Vec<Job<'_>> = segments
            .iter()
            .zip(&geometry)
            .flat_map(|(segment, sides)| {
                Side::ALL.into_iter().zip(sides).map(move |(side, curb)| (segment, side, curb.as_ref().ok()))
            })
            .map(|(segment, side, curb)| {
                let joined = by_key.remove(&BlockfaceKey { cnn: segment.cnn, side }).unwrap_or_default();
                Job { segment, side, curb, joined }
            })
            .collect();
        let assembled: Vec<Assembled> =
            timed(&mut metrics.stages.assemble, || jobs.into_par_iter().map(|job| self.assemble(job)).collect());

        let mut interpreted = 0;
        let mut blockfaces = Vec::with_capacity(assembled.len());
        for mut a in assembled {
            interpreted += a.interpreted;
            anomalies.append(&mut a.anomalies);
            blockfaces.push(a.blockface);
        }
        blockfaces.sort_by_key(|b| b.key);

        // (4) validate
        let found = timed(&mut metrics.stages.validate, || validate_batch(&blockfaces, self.checks));
        anomalies.extend(found);
        anomalies.sort();

        metrics.counts = RunCounts {
            segments: segments.len(),
            records: records.len(),
            blockfaces: blockfaces.len(),
            primary_matches: outcome.primary,
            spatial_matches: outcome.spatial,
            dropped: outcome.dropped,
            degraded_geometries: blockfaces.iter().filter(|b| b.geometry_degraded).count(),
            interpreted,
        };
        metrics.stages.total = started.elapsed();
        tracing::info!(
            blockfaces = blockfaces.len(),
            anomalies = anomalies.len(),
            dropped = outcome.dropped,
            "reconciliation finished"
        );

        ReconcileResult { blockfaces, anomalies, dropped: outcome.dropped, metrics }
    }

    /// Curb lines usable for spatial matching, plus geometry anomalies.
    fn collect_curbs(
        &self,
        segments: &[StreetSegment],
        geometry: &[SideGeometry],
        anomalies: &mut Vec<Anomaly>,
    ) -> BTreeMap<BlockfaceKey, CurbGeometry> {
        let mut curbs = BTreeMap::new();
        for (segment, sides) in segments.iter().zip(geometry) {
            if let [Err(err), _] = sides {
                anomalies.push(Anomaly::new(
                    EntityKey::Segment { cnn: segment.cnn },
                    AnomalyKind::DegenerateGeometry,
                    err.to_string(),
                ));
            }
            for (side, outcome) in Side::ALL.into_iter().zip(sides) {
                let key = BlockfaceKey { cnn: segment.cnn, side };
                let Ok(curb) = outcome else { continue };
                if let Some(reason) = curb.reason {
                    anomalies.push(Anomaly::new(EntityKey::Blockface(key), AnomalyKind::GeometryInvalid, reason));
                }
                curbs.entry(key).or_insert_with(|| curb.clone());
            }
        }
        curbs
    }

    fn assemble(&self, job: Job<'_>) -> Assembled {
        let Job { segment, side, curb, joined } = job;
        let key = BlockfaceKey { cnn: segment.cnn, side };
        let mut anomalies = Vec::new();
        let mut interpreted = 0;

        let (from_address, to_address) = merge_address_range(key, &joined, &mut anomalies);
        let rules: Vec<Rule> = joined
            .iter()
            .map(|j| {
                let (rule, ok) = self.rule(j, &mut anomalies);
                interpreted += usize::from(ok);
                rule
            })
            .collect();

        let blockface = Blockface {
            key,
            street: segment.street.clone(),
            from_street: segment.from_street.clone(),
            to_street: segment.to_street.clone(),
            cardinal: bearing_degrees(&segment.line).map(|b| cardinal_direction(b, side)),
            from_address,
            to_address,
            geometry: curb.map(|c| c.line.clone()),
            geometry_degraded: curb.is_some_and(|c| c.degraded),
            rules,
        };
        Assembled { blockface, anomalies, interpreted }
    }

    /// Build one rule; the flag is set when the interpreter produced a value.
    fn rule(&self, joined: &Joined<'_>, anomalies: &mut Vec<Anomaly>) -> (Rule, bool) {
        let record = joined.record;
        let routing = self.classifier.route(&record.kind, record);
        let entity = || EntityKey::record(&record.kind, record.index);

        let mut schedule = None;
        let mut interpretation = None;
        match routing.classification {
            Classification::Parser => match self.schedule(record, routing.pattern.is_some()) {
                Some(Ok(parsed)) => schedule = Some(parsed),
                Some(Err(err)) => {
                    anomalies.push(Anomaly::new(entity(), AnomalyKind::ScheduleUnparsed, err.to_string()));
                }
                None => {}
            },
            Classification::Ai => {
                if let (Some(engine), Some(text)) = (self.interpreter, record.text.as_deref()) {
                    match engine.interpret(text) {
                        Ok(value) => interpretation = Some(value),
                        Err(err) => {
                            anomalies.push(Anomaly::new(entity(), AnomalyKind::InterpretationFailed, err.to_string()));
                        }
                    }
                }
            }
        }

        let ok = interpretation.is_some();
        let rule = Rule {
            source: record.kind.clone(),
            source_index: record.index,
            rule_type: record.kind.rule_type(),
            classification: routing.classification,
            matched_pattern: routing.pattern,
            matched_by: joined.matched_by,
            text: record.text.clone(),
            payload: record.payload.clone(),
            schedule,
            interpretation,
        };
        (rule, ok)
    }

    /// Schedule for a PARSER-routed record, or `None` when its feed has no schedule fields.
    fn schedule(&self, record: &RegulationRecord, whitelisted: bool) -> Option<Result<Schedule, ScheduleError>> {
        if whitelisted {
            let text = record.text.as_deref().unwrap_or_default();
            return Some(parse_window_text(text).map(|window| Schedule { days: Vec::new(), window: Some(window) }));
        }
        let fields = self.config.fields(&record.kind)?.schedule_fields.as_ref()?;
        Some(schedule_from_fields(&record.payload, fields))
    }
}
