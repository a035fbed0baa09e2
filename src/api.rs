use crate::anomaly::Anomaly;
use crate::config::ReconcileConfig;
use crate::engine::{Checks, Classifier, Reconciler, RunMetrics};
use crate::ingest::{Dataset, records_from_dataset};
use crate::interpret::Interpreter;
use crate::{Blockface, ReconcileError, RegulationRecord, StreetSegment};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Options that affect a run without changing its configuration.
#[derive(Clone, Default)]
pub struct Options {
    /// Validator checks to run.
    pub checks: Checks,
    /// Free-text engine for AI-classified rules. Without one, AI rules are
    /// emitted with `interpretation: None`.
    pub interpreter: Option<Arc<dyn Interpreter>>,
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("checks", &self.checks)
            .field("interpreter", &self.interpreter.as_ref().map(|_| "<dyn Interpreter>"))
            .finish()
    }
}

/// Materialized input for one run.
#[derive(Debug, Clone, Default)]
pub struct ReconcileInput {
    pub segments: Vec<StreetSegment>,
    pub records: Vec<RegulationRecord>,
    /// Findings from field mapping, carried into the result's anomaly report.
    pub findings: Vec<Anomaly>,
}

impl ReconcileInput {
    pub fn new(segments: Vec<StreetSegment>, records: Vec<RegulationRecord>) -> Self {
        ReconcileInput { segments, records, findings: Vec::new() }
    }

    /// Map every feed in `dataset` through the field table in `config`.
    pub fn from_dataset(dataset: &Dataset, config: &ReconcileConfig) -> Self {
        let (records, findings) = records_from_dataset(dataset, config);
        ReconcileInput { segments: dataset.segments.clone(), records, findings }
    }
}

/// Result from [`reconcile`] and [`reconcile_with`].
///
/// Always carries both the best-effort blockfaces and the full anomaly list.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileResult {
    /// One entry per segment side, sorted by key.
    pub blockfaces: Vec<Blockface>,
    /// Sorted findings.
    pub anomalies: Vec<Anomaly>,
    /// Records that matched no blockface.
    pub dropped: usize,
    #[serde(skip)]
    pub metrics: RunMetrics,
}

/// Reconcile `input` with the default configuration and options.
///
/// # Example
/// ```
/// use curbside::{Cnn, LineString, ReconcileInput, RegulationRecord, Side, SourceKind, StreetSegment, reconcile};
///
/// let segment = StreetSegment {
///     cnn: Cnn(1),
///     line: LineString::from(vec![(-122.4098, 37.7592), (-122.4089, 37.7592)]),
///     street: "20TH ST".into(),
///     from_street: None,
///     to_street: None,
/// };
/// let mut meter = RegulationRecord::new(SourceKind::Meter, 0);
/// meter.cnn = Some(Cnn(1));
/// meter.side = Some("L".into());
///
/// let out = reconcile(&ReconcileInput::new(vec![segment], vec![meter])).unwrap();
/// assert_eq!(out.blockfaces.len(), 2);
/// assert_eq!(out.blockfaces[0].key.side, Side::Left);
/// assert_eq!(out.blockfaces[0].rules.len(), 1);
/// ```
pub fn reconcile(input: &ReconcileInput) -> Result<ReconcileResult, ReconcileError> {
    reconcile_with(input, &ReconcileConfig::default(), &Options::default())
}

/// Reconcile `input` with an explicit configuration and options.
///
/// Fails only when the configuration is unusable or there is nothing to
/// reconcile; every other problem is reported in the result.
pub fn reconcile_with(
    input: &ReconcileInput,
    config: &ReconcileConfig,
    options: &Options,
) -> Result<ReconcileResult, ReconcileError> {
    config.validate()?;
    let classifier = Classifier::from_config(config)?;
    if input.segments.is_empty() {
        return Err(ReconcileError::NoSegments);
    }
    if input.records.is_empty() {
        return Err(ReconcileError::NoRegulationSources);
    }

    let mut result = Reconciler::new(config, classifier)
        .with_checks(options.checks)
        .with_interpreter(options.interpreter.as_deref())
        .run(&input.segments, &input.records);

    if !input.findings.is_empty() {
        result.anomalies.extend(input.findings.iter().cloned());
        result.anomalies.sort();
    }
    Ok(result)
}
