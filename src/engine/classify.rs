//! Rule routing: deterministic parser or free-text interpretation.
//!
//! Routing is a table over [`SourceKind`]:
//!
//! ```text
//! Meter     ──▶ PARSER
//! Sweeping  ──▶ PARSER
//! General   ──▶ whitelist pre-check ──┬─ match ──▶ PARSER (pattern recorded)
//!                                     └─ none  ──▶ AI
//! Other(_)  ──▶ AI
//! ```
//!
//! The GENERAL whitelist is the single extension point. Built-in patterns only
//! accept texts that are fully structured (one time window, no exceptions);
//! anything with qualifiers stays on the AI path. Configuration may append more
//! patterns through [`Classifier::with_pattern`].

use crate::config::ReconcileConfig;
use crate::{Classification, ReconcileError, RegulationRecord, RuleType, SourceKind};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

static DEFAULT_CLASSIFIER: Lazy<Classifier> = Lazy::new(Classifier::new);

/// A named whitelist pattern for GENERAL regulation text.
#[derive(Debug, Clone)]
pub struct TextPattern {
    pub name: Cow<'static, str>,
    pub regex: Regex,
}

impl TextPattern {
    pub fn from_static(name: &'static str, regex: &'static Regex) -> Self {
        TextPattern { name: Cow::Borrowed(name), regex: regex.clone() }
    }

    pub fn compile(name: impl Into<String>, pattern: &str) -> Result<Self, ReconcileError> {
        let name = name.into();
        match Regex::new(pattern) {
            Ok(regex) => Ok(TextPattern { name: Cow::Owned(name), regex }),
            Err(source) => Err(ReconcileError::InvalidPattern { name, source }),
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text.trim())
    }
}

/// Outcome of routing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routing {
    pub classification: Classification,
    /// Whitelist pattern that fired, for GENERAL records routed to the parser.
    pub pattern: Option<String>,
}

impl Routing {
    fn parser() -> Self {
        Routing { classification: Classification::Parser, pattern: None }
    }

    fn ai() -> Self {
        Routing { classification: Classification::Ai, pattern: None }
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    general_patterns: Vec<TextPattern>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    /// Classifier with the built-in GENERAL whitelist.
    pub fn new() -> Self {
        Classifier {
            general_patterns: vec![
                text_pattern!(
                    name: "single-time-window",
                    pattern: r"(?i)^(?:no\s+(?:parking|stopping)\s+)?\d{1,2}(?::\d{2})?\s*(?:am|pm)\s*(?:-|to)\s*\d{1,2}(?::\d{2})?\s*(?:am|pm)$",
                ),
                text_pattern!(
                    name: "no-parking-anytime",
                    pattern: r"(?i)^no\s+(?:parking|stopping)\s+any\s*time$",
                ),
            ],
        }
    }

    /// Classifier with no whitelist: every GENERAL record routes to AI.
    pub fn empty() -> Self {
        Classifier { general_patterns: Vec::new() }
    }

    pub fn with_pattern(mut self, pattern: TextPattern) -> Self {
        self.general_patterns.push(pattern);
        self
    }

    /// Built-in whitelist plus the patterns listed in `config`.
    pub fn from_config(config: &ReconcileConfig) -> Result<Self, ReconcileError> {
        let mut classifier = Classifier::new();
        for p in &config.general_whitelist {
            classifier = classifier.with_pattern(TextPattern::compile(&p.name, &p.pattern)?);
        }
        Ok(classifier)
    }

    pub fn patterns(&self) -> &[TextPattern] {
        &self.general_patterns
    }

    pub fn route(&self, kind: &SourceKind, record: &RegulationRecord) -> Routing {
        match kind {
            SourceKind::Meter | SourceKind::Sweeping => Routing::parser(),
            SourceKind::General => {
                let Some(text) = record.text.as_deref() else {
                    return Routing::ai();
                };
                match self.general_patterns.iter().find(|p| p.matches(text)) {
                    Some(p) => Routing { classification: Classification::Parser, pattern: Some(p.name.to_string()) },
                    None => Routing::ai(),
                }
            }
            SourceKind::Other(label) => {
                tracing::debug!(source = %label, "unknown source kind routed to AI");
                Routing::ai()
            }
        }
    }

    pub fn classify(&self, kind: &SourceKind, record: &RegulationRecord) -> Classification {
        self.route(kind, record).classification
    }
}

/// Classify with the built-in whitelist.
pub fn classify(kind: &SourceKind, record: &RegulationRecord) -> Classification {
    DEFAULT_CLASSIFIER.classify(kind, record)
}

/// Tag the routing table implies for a rule of `rule_type`.
///
/// Parking regulations are AI unless a whitelist pattern promoted them.
pub(crate) fn expected_classification(rule_type: RuleType, whitelisted: bool) -> Classification {
    match rule_type {
        RuleType::Meter | RuleType::StreetSweeping => Classification::Parser,
        RuleType::ParkingRegulation if whitelisted => Classification::Parser,
        RuleType::ParkingRegulation => Classification::Ai,
    }
}
