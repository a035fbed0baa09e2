//! Boundary to the free-text regulation engine.
//!
//! The engine itself lives outside this crate. It is only called for rules the
//! classifier routes to AI, once per rule, and its failures are recorded as
//! anomalies without retrying.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InterpretError(pub String);

/// Turns regulation text into a structured value.
pub trait Interpreter: Send + Sync {
    fn interpret(&self, text: &str) -> Result<serde_json::Value, InterpretError>;
}

impl<F> Interpreter for F
where
    F: Fn(&str) -> Result<serde_json::Value, InterpretError> + Send + Sync,
{
    fn interpret(&self, text: &str) -> Result<serde_json::Value, InterpretError> {
        self(text)
    }
}
