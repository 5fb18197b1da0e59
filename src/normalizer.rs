//! Reduce raw classification replies to one canonical prediction.
//!
//! [`ClassifyReply`] is the only place the loosely-typed reply shapes exist.
//! Everything past [`normalize`] sees either a [`PredictionOutcome`] or a
//! [`ClassifyFailure`].

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::advice::advice_for;
use crate::classifier::{ClassifyReply, Settled};

/// One label/confidence pair from a classification attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionCandidate {
    pub label: String,
    /// In `[0, 1]`.
    pub confidence: f64,
}

/// The top candidate, decorated for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionOutcome {
    pub label: String,
    pub confidence_pct: f64,
    pub advice: String,
    pub glyph: String,
    pub category: String,
}

impl PredictionOutcome {
    pub fn from_candidate(candidate: &PredictionCandidate) -> Self {
        let advice = advice_for(&candidate.label);
        Self {
            label: candidate.label.clone(),
            confidence_pct: candidate.confidence * 100.0,
            advice: advice.advice.to_string(),
            glyph: advice.glyph.to_string(),
            category: advice.category.to_string(),
        }
    }
}

impl fmt::Display for PredictionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({:.1}%): {}",
            self.glyph, self.label, self.confidence_pct, self.advice
        )
    }
}

/// Non-fatal reasons a classification did not produce an outcome.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifyFailure {
    /// The classifier reported an error.
    #[error("Classifier error: {0}")]
    Failed(String),
    /// The classifier answered, but with nothing usable.
    #[error("No prediction results")]
    NoResults,
}

/// Normalise `reply`, waiting at most `timeout` for a deferred value.
pub fn normalize(reply: ClassifyReply, timeout: Duration) -> Result<PredictionOutcome, ClassifyFailure> {
    let results = match reply {
        ClassifyReply::Callback { error, results } => callback_results(error, results)?,
        ClassifyReply::Deferred(deferred) => match deferred.wait(timeout) {
            Settled::Resolved(value) => Some(value),
            Settled::Rejected(error) => return Err(ClassifyFailure::Failed(describe_error(&error))),
            Settled::TimedOut => {
                return Err(ClassifyFailure::Failed(format!(
                    "No classification reply within {} ms",
                    timeout.as_millis()
                )));
            }
            Settled::Abandoned => {
                return Err(ClassifyFailure::Failed(
                    "Classification was abandoned before it settled".to_string(),
                ));
            }
        },
    };
    let candidate = select_top(results.as_ref()).ok_or(ClassifyFailure::NoResults)?;
    Ok(PredictionOutcome::from_candidate(&candidate))
}

fn callback_results(
    error: Option<Value>,
    results: Option<Value>,
) -> Result<Option<Value>, ClassifyFailure> {
    let error = error.filter(is_error_set);
    let results = results.filter(|value| !value.is_null());
    match (error, results) {
        // Candidates delivered through the error slot.
        (Some(Value::Array(items)), None) => Ok(Some(Value::Array(items))),
        (Some(error), _) => Err(ClassifyFailure::Failed(describe_error(&error))),
        (None, results) => Ok(results),
    }
}

/// `null`, `false`, `0` and `""` in the error slot mean "no error".
fn is_error_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Highest-confidence valid candidate; the first one wins ties.
pub fn select_top(results: Option<&Value>) -> Option<PredictionCandidate> {
    let items = results?.as_array()?;
    let mut best: Option<PredictionCandidate> = None;
    for candidate in items.iter().filter_map(parse_candidate) {
        let better = best
            .as_ref()
            .is_none_or(|current| candidate.confidence > current.confidence);
        if better {
            best = Some(candidate);
        }
    }
    best
}

fn parse_candidate(value: &Value) -> Option<PredictionCandidate> {
    let label = value.get("label")?.as_str()?.trim();
    let confidence = value.get("confidence")?.as_f64()?;
    if label.is_empty() || !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return None;
    }
    Some(PredictionCandidate {
        label: label.to_string(),
        confidence,
    })
}

fn describe_error(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}
