//! Per-item evaluation outcomes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{Result, TracevalError};
use super::level::EvalLevel;

/// A successful score with optional explanation and free-form details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    explanation: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    details: BTreeMap<String, Value>,
}

/// Outcome of one evaluator callback.
///
/// A skip is a documented, non-error outcome (missing ground truth, missing
/// dependency). Score accessors on a skip return [`TracevalError::NotScored`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvalResult {
    Scored(Score),
    Skipped { reason: String },
}

impl EvalResult {
    /// A scored result. Fails on NaN or values outside `[0, 1]`.
    pub fn scored(value: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&value) {
            return Err(TracevalError::InvalidScore(value));
        }
        Ok(Self::Scored(Score {
            value,
            explanation: None,
            details: BTreeMap::new(),
        }))
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Attach an explanation. No-op on skipped results.
    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        if let Self::Scored(score) = &mut self {
            score.explanation = Some(explanation.into());
        }
        self
    }

    /// Attach a detail entry. No-op on skipped results.
    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        if let Self::Scored(score) = &mut self {
            score.details.insert(key.into(), value);
        }
        self
    }

    pub fn is_scored(&self) -> bool {
        matches!(self, Self::Scored(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    pub fn score(&self) -> Result<f64> {
        self.as_scored().map(|s| s.value)
    }

    pub fn explanation(&self) -> Result<Option<&str>> {
        self.as_scored().map(|s| s.explanation.as_deref())
    }

    pub fn details(&self) -> Result<&BTreeMap<String, Value>> {
        self.as_scored().map(|s| &s.details)
    }

    /// Skip reason, `None` for scored results.
    pub fn skip_reason(&self) -> Option<&str> {
        match self {
            Self::Skipped { reason } => Some(reason),
            Self::Scored(_) => None,
        }
    }

    fn as_scored(&self) -> Result<&Score> {
        match self {
            Self::Scored(score) => Ok(score),
            Self::Skipped { reason } => Err(TracevalError::NotScored {
                reason: reason.clone(),
            }),
        }
    }
}

/// An [`EvalResult`] bound to the item it was computed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetedResult {
    pub evaluator: String,
    pub level: EvalLevel,
    /// Trace id, agent span id or LLM span id, depending on `level`.
    pub target_id: String,
    pub result: EvalResult,
}
