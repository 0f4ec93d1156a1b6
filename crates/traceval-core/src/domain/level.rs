//! Evaluation granularity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::TracevalError;

/// The granularity an evaluator runs at.
///
/// Ordering follows the natural nesting: a trace contains agents, an agent
/// contains LLM spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalLevel {
    /// Whole trace, one result per trace.
    Trace,
    /// One result per agent subtree.
    Agent,
    /// One result per LLM span.
    Span,
}

impl EvalLevel {
    pub const ALL: [EvalLevel; 3] = [EvalLevel::Trace, EvalLevel::Agent, EvalLevel::Span];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Agent => "agent",
            Self::Span => "span",
        }
    }
}

impl Default for EvalLevel {
    fn default() -> Self {
        Self::Trace
    }
}

impl fmt::Display for EvalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvalLevel {
    type Err = TracevalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "agent" => Ok(Self::Agent),
            "span" => Ok(Self::Span),
            other => Err(TracevalError::InvalidConfig(format!(
                "unknown evaluation level '{other}'"
            ))),
        }
    }
}
