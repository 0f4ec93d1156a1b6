//! Domain-level error taxonomy for traceval.

use super::level::EvalLevel;

/// traceval domain errors.
#[derive(Debug, thiserror::Error)]
pub enum TracevalError {
    #[error(
        "evaluator {evaluator} does not support the {requested} level; permitted levels: {}",
        format_levels(permitted)
    )]
    Configuration {
        evaluator: String,
        requested: EvalLevel,
        permitted: Vec<EvalLevel>,
    },

    #[error("unknown evaluator: {0}")]
    UnknownEvaluator(String),

    #[error("score {0} is outside [0, 1]")]
    InvalidScore(f64),

    #[error("result was skipped, no score available: {reason}")]
    NotScored { reason: String },

    #[error("evaluator {evaluator} failed at {level} level on {target_id}: {message}")]
    EvaluatorFailed {
        evaluator: String,
        level: EvalLevel,
        target_id: String,
        message: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn format_levels(levels: &[EvalLevel]) -> String {
    let names: Vec<String> = levels.iter().map(|l| format!("\"{l}\"")).collect();
    format!("[{}]", names.join(", "))
}

/// Result type for traceval domain operations.
pub type Result<T> = std::result::Result<T, TracevalError>;
