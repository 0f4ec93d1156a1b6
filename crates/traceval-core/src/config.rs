//! Run configuration, loadable from TOML or JSON.
//!
//! ```toml
//! default_aggregations = ["mean"]
//!
//! [normalize]
//! create_synthetic_root = true
//!
//! [[evaluators]]
//! evaluator = "tool_sequence"
//! level = "agent"
//! aggregations = ["mean", { kind = "pass_rate", threshold = 0.9 }]
//!
//! [[evaluators]]
//! evaluator = "token_budget"
//! name = "tight_budget"
//! level = "span"
//! params = { max_tokens = 512 }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregation;
use crate::domain::{EvalLevel, Result, TracevalError};
use crate::eval::EvaluatorParams;
use crate::normalize::NormalizeOptions;

/// One evaluator entry of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Registry name.
    pub evaluator: String,
    /// Display name in results; defaults to the registry name. Must be
    /// unique within a run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub level: EvalLevel,
    /// Overrides the run's `default_aggregations` for this evaluator.
    #[serde(default)]
    pub aggregations: Vec<Aggregation>,
    /// Added to the evaluator's default tags.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub params: EvaluatorParams,
}

impl EvaluatorConfig {
    pub fn new(evaluator: impl Into<String>, level: EvalLevel) -> Self {
        Self {
            evaluator: evaluator.into(),
            name: None,
            level,
            aggregations: Vec::new(),
            tags: Vec::new(),
            params: EvaluatorParams::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_aggregations(mut self, aggregations: Vec<Aggregation>) -> Self {
        self.aggregations = aggregations;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.evaluator)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub evaluators: Vec<EvaluatorConfig>,
    #[serde(default)]
    pub normalize: NormalizeOptions,
    /// Aggregations for every evaluator that does not list its own. When
    /// empty, each evaluator's built-in defaults apply.
    #[serde(default)]
    pub default_aggregations: Vec<Aggregation>,
}

impl RunConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load by extension: `.json` is JSON, anything else TOML.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_toml_str(&text),
        }
    }

    pub fn with_evaluator(mut self, evaluator: EvaluatorConfig) -> Self {
        self.evaluators.push(evaluator);
        self
    }

    /// Reject empty registry names and duplicate display names.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.evaluators {
            if entry.evaluator.trim().is_empty() {
                return Err(TracevalError::InvalidConfig(
                    "evaluator entry without a registry name".to_string(),
                ));
            }
            if !seen.insert(entry.display_name()) {
                return Err(TracevalError::InvalidConfig(format!(
                    "duplicate evaluator name '{}'; set `name` to tell them apart",
                    entry.display_name()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
default_aggregations = ["mean", "p90"]

[normalize]
create_synthetic_root = false

[[evaluators]]
evaluator = "tool_sequence"
level = "agent"
aggregations = ["mean", { kind = "pass_rate", threshold = 0.9 }]
tags = ["nightly"]

[[evaluators]]
evaluator = "token_budget"
name = "tight_budget"
level = "span"
params = { max_tokens = 512 }
"#;

    #[test]
    fn test_parse_toml() {
        let config = RunConfig::from_toml_str(SAMPLE).expect("parse");
        assert!(!config.normalize.create_synthetic_root);
        assert_eq!(config.default_aggregations.len(), 2);
        assert_eq!(config.evaluators.len(), 2);

        let tools = &config.evaluators[0];
        assert_eq!(tools.level, EvalLevel::Agent);
        let names: Vec<String> = tools.aggregations.iter().map(Aggregation::name).collect();
        assert_eq!(names, vec!["mean", "pass_rate_threshold_0.9"]);
        assert_eq!(tools.display_name(), "tool_sequence");

        let budget = &config.evaluators[1];
        assert_eq!(budget.display_name(), "tight_budget");
        assert_eq!(budget.params["max_tokens"], serde_json::json!(512));
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = RunConfig::from_toml_str("[[evaluators]]\nevaluator = \"error_free\"\n")
            .expect("parse");
        assert!(config.normalize.create_synthetic_root);
        assert_eq!(config.evaluators[0].level, EvalLevel::Trace);
        assert!(config.default_aggregations.is_empty());
    }

    #[test]
    fn test_parse_json() {
        let config = RunConfig::from_json_str(
            r#"{"evaluators": [{"evaluator": "error_free", "level": "span"}]}"#,
        )
        .expect("parse");
        assert_eq!(config.evaluators[0].level, EvalLevel::Span);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let config = RunConfig::default()
            .with_evaluator(EvaluatorConfig::new("error_free", EvalLevel::Trace))
            .with_evaluator(EvaluatorConfig::new("error_free", EvalLevel::Span));
        assert!(matches!(
            config.validate(),
            Err(TracevalError::InvalidConfig(_))
        ));

        let spans = EvaluatorConfig::new("error_free", EvalLevel::Span).with_name("span_errors");
        let renamed = RunConfig::default()
            .with_evaluator(EvaluatorConfig::new("error_free", EvalLevel::Trace))
            .with_evaluator(spans);
        assert!(renamed.validate().is_ok());
    }

    #[test]
    fn test_unknown_level_is_a_parse_error() {
        let toml = "[[evaluators]]\nevaluator = \"x\"\nlevel = \"session\"\n";
        let err = RunConfig::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, TracevalError::TomlDe(_)));
    }
}
