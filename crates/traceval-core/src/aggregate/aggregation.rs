//! Aggregation specifiers and their identity strings.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default `threshold` for [`AggregationKind::PassRate`].
pub const DEFAULT_PASS_THRESHOLD: f64 = 0.7;

/// Statistic to compute over a list of scores.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AggregationKind {
    Mean,
    Median,
    Min,
    Max,
    Sum,
    Count,
    Stdev,
    Variance,
    P50,
    P75,
    P90,
    P95,
    P99,
    /// Fraction of scores at or above `threshold`.
    PassRate,
    /// Looked up by name in the engine's custom registry.
    Custom(String),
}

impl AggregationKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Min => "min",
            Self::Max => "max",
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Stdev => "stdev",
            Self::Variance => "variance",
            Self::P50 => "p50",
            Self::P75 => "p75",
            Self::P90 => "p90",
            Self::P95 => "p95",
            Self::P99 => "p99",
            Self::PassRate => "pass_rate",
            Self::Custom(name) => name,
        }
    }

    /// Parse a kind name. Unrecognised names become [`AggregationKind::Custom`].
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "mean" | "avg" | "average" => Self::Mean,
            "median" => Self::Median,
            "min" => Self::Min,
            "max" => Self::Max,
            "sum" => Self::Sum,
            "count" => Self::Count,
            "stdev" | "std" => Self::Stdev,
            "variance" | "var" => Self::Variance,
            "p50" => Self::P50,
            "p75" => Self::P75,
            "p90" => Self::P90,
            "p95" => Self::P95,
            "p99" => Self::P99,
            "pass_rate" => Self::PassRate,
            _ => Self::Custom(name.trim().to_string()),
        }
    }

    /// Percentile rank for the `pNN` kinds.
    pub fn percentile(&self) -> Option<f64> {
        match self {
            Self::P50 => Some(50.0),
            Self::P75 => Some(75.0),
            Self::P90 => Some(90.0),
            Self::P95 => Some(95.0),
            Self::P99 => Some(99.0),
            _ => None,
        }
    }
}

impl fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An aggregation kind plus its parameters.
///
/// Parameters are kept sorted by key so the identity string never depends
/// on the order they were supplied in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "AggregationRepr", into = "AggregationRepr")]
pub struct Aggregation {
    kind: AggregationKind,
    params: BTreeMap<String, Value>,
}

impl Aggregation {
    /// Aggregation with the kind's default parameters.
    pub fn new(kind: AggregationKind) -> Self {
        let mut params = BTreeMap::new();
        if kind == AggregationKind::PassRate {
            params.insert("threshold".to_string(), Value::from(DEFAULT_PASS_THRESHOLD));
        }
        Self { kind, params }
    }

    pub fn mean() -> Self {
        Self::new(AggregationKind::Mean)
    }

    pub fn pass_rate(threshold: f64) -> Self {
        Self::new(AggregationKind::PassRate).with_param("threshold", threshold)
    }

    pub fn custom(name: impl Into<String>) -> Self {
        Self::new(AggregationKind::Custom(name.into()))
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> &AggregationKind {
        &self.kind
    }

    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(Value::as_f64)
    }

    /// Identity string: the kind name, then `_key_value` for each parameter
    /// in key order.
    pub fn name(&self) -> String {
        let mut name = self.kind.as_str().to_string();
        for (key, value) in &self.params {
            name.push('_');
            name.push_str(key);
            name.push('_');
            match value {
                Value::String(s) => name.push_str(s),
                other => name.push_str(&other.to_string()),
            }
        }
        name
    }
}

impl From<AggregationKind> for Aggregation {
    fn from(kind: AggregationKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Config form: a bare name (`"p95"`) or a table with `kind` and parameters
/// (`{ kind = "pass_rate", threshold = 0.9 }`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum AggregationRepr {
    Name(String),
    Table {
        kind: String,
        #[serde(flatten)]
        params: BTreeMap<String, Value>,
    },
}

impl From<AggregationRepr> for Aggregation {
    fn from(repr: AggregationRepr) -> Self {
        match repr {
            AggregationRepr::Name(name) => Self::new(AggregationKind::parse(&name)),
            AggregationRepr::Table { kind, params } => {
                let mut aggregation = Self::new(AggregationKind::parse(&kind));
                aggregation.params.extend(params);
                aggregation
            }
        }
    }
}

impl From<Aggregation> for AggregationRepr {
    fn from(aggregation: Aggregation) -> Self {
        if aggregation.params.is_empty() {
            AggregationRepr::Name(aggregation.kind.as_str().to_string())
        } else {
            AggregationRepr::Table {
                kind: aggregation.kind.as_str().to_string(),
                params: aggregation.params,
            }
        }
    }
}
