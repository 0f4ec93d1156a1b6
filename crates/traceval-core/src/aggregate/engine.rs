//! Reduce per-item scores into named statistics.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::aggregation::{Aggregation, AggregationKind, DEFAULT_PASS_THRESHOLD};
use crate::domain::TargetedResult;
use crate::obs::emit_aggregation_failed;

/// Why one aggregation could not be computed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AggregationError {
    #[error("{kind} needs at least {required} value(s), got {actual}")]
    InsufficientData {
        kind: String,
        required: usize,
        actual: usize,
    },

    #[error("unknown aggregation: {0}")]
    Unknown(String),

    #[error("aggregation name {0} is reserved for a built-in kind")]
    Reserved(String),

    #[error("invalid parameter {param} for {kind}: {message}")]
    InvalidParameter {
        kind: String,
        param: String,
        message: String,
    },

    #[error("{0}")]
    Custom(String),
}

/// A user-registered aggregation.
pub type AggregationFn =
    Arc<dyn Fn(&[f64], &BTreeMap<String, Value>) -> Result<f64, AggregationError> + Send + Sync>;

/// Aggregated outcome of one evaluator over a run.
///
/// Failed aggregations hold NaN, which serializes as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedResult {
    pub evaluator: String,
    /// Number of scored items.
    pub count: usize,
    pub skipped: usize,
    pub aggregations: BTreeMap<String, f64>,
    /// `(target_id, score)` in dispatch order.
    pub items: Vec<(String, f64)>,
}

impl AggregatedResult {
    pub fn get(&self, aggregation: &str) -> Option<f64> {
        self.aggregations.get(aggregation).copied()
    }
}

/// Computes built-in and registered aggregations.
#[derive(Clone, Default)]
pub struct AggregationEngine {
    custom: HashMap<String, AggregationFn>,
}

impl fmt::Debug for AggregationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.custom.keys().collect();
        names.sort();
        f.debug_struct("AggregationEngine")
            .field("custom", &names)
            .finish()
    }
}

impl AggregationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom aggregation under `name`. Built-in names are
    /// reserved; re-registering a custom name replaces it.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F) -> Result<(), AggregationError>
    where
        F: Fn(&[f64], &BTreeMap<String, Value>) -> Result<f64, AggregationError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        if !matches!(AggregationKind::parse(&name), AggregationKind::Custom(_)) {
            return Err(AggregationError::Reserved(name));
        }
        self.custom.insert(name, Arc::new(f));
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.custom.contains_key(name)
    }

    /// Compute one aggregation over `values`.
    pub fn compute(
        &self,
        aggregation: &Aggregation,
        values: &[f64],
    ) -> Result<f64, AggregationError> {
        let kind = aggregation.kind();
        let n = values.len();
        let need = |required: usize| -> Result<(), AggregationError> {
            if n < required {
                Err(AggregationError::InsufficientData {
                    kind: kind.to_string(),
                    required,
                    actual: n,
                })
            } else {
                Ok(())
            }
        };

        match kind {
            AggregationKind::Count => Ok(n as f64),
            AggregationKind::Sum => Ok(values.iter().sum()),
            AggregationKind::Mean => {
                need(1)?;
                Ok(mean(values))
            }
            AggregationKind::Min => {
                need(1)?;
                Ok(values.iter().copied().fold(f64::INFINITY, f64::min))
            }
            AggregationKind::Max => {
                need(1)?;
                Ok(values.iter().copied().fold(f64::NEG_INFINITY, f64::max))
            }
            AggregationKind::Variance => {
                need(2)?;
                Ok(sample_variance(values))
            }
            AggregationKind::Stdev => {
                need(2)?;
                Ok(sample_variance(values).sqrt())
            }
            AggregationKind::Median => percentile(values, 50.0),
            AggregationKind::P50
            | AggregationKind::P75
            | AggregationKind::P90
            | AggregationKind::P95
            | AggregationKind::P99 => {
                let p = kind.percentile().unwrap_or(50.0);
                percentile(values, p)
            }
            AggregationKind::PassRate => {
                need(1)?;
                let threshold = match aggregation.params().get("threshold") {
                    None => DEFAULT_PASS_THRESHOLD,
                    Some(v) => v.as_f64().ok_or_else(|| invalid_threshold(kind, v))?,
                };
                let passed = values.iter().filter(|&&v| v >= threshold).count();
                Ok(passed as f64 / n as f64)
            }
            AggregationKind::Custom(name) => {
                let f = self
                    .custom
                    .get(name)
                    .ok_or_else(|| AggregationError::Unknown(name.clone()))?;
                f(values, aggregation.params())
            }
        }
    }

    /// Aggregate one evaluator's results.
    ///
    /// The aggregation list is `call_level` when non-empty, else
    /// `evaluator_default` when non-empty, else `[mean]`. Skipped results
    /// are counted but never scored. A failing aggregation is recorded as
    /// NaN and the others still run.
    pub fn aggregate(
        &self,
        evaluator: &str,
        results: &[TargetedResult],
        call_level: Option<&[Aggregation]>,
        evaluator_default: &[Aggregation],
    ) -> AggregatedResult {
        let mut items = Vec::with_capacity(results.len());
        let mut skipped = 0;
        for targeted in results {
            match targeted.result.score() {
                Ok(score) => items.push((targeted.target_id.clone(), score)),
                Err(_) => skipped += 1,
            }
        }

        let mut aggregations = BTreeMap::new();
        if !items.is_empty() {
            let values: Vec<f64> = items.iter().map(|(_, score)| *score).collect();
            for aggregation in select_aggregations(call_level, evaluator_default).iter() {
                let name = aggregation.name();
                let value = match self.compute(aggregation, &values) {
                    Ok(value) => value,
                    Err(err) => {
                        emit_aggregation_failed(evaluator, &name, &err);
                        f64::NAN
                    }
                };
                aggregations.insert(name, value);
            }
        }

        AggregatedResult {
            evaluator: evaluator.to_string(),
            count: items.len(),
            skipped,
            aggregations,
            items,
        }
    }
}

fn select_aggregations(
    call_level: Option<&[Aggregation]>,
    evaluator_default: &[Aggregation],
) -> Vec<Aggregation> {
    match call_level {
        Some(list) if !list.is_empty() => list.to_vec(),
        _ if !evaluator_default.is_empty() => evaluator_default.to_vec(),
        _ => vec![Aggregation::mean()],
    }
}

fn invalid_threshold(kind: &AggregationKind, value: &Value) -> AggregationError {
    AggregationError::InvalidParameter {
        kind: kind.to_string(),
        param: "threshold".to_string(),
        message: format!("expected a number, got {value}"),
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_variance(values: &[f64]) -> f64 {
    let m = mean(values);
    let squares: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    squares / (values.len() - 1) as f64
}

/// Linear-interpolated percentile, `p` in `[0, 100]`.
///
/// rank = (n - 1) * p / 100; the result interpolates between the sorted
/// values either side of the rank.
pub fn percentile(values: &[f64], p: f64) -> Result<f64, AggregationError> {
    if values.is_empty() {
        return Err(AggregationError::InsufficientData {
            kind: format!("p{p}"),
            required: 1,
            actual: 0,
        });
    }
    if !(0.0..=100.0).contains(&p) {
        return Err(AggregationError::InvalidParameter {
            kind: "percentile".to_string(),
            param: "p".to_string(),
            message: format!("{p} is outside [0, 100]"),
        });
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (sorted.len() - 1) as f64 * p / 100.0;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = rank - lo as f64;
    Ok(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}
