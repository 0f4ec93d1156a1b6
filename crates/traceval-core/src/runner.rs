//! Run orchestration: normalize → model → dispatch → aggregate.
//!
//! A [`Runner`] is built once from a [`RunConfig`] and can evaluate any
//! number of trace batches. Each trace's pipeline is independent, so
//! [`Runner::run_parallel`] spreads them over blocking tokio tasks.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{AggregatedResult, Aggregation, AggregationEngine};
use crate::config::RunConfig;
use crate::domain::{RawSpan, Result, TargetedResult, Task};
use crate::eval::{global_registry, BoundEvaluator, EvaluatorRegistry};
use crate::metrics::METRICS;
use crate::model::TraceModel;
use crate::normalize::{normalize_spans, NormalizeOptions};
use crate::obs::{
    emit_evaluator_dispatched, emit_run_finished, emit_run_started, emit_trace_normalized, RunSpan,
};

/// One trace to evaluate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceInput {
    pub trace_id: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub spans: Vec<RawSpan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
}

impl TraceInput {
    pub fn new(trace_id: impl Into<String>, spans: Vec<RawSpan>) -> Self {
        Self {
            trace_id: trace_id.into(),
            spans,
            ..Self::default()
        }
    }

    pub fn with_io(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.input = input.into();
        self.output = output.into();
        self
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.task = Some(task);
        self
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub trace_count: usize,
    /// One entry per configured evaluator, in configuration order.
    pub evaluators: Vec<AggregatedResult>,
}

impl EvaluationReport {
    pub fn evaluator(&self, name: &str) -> Option<&AggregatedResult> {
        self.evaluators.iter().find(|e| e.evaluator == name)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    bound: BoundEvaluator,
    /// Call-level aggregations; empty defers to the evaluator's defaults.
    aggregations: Vec<Aggregation>,
}

/// Results of every evaluator for one trace, indexed like `Runner::entries`.
type TraceResults = Vec<Vec<TargetedResult>>;

#[derive(Debug, Clone)]
pub struct Runner {
    entries: Arc<[Entry]>,
    normalize: NormalizeOptions,
    engine: Arc<AggregationEngine>,
}

impl Runner {
    /// Build from `config`, resolving evaluators in the process-wide registry.
    pub fn new(config: RunConfig) -> Result<Self> {
        Self::with_registry(config, &global_registry())
    }

    /// Build from `config` against an explicit registry. Fails on the first
    /// unknown evaluator or unsupported level.
    pub fn with_registry(config: RunConfig, registry: &EvaluatorRegistry) -> Result<Self> {
        config.validate()?;
        let mut entries = Vec::with_capacity(config.evaluators.len());
        for entry in config.evaluators {
            let evaluator = registry.create(&entry.evaluator, &entry.params)?;
            let name = entry.display_name().to_string();
            let bound = BoundEvaluator::new(evaluator, entry.level)?
                .with_name(name)
                .with_tags(entry.tags);
            let aggregations = if entry.aggregations.is_empty() {
                config.default_aggregations.clone()
            } else {
                entry.aggregations
            };
            entries.push(Entry {
                bound,
                aggregations,
            });
        }
        Ok(Self {
            entries: entries.into(),
            normalize: config.normalize,
            engine: Arc::new(AggregationEngine::new()),
        })
    }

    /// Build from already bound evaluators; their own aggregations apply.
    pub fn from_evaluators(evaluators: Vec<BoundEvaluator>, normalize: NormalizeOptions) -> Self {
        let entries: Vec<Entry> = evaluators
            .into_iter()
            .map(|bound| Entry {
                bound,
                aggregations: Vec::new(),
            })
            .collect();
        Self {
            entries: entries.into(),
            normalize,
            engine: Arc::new(AggregationEngine::new()),
        }
    }

    /// Use `engine` for aggregation, e.g. one with custom kinds registered.
    pub fn with_engine(mut self, engine: AggregationEngine) -> Self {
        self.engine = Arc::new(engine);
        self
    }

    pub fn evaluators(&self) -> impl Iterator<Item = &BoundEvaluator> {
        self.entries.iter().map(|e| &e.bound)
    }

    /// Evaluate `traces` one after another.
    pub fn run(&self, traces: &[TraceInput]) -> Result<EvaluationReport> {
        let run_id = Uuid::new_v4().to_string();
        let _span = RunSpan::enter(&run_id);
        let started_at = Utc::now();
        let clock = Instant::now();
        emit_run_started(&run_id, traces.len(), self.entries.len());

        let per_trace = traces
            .iter()
            .map(|trace| self.evaluate_one(trace))
            .collect::<Result<Vec<_>>>()?;

        Ok(self.finish(run_id, started_at, clock, per_trace))
    }

    /// Evaluate `traces` on tokio's blocking pool, one task per trace.
    ///
    /// Results keep input order regardless of completion order. Every task
    /// is awaited before returning; the first failing trace (in input order)
    /// then fails the run.
    pub async fn run_parallel(&self, traces: Vec<TraceInput>) -> Result<EvaluationReport> {
        let run_id = Uuid::new_v4().to_string();
        let span = RunSpan::span(&run_id);
        let started_at = Utc::now();
        let clock = Instant::now();
        span.in_scope(|| emit_run_started(&run_id, traces.len(), self.entries.len()));

        let handles: Vec<_> = traces
            .into_iter()
            .map(|trace| {
                let runner = self.clone();
                let span = span.clone();
                tokio::task::spawn_blocking(move || span.in_scope(|| runner.evaluate_one(&trace)))
            })
            .collect();

        let mut per_trace = Vec::with_capacity(handles.len());
        let mut first_error = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(results)) => per_trace.push(results),
                Ok(Err(err)) => {
                    first_error.get_or_insert(err);
                }
                Err(err) => {
                    first_error.get_or_insert(err.into());
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        Ok(span.in_scope(|| self.finish(run_id, started_at, clock, per_trace)))
    }

    /// Full pipeline for one trace.
    fn evaluate_one(&self, trace: &TraceInput) -> Result<TraceResults> {
        let normalized = normalize_spans(&trace.spans, &self.normalize);
        emit_trace_normalized(&trace.trace_id, normalized.len(), &normalized.stats);
        METRICS.inc_traces_normalized();
        METRICS.add_spans_dropped(
            (normalized.stats.dropped_infrastructure + normalized.stats.dropped_metric_only) as u64,
        );

        let model = TraceModel::build(
            trace.trace_id.clone(),
            trace.input.clone(),
            trace.output.clone(),
            normalized,
        );

        self.entries
            .iter()
            .map(|entry| -> Result<Vec<TargetedResult>> {
                let results = entry.bound.evaluate(&model, trace.task.as_ref())?;
                emit_evaluator_dispatched(
                    entry.bound.name(),
                    entry.bound.level(),
                    model.trace_id(),
                    results.len(),
                );
                Ok(results)
            })
            .collect()
    }

    fn finish(
        &self,
        run_id: String,
        started_at: DateTime<Utc>,
        clock: Instant,
        per_trace: Vec<TraceResults>,
    ) -> EvaluationReport {
        let trace_count = per_trace.len();
        let mut by_evaluator: Vec<Vec<TargetedResult>> = vec![Vec::new(); self.entries.len()];
        for trace_results in per_trace {
            for (slot, results) in by_evaluator.iter_mut().zip(trace_results) {
                slot.extend(results);
            }
        }

        let mut produced = 0u64;
        let mut skipped = 0u64;
        let evaluators: Vec<AggregatedResult> = self
            .entries
            .iter()
            .zip(&by_evaluator)
            .map(|(entry, results)| {
                let aggregated = self.engine.aggregate(
                    entry.bound.name(),
                    results,
                    Some(entry.aggregations.as_slice()),
                    entry.bound.aggregations(),
                );
                produced += results.len() as u64;
                skipped += aggregated.skipped as u64;
                aggregated
            })
            .collect();

        METRICS.add_results(produced, skipped);
        METRICS.flush();
        let duration_ms = clock.elapsed().as_millis() as u64;
        emit_run_finished(&run_id, duration_ms, produced, skipped);

        EvaluationReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            trace_count,
            evaluators,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvaluatorConfig;
    use crate::domain::{EvalLevel, TracevalError};

    fn traces() -> Vec<TraceInput> {
        vec![
            TraceInput::new(
                "t1",
                vec![
                    RawSpan::new("a", None, "agent"),
                    RawSpan::new("l", Some("a"), "llm"),
                ],
            ),
            TraceInput::new("t2", vec![RawSpan::new("l", None, "llm").with_error(true)]),
        ]
    }

    #[test]
    fn test_run_aggregates_in_config_order() {
        let config = RunConfig::default()
            .with_evaluator(EvaluatorConfig::new("error_free", EvalLevel::Trace))
            .with_evaluator(
                EvaluatorConfig::new("error_free", EvalLevel::Span).with_name("span_errors"),
            );
        let runner = Runner::with_registry(config, &EvaluatorRegistry::with_builtins()).unwrap();
        let report = runner.run(&traces()).unwrap();

        assert_eq!(report.trace_count, 2);
        let names: Vec<&str> = report
            .evaluators
            .iter()
            .map(|e| e.evaluator.as_str())
            .collect();
        assert_eq!(names, vec!["error_free", "span_errors"]);

        let trace_level = report.evaluator("error_free").unwrap();
        assert_eq!(
            trace_level.items,
            vec![("t1".to_string(), 1.0), ("t2".to_string(), 0.0)]
        );
        assert_eq!(trace_level.get("mean"), Some(0.5));
        assert!(report.finished_at >= report.started_at);
    }

    #[test]
    fn test_run_level_default_aggregations() {
        let config = RunConfig {
            default_aggregations: vec![Aggregation::pass_rate(0.5)],
            ..RunConfig::default()
        }
        .with_evaluator(EvaluatorConfig::new("error_free", EvalLevel::Trace));
        let runner = Runner::with_registry(config, &EvaluatorRegistry::with_builtins()).unwrap();
        let report = runner.run(&traces()).unwrap();
        let keys: Vec<&String> = report.evaluators[0].aggregations.keys().collect();
        assert_eq!(keys, vec!["pass_rate_threshold_0.5"]);
    }

    #[test]
    fn test_unsupported_level_fails_fast() {
        let config = RunConfig::default()
            .with_evaluator(EvaluatorConfig::new("token_budget", EvalLevel::Agent));
        let err = Runner::with_registry(config, &EvaluatorRegistry::with_builtins()).unwrap_err();
        assert!(matches!(err, TracevalError::Configuration { .. }));
    }

    #[test]
    fn test_unknown_evaluator_fails_fast() {
        let config = RunConfig::default()
            .with_evaluator(EvaluatorConfig::new("judge", EvalLevel::Trace));
        let err = Runner::with_registry(config, &EvaluatorRegistry::new()).unwrap_err();
        assert!(matches!(err, TracevalError::UnknownEvaluator(_)));
    }
}
