//! Binding an evaluator to one level and running it over a trace.

use std::fmt;
use std::sync::Arc;

use serde_json::json;

use super::evaluator::{supported_levels, Evaluator};
use crate::aggregate::Aggregation;
use crate::domain::{EvalLevel, EvalResult, Result, TargetedResult, Task, TracevalError};
use crate::model::TraceModel;

/// An evaluator fixed to one [`EvalLevel`].
///
/// The level is checked against the evaluator's capabilities once, here.
/// Tags and default aggregations are this instance's own copies; changing
/// them never affects other bindings of the same evaluator.
#[derive(Clone)]
pub struct BoundEvaluator {
    evaluator: Arc<dyn Evaluator>,
    name: String,
    level: EvalLevel,
    supported: Vec<EvalLevel>,
    tags: Vec<String>,
    aggregations: Vec<Aggregation>,
}

impl fmt::Debug for BoundEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundEvaluator")
            .field("name", &self.name)
            .field("level", &self.level)
            .field("supported", &self.supported)
            .field("tags", &self.tags)
            .field("aggregations", &self.aggregations)
            .finish()
    }
}

impl BoundEvaluator {
    /// Bind `evaluator` to `level`.
    ///
    /// Fails with [`TracevalError::Configuration`] when the evaluator does
    /// not implement the level.
    pub fn new(evaluator: Arc<dyn Evaluator>, level: EvalLevel) -> Result<Self> {
        let supported = supported_levels(evaluator.as_ref());
        if !supported.contains(&level) {
            return Err(TracevalError::Configuration {
                evaluator: evaluator.name().to_string(),
                requested: level,
                permitted: supported,
            });
        }
        Ok(Self {
            name: evaluator.name().to_string(),
            tags: evaluator.default_tags(),
            aggregations: evaluator.default_aggregations(),
            evaluator,
            level,
            supported,
        })
    }

    /// Override the display name used in results and reports.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add tags after the evaluator's defaults, skipping duplicates.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            let tag = tag.into();
            if !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
        self
    }

    /// Replace the default aggregations. An empty list keeps the current ones.
    pub fn with_aggregations(mut self, aggregations: Vec<Aggregation>) -> Self {
        if !aggregations.is_empty() {
            self.aggregations = aggregations;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> EvalLevel {
        self.level
    }

    pub fn supported_levels(&self) -> &[EvalLevel] {
        &self.supported
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn aggregations(&self) -> &[Aggregation] {
        &self.aggregations
    }

    pub fn evaluator(&self) -> &Arc<dyn Evaluator> {
        &self.evaluator
    }

    /// Run over one trace.
    ///
    /// - trace: one result, target = trace id
    /// - agent: one result per agent view, details carry `agent_id`
    /// - span: one result per LLM span, details carry `span_id`
    ///
    /// Skips pass through unchanged: they have no detail map, so the
    /// `agent_id`/`span_id` stamp is absent and only
    /// [`TargetedResult::target_id`] identifies their source. The first
    /// callback error aborts and is returned as
    /// [`TracevalError::EvaluatorFailed`].
    pub fn evaluate(&self, trace: &TraceModel, task: Option<&Task>) -> Result<Vec<TargetedResult>> {
        match self.level {
            EvalLevel::Trace => {
                let result = self
                    .evaluator
                    .evaluate_trace(trace, task)
                    .map_err(|err| self.failed(trace.trace_id(), err))?;
                Ok(vec![self.targeted(trace.trace_id(), result)])
            }
            EvalLevel::Agent => {
                let agent_evaluator = self
                    .evaluator
                    .as_agent_evaluator()
                    .ok_or_else(|| self.unsupported())?;
                trace
                    .agent_traces()
                    .iter()
                    .map(|view| -> Result<TargetedResult> {
                        let result = agent_evaluator
                            .evaluate_agent(view, task)
                            .map_err(|err| self.failed(view.trace_id(), err))?
                            .with_detail("agent_id", json!(view.trace_id()));
                        Ok(self.targeted(view.trace_id(), result))
                    })
                    .collect()
            }
            EvalLevel::Span => {
                let span_evaluator = self
                    .evaluator
                    .as_span_evaluator()
                    .ok_or_else(|| self.unsupported())?;
                trace
                    .llm_spans()
                    .iter()
                    .map(|span| -> Result<TargetedResult> {
                        let result = span_evaluator
                            .evaluate_span(span, trace, task)
                            .map_err(|err| self.failed(&span.span_id, err))?
                            .with_detail("span_id", json!(span.span_id));
                        Ok(self.targeted(&span.span_id, result))
                    })
                    .collect()
            }
        }
    }

    fn targeted(&self, target_id: &str, result: EvalResult) -> TargetedResult {
        TargetedResult {
            evaluator: self.name.clone(),
            level: self.level,
            target_id: target_id.to_string(),
            result,
        }
    }

    fn failed(&self, target_id: &str, err: anyhow::Error) -> TracevalError {
        TracevalError::EvaluatorFailed {
            evaluator: self.name.clone(),
            level: self.level,
            target_id: target_id.to_string(),
            message: format!("{err:#}"),
        }
    }

    fn unsupported(&self) -> TracevalError {
        TracevalError::Configuration {
            evaluator: self.name.clone(),
            requested: self.level,
            permitted: self.supported.clone(),
        }
    }
}
