//! Agent-scoped views over a trace.

use std::collections::HashSet;

use serde::Serialize;

use super::metrics::TraceMetrics;
use super::trace::TraceModel;
use super::typed::{AgentSpan, LlmSpan, RetrieverSpan, ToolSpan, TypedSpan};
use crate::normalize::{MetricContribution, SemanticKind};

/// The part of a trace executed under one agent.
///
/// For a trace without agent spans this wraps the whole trace and carries
/// the trace id.
#[derive(Debug, Clone, Serialize)]
pub struct AgentTrace {
    trace_id: String,
    agent: Option<AgentSpan>,
    input: String,
    output: String,
    steps: Vec<TypedSpan>,
    metrics: TraceMetrics,
}

impl AgentTrace {
    /// View over the whole trace, used when it has no agent spans.
    pub fn whole_trace(model: &TraceModel) -> Self {
        let steps = dedup_steps(model.steps().iter());
        let metrics = TraceMetrics::fold(&steps, model.contributions());
        Self {
            trace_id: model.trace_id().to_string(),
            agent: None,
            input: model.input().to_string(),
            output: model.output().to_string(),
            steps,
            metrics,
        }
    }

    /// View over the filtered subtree rooted at `agent`.
    pub fn for_agent(model: &TraceModel, agent: &AgentSpan) -> Self {
        let tree = model.tree();
        let steps = dedup_steps(
            model
                .steps()
                .iter()
                .filter(|step| tree.is_descendant_of(step.span_id(), &agent.span_id)),
        );

        let mut ids: HashSet<&str> = steps.iter().map(TypedSpan::span_id).collect();
        ids.insert(&agent.span_id);
        let contributions: Vec<&MetricContribution> = model
            .contributions()
            .iter()
            .filter(|c| c.anchor_id.as_deref().is_some_and(|a| ids.contains(a)))
            .collect();

        let mut metrics = TraceMetrics::fold(&steps, contributions);
        if agent.error {
            metrics.error_count += 1;
        }

        Self {
            trace_id: agent.span_id.clone(),
            agent: Some(agent.clone()),
            input: non_empty_or(&agent.input, model.input()),
            output: non_empty_or(&agent.output, model.output()),
            steps,
            metrics,
        }
    }

    /// Agent span id, or the trace id for a whole-trace view.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn agent(&self) -> Option<&AgentSpan> {
        self.agent.as_ref()
    }

    pub fn is_whole_trace(&self) -> bool {
        self.agent.is_none()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn steps(&self) -> &[TypedSpan] {
        &self.steps
    }

    pub fn metrics(&self) -> &TraceMetrics {
        &self.metrics
    }

    pub fn llm_spans(&self) -> impl Iterator<Item = &LlmSpan> {
        self.steps.iter().filter_map(|s| match s {
            TypedSpan::Llm(llm) => Some(llm),
            _ => None,
        })
    }

    pub fn tool_spans(&self) -> impl Iterator<Item = &ToolSpan> {
        self.steps.iter().filter_map(|s| match s {
            TypedSpan::Tool(tool) => Some(tool),
            _ => None,
        })
    }

    pub fn retriever_spans(&self) -> impl Iterator<Item = &RetrieverSpan> {
        self.steps.iter().filter_map(|s| match s {
            TypedSpan::Retriever(retriever) => Some(retriever),
            _ => None,
        })
    }

    /// Tool names in call order.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tool_spans().map(|t| t.name.as_str()).collect()
    }

    pub fn has_output(&self) -> bool {
        !self.output.trim().is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.metrics.error_count > 0
    }
}

/// Collapse repeated (kind, span_id) pairs, keeping the first occurrence.
fn dedup_steps<'a>(steps: impl Iterator<Item = &'a TypedSpan>) -> Vec<TypedSpan> {
    let mut seen: HashSet<(SemanticKind, &str)> = HashSet::new();
    steps
        .filter(|step| seen.insert((step.kind(), step.span_id())))
        .cloned()
        .collect()
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}
