//! The immutable trace model evaluators run against.

use std::collections::HashMap;

use serde::Serialize;

use super::agent::AgentTrace;
use super::metrics::TraceMetrics;
use super::typed::{AgentSpan, LlmSpan, RetrieverSpan, ToolSpan, TypedSpan};
use crate::domain::RawSpan;
use crate::normalize::{normalize_spans, MetricContribution, NormalizeOptions, NormalizedTrace};

/// Parent links of the filtered tree, synthetic root included.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SpanTree {
    parents: HashMap<String, Option<String>>,
}

impl SpanTree {
    fn from_normalized(normalized: &NormalizedTrace) -> Self {
        Self {
            parents: normalized
                .spans
                .iter()
                .map(|s| (s.span_id.clone(), s.parent_id.clone()))
                .collect(),
        }
    }

    pub fn parent(&self, span_id: &str) -> Option<&str> {
        self.parents.get(span_id).and_then(|p| p.as_deref())
    }

    pub fn contains(&self, span_id: &str) -> bool {
        self.parents.contains_key(span_id)
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Ancestors of `span_id`, nearest first. Bounded by the tree size.
    pub fn ancestors<'a>(&'a self, span_id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        let mut current = self.parent(span_id);
        let mut remaining = self.parents.len();
        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            remaining -= 1;
            let next = current?;
            current = self.parent(next);
            Some(next)
        })
    }

    /// Whether `ancestor_id` is a proper ancestor of `span_id`.
    pub fn is_descendant_of(&self, span_id: &str, ancestor_id: &str) -> bool {
        self.ancestors(span_id).any(|a| a == ancestor_id)
    }
}

/// A decoded, filtered trace. Built once; re-evaluating means rebuilding from
/// the raw spans.
#[derive(Debug, Clone, Serialize)]
pub struct TraceModel {
    trace_id: String,
    input: String,
    output: String,
    steps: Vec<TypedSpan>,
    llm_spans: Vec<LlmSpan>,
    tool_spans: Vec<ToolSpan>,
    retriever_spans: Vec<RetrieverSpan>,
    agent_spans: Vec<AgentSpan>,
    top_agent: Option<usize>,
    contributions: Vec<MetricContribution>,
    metrics: TraceMetrics,
    tree: SpanTree,
    tool_names: Vec<String>,
    llm_outputs: Vec<String>,
}

impl TraceModel {
    /// Build from a normalized trace.
    pub fn build(
        trace_id: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
        normalized: NormalizedTrace,
    ) -> Self {
        let tree = SpanTree::from_normalized(&normalized);
        let steps: Vec<TypedSpan> = normalized
            .spans
            .iter()
            .filter_map(TypedSpan::decode)
            .collect();

        let mut llm_spans = Vec::new();
        let mut tool_spans = Vec::new();
        let mut retriever_spans = Vec::new();
        let mut agent_spans = Vec::new();
        for step in &steps {
            match step {
                TypedSpan::Llm(s) => llm_spans.push(s.clone()),
                TypedSpan::Tool(s) => tool_spans.push(s.clone()),
                TypedSpan::Retriever(s) => retriever_spans.push(s.clone()),
                TypedSpan::Agent(s) => agent_spans.push(s.clone()),
            }
        }

        let top_agent = agent_spans.iter().position(|agent| {
            let id = agent.span_id.as_str();
            !agent_spans
                .iter()
                .any(|other| tree.is_descendant_of(id, &other.span_id))
        });

        let metrics = TraceMetrics::fold(&steps, &normalized.contributions);
        let tool_names = tool_spans.iter().map(|t| t.name.clone()).collect();
        let llm_outputs = llm_spans.iter().map(|l| l.output.clone()).collect();

        Self {
            trace_id: trace_id.into(),
            input: input.into(),
            output: output.into(),
            steps,
            llm_spans,
            tool_spans,
            retriever_spans,
            agent_spans,
            top_agent,
            contributions: normalized.contributions,
            metrics,
            tree,
            tool_names,
            llm_outputs,
        }
    }

    /// Normalize raw spans and build the model in one step.
    pub fn from_raw(
        trace_id: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
        spans: &[RawSpan],
        options: &NormalizeOptions,
    ) -> Self {
        Self::build(trace_id, input, output, normalize_spans(spans, options))
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    /// Every typed span in input order.
    pub fn steps(&self) -> &[TypedSpan] {
        &self.steps
    }

    pub fn llm_spans(&self) -> &[LlmSpan] {
        &self.llm_spans
    }

    pub fn tool_spans(&self) -> &[ToolSpan] {
        &self.tool_spans
    }

    pub fn retriever_spans(&self) -> &[RetrieverSpan] {
        &self.retriever_spans
    }

    pub fn agent_spans(&self) -> &[AgentSpan] {
        &self.agent_spans
    }

    /// The first agent span (input order) that has no agent ancestor.
    pub fn agent(&self) -> Option<&AgentSpan> {
        self.top_agent.map(|i| &self.agent_spans[i])
    }

    pub fn contributions(&self) -> &[MetricContribution] {
        &self.contributions
    }

    pub fn metrics(&self) -> &TraceMetrics {
        &self.metrics
    }

    pub fn tree(&self) -> &SpanTree {
        &self.tree
    }

    pub fn has_output(&self) -> bool {
        !self.output.trim().is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.metrics.error_count > 0
    }

    /// Tool names in call order.
    pub fn tool_names(&self) -> &[String] {
        &self.tool_names
    }

    /// LLM outputs in call order.
    pub fn llm_outputs(&self) -> &[String] {
        &self.llm_outputs
    }

    /// One agent-scoped view per agent span, or a single view over the
    /// whole trace when there are none.
    pub fn agent_traces(&self) -> Vec<AgentTrace> {
        if self.agent_spans.is_empty() {
            return vec![AgentTrace::whole_trace(self)];
        }
        self.agent_spans
            .iter()
            .map(|agent| AgentTrace::for_agent(self, agent))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_spans() -> Vec<RawSpan> {
        vec![
            RawSpan::new("root", None, "chain"),
            RawSpan::new("agent", Some("root"), "agent").with_name("planner"),
            RawSpan::new("c1", Some("agent"), "chain"),
            RawSpan::new("l1", Some("c1"), "llm")
                .with_output(json!("call search"))
                .with_attribute("llm.token_count.prompt", json!(10))
                .with_attribute("llm.token_count.completion", json!(2))
                .with_duration_ms(100.0),
            RawSpan::new("t1", Some("c1"), "tool")
                .with_name("search")
                .with_duration_ms(50.0),
            RawSpan::new("t2", Some("agent"), "tool")
                .with_name("book")
                .with_error(true),
            RawSpan::new("l2", Some("agent"), "llm").with_output(json!("done")),
        ]
    }

    #[test]
    fn test_build_orders_and_views() {
        let options = NormalizeOptions::default();
        let model = TraceModel::from_raw("trace-1", "in", "out", &sample_spans(), &options);
        assert_eq!(model.trace_id(), "trace-1");
        assert_eq!(model.steps().len(), 5);
        assert_eq!(model.tool_names(), ["search", "book"]);
        assert_eq!(model.llm_outputs(), ["call search", "done"]);
        assert_eq!(model.agent().map(|a| a.name.as_str()), Some("planner"));
        assert!(model.has_output());
        assert!(model.has_errors());
    }

    #[test]
    fn test_metrics_fold() {
        let options = NormalizeOptions::default();
        let model = TraceModel::from_raw("trace-1", "", "", &sample_spans(), &options);
        let metrics = model.metrics();
        assert_eq!(metrics.llm_calls, 2);
        assert_eq!(metrics.tool_calls, 2);
        assert_eq!(metrics.agent_calls, 1);
        assert_eq!(metrics.usage.total_tokens, 12);
        assert_eq!(metrics.total_duration_ms, 150.0);
        assert_eq!(metrics.error_count, 1);
        assert!(!model.has_output());
    }

    #[test]
    fn test_top_level_agent_skips_nested() {
        let spans = vec![
            RawSpan::new("inner", Some("outer"), "agent"),
            RawSpan::new("outer", None, "agent"),
        ];
        let model = TraceModel::from_raw("t", "", "", &spans, &NormalizeOptions::default());
        assert_eq!(model.agent_spans().len(), 2);
        assert_eq!(model.agent().map(|a| a.span_id.as_str()), Some("outer"));
    }

    #[test]
    fn test_empty_trace_model() {
        let model = TraceModel::from_raw("t", "", "", &[], &NormalizeOptions::default());
        assert!(model.steps().is_empty());
        assert!(model.agent().is_none());
        assert!(!model.has_errors());
        assert!(model.tree().is_empty());
        assert_eq!(model.agent_traces().len(), 1);
    }

    #[test]
    fn test_ancestor_walk_is_bounded() {
        let spans = vec![
            RawSpan::new("a", None, "agent"),
            RawSpan::new("b", Some("a"), "llm"),
        ];
        let model = TraceModel::from_raw("t", "", "", &spans, &NormalizeOptions::default());
        let ancestors: Vec<&str> = model.tree().ancestors("b").collect();
        assert_eq!(ancestors, vec!["a"]);
        assert!(model.tree().is_descendant_of("b", "a"));
        assert!(!model.tree().is_descendant_of("a", "b"));
    }
}
