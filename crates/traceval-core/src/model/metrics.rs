//! Trace-level counters folded from typed spans.

use serde::{Deserialize, Serialize};

use super::typed::TypedSpan;
use super::usage::TokenUsage;
use crate::normalize::{MetricContribution, MetricKind};

/// Aggregate counters for a trace or an agent subtree.
///
/// Produced by [`TraceMetrics::fold`]. The fold is additive and does not
/// depend on span order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceMetrics {
    pub usage: TokenUsage,
    pub llm_calls: u64,
    pub tool_calls: u64,
    pub retriever_calls: u64,
    pub agent_calls: u64,
    pub embedding_calls: u64,
    pub rerank_calls: u64,
    /// Sum over LLM, tool, retriever and metric-only spans. Agent spans are
    /// excluded since they enclose the others.
    pub total_duration_ms: f64,
    pub error_count: u64,
}

impl TraceMetrics {
    pub fn fold<'a, S, C>(spans: S, contributions: C) -> Self
    where
        S: IntoIterator<Item = &'a TypedSpan>,
        C: IntoIterator<Item = &'a MetricContribution>,
    {
        let mut metrics = Self::default();
        for span in spans {
            metrics.add_span(span);
        }
        for contribution in contributions {
            metrics.add_contribution(contribution);
        }
        metrics
    }

    fn add_span(&mut self, span: &TypedSpan) {
        match span {
            TypedSpan::Llm(llm) => {
                self.llm_calls += 1;
                self.usage += llm.usage;
                self.total_duration_ms += llm.duration_ms;
            }
            TypedSpan::Tool(tool) => {
                self.tool_calls += 1;
                self.total_duration_ms += tool.duration_ms;
            }
            TypedSpan::Retriever(retriever) => {
                self.retriever_calls += 1;
                self.total_duration_ms += retriever.duration_ms;
            }
            TypedSpan::Agent(_) => self.agent_calls += 1,
        }
        if span.error() {
            self.error_count += 1;
        }
    }

    fn add_contribution(&mut self, contribution: &MetricContribution) {
        match contribution.kind {
            MetricKind::Embedding => self.embedding_calls += 1,
            MetricKind::Rerank => self.rerank_calls += 1,
        }
        self.usage += contribution.usage;
        self.total_duration_ms += contribution.duration_ms;
        if contribution.error {
            self.error_count += 1;
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.usage.total_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::typed::{AgentSpan, ToolSpan};
    use serde_json::Value;

    fn tool(id: &str, duration_ms: f64, error: bool) -> TypedSpan {
        TypedSpan::Tool(ToolSpan {
            span_id: id.to_string(),
            parent_id: None,
            name: id.to_string(),
            arguments: Value::Null,
            result: Value::Null,
            duration_ms,
            error,
        })
    }

    fn agent(id: &str, error: bool) -> TypedSpan {
        TypedSpan::Agent(AgentSpan {
            span_id: id.to_string(),
            parent_id: None,
            name: id.to_string(),
            framework: String::new(),
            system_prompt: String::new(),
            tools: Vec::new(),
            max_iterations: 0,
            input: String::new(),
            output: String::new(),
            duration_ms: 500.0,
            error,
        })
    }

    fn embedding(tokens: u64, error: bool) -> MetricContribution {
        MetricContribution {
            span_id: "e".to_string(),
            kind: MetricKind::Embedding,
            anchor_id: None,
            usage: TokenUsage {
                prompt_tokens: tokens,
                completion_tokens: 0,
                total_tokens: tokens,
                cost: 0.0,
            },
            duration_ms: 5.0,
            error,
        }
    }

    #[test]
    fn test_fold_counts_and_errors() {
        let spans = vec![
            tool("t1", 10.0, false),
            tool("t2", 20.0, true),
            agent("a", true),
        ];
        let contributions = vec![embedding(7, true)];
        let metrics = TraceMetrics::fold(&spans, &contributions);
        assert_eq!(metrics.tool_calls, 2);
        assert_eq!(metrics.agent_calls, 1);
        assert_eq!(metrics.embedding_calls, 1);
        assert_eq!(metrics.error_count, 3);
        assert_eq!(metrics.total_duration_ms, 35.0);
        assert_eq!(metrics.total_tokens(), 7);
    }

    #[test]
    fn test_fold_is_order_independent() {
        let spans = vec![
            tool("t1", 10.0, false),
            agent("a", false),
            tool("t2", 20.0, true),
        ];
        let reversed: Vec<TypedSpan> = spans.iter().rev().cloned().collect();
        let contributions = vec![embedding(3, false), embedding(4, false)];
        assert_eq!(
            TraceMetrics::fold(&spans, &contributions),
            TraceMetrics::fold(&reversed, contributions.iter().rev())
        );
    }

    #[test]
    fn test_fold_empty() {
        let spans: Vec<TypedSpan> = Vec::new();
        let contributions: Vec<MetricContribution> = Vec::new();
        let metrics = TraceMetrics::fold(&spans, &contributions);
        assert_eq!(metrics, TraceMetrics::default());
    }
}
