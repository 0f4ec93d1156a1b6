//! Span role classification.
//!
//! Kind tags come from many instrumentation libraries, so matching is
//! case-insensitive and a handful of common aliases are folded in. Anything
//! not recognised is structural and gets filtered out.

use serde::{Deserialize, Serialize};

/// Span kinds that carry evaluation meaning and survive normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticKind {
    Llm,
    Tool,
    Retriever,
    Agent,
}

impl SemanticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Tool => "tool",
            Self::Retriever => "retriever",
            Self::Agent => "agent",
        }
    }
}

/// Span kinds kept only as a source of token and cost counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Embedding,
    Rerank,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Embedding => "embedding",
            Self::Rerank => "rerank",
        }
    }
}

/// Role of a raw span in the normalized tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpanRole {
    Semantic(SemanticKind),
    /// Structural wrapper (chain, task, framework internals). Removed.
    Infrastructure,
    MetricOnly(MetricKind),
}

impl SpanRole {
    pub fn is_semantic(&self) -> bool {
        matches!(self, Self::Semantic(_))
    }

    pub fn semantic_kind(&self) -> Option<SemanticKind> {
        match self {
            Self::Semantic(kind) => Some(*kind),
            _ => None,
        }
    }
}

/// Classify a raw kind tag.
pub fn classify(kind: &str) -> SpanRole {
    match kind.trim().to_ascii_lowercase().as_str() {
        "llm" | "generation" | "chat" => SpanRole::Semantic(SemanticKind::Llm),
        "tool" => SpanRole::Semantic(SemanticKind::Tool),
        "retriever" | "retrieval" => SpanRole::Semantic(SemanticKind::Retriever),
        "agent" => SpanRole::Semantic(SemanticKind::Agent),
        "embedding" => SpanRole::MetricOnly(MetricKind::Embedding),
        "rerank" | "reranker" => SpanRole::MetricOnly(MetricKind::Rerank),
        _ => SpanRole::Infrastructure,
    }
}
