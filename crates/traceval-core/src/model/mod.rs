//! Typed trace model built from normalized spans.
//!
//! - `TraceModel`: immutable decoded trace with folded metrics
//! - `AgentTrace`: the same view scoped to one agent's subtree
//! - `TypedSpan` and friends: per-kind decoded spans
//! - `TraceMetrics` / `TokenUsage`: additive counters

pub mod agent;
pub mod metrics;
pub mod trace;
pub mod typed;
pub mod usage;

pub use agent::AgentTrace;
pub use metrics::TraceMetrics;
pub use trace::{SpanTree, TraceModel};
pub use typed::{AgentSpan, LlmSpan, Message, RetrievedDocument, RetrieverSpan, ToolSpan, TypedSpan};
pub use usage::TokenUsage;
