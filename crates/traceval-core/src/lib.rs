//! traceval core library
//!
//! Offline evaluation of recorded agent traces:
//! raw spans → filtered semantic tree → typed trace model → level-dispatched
//! evaluators → aggregated statistics.

pub mod aggregate;
pub mod config;
pub mod domain;
pub mod eval;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod obs;
pub mod runner;
pub mod telemetry;

pub use aggregate::{
    percentile, AggregatedResult, Aggregation, AggregationEngine, AggregationError, AggregationKind,
};
pub use config::{EvaluatorConfig, RunConfig};
pub use domain::{
    EvalLevel, EvalResult, RawSpan, Result, Score, SpanPayload, TargetedResult, Task, TracevalError,
};
pub use eval::{
    create_evaluator, register_builtin_evaluators, register_evaluator, registered_evaluators,
    AgentEvaluator, BoundEvaluator, CallbackResult, Evaluator, EvaluatorParams, EvaluatorRegistry,
    SpanEvaluator,
};
pub use model::{
    AgentSpan, AgentTrace, LlmSpan, RetrieverSpan, TokenUsage, ToolSpan, TraceMetrics, TraceModel,
    TypedSpan,
};
pub use normalize::{
    classify, normalize_spans, FilteredSpan, NormalizeOptions, NormalizedTrace, SpanRole,
};
pub use obs::{
    emit_aggregation_failed, emit_evaluator_dispatched, emit_run_finished, emit_run_started,
    emit_trace_normalized, RunSpan,
};
pub use runner::{EvaluationReport, Runner, TraceInput};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
