//! Evaluators and level dispatch.
//!
//! - `evaluator`: the `Evaluator` trait and its optional agent/span facets
//! - `dispatch`: `BoundEvaluator`, an evaluator fixed to one level
//! - `registry`: name → constructor lookup
//! - `builtin`: deterministic evaluators shipped with the crate

pub mod builtin;
pub mod dispatch;
pub mod evaluator;
pub mod registry;

pub use builtin::{
    ErrorFreeEvaluator, OutputMatchEvaluator, TokenBudgetEvaluator, ToolSequenceEvaluator,
};
pub use dispatch::BoundEvaluator;
pub use evaluator::{supported_levels, AgentEvaluator, CallbackResult, Evaluator, SpanEvaluator};
pub use registry::{
    create_evaluator, global_registry, register_builtin_evaluators, register_evaluator,
    registered_evaluators, EvaluatorFactory, EvaluatorParams, EvaluatorRegistry,
};
