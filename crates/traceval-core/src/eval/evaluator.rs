//! Evaluator traits.
//!
//! Every evaluator scores a whole trace. Agent- and span-level scoring are
//! opt-in: an evaluator advertises them by returning `Some(self)` from
//! [`Evaluator::as_agent_evaluator`] / [`Evaluator::as_span_evaluator`].

use crate::aggregate::Aggregation;
use crate::domain::{EvalLevel, EvalResult, Task};
use crate::model::{AgentTrace, LlmSpan, TraceModel};

/// What an evaluator callback returns. Errors propagate to the caller as
/// [`crate::domain::TracevalError::EvaluatorFailed`].
pub type CallbackResult = anyhow::Result<EvalResult>;

pub trait Evaluator: Send + Sync {
    /// Registry name, also the default display name.
    fn name(&self) -> &str;

    fn evaluate_trace(&self, trace: &TraceModel, task: Option<&Task>) -> CallbackResult;

    fn as_agent_evaluator(&self) -> Option<&dyn AgentEvaluator> {
        None
    }

    fn as_span_evaluator(&self) -> Option<&dyn SpanEvaluator> {
        None
    }

    /// Aggregations used when the caller does not ask for any.
    fn default_aggregations(&self) -> Vec<Aggregation> {
        Vec::new()
    }

    fn default_tags(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Scores one agent-scoped view.
pub trait AgentEvaluator: Send + Sync {
    fn evaluate_agent(&self, agent: &AgentTrace, task: Option<&Task>) -> CallbackResult;
}

/// Scores one LLM span. The enclosing trace is passed for context.
pub trait SpanEvaluator: Send + Sync {
    fn evaluate_span(&self, span: &LlmSpan, trace: &TraceModel, task: Option<&Task>)
        -> CallbackResult;
}

/// Levels `evaluator` can run at, in [`EvalLevel`] order.
pub fn supported_levels(evaluator: &dyn Evaluator) -> Vec<EvalLevel> {
    let mut levels = vec![EvalLevel::Trace];
    if evaluator.as_agent_evaluator().is_some() {
        levels.push(EvalLevel::Agent);
    }
    if evaluator.as_span_evaluator().is_some() {
        levels.push(EvalLevel::Span);
    }
    levels
}
