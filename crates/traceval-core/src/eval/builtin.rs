//! Deterministic evaluators that need no external service.

use std::collections::HashSet;

use regex::Regex;
use serde_json::{json, Map, Value};

use super::evaluator::{AgentEvaluator, CallbackResult, Evaluator, SpanEvaluator};
use crate::aggregate::{Aggregation, AggregationKind};
use crate::domain::{EvalResult, Result, Task, TracevalError};
use crate::model::{AgentTrace, LlmSpan, TraceModel};

pub const TOOL_SEQUENCE: &str = "tool_sequence";
pub const OUTPUT_MATCH: &str = "output_match";
pub const ERROR_FREE: &str = "error_free";
pub const TOKEN_BUDGET: &str = "token_budget";

/// Default for `token_budget`'s `max_tokens`.
pub const DEFAULT_MAX_TOKENS: u64 = 4096;

// ---------------------------------------------------------------------------
// tool_sequence
// ---------------------------------------------------------------------------

/// Compares the order of tool calls with `task.expected_tools`.
///
/// Score is the longest common subsequence length divided by the longer of
/// the two sequences.
#[derive(Debug, Default)]
pub struct ToolSequenceEvaluator;

impl ToolSequenceEvaluator {
    fn score(observed: &[&str], task: Option<&Task>) -> CallbackResult {
        let expected: Vec<&str> = match task {
            Some(task) if !task.expected_tools.is_empty() => {
                task.expected_tools.iter().map(String::as_str).collect()
            }
            _ => return Ok(EvalResult::skipped("no expected tools")),
        };

        let alignment = lcs_alignment(observed, &expected);
        let longest = observed.len().max(expected.len());
        let value = alignment.len() as f64 / longest as f64;
        let missing: Vec<&str> = expected
            .iter()
            .enumerate()
            .filter(|(j, _)| !alignment.iter().any(|&(_, b)| b == *j))
            .map(|(_, name)| *name)
            .collect();

        Ok(EvalResult::scored(value)?
            .with_explanation(format!(
                "{} of {} tool calls aligned",
                alignment.len(),
                longest
            ))
            .with_detail("observed", json!(observed))
            .with_detail("expected", json!(expected))
            .with_detail("missing", json!(missing)))
    }
}

impl Evaluator for ToolSequenceEvaluator {
    fn name(&self) -> &str {
        TOOL_SEQUENCE
    }

    fn evaluate_trace(&self, trace: &TraceModel, task: Option<&Task>) -> CallbackResult {
        let observed: Vec<&str> = trace.tool_names().iter().map(String::as_str).collect();
        Self::score(&observed, task)
    }

    fn as_agent_evaluator(&self) -> Option<&dyn AgentEvaluator> {
        Some(self)
    }

    fn default_aggregations(&self) -> Vec<Aggregation> {
        vec![Aggregation::mean(), Aggregation::new(AggregationKind::P50)]
    }

    fn default_tags(&self) -> Vec<String> {
        vec!["deterministic".to_string(), "tools".to_string()]
    }
}

impl AgentEvaluator for ToolSequenceEvaluator {
    fn evaluate_agent(&self, agent: &AgentTrace, task: Option<&Task>) -> CallbackResult {
        Self::score(&agent.tool_names(), task)
    }
}

/// Matched index pairs of the longest common subsequence of `a` and `b`.
fn lcs_alignment<T: PartialEq>(a: &[T], b: &[T]) -> Vec<(usize, usize)> {
    let m = a.len();
    let n = b.len();

    if m == 0 || n == 0 {
        return Vec::new();
    }

    let mut dp = vec![vec![0usize; n + 1]; m + 1];

    for i in 1..=m {
        for j in 1..=n {
            if a[i - 1] == b[j - 1] {
                dp[i][j] = dp[i - 1][j - 1] + 1;
            } else {
                dp[i][j] = dp[i][j - 1].max(dp[i - 1][j]);
            }
        }
    }

    let mut alignment = Vec::new();
    let mut i = m;
    let mut j = n;

    while i > 0 && j > 0 {
        if a[i - 1] == b[j - 1] {
            alignment.push((i - 1, j - 1));
            i -= 1;
            j -= 1;
        } else if dp[i][j - 1] > dp[i - 1][j] {
            j -= 1;
        } else {
            i -= 1;
        }
    }

    alignment.reverse();
    alignment
}

// ---------------------------------------------------------------------------
// output_match
// ---------------------------------------------------------------------------

/// Compares the final output with `task.expected_output`.
///
/// Case, punctuation and whitespace are ignored. An exact match scores 1.0;
/// otherwise the score is the Jaccard overlap of the two token sets.
#[derive(Debug)]
pub struct OutputMatchEvaluator {
    punctuation: Regex,
}

impl OutputMatchEvaluator {
    pub fn new() -> Result<Self> {
        let punctuation = Regex::new(r"[^\p{L}\p{N}\s]+")
            .map_err(|e| TracevalError::InvalidConfig(format!("output_match pattern: {e}")))?;
        Ok(Self { punctuation })
    }

    fn normalize(&self, text: &str) -> Vec<String> {
        self.punctuation
            .replace_all(&text.to_lowercase(), " ")
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    fn score(&self, actual: &str, task: Option<&Task>) -> CallbackResult {
        let Some(expected) = task.and_then(|t| t.expected_output.as_deref()) else {
            return Ok(EvalResult::skipped("no expected output"));
        };

        let actual_tokens = self.normalize(actual);
        let expected_tokens = self.normalize(expected);
        if actual_tokens == expected_tokens {
            return Ok(EvalResult::scored(1.0)?
                .with_explanation("normalized output matches")
                .with_detail("exact", json!(true)));
        }

        let actual_set: HashSet<&str> = actual_tokens.iter().map(String::as_str).collect();
        let expected_set: HashSet<&str> = expected_tokens.iter().map(String::as_str).collect();
        let shared = actual_set.intersection(&expected_set).count();
        let union = actual_set.union(&expected_set).count();
        let overlap = if union == 0 {
            0.0
        } else {
            shared as f64 / union as f64
        };

        Ok(EvalResult::scored(overlap)?
            .with_explanation(format!("{shared} of {union} distinct tokens shared"))
            .with_detail("exact", json!(false)))
    }
}

impl Evaluator for OutputMatchEvaluator {
    fn name(&self) -> &str {
        OUTPUT_MATCH
    }

    fn evaluate_trace(&self, trace: &TraceModel, task: Option<&Task>) -> CallbackResult {
        self.score(trace.output(), task)
    }

    fn as_agent_evaluator(&self) -> Option<&dyn AgentEvaluator> {
        Some(self)
    }

    fn default_aggregations(&self) -> Vec<Aggregation> {
        vec![
            Aggregation::mean(),
            Aggregation::new(AggregationKind::PassRate),
        ]
    }

    fn default_tags(&self) -> Vec<String> {
        vec!["deterministic".to_string(), "output".to_string()]
    }
}

impl AgentEvaluator for OutputMatchEvaluator {
    fn evaluate_agent(&self, agent: &AgentTrace, task: Option<&Task>) -> CallbackResult {
        self.score(agent.output(), task)
    }
}

// ---------------------------------------------------------------------------
// error_free
// ---------------------------------------------------------------------------

/// 1.0 when nothing in scope carries the error flag, else 0.0.
#[derive(Debug, Default)]
pub struct ErrorFreeEvaluator;

fn error_score(error_count: u64) -> CallbackResult {
    let value = if error_count == 0 { 1.0 } else { 0.0 };
    Ok(EvalResult::scored(value)?.with_detail("error_count", json!(error_count)))
}

impl Evaluator for ErrorFreeEvaluator {
    fn name(&self) -> &str {
        ERROR_FREE
    }

    fn evaluate_trace(&self, trace: &TraceModel, _task: Option<&Task>) -> CallbackResult {
        error_score(trace.metrics().error_count)
    }

    fn as_agent_evaluator(&self) -> Option<&dyn AgentEvaluator> {
        Some(self)
    }

    fn as_span_evaluator(&self) -> Option<&dyn SpanEvaluator> {
        Some(self)
    }

    fn default_tags(&self) -> Vec<String> {
        vec!["deterministic".to_string(), "reliability".to_string()]
    }
}

impl AgentEvaluator for ErrorFreeEvaluator {
    fn evaluate_agent(&self, agent: &AgentTrace, _task: Option<&Task>) -> CallbackResult {
        error_score(agent.metrics().error_count)
    }
}

impl SpanEvaluator for ErrorFreeEvaluator {
    fn evaluate_span(
        &self,
        span: &LlmSpan,
        _trace: &TraceModel,
        _task: Option<&Task>,
    ) -> CallbackResult {
        error_score(u64::from(span.error))
    }
}

// ---------------------------------------------------------------------------
// token_budget
// ---------------------------------------------------------------------------

/// Penalises token usage above `max_tokens`: 1.0 within budget, else
/// budget / used.
#[derive(Debug)]
pub struct TokenBudgetEvaluator {
    max_tokens: u64,
}

impl TokenBudgetEvaluator {
    pub fn new(max_tokens: u64) -> Result<Self> {
        if max_tokens == 0 {
            return Err(TracevalError::InvalidConfig(
                "token_budget max_tokens must be positive".to_string(),
            ));
        }
        Ok(Self { max_tokens })
    }

    /// Read `max_tokens` from evaluator params, defaulting to
    /// [`DEFAULT_MAX_TOKENS`].
    pub fn from_params(params: &Map<String, Value>) -> Result<Self> {
        match params.get("max_tokens") {
            None => Self::new(DEFAULT_MAX_TOKENS),
            Some(value) => {
                let max_tokens = value.as_u64().ok_or_else(|| {
                    TracevalError::InvalidConfig(format!(
                        "token_budget max_tokens must be a positive integer, got {value}"
                    ))
                })?;
                Self::new(max_tokens)
            }
        }
    }

    pub fn max_tokens(&self) -> u64 {
        self.max_tokens
    }

    fn score(&self, used: u64) -> CallbackResult {
        let value = if used <= self.max_tokens {
            1.0
        } else {
            self.max_tokens as f64 / used as f64
        };
        Ok(EvalResult::scored(value)?
            .with_detail("used_tokens", json!(used))
            .with_detail("max_tokens", json!(self.max_tokens)))
    }
}

impl Evaluator for TokenBudgetEvaluator {
    fn name(&self) -> &str {
        TOKEN_BUDGET
    }

    fn evaluate_trace(&self, trace: &TraceModel, _task: Option<&Task>) -> CallbackResult {
        self.score(trace.metrics().total_tokens())
    }

    fn as_span_evaluator(&self) -> Option<&dyn SpanEvaluator> {
        Some(self)
    }

    fn default_aggregations(&self) -> Vec<Aggregation> {
        vec![Aggregation::mean(), Aggregation::new(AggregationKind::Min)]
    }

    fn default_tags(&self) -> Vec<String> {
        vec!["deterministic".to_string(), "cost".to_string()]
    }
}

impl SpanEvaluator for TokenBudgetEvaluator {
    fn evaluate_span(
        &self,
        span: &LlmSpan,
        _trace: &TraceModel,
        _task: Option<&Task>,
    ) -> CallbackResult {
        self.score(span.usage.total_tokens)
    }
}
