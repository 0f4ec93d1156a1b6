//! Structured observability hooks for evaluation runs.
//!
//! This module provides:
//! - Run-scoped tracing spans via `RunSpan` RAII guard
//! - Emission functions for run start/finish, trace normalization,
//!   evaluator dispatch and aggregation failures
//!
//! Events are emitted at `info!` level except aggregation failures, which
//! are `warn!`. Filter with `RUST_LOG`.

use tracing::{debug, info, warn};

use crate::domain::EvalLevel;
use crate::normalize::NormalizeStats;

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// ```ignore
/// let _span = RunSpan::enter("6f1c...");
/// // every event below carries run_id
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// The run span without entering it, for work spread across threads.
    pub fn span(run_id: &str) -> tracing::Span {
        tracing::info_span!("traceval.run", run_id = %run_id)
    }

    pub fn enter(run_id: &str) -> Self {
        Self {
            _span: Self::span(run_id).entered(),
        }
    }
}

pub fn emit_run_started(run_id: &str, trace_count: usize, evaluator_count: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        trace_count = trace_count,
        evaluator_count = evaluator_count,
    );
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, results: u64, skipped: u64) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        results = results,
        skipped = skipped,
    );
}

/// Emit event: a trace went through the normalizer. Structural anomalies
/// that were recovered locally are logged at `debug!`.
pub fn emit_trace_normalized(trace_id: &str, kept: usize, stats: &NormalizeStats) {
    info!(
        event = "trace.normalized",
        trace_id = %trace_id,
        input_spans = stats.input_spans,
        kept = kept,
        dropped_infrastructure = stats.dropped_infrastructure,
        dropped_metric_only = stats.dropped_metric_only,
        synthetic_root = stats.synthetic_root,
    );
    if stats.duplicate_spans > 0 || stats.dangling_parents > 0 || stats.cycles_broken > 0 {
        debug!(
            event = "trace.repaired",
            trace_id = %trace_id,
            duplicate_spans = stats.duplicate_spans,
            dangling_parents = stats.dangling_parents,
            cycles_broken = stats.cycles_broken,
        );
    }
}

pub fn emit_evaluator_dispatched(
    evaluator: &str,
    level: EvalLevel,
    trace_id: &str,
    results: usize,
) {
    info!(
        event = "evaluator.dispatched",
        evaluator = %evaluator,
        level = %level,
        trace_id = %trace_id,
        results = results,
    );
}

/// Emit event: one aggregation failed and was recorded as NaN (warning level).
pub fn emit_aggregation_failed(evaluator: &str, aggregation: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "aggregation.failed",
        evaluator = %evaluator,
        aggregation = %aggregation,
        error = %error,
    );
}
