//! Domain models for traceval.
//!
//! Canonical definitions shared by every pipeline stage:
//! - `RawSpan`: a span exactly as received from a trace source
//! - `EvalLevel`: granularity an evaluator runs at
//! - `EvalResult` / `TargetedResult`: per-item evaluation outcomes
//! - `Task`: optional ground truth for a trace

pub mod error;
pub mod level;
pub mod result;
pub mod span;
pub mod task;

// Re-export main types and errors
pub use error::{Result, TracevalError};
pub use level::EvalLevel;
pub use result::{EvalResult, Score, TargetedResult};
pub use span::{RawSpan, SpanPayload};
pub use task::Task;
