//! Score aggregation.
//!
//! - `aggregation`: kinds, parameters and identity strings
//! - `engine`: computation, custom registration and failure isolation

pub mod aggregation;
pub mod engine;

pub use aggregation::{Aggregation, AggregationKind, DEFAULT_PASS_THRESHOLD};
pub use engine::{percentile, AggregatedResult, AggregationEngine, AggregationError, AggregationFn};
