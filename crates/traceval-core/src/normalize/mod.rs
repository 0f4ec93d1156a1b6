//! Raw span tree → filtered semantic tree.
//!
//! This module provides:
//! - Span role classification (`classify` submodule)
//! - Infrastructure removal and re-parenting (`tree` submodule)

pub mod classify;
pub mod tree;

pub use classify::{classify, MetricKind, SemanticKind, SpanRole};
pub use tree::{
    normalize_spans, FilteredSpan, MetricContribution, NormalizeOptions, NormalizeStats,
    NormalizedTrace, SYNTHETIC_ROOT_ID, SYNTHETIC_ROOT_KIND,
};
