//! Span-tree normalization.
//!
//! Removes infrastructure and metric-only spans from a raw trace and
//! re-links the surviving semantic spans to their nearest surviving
//! ancestor. The output always satisfies: every span's `parent_id` is
//! `None` or the id of another span in the same output.
//!
//! Malformed input is recovered locally:
//! - duplicated span ids keep the first occurrence,
//! - parents that do not resolve make the span a root,
//! - parent cycles are cut, every ancestor walk is bounded by the span count.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::classify::{classify, MetricKind, SemanticKind, SpanRole};
use crate::domain::{RawSpan, SpanPayload};
use crate::model::TokenUsage;

/// Id given to the synthetic root unless a surviving span already uses it.
pub const SYNTHETIC_ROOT_ID: &str = "synthetic-root";

/// Kind tag a synthetic root carries when converted back to a [`RawSpan`].
pub const SYNTHETIC_ROOT_KIND: &str = "synthetic_root";

/// Normalizer options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeOptions {
    /// Insert a single root above the orphans when more than one remains.
    #[serde(default = "default_true")]
    pub create_synthetic_root: bool,
}

fn default_true() -> bool {
    true
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            create_synthetic_root: true,
        }
    }
}

/// A semantic span after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredSpan {
    pub span_id: String,
    /// Nearest surviving ancestor (or the synthetic root).
    pub parent_id: Option<String>,
    /// `None` only for the synthetic root.
    pub kind: Option<SemanticKind>,
    pub name: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: f64,
    pub payload: SpanPayload,
    pub error: bool,
}

impl FilteredSpan {
    fn from_raw(raw: &RawSpan, kind: SemanticKind, parent_id: Option<String>) -> Self {
        Self {
            span_id: raw.span_id.clone(),
            parent_id,
            kind: Some(kind),
            name: raw.name.clone(),
            start_time: raw.start_time,
            end_time: raw.end_time,
            duration_ms: raw.duration_ms(),
            payload: raw.payload.clone(),
            error: raw.error,
        }
    }

    fn synthetic_root(span_id: String) -> Self {
        Self {
            span_id,
            parent_id: None,
            kind: None,
            name: "synthetic root".to_string(),
            start_time: None,
            end_time: None,
            duration_ms: 0.0,
            payload: SpanPayload::default(),
            error: false,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.kind.is_none()
    }
}

impl From<&FilteredSpan> for RawSpan {
    fn from(span: &FilteredSpan) -> Self {
        RawSpan {
            span_id: span.span_id.clone(),
            parent_id: span.parent_id.clone(),
            kind: span
                .kind
                .map(|k| k.as_str())
                .unwrap_or(SYNTHETIC_ROOT_KIND)
                .to_string(),
            name: span.name.clone(),
            start_time: span.start_time,
            end_time: span.end_time,
            duration_ms: Some(span.duration_ms),
            payload: span.payload.clone(),
            error: span.error,
        }
    }
}

/// Counters captured from a metric-only span before it is discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricContribution {
    pub span_id: String,
    pub kind: MetricKind,
    /// Nearest surviving semantic ancestor, used to scope the contribution
    /// to an agent subtree.
    pub anchor_id: Option<String>,
    pub usage: TokenUsage,
    pub duration_ms: f64,
    pub error: bool,
}

/// Bookkeeping about what the normalizer removed or repaired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeStats {
    pub input_spans: usize,
    pub duplicate_spans: usize,
    pub dropped_infrastructure: usize,
    pub dropped_metric_only: usize,
    pub dangling_parents: usize,
    pub cycles_broken: usize,
    pub synthetic_root: bool,
}

/// Output of [`normalize_spans`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTrace {
    /// Surviving spans in input order, synthetic root first when present.
    pub spans: Vec<FilteredSpan>,
    pub contributions: Vec<MetricContribution>,
    pub stats: NormalizeStats,
}

impl NormalizedTrace {
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn get(&self, span_id: &str) -> Option<&FilteredSpan> {
        self.spans.iter().find(|s| s.span_id == span_id)
    }

    /// Spans without a parent.
    pub fn roots(&self) -> impl Iterator<Item = &FilteredSpan> {
        self.spans.iter().filter(|s| s.parent_id.is_none())
    }

    pub fn root_count(&self) -> usize {
        self.roots().count()
    }

    /// Whether every parent reference resolves inside this set.
    pub fn parents_resolve(&self) -> bool {
        let ids: HashSet<&str> = self.spans.iter().map(|s| s.span_id.as_str()).collect();
        self.spans
            .iter()
            .all(|s| s.parent_id.as_deref().map_or(true, |p| ids.contains(p)))
    }
}

/// Normalize one trace's raw spans.
pub fn normalize_spans(spans: &[RawSpan], options: &NormalizeOptions) -> NormalizedTrace {
    let mut stats = NormalizeStats {
        input_spans: spans.len(),
        ..NormalizeStats::default()
    };

    let mut index: HashMap<&str, usize> = HashMap::with_capacity(spans.len());
    let mut unique: Vec<&RawSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        if index.contains_key(span.span_id.as_str()) {
            debug!(span_id = %span.span_id, "duplicate span id dropped");
            stats.duplicate_spans += 1;
            continue;
        }
        index.insert(span.span_id.as_str(), unique.len());
        unique.push(span);
    }

    let roles: Vec<SpanRole> = unique.iter().map(|s| classify(&s.kind)).collect();
    let bound = unique.len();

    for span in &unique {
        if let Some(parent) = span.parent_id.as_deref() {
            if !index.contains_key(parent) {
                debug!(
                    span_id = %span.span_id,
                    parent_id = %parent,
                    "parent does not resolve; treating as root"
                );
                stats.dangling_parents += 1;
            }
        }
    }

    // Walk the original parent chain of `start`, skipping non-semantic spans.
    let nearest_survivor = |start: usize| -> Option<usize> {
        let mut current = unique[start].parent_id.as_deref();
        for _ in 0..bound {
            let idx = *index.get(current?)?;
            if idx == start {
                return None;
            }
            if roles[idx].is_semantic() {
                return Some(idx);
            }
            current = unique[idx].parent_id.as_deref();
        }
        None
    };

    let kept: Vec<(usize, SemanticKind)> = roles
        .iter()
        .enumerate()
        .filter_map(|(i, role)| role.semantic_kind().map(|kind| (i, kind)))
        .collect();
    let mut resolved: Vec<Option<usize>> = vec![None; unique.len()];
    for &(i, _) in &kept {
        resolved[i] = nearest_survivor(i);
    }

    let mut contributions = Vec::new();
    for (i, role) in roles.iter().enumerate() {
        match role {
            SpanRole::Infrastructure => stats.dropped_infrastructure += 1,
            SpanRole::MetricOnly(kind) => {
                stats.dropped_metric_only += 1;
                let raw = unique[i];
                contributions.push(MetricContribution {
                    span_id: raw.span_id.clone(),
                    kind: *kind,
                    anchor_id: nearest_survivor(i).map(|a| unique[a].span_id.clone()),
                    usage: TokenUsage::from_payload(&raw.payload),
                    duration_ms: raw.duration_ms(),
                    error: raw.error,
                });
            }
            SpanRole::Semantic(_) => {}
        }
    }

    // Cycles among survivors: detach the first span (input order) that its
    // own ancestor walk returns to.
    for &(i, _) in &kept {
        let mut current = resolved[i];
        let mut steps = 0;
        while let Some(p) = current {
            if p == i {
                warn!(span_id = %unique[i].span_id, "parent cycle detected; detaching span");
                resolved[i] = None;
                stats.cycles_broken += 1;
                break;
            }
            steps += 1;
            if steps > bound {
                break;
            }
            current = resolved[p];
        }
    }

    let orphans = kept.iter().filter(|(i, _)| resolved[*i].is_none()).count();
    let synthetic_id = if orphans > 1 && options.create_synthetic_root {
        let used: HashSet<&str> = kept
            .iter()
            .map(|(i, _)| unique[*i].span_id.as_str())
            .collect();
        Some(synthetic_root_id(&used))
    } else {
        None
    };

    let mut filtered = Vec::with_capacity(kept.len() + 1);
    if let Some(root_id) = &synthetic_id {
        stats.synthetic_root = true;
        filtered.push(FilteredSpan::synthetic_root(root_id.clone()));
    }
    for &(i, kind) in &kept {
        let parent = match resolved[i] {
            Some(p) => Some(unique[p].span_id.clone()),
            None => synthetic_id.clone(),
        };
        filtered.push(FilteredSpan::from_raw(unique[i], kind, parent));
    }

    debug!(
        input = stats.input_spans,
        kept = kept.len(),
        orphans,
        synthetic_root = stats.synthetic_root,
        "span tree normalized"
    );

    NormalizedTrace {
        spans: filtered,
        contributions,
        stats,
    }
}

fn synthetic_root_id(used: &HashSet<&str>) -> String {
    if !used.contains(SYNTHETIC_ROOT_ID) {
        return SYNTHETIC_ROOT_ID.to_string();
    }
    (1..)
        .map(|n| format!("{SYNTHETIC_ROOT_ID}-{n}"))
        .find(|candidate| !used.contains(candidate.as_str()))
        .unwrap_or_else(|| SYNTHETIC_ROOT_ID.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn span(id: &str, parent: Option<&str>, kind: &str) -> RawSpan {
        RawSpan::new(id, parent, kind)
    }

    fn parent_of<'a>(trace: &'a NormalizedTrace, id: &str) -> Option<&'a str> {
        trace.get(id).and_then(|s| s.parent_id.as_deref())
    }

    #[test]
    fn test_empty_trace() {
        let out = normalize_spans(&[], &NormalizeOptions::default());
        assert!(out.is_empty());
        assert!(out.contributions.is_empty());
        assert!(out.parents_resolve());
    }

    #[test]
    fn test_only_infrastructure_reduces_to_empty() {
        let spans = vec![
            span("c1", None, "chain"),
            span("c2", Some("c1"), "task"),
            span("e1", Some("c2"), "embedding"),
        ];
        let out = normalize_spans(&spans, &NormalizeOptions::default());
        assert!(out.is_empty());
        assert_eq!(out.stats.dropped_infrastructure, 2);
        assert_eq!(out.stats.dropped_metric_only, 1);
        assert_eq!(out.contributions.len(), 1);
        assert_eq!(out.contributions[0].anchor_id, None);
    }

    #[test]
    fn test_nested_infrastructure_is_skipped() {
        let spans = vec![
            span("agent", None, "agent"),
            span("c1", Some("agent"), "chain"),
            span("c2", Some("c1"), "chain"),
            span("c3", Some("c2"), "task"),
            span("llm", Some("c3"), "llm"),
        ];
        let out = normalize_spans(&spans, &NormalizeOptions::default());
        assert_eq!(out.len(), 2);
        assert_eq!(parent_of(&out, "llm"), Some("agent"));
        assert_eq!(out.root_count(), 1);
        assert!(!out.stats.synthetic_root);
    }

    #[test]
    fn test_multiple_orphans_get_synthetic_root() {
        let spans = vec![
            span("c1", None, "chain"),
            span("llm", Some("c1"), "llm"),
            span("tool", Some("c1"), "tool"),
        ];
        let out = normalize_spans(&spans, &NormalizeOptions::default());
        assert_eq!(out.len(), 3);
        assert!(out.spans[0].is_synthetic());
        assert_eq!(out.spans[0].span_id, SYNTHETIC_ROOT_ID);
        assert_eq!(out.spans[0].duration_ms, 0.0);
        assert!(out.spans[0].payload.is_empty());
        assert_eq!(parent_of(&out, "llm"), Some(SYNTHETIC_ROOT_ID));
        assert_eq!(parent_of(&out, "tool"), Some(SYNTHETIC_ROOT_ID));
        assert_eq!(out.root_count(), 1);
    }

    #[test]
    fn test_synthetic_root_disabled_keeps_multiple_roots() {
        let spans = vec![
            span("c1", None, "chain"),
            span("llm", Some("c1"), "llm"),
            span("tool", Some("c1"), "tool"),
        ];
        let options = NormalizeOptions {
            create_synthetic_root: false,
        };
        let out = normalize_spans(&spans, &options);
        assert_eq!(out.len(), 2);
        assert_eq!(out.root_count(), 2);
        assert!(out.parents_resolve());
    }

    #[test]
    fn test_single_orphan_never_gets_synthetic_root() {
        let spans = vec![span("c1", None, "chain"), span("llm", Some("c1"), "llm")];
        for create in [true, false] {
            let options = NormalizeOptions {
                create_synthetic_root: create,
            };
            let out = normalize_spans(&spans, &options);
            assert_eq!(out.len(), 1);
            assert_eq!(out.spans[0].parent_id, None);
        }
    }

    #[test]
    fn test_synthetic_root_id_avoids_collision() {
        let spans = vec![
            span(SYNTHETIC_ROOT_ID, None, "llm"),
            span("tool", None, "tool"),
        ];
        let out = normalize_spans(&spans, &NormalizeOptions::default());
        assert_eq!(out.spans[0].span_id, "synthetic-root-1");
        assert_eq!(parent_of(&out, SYNTHETIC_ROOT_ID), Some("synthetic-root-1"));
    }

    #[test]
    fn test_dangling_parent_becomes_root() {
        let spans = vec![span("llm", Some("missing"), "llm")];
        let out = normalize_spans(&spans, &NormalizeOptions::default());
        assert_eq!(out.spans[0].parent_id, None);
        assert_eq!(out.stats.dangling_parents, 1);
    }

    #[test]
    fn test_self_parent_is_treated_as_root() {
        let spans = vec![span("llm", Some("llm"), "llm")];
        let out = normalize_spans(&spans, &NormalizeOptions::default());
        assert_eq!(out.spans[0].parent_id, None);
        assert!(out.parents_resolve());
    }

    #[test]
    fn test_infrastructure_cycle_terminates() {
        let spans = vec![
            span("c1", Some("c2"), "chain"),
            span("c2", Some("c1"), "chain"),
            span("llm", Some("c1"), "llm"),
        ];
        let out = normalize_spans(&spans, &NormalizeOptions::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out.spans[0].parent_id, None);
    }

    #[test]
    fn test_semantic_cycle_is_broken() {
        let spans = vec![
            span("a", Some("b"), "llm"),
            span("b", Some("c"), "chain"),
            span("c", Some("a"), "tool"),
        ];
        let out = normalize_spans(&spans, &NormalizeOptions::default());
        assert_eq!(out.stats.cycles_broken, 1);
        assert_eq!(parent_of(&out, "a"), None);
        assert_eq!(parent_of(&out, "c"), Some("a"));
        assert_eq!(out.root_count(), 1);
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let spans = vec![
            span("a", None, "llm").with_name("first"),
            span("a", None, "tool").with_name("second"),
        ];
        let out = normalize_spans(&spans, &NormalizeOptions::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out.spans[0].name, "first");
        assert_eq!(out.stats.duplicate_spans, 1);
    }

    #[test]
    fn test_metric_only_contribution_is_anchored() {
        let spans = vec![
            span("agent", None, "agent"),
            span("c1", Some("agent"), "chain"),
            span("emb", Some("c1"), "embedding")
                .with_attribute("llm.token_count.prompt", json!(30))
                .with_error(true),
        ];
        let out = normalize_spans(&spans, &NormalizeOptions::default());
        assert_eq!(out.len(), 1);
        let contribution = &out.contributions[0];
        assert_eq!(contribution.anchor_id.as_deref(), Some("agent"));
        assert_eq!(contribution.usage.prompt_tokens, 30);
        assert!(contribution.error);
    }

    #[test]
    fn test_round_trip_through_raw_is_stable() {
        let spans = vec![
            span("c1", None, "chain"),
            span("llm", Some("c1"), "llm"),
            span("tool", Some("c1"), "tool"),
        ];
        let options = NormalizeOptions::default();
        let once = normalize_spans(&spans, &options);
        let raw: Vec<RawSpan> = once.spans.iter().map(RawSpan::from).collect();
        let twice = normalize_spans(&raw, &options);
        assert_eq!(once.spans, twice.spans);
    }
}
