//! Global atomic counters for evaluation runs.
//!
//! Counters are incremented by the run orchestrator. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event, typically once per run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    traces_normalized: AtomicU64,
    spans_dropped: AtomicU64,
    results_produced: AtomicU64,
    results_skipped: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            traces_normalized: AtomicU64::new(0),
            spans_dropped: AtomicU64::new(0),
            results_produced: AtomicU64::new(0),
            results_skipped: AtomicU64::new(0),
        }
    }

    pub fn inc_traces_normalized(&self) {
        self.traces_normalized.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "traces_normalized", "counter incremented");
    }

    /// Add the number of infrastructure and metric-only spans a trace lost.
    pub fn add_spans_dropped(&self, n: u64) {
        self.spans_dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_results(&self, produced: u64, skipped: u64) {
        self.results_produced.fetch_add(produced, Ordering::Relaxed);
        self.results_skipped.fetch_add(skipped, Ordering::Relaxed);
        tracing::trace!(metric = "results", produced, skipped, "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            traces_normalized = self.traces_normalized(),
            spans_dropped = self.spans_dropped(),
            results_produced = self.results_produced(),
            results_skipped = self.results_skipped(),
        );
    }

    pub fn traces_normalized(&self) -> u64 {
        self.traces_normalized.load(Ordering::Relaxed)
    }

    pub fn spans_dropped(&self) -> u64 {
        self.spans_dropped.load(Ordering::Relaxed)
    }

    /// Results produced, skips included.
    pub fn results_produced(&self) -> u64 {
        self.results_produced.load(Ordering::Relaxed)
    }

    pub fn results_skipped(&self) -> u64 {
        self.results_skipped.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.traces_normalized.store(0, Ordering::Relaxed);
        self.spans_dropped.store(0, Ordering::Relaxed);
        self.results_produced.store(0, Ordering::Relaxed);
        self.results_skipped.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_traces_normalized();
        m.inc_traces_normalized();
        assert_eq!(m.traces_normalized(), 2);

        m.add_spans_dropped(5);
        assert_eq!(m.spans_dropped(), 5);

        m.add_results(4, 1);
        m.add_results(2, 0);
        assert_eq!(m.results_produced(), 6);
        assert_eq!(m.results_skipped(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_traces_normalized();
        m.add_spans_dropped(3);
        m.add_results(1, 1);
        m.reset();
        assert_eq!(m.traces_normalized(), 0);
        assert_eq!(m.spans_dropped(), 0);
        assert_eq!(m.results_produced(), 0);
        assert_eq!(m.results_skipped(), 0);
    }
}
