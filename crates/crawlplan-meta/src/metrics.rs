//! Global atomic counters for arbitration observability.
//!
//! Counters are bumped silently at the call site. [`Metrics::flush`] emits
//! the current values as one `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free counters.
pub struct Metrics {
    decisions_made: AtomicU64,
    fusions_applied: AtomicU64,
    replays_degraded: AtomicU64,
    decision_log_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            decisions_made: AtomicU64::new(0),
            fusions_applied: AtomicU64::new(0),
            replays_degraded: AtomicU64::new(0),
            decision_log_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_decisions(&self) {
        self.decisions_made.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "decisions_made", "counter incremented");
    }

    pub fn inc_fusions(&self) {
        self.fusions_applied.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "fusions_applied", "counter incremented");
    }

    pub fn inc_replays_degraded(&self) {
        self.replays_degraded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "replays_degraded", "counter incremented");
    }

    pub fn inc_decision_log_failures(&self) {
        self.decision_log_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "decision_log_failures", "counter incremented");
    }

    /// Emit all counters as a single `info!` event.
    ///
    /// Call at natural boundaries (end of a CLI run, service tick) rather
    /// than after every decision.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            decisions_made = self.decisions_made(),
            fusions_applied = self.fusions_applied(),
            replays_degraded = self.replays_degraded(),
            decision_log_failures = self.decision_log_failures(),
        );
    }

    pub fn decisions_made(&self) -> u64 {
        self.decisions_made.load(Ordering::Relaxed)
    }

    pub fn fusions_applied(&self) -> u64 {
        self.fusions_applied.load(Ordering::Relaxed)
    }

    pub fn replays_degraded(&self) -> u64 {
        self.replays_degraded.load(Ordering::Relaxed)
    }

    pub fn decision_log_failures(&self) -> u64 {
        self.decision_log_failures.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.decisions_made.store(0, Ordering::Relaxed);
        self.fusions_applied.store(0, Ordering::Relaxed);
        self.replays_degraded.store(0, Ordering::Relaxed);
        self.decision_log_failures.store(0, Ordering::Relaxed);
    }
}
