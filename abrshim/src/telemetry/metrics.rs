//! Atomic counters shared across components.

use std::sync::atomic::{AtomicU64, Ordering};

use super::TelemetrySnapshot;

/// Counters for interception, decisions and coordinator traffic.
///
/// All methods take `&self`; share through `Arc<ShimMetrics>`.
#[derive(Debug, Default)]
pub struct ShimMetrics {
    fetches_captured: AtomicU64,
    fetches_passed_through: AtomicU64,
    fetch_retries: AtomicU64,
    substitutions: AtomicU64,
    substituted_bytes: AtomicU64,
    callback_errors: AtomicU64,
    decisions_received: AtomicU64,
    fallback_decisions: AtomicU64,
    coordinator_failures: AtomicU64,
    segments_served: AtomicU64,
    segments_timed_out: AtomicU64,
    segments_abandoned: AtomicU64,
}

impl ShimMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A segment fetch was held back from the network.
    pub fn fetch_captured(&self) {
        self.fetches_captured.fetch_add(1, Ordering::Relaxed);
    }

    /// A fetch went to the real network.
    pub fn fetch_passed_through(&self) {
        self.fetches_passed_through.fetch_add(1, Ordering::Relaxed);
    }

    /// A repeated fetch for an already captured or resolved index.
    pub fn fetch_retried(&self) {
        self.fetch_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// A substitute response was replayed into a captured request.
    pub fn substitution_completed(&self, bytes: u64) {
        self.substitutions.fetch_add(1, Ordering::Relaxed);
        self.substituted_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// A player event handler failed during dispatch.
    pub fn callback_failed(&self) {
        self.callback_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// The coordinator answered a decision request.
    pub fn decision_received(&self) {
        self.decisions_received.fetch_add(1, Ordering::Relaxed);
    }

    /// A decision was produced locally because none was available.
    pub fn fallback_decision(&self) {
        self.fallback_decisions.fetch_add(1, Ordering::Relaxed);
    }

    /// A coordinator request failed.
    pub fn coordinator_failed(&self) {
        self.coordinator_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn segment_served(&self) {
        self.segments_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn segment_timed_out(&self) {
        self.segments_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn segment_abandoned(&self) {
        self.segments_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy all counters.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            fetches_captured: self.fetches_captured.load(Ordering::Relaxed),
            fetches_passed_through: self.fetches_passed_through.load(Ordering::Relaxed),
            fetch_retries: self.fetch_retries.load(Ordering::Relaxed),
            substitutions: self.substitutions.load(Ordering::Relaxed),
            substituted_bytes: self.substituted_bytes.load(Ordering::Relaxed),
            callback_errors: self.callback_errors.load(Ordering::Relaxed),
            decisions_received: self.decisions_received.load(Ordering::Relaxed),
            fallback_decisions: self.fallback_decisions.load(Ordering::Relaxed),
            coordinator_failures: self.coordinator_failures.load(Ordering::Relaxed),
            segments_served: self.segments_served.load(Ordering::Relaxed),
            segments_timed_out: self.segments_timed_out.load(Ordering::Relaxed),
            segments_abandoned: self.segments_abandoned.load(Ordering::Relaxed),
        }
    }
}
