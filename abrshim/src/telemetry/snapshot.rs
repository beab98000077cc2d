//! Point-in-time copy of the shim counters.

use std::fmt;

use serde::Serialize;

/// Snapshot of [`ShimMetrics`](super::ShimMetrics).
///
/// Serializes as camelCase JSON so it can be posted to the coordinator's
/// metrics endpoint unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub fetches_captured: u64,
    pub fetches_passed_through: u64,
    pub fetch_retries: u64,
    pub substitutions: u64,
    pub substituted_bytes: u64,
    pub callback_errors: u64,
    pub decisions_received: u64,
    pub fallback_decisions: u64,
    pub coordinator_failures: u64,
    pub segments_served: u64,
    pub segments_timed_out: u64,
    pub segments_abandoned: u64,
}

impl TelemetrySnapshot {
    /// Fraction of segment fetches answered with a substitute response.
    pub fn substitution_ratio(&self) -> f64 {
        let total = self.fetches_captured + self.fetches_passed_through;
        if total == 0 {
            0.0
        } else {
            self.substitutions as f64 / total as f64
        }
    }
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Fetches:    {} captured, {} passed through, {} retries",
            self.fetches_captured, self.fetches_passed_through, self.fetch_retries
        )?;
        writeln!(
            f,
            "Substitute: {} responses, {} bytes, {} handler errors",
            self.substitutions, self.substituted_bytes, self.callback_errors
        )?;
        writeln!(
            f,
            "Decisions:  {} from coordinator, {} fallback",
            self.decisions_received, self.fallback_decisions
        )?;
        write!(
            f,
            "Segments:   {} served, {} timed out, {} abandoned ({} coordinator failures)",
            self.segments_served,
            self.segments_timed_out,
            self.segments_abandoned,
            self.coordinator_failures
        )
    }
}
