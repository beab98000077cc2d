//! Shim telemetry for observability.
//!
//! Lock-free atomic counters recording what the interceptor, pipeline and
//! orchestrator did. Counters are shared through an `Arc<ShimMetrics>` and
//! read through point-in-time snapshots.
//!
//! # Architecture
//!
//! ```text
//! Interceptor ───┐
//! Pipeline ──────┼──► ShimMetrics ─────► TelemetrySnapshot ─────► CLI / metrics request
//! Orchestrator ──┘    (atomic counters)  (point-in-time copy)
//! ```
//!
//! # Example
//!
//! ```
//! use abrshim::telemetry::ShimMetrics;
//!
//! let metrics = ShimMetrics::new();
//! metrics.fetch_captured();
//! metrics.substitution_completed(4096);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.substitutions, 1);
//! assert_eq!(snapshot.substituted_bytes, 4096);
//! ```

mod metrics;
mod snapshot;

pub use metrics::ShimMetrics;
pub use snapshot::TelemetrySnapshot;
