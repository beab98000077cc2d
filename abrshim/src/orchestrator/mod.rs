//! Segment request orchestration.
//!
//! Keeps a bounded window of segments in flight against the coordinator and
//! hands their payloads to the interceptor.

mod policy;
mod session;
mod types;

pub use policy::{
    RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_DELAY_SECS,
};
pub use session::RequestOrchestrator;
pub use types::{
    OrchestratorConfig, OrchestratorError, SegmentOutcome, DEFAULT_DECISION_CHANNEL_CAPACITY,
    DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_ATTEMPTS, DEFAULT_OUTAGE_BACKOFF, DEFAULT_POOL_SIZE,
    DEFAULT_START_INDEX,
};
