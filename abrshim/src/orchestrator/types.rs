//! Orchestrator configuration, outcomes and errors.

use std::time::Duration;

use thiserror::Error;

use super::policy::RetryPolicy;
use crate::coordinator::CoordinatorError;
use crate::segment::SegmentIndex;

/// Default number of simultaneously outstanding segments.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Default attempts per coordinator request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default time a captured or announced segment may wait for resolution.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// First segment index requested.
pub const DEFAULT_START_INDEX: SegmentIndex = 1;

/// Pause between rounds of decision retries while the coordinator is down.
pub const DEFAULT_OUTAGE_BACKOFF: Duration = Duration::from_secs(1);

/// Capacity of the decision broadcast channel.
pub const DEFAULT_DECISION_CHANNEL_CAPACITY: usize = 64;

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Maximum outstanding segments. Default: 5.
    pub pool: usize,
    /// Retry policy for decision and resource requests.
    pub retry: RetryPolicy,
    /// How long a segment may wait for the player's fetch once its payload
    /// is available. Default: 30s.
    pub fetch_timeout: Duration,
    /// First index to request. Default: 1.
    pub start_index: SegmentIndex,
    /// Wait before the same index's decision is retried again once a full
    /// round of `retry` has failed. Default: 1s.
    pub outage_backoff: Duration,
    pub decision_channel_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            pool: DEFAULT_POOL_SIZE,
            retry: RetryPolicy::exponential(DEFAULT_MAX_ATTEMPTS),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            start_index: DEFAULT_START_INDEX,
            outage_backoff: DEFAULT_OUTAGE_BACKOFF,
            decision_channel_capacity: DEFAULT_DECISION_CHANNEL_CAPACITY,
        }
    }
}

impl OrchestratorConfig {
    /// Set the pool size (at least 1).
    pub fn with_pool(mut self, pool: usize) -> Self {
        self.pool = pool.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn with_start_index(mut self, start_index: SegmentIndex) -> Self {
        self.start_index = start_index;
        self
    }

    pub fn with_outage_backoff(mut self, outage_backoff: Duration) -> Self {
        self.outage_backoff = outage_backoff;
        self
    }
}

/// How a segment left the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentOutcome {
    /// The payload was substituted into the player's fetch.
    Served { bytes: u64 },
    /// The player never fetched the segment in time.
    TimedOut,
    /// The payload could not be obtained.
    Abandoned,
}

/// Errors from the request orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A coordinator request failed after all attempts.
    #[error("coordinator request for segment {index} failed after {attempts} attempts: {source}")]
    Coordinator {
        index: SegmentIndex,
        attempts: u32,
        #[source]
        source: CoordinatorError,
    },

    /// The player did not fetch the segment in time.
    #[error("segment {index} was not fetched within {after:?}")]
    Timeout { index: SegmentIndex, after: Duration },

    /// The segment was given up without a payload.
    #[error("segment {index} abandoned")]
    Abandoned { index: SegmentIndex },

    /// `start` was called twice.
    #[error("orchestrator already started")]
    AlreadyStarted,
}
