//! Coordinator wire types, configuration and errors.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::segment::{Decision, SegmentIndex};

/// Default coordinator endpoint.
pub const DEFAULT_COORDINATOR_URL: &str = "https://www.example.org/request";

/// Default per-request timeout.
pub const DEFAULT_COORDINATOR_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from coordinator requests.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The request could not be sent or the body not read.
    #[error("coordinator request failed: {0}")]
    Http(String),

    /// The coordinator answered with a non-success status.
    #[error("coordinator returned status {status}")]
    Status { status: u16 },

    /// The response body was not a valid decision.
    #[error("invalid coordinator payload: {0}")]
    Decode(String),
}

/// Result alias for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Coordinator connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Endpoint every request is posted to.
    pub url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_COORDINATOR_URL.to_string(),
            timeout: DEFAULT_COORDINATOR_TIMEOUT,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// JSON body posted to the coordinator.
///
/// A decision request sets `pieceRequest`, a resource request sets
/// `resourceRequest`, and a metrics report carries `stats` only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorRequest {
    pub piece_request: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub resource_request: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<SegmentIndex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<serde_json::Value>,
}

impl CoordinatorRequest {
    /// Ask for the quality decision of `index`.
    pub fn decision(index: SegmentIndex) -> Self {
        Self {
            piece_request: true,
            index: Some(index),
            ..Default::default()
        }
    }

    /// Ask for the segment payload of `index`.
    pub fn resource(index: SegmentIndex) -> Self {
        Self {
            resource_request: true,
            index: Some(index),
            ..Default::default()
        }
    }

    /// Report aggregate statistics.
    pub fn metrics(stats: serde_json::Value) -> Self {
        Self {
            stats: Some(stats),
            ..Default::default()
        }
    }
}

/// Parse a decision response body.
pub fn decode_decision(body: &[u8]) -> CoordinatorResult<Decision> {
    serde_json::from_slice(body).map_err(|e| CoordinatorError::Decode(e.to_string()))
}
