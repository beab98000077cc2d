//! Coordinator client abstraction.
//!
//! The orchestrator talks to the coordinator only through
//! [`CoordinatorClient`], so tests can substitute an in-process mock.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use tracing::{debug, warn};

use super::types::{
    decode_decision, CoordinatorConfig, CoordinatorError, CoordinatorRequest, CoordinatorResult,
};
use crate::segment::{Decision, SegmentIndex};

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Hook run once the resource request is about to leave.
pub type OnSend = Box<dyn FnOnce() + Send>;

/// Requests issued to the external coordinator.
///
/// Uses `Pin<Box<dyn Future>>` so the orchestrator can hold an
/// `Arc<dyn CoordinatorClient>`.
pub trait CoordinatorClient: Send + Sync {
    /// Fetch the quality decision for `index`.
    fn decision(&self, index: SegmentIndex) -> BoxFuture<'_, CoordinatorResult<Decision>>;

    /// Fetch the substitute payload for `index`.
    ///
    /// `on_send` must run right before the request is transmitted, and at
    /// most once per call.
    fn resource(
        &self,
        index: SegmentIndex,
        on_send: OnSend,
    ) -> BoxFuture<'_, CoordinatorResult<Bytes>>;

    /// Post aggregate statistics. The response body is ignored.
    fn metrics(&self, stats: serde_json::Value) -> BoxFuture<'_, CoordinatorResult<()>>;
}

/// Coordinator reached over HTTP POST.
#[derive(Debug, Clone)]
pub struct HttpCoordinator {
    client: reqwest::Client,
    url: String,
}

impl HttpCoordinator {
    /// Create a client for the configured endpoint.
    pub fn new(config: &CoordinatorConfig) -> CoordinatorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CoordinatorError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    /// Endpoint requests are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, body: &CoordinatorRequest) -> CoordinatorResult<Bytes> {
        debug!(url = %self.url, ?body, "Sending coordinator request");

        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| CoordinatorError::Http(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %self.url, status = status.as_u16(), "Coordinator returned error status");
            return Err(CoordinatorError::Status {
                status: status.as_u16(),
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| CoordinatorError::Http(format!("Failed to read response: {}", e)))
    }
}

impl CoordinatorClient for HttpCoordinator {
    fn decision(&self, index: SegmentIndex) -> BoxFuture<'_, CoordinatorResult<Decision>> {
        Box::pin(async move {
            let body = self.post(&CoordinatorRequest::decision(index)).await?;
            decode_decision(&body)
        })
    }

    fn resource(
        &self,
        index: SegmentIndex,
        on_send: OnSend,
    ) -> BoxFuture<'_, CoordinatorResult<Bytes>> {
        Box::pin(async move {
            on_send();
            self.post(&CoordinatorRequest::resource(index)).await
        })
    }

    fn metrics(&self, stats: serde_json::Value) -> BoxFuture<'_, CoordinatorResult<()>> {
        Box::pin(async move {
            self.post(&CoordinatorRequest::metrics(stats)).await?;
            Ok(())
        })
    }
}
