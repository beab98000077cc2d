//! Real network transport backed by reqwest.

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::request::{RequestHandle, Transport};

/// Errors raised while setting up or using the network transport.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The HTTP client could not be built.
    #[error("failed to create HTTP client: {0}")]
    Client(String),

    /// No tokio runtime to run fetches on.
    #[error("network transport requires a tokio runtime")]
    NoRuntime,

    /// The fetch itself failed.
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
}

/// Forwards passthrough requests to the network.
///
/// Fetches run on the tokio runtime captured at construction; the player's
/// request is completed from the response, or failed on transport errors.
/// Non-success statuses are delivered as-is, as a browser would.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    runtime: Handle,
}

impl HttpTransport {
    /// Create a transport with a 30 second request timeout.
    pub fn new() -> Result<Self, NetworkError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a transport with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, NetworkError> {
        let runtime = Handle::try_current().map_err(|_| NetworkError::NoRuntime)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::Client(e.to_string()))?;

        Ok(Self { client, runtime })
    }
}

async fn fetch(
    client: &reqwest::Client,
    method: &str,
    url: &str,
) -> Result<(u16, String, Bytes), NetworkError> {
    let method = reqwest::Method::from_bytes(method.as_bytes()).unwrap_or(reqwest::Method::GET);
    let request_error = |e: reqwest::Error| NetworkError::Request {
        url: url.to_string(),
        message: e.to_string(),
    };

    let response = client
        .request(method, url)
        .send()
        .await
        .map_err(request_error)?;
    let status = response.status();
    let body = response.bytes().await.map_err(request_error)?;

    Ok((
        status.as_u16(),
        status.canonical_reason().unwrap_or_default().to_string(),
        body,
    ))
}

impl Transport for HttpTransport {
    fn transmit(&self, request: RequestHandle) {
        let client = self.client.clone();
        self.runtime.spawn(async move {
            match fetch(&client, request.method(), request.url()).await {
                Ok((status, status_text, body)) => {
                    debug!(url = %request.url(), status, bytes = body.len(), "Network response");
                    request.complete(status, &status_text, body);
                }
                Err(e) => {
                    warn!(error = %e, "Network request failed");
                    request.fail();
                }
            }
        });
    }
}
