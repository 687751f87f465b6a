//! Outbound transport adapter.
//!
//! The dispatcher depends only on [`ServiceTransport`]; concrete bindings
//! (HTTP today, anything else tomorrow) implement it. This keeps runtime
//! type inspection out of the routing path entirely.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use meshgate_core::{RequestEnvelope, ServiceEndpoint, CORRELATION_HEADER};

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// Outbound call failure, split so the breaker and logs can tell a
/// deadline expiry apart from other transport failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("outbound call exceeded its {budget_ms}ms deadline")]
    Timeout { budget_ms: u64 },
    #[error("outbound call failed: {0}")]
    Failed(String),
}

// ---------------------------------------------------------------------------
// ServiceTransport trait
// ---------------------------------------------------------------------------

/// Performs the forwarded call to a resolved endpoint.
///
/// Implementations must honor `deadline` and must forward the correlation
/// header unchanged so the downstream hop joins the same trace.
#[async_trait]
pub trait ServiceTransport: Send + Sync {
    /// Forward the envelope to `endpoint`'s `action` and return the raw
    /// response payload.
    ///
    /// # Errors
    ///
    /// `TransportError::Timeout` when the deadline expires,
    /// `TransportError::Failed` for every other transport-level failure
    /// (connect error, non-success status, body read error).
    async fn call(
        &self,
        endpoint: &ServiceEndpoint,
        action: &str,
        envelope: &RequestEnvelope,
        deadline: Duration,
    ) -> Result<Bytes, TransportError>;
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

/// HTTP binding over a shared `reqwest` client (connection-pooled).
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceTransport for HttpTransport {
    async fn call(
        &self,
        endpoint: &ServiceEndpoint,
        action: &str,
        envelope: &RequestEnvelope,
        deadline: Duration,
    ) -> Result<Bytes, TransportError> {
        #[allow(clippy::cast_possible_truncation)]
        let budget_ms = deadline.as_millis() as u64;
        let classify = move |error: reqwest::Error| {
            if error.is_timeout() {
                TransportError::Timeout { budget_ms }
            } else {
                TransportError::Failed(error.to_string())
            }
        };

        let method = reqwest::Method::from_bytes(envelope.method.as_bytes())
            .unwrap_or(reqwest::Method::GET);
        let url = target_url(endpoint, action, &envelope.url_query);

        let mut request = self
            .client
            .request(method, url)
            .headers(forward_headers(envelope))
            .timeout(deadline);
        if !envelope.body.is_null() {
            request = request.json(&envelope.body);
        }

        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Failed(format!(
                "backend responded with status {status}"
            )));
        }
        response.bytes().await.map_err(classify)
    }
}

/// Full URL for the forwarded call; `url_query` already carries its `?`.
fn target_url(endpoint: &ServiceEndpoint, action: &str, url_query: &str) -> String {
    format!("{}/{}{}", endpoint.base_url(), action, url_query)
}

/// Headers to forward downstream.
///
/// Hop-by-hop and body-framing headers are stripped (the body is
/// re-encoded as JSON); the correlation header is always set from the
/// envelope so it propagates even if the client never sent one.
fn forward_headers(envelope: &RequestEnvelope) -> HeaderMap {
    const SKIP: &[&str] = &[
        "host",
        "connection",
        "content-length",
        "content-type",
        "transfer-encoding",
        CORRELATION_HEADER,
    ];

    let mut headers = HeaderMap::new();
    for (key, value) in &envelope.headers {
        if SKIP.contains(&key.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    if let Ok(value) = HeaderValue::from_str(envelope.correlation_id.as_str()) {
        headers.insert(HeaderName::from_static(CORRELATION_HEADER), value);
    }
    headers
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
