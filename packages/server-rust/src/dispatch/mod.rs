//! Dispatcher: admission, endpoint selection, forwarding, envelope wrapping.
//!
//! `route` is the single entry point for every gateway call. It runs the
//! pipeline in a fixed order: admission (auth, rate limit, breaker), then
//! registry lookup, then endpoint selection, then the outbound call through
//! the transport seam. Whatever happens, the caller gets a complete
//! [`ResponseEnvelope`]; gateway failures are data in the envelope, never a
//! transport-level error to the client.
//!
//! Endpoint selection is deterministic: the correlation ID's hash picks one
//! endpoint among the healthy candidates, falling back to the full set when
//! none is currently marked healthy. Retrying with the same correlation ID
//! therefore lands on the same instance while the table is unchanged.

pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use meshgate_core::{GatewayError, RequestEnvelope, ResponseEnvelope, ServiceEndpoint, ServiceTable};

use crate::admission::AdmissionControl;
use crate::config::GatewayConfig;
use crate::registry::Registry;

pub use transport::{HttpTransport, ServiceTransport, TransportError};

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Routes one call to one backend instance and wraps the result.
pub struct Dispatcher {
    registry: Registry,
    admission: AdmissionControl,
    transport: Arc<dyn ServiceTransport>,
    budget: Duration,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        registry: Registry,
        admission: AdmissionControl,
        transport: Arc<dyn ServiceTransport>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            registry,
            admission,
            transport,
            budget: config.request_budget,
        }
    }

    /// Runs the full routing pipeline for one call.
    ///
    /// Never returns an error: every failure mode maps to its envelope code
    /// and the corresponding fixed message.
    pub async fn route(
        &self,
        service: &str,
        action: &str,
        envelope: &RequestEnvelope,
    ) -> ResponseEnvelope {
        match self.forward(service, action, envelope).await {
            Ok(data) => ResponseEnvelope::ok(data),
            Err(error) => {
                debug!(
                    correlation_id = %envelope.correlation_id,
                    service,
                    action,
                    code = error.code(),
                    %error,
                    "call not forwarded or failed"
                );
                ResponseEnvelope::failure(error)
            }
        }
    }

    async fn forward(
        &self,
        service: &str,
        action: &str,
        envelope: &RequestEnvelope,
    ) -> Result<Value, GatewayError> {
        if service.is_empty() || action.is_empty() {
            return Err(GatewayError::NotFound);
        }

        self.admission
            .admit(&envelope.correlation_id, service, action, &envelope.headers)?;

        let endpoints = self.registry.lookup(service)?;
        let endpoint = select_endpoint(&endpoints, envelope.correlation_id.hash64())
            .ok_or(GatewayError::NotFound)?;

        let outcome = self
            .transport
            .call(endpoint, action, envelope, self.budget)
            .await;

        match outcome {
            Ok(payload) => match serde_json::from_slice::<Value>(&payload) {
                Ok(data) => {
                    self.admission.report_outcome(service, true);
                    Ok(data)
                }
                Err(error) => {
                    // The call completed but the backend spoke garbage;
                    // that counts against its breaker.
                    self.admission.report_outcome(service, false);
                    warn!(
                        correlation_id = %envelope.correlation_id,
                        service,
                        action,
                        %error,
                        raw = %String::from_utf8_lossy(&payload),
                        "backend payload is not valid JSON"
                    );
                    Err(GatewayError::ServerError)
                }
            },
            Err(error) => {
                self.admission.report_outcome(service, false);
                warn!(
                    correlation_id = %envelope.correlation_id,
                    service,
                    action,
                    address = %endpoint.address,
                    port = endpoint.port,
                    %error,
                    "outbound call failed"
                );
                Err(GatewayError::ServerError)
            }
        }
    }

    /// Current service table, for the cluster-status surface.
    #[must_use]
    pub fn cluster_snapshot(&self) -> Arc<ServiceTable> {
        self.registry.snapshot()
    }
}

// ---------------------------------------------------------------------------
// Endpoint selection
// ---------------------------------------------------------------------------

/// Picks one endpoint by correlation hash, preferring healthy candidates.
///
/// When every endpoint is flagged unhealthy the staleness marking is
/// advisory only and selection falls back to the full set.
fn select_endpoint(endpoints: &[ServiceEndpoint], hash: u64) -> Option<&ServiceEndpoint> {
    if endpoints.is_empty() {
        return None;
    }
    let healthy: Vec<&ServiceEndpoint> = endpoints.iter().filter(|e| e.healthy).collect();
    let candidates = if healthy.is_empty() {
        endpoints.iter().collect::<Vec<_>>()
    } else {
        healthy
    };
    #[allow(clippy::cast_possible_truncation)]
    let index = (hash % candidates.len() as u64) as usize;
    Some(candidates[index])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
