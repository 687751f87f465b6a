//! Trace event schema.
//!
//! Append-only events describing the lifecycle of one request hop. Events
//! are never mutated after emission; within one correlation ID the start
//! event of a hop always precedes its end event.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::correlation::CorrelationId;
use crate::envelope::RequestEnvelope;

// ---------------------------------------------------------------------------
// TraceEventKind
// ---------------------------------------------------------------------------

/// Lifecycle marker of a trace event.
///
/// `Request*` kinds are emitted by the hop that originated the correlation
/// ID (the edge hop); `Service*` kinds by hops propagating an upstream ID.
/// This distinction separates client-facing from internal hops in the
/// aggregated trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEventKind {
    #[serde(rename = "request.start")]
    RequestStart,
    #[serde(rename = "request.end")]
    RequestEnd,
    #[serde(rename = "service.start")]
    ServiceStart,
    #[serde(rename = "service.end")]
    ServiceEnd,
}

impl TraceEventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RequestStart => "request.start",
            Self::RequestEnd => "request.end",
            Self::ServiceStart => "service.start",
            Self::ServiceEnd => "service.end",
        }
    }

    /// Whether this is a start-of-hop marker.
    #[must_use]
    pub fn is_start(self) -> bool {
        matches!(self, Self::RequestStart | Self::ServiceStart)
    }
}

// ---------------------------------------------------------------------------
// RequestSnapshot
// ---------------------------------------------------------------------------

/// Frozen copy of the inbound request attached to start events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSnapshot {
    pub client_ip: String,
    pub method: String,
    pub url: String,
    pub url_query: String,
    pub headers: Value,
    pub body: Value,
}

impl From<&RequestEnvelope> for RequestSnapshot {
    fn from(envelope: &RequestEnvelope) -> Self {
        Self {
            client_ip: envelope.client_ip.clone(),
            method: envelope.method.clone(),
            url: envelope.url.clone(),
            url_query: envelope.url_query.clone(),
            headers: serde_json::to_value(&envelope.headers).unwrap_or(Value::Null),
            body: envelope.body.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// TraceEvent
// ---------------------------------------------------------------------------

/// One emitted trace record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEvent {
    pub project_name: String,
    pub service_name: String,
    pub service_instance_id: String,
    pub correlation_id: CorrelationId,
    pub event: TraceEventKind,
    /// Unix millis at emission time.
    pub timestamp_ms: u64,
    /// Present on start events only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestSnapshot>,
    /// Present on end events only: elapsed wall time of the hop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing_ms: Option<u64>,
    /// Set on end events when the hop was abandoned (caller disconnect or
    /// deadline expiry) rather than completed.
    #[serde(default)]
    pub cancelled: bool,
}
