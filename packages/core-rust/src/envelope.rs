//! Request and response envelopes.
//!
//! The `RequestEnvelope` is the immutable, transport-neutral snapshot of one
//! inbound call; the `ResponseEnvelope` is the single shape every caller
//! receives back, success or failure. Raw backend payloads and transport
//! errors never reach callers directly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::correlation::CorrelationId;
use crate::error::GatewayError;

// ---------------------------------------------------------------------------
// RequestEnvelope
// ---------------------------------------------------------------------------

/// Transport-neutral view of one inbound request.
///
/// Constructed once per call by the HTTP surface and treated as read-only
/// from then on. Header keys are stored lowercased so lookups are
/// case-insensitive regardless of how the client spelled them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub client_ip: String,
    /// Uppercase HTTP method (`GET`, `POST`, ...).
    pub method: String,
    /// Request path as received, e.g. `/api/user/exists`.
    pub url: String,
    /// Raw query string including the leading `?`, or empty.
    pub url_query: String,
    /// Headers with lowercased keys.
    pub headers: BTreeMap<String, String>,
    /// Structured body: decoded JSON or form fields, `Null` when absent.
    pub body: Value,
    pub correlation_id: CorrelationId,
}

impl RequestEnvelope {
    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// ResponseEnvelope
// ---------------------------------------------------------------------------

/// The uniform wrapper returned to every gateway caller.
///
/// `code` 0 means success; any other value is one of the
/// [`GatewayError`] codes. Handled outcomes always travel as HTTP 200 --
/// the envelope, not the status line, carries the verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub code: i32,
    pub message: String,
    pub data: Value,
}

impl ResponseEnvelope {
    /// Success envelope wrapping the backend's structured payload.
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self {
            code: 0,
            message: String::new(),
            data,
        }
    }

    /// Failure envelope for one of the taxonomy kinds. Carries no payload.
    #[must_use]
    pub fn failure(error: GatewayError) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
            data: Value::Null,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn envelope_with_headers(headers: &[(&str, &str)]) -> RequestEnvelope {
        RequestEnvelope {
            client_ip: "127.0.0.1".to_string(),
            method: "GET".to_string(),
            url: "/api/user/exists".to_string(),
            url_query: "?username=bob".to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), (*v).to_string()))
                .collect(),
            body: Value::Null,
            correlation_id: CorrelationId::mint(),
        }
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let envelope = envelope_with_headers(&[("Content-Type", "application/json")]);
        assert_eq!(envelope.header("content-type"), Some("application/json"));
        assert_eq!(envelope.header("Content-Type"), Some("application/json"));
        assert_eq!(envelope.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(envelope.header("x-missing"), None);
    }

    #[test]
    fn ok_envelope_has_code_zero() {
        let envelope = ResponseEnvelope::ok(json!({"exists": true}));
        assert!(envelope.is_success());
        assert_eq!(envelope.code, 0);
        assert_eq!(envelope.data, json!({"exists": true}));
    }

    #[test]
    fn failure_envelope_carries_code_message_and_null_data() {
        let envelope = ResponseEnvelope::failure(GatewayError::NotFound);
        assert!(!envelope.is_success());
        assert_eq!(envelope.code, 404);
        assert_eq!(envelope.message, "The resource could not be found");
        assert_eq!(envelope.data, Value::Null);
    }

    #[test]
    fn response_envelope_wire_shape() {
        let wire = serde_json::to_value(ResponseEnvelope::ok(json!(1))).unwrap();
        assert_eq!(wire, json!({"code": 0, "message": "", "data": 1}));
    }
}
