//! The `/api/{service}/{action}` handler: the gateway's single dispatch
//! surface.
//!
//! Accepts any method. The raw request is normalized into a
//! [`RequestEnvelope`], wrapped in a trace hop, routed through the
//! dispatcher, and answered with the uniform `{code, message, data}`
//! envelope. Handled outcomes (including gateway denials) are always
//! HTTP 200; the envelope code carries the verdict. The correlation ID is
//! echoed on the response so edge clients learn the ID minted for them.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::Value;
use tracing::debug;

use meshgate_core::{RequestEnvelope, RequestSnapshot, CORRELATION_HEADER};

use super::AppState;

/// Upper bound on buffered request bodies.
const BODY_LIMIT: usize = 2 * 1024 * 1024;

pub async fn gateway_handler(
    State(state): State<AppState>,
    Path((service, action)): Path<(String, String)>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
) -> impl IntoResponse {
    let _guard = state.shutdown.in_flight_guard();

    let method = request.method().to_string();
    let url = request.uri().path().to_string();
    let url_query = request
        .uri()
        .query()
        .map(|query| format!("?{query}"))
        .unwrap_or_default();
    let headers = lowercase_headers(request.headers());
    let client_ip = client_ip(&headers, peer);

    let content_type = headers.get("content-type").map_or("", String::as_str).to_string();
    let body_bytes = match axum::body::to_bytes(request.into_body(), BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(error) => {
            debug!(%error, "failed to buffer request body, treating as empty");
            bytes::Bytes::new()
        }
    };
    let body = decode_body(&content_type, &body_bytes);

    let snapshot = RequestSnapshot {
        client_ip: client_ip.clone(),
        method: method.clone(),
        url: url.clone(),
        url_query: url_query.clone(),
        headers: serde_json::to_value(&headers).unwrap_or(Value::Null),
        body: body.clone(),
    };
    let context = state
        .trace
        .begin(headers.get(CORRELATION_HEADER).map(String::as_str), snapshot);
    let correlation_id = context.correlation_id().clone();

    let envelope = RequestEnvelope {
        client_ip,
        method,
        url,
        url_query,
        headers,
        body,
        correlation_id: correlation_id.clone(),
    };

    let response = state.dispatcher.route(&service, &action, &envelope).await;
    context.end();

    (
        [(CORRELATION_HEADER, correlation_id.to_string())],
        Json(response),
    )
}

/// Header map with lowercased names; non-UTF-8 values are lossy-decoded.
fn lowercase_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_ascii_lowercase(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Client address: first `X-Forwarded-For` entry when present, otherwise
/// the peer socket address.
fn client_ip(headers: &BTreeMap<String, String>, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}

/// Decodes the request body into a JSON value.
///
/// JSON bodies are parsed as-is; form bodies become a string-valued
/// object. An unlabeled content type tries JSON first, then form fields.
/// Empty and undecodable bodies become `Null` so the call still
/// dispatches with whatever the query string carries.
fn decode_body(content_type: &str, bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    if content_type.starts_with("application/json") {
        return serde_json::from_slice(bytes).unwrap_or(Value::Null);
    }
    if content_type.starts_with("application/x-www-form-urlencoded") {
        return decode_form(bytes);
    }
    match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(_) => decode_form(bytes),
    }
}

fn decode_form(bytes: &[u8]) -> Value {
    match serde_urlencoded::from_bytes::<BTreeMap<String, String>>(bytes) {
        Ok(fields) if !fields.is_empty() => serde_json::to_value(fields).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}
