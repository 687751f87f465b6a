//! Transport-level Tower middleware for the gateway listener.
//!
//! Outer-to-inner: tracing spans, CORS, then the transport timeout. The
//! stack deliberately carries no request-id layer: correlation IDs are
//! minted and propagated by the trace pipeline, which must see the raw
//! incoming header to tell an edge hop from an internal one. A layer that
//! stamped IDs ahead of the handler would make every hop look internal.

use axum::http::{Method, StatusCode};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::NetworkConfig;

/// The composed layer stack, outermost first.
type HttpLayers = tower::layer::util::Stack<
    TimeoutLayer,
    tower::layer::util::Stack<
        CorsLayer,
        tower::layer::util::Stack<
            TraceLayer<
                tower_http::classify::SharedClassifier<
                    tower_http::classify::ServerErrorsAsFailures,
                >,
            >,
            tower::layer::util::Identity,
        >,
    >,
>;

/// Builds the middleware stack from the listener configuration.
#[must_use]
pub fn build_http_layers(config: &NetworkConfig) -> HttpLayers {
    ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&config.cors_origins))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .into_inner()
}

/// `"*"` anywhere in the list allows any origin; otherwise each entry is
/// parsed into an explicit allowlist (unparseable entries are skipped).
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|origin| origin.parse().ok()))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn builds_with_defaults() {
        let _layers = build_http_layers(&NetworkConfig::default());
    }

    #[test]
    fn builds_with_explicit_origins_and_timeout() {
        let config = NetworkConfig {
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "https://gateway.example.com".to_string(),
            ],
            request_timeout: Duration::from_secs(5),
            ..NetworkConfig::default()
        };
        let _layers = build_http_layers(&config);
    }

    #[test]
    fn wildcard_origin_builds() {
        let _cors = build_cors_layer(&["*".to_string()]);
    }
}
