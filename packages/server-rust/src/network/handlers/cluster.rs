//! The `/cluster` handler: read-only view of the service table.

use axum::extract::State;
use axum::Json;

use meshgate_core::{GatewayError, ResponseEnvelope};

use super::AppState;

/// Returns the current service table snapshot in the standard envelope.
///
/// Purely observational: serving this never mutates registry state.
pub async fn cluster_handler(State(state): State<AppState>) -> Json<ResponseEnvelope> {
    let snapshot = state.dispatcher.cluster_snapshot();
    let response = match serde_json::to_value(&*snapshot) {
        Ok(table) => ResponseEnvelope::ok(table),
        Err(_) => ResponseEnvelope::failure(GatewayError::ServerError),
    };
    Json(response)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use meshgate_core::{epoch_ms, ServiceEndpoint};

    use crate::admission::AdmissionControl;
    use crate::config::GatewayConfig;
    use crate::dispatch::{Dispatcher, HttpTransport};
    use crate::network::shutdown::ShutdownController;
    use crate::registry::{Registry, RegistryChange};
    use crate::trace::{MemorySink, TracePipeline};

    use super::*;

    async fn test_state() -> (AppState, Registry) {
        let config = GatewayConfig::default();
        let registry = Registry::spawn(config.heartbeat_timeout, config.sweep_interval);
        let dispatcher = Dispatcher::new(
            registry.clone(),
            AdmissionControl::new(&config),
            Arc::new(HttpTransport::new()),
            &config,
        );
        let state = AppState {
            dispatcher: Arc::new(dispatcher),
            trace: TracePipeline::spawn(&config, Arc::new(MemorySink::new())),
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
        };
        (state, registry)
    }

    #[tokio::test]
    async fn empty_table_is_a_success_envelope() {
        let (state, _registry) = test_state().await;
        let response = cluster_handler(State(state)).await.0;

        assert_eq!(response.code, 0);
        assert!(response.data.get("services").is_some());
        assert!(response.data.get("version").is_some());
    }

    #[tokio::test]
    async fn registered_endpoints_appear_in_the_snapshot() {
        let (state, registry) = test_state().await;
        registry
            .apply(RegistryChange::Upsert(ServiceEndpoint {
                service_name: "user".to_string(),
                address: "10.0.0.1".to_string(),
                port: 9000,
                healthy: true,
                last_seen_ms: epoch_ms(),
            }))
            .await;

        let response = cluster_handler(State(state)).await.0;
        let endpoints = &response.data["services"]["user"];
        assert_eq!(endpoints.as_array().unwrap().len(), 1);
        assert_eq!(endpoints[0]["address"], "10.0.0.1");
    }
}
