//! Health, liveness, and readiness handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::network::shutdown::HealthState;

/// Detailed health JSON. Always 200; the `state` field tells monitoring
/// apart "up but draining" from "down".
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.dispatcher.cluster_snapshot();
    Json(json!({
        "state": state.shutdown.health_state().as_str(),
        "services": snapshot.service_count(),
        "in_flight": state.shutdown.in_flight_count(),
        "trace_events_dropped": state.trace.dropped_events(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Liveness probe: 200 whenever the process can answer at all. Checking
/// anything deeper here would turn a draining pod into a restart loop.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: 200 only in the `Ready` state, 503 while starting,
/// draining, or stopped.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
