//! Axum handler definitions for the gateway listener.
//!
//! `AppState` carries the shared pipeline pieces into every handler via
//! axum's `State` extraction; the submodules hold the handlers themselves.

pub mod cluster;
pub mod gateway;
pub mod health;

pub use cluster::cluster_handler;
pub use gateway::gateway_handler;
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use crate::dispatch::Dispatcher;
use crate::network::shutdown::ShutdownController;
use crate::trace::TracePipeline;

/// Shared state for all handlers. `Arc`s throughout, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// The routing pipeline (admission, registry, transport).
    pub dispatcher: Arc<Dispatcher>,
    /// Correlation handling and trace event emission.
    pub trace: TracePipeline,
    /// Drain coordination and in-flight accounting.
    pub shutdown: Arc<ShutdownController>,
    /// Process start time, for the uptime field on the health surface.
    pub start_time: Instant,
}
