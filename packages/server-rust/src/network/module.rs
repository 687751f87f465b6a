//! Gateway server lifecycle with deferred startup.
//!
//! `new()` wires the pipeline (registry, admission, dispatcher, trace),
//! `start()` binds the listener, `serve()` accepts traffic until the
//! shutdown future resolves and then drains. The gap between `new()` and
//! `serve()` is where callers attach discovery sources and seed endpoints.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{any, get};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::admission::AdmissionControl;
use crate::config::{GatewayConfig, NetworkConfig};
use crate::dispatch::{Dispatcher, HttpTransport, ServiceTransport};
use crate::network::handlers::{
    cluster_handler, gateway_handler, health_handler, liveness_handler, readiness_handler,
    AppState,
};
use crate::network::middleware::build_http_layers;
use crate::network::shutdown::ShutdownController;
use crate::registry::Registry;
use crate::trace::{TracePipeline, TraceSink};

/// How long `serve` waits for in-flight calls after the listener stops.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the full gateway: pipeline state, listener, drain sequence.
pub struct GatewayServer {
    network: NetworkConfig,
    listener: Option<TcpListener>,
    registry: Registry,
    shutdown: Arc<ShutdownController>,
    state: AppState,
}

impl GatewayServer {
    /// Wires the pipeline without binding any port.
    ///
    /// Uses the HTTP transport for outbound calls; tests and embedders can
    /// substitute one via [`GatewayServer::with_transport`].
    #[must_use]
    pub fn new(
        gateway: &GatewayConfig,
        network: NetworkConfig,
        sink: Arc<dyn TraceSink>,
    ) -> Self {
        Self::with_transport(gateway, network, sink, Arc::new(HttpTransport::new()))
    }

    /// Same as [`GatewayServer::new`] with an explicit outbound transport.
    #[must_use]
    pub fn with_transport(
        gateway: &GatewayConfig,
        network: NetworkConfig,
        sink: Arc<dyn TraceSink>,
        transport: Arc<dyn ServiceTransport>,
    ) -> Self {
        let registry = Registry::spawn(gateway.heartbeat_timeout, gateway.sweep_interval);
        let dispatcher = Dispatcher::new(
            registry.clone(),
            AdmissionControl::new(gateway),
            transport,
            gateway,
        );
        let shutdown = Arc::new(ShutdownController::new());
        let state = AppState {
            dispatcher: Arc::new(dispatcher),
            trace: TracePipeline::spawn(gateway, sink),
            shutdown: Arc::clone(&shutdown),
            start_time: Instant::now(),
        };

        Self {
            network,
            listener: None,
            registry,
            shutdown,
            state,
        }
    }

    /// Registry handle for attaching discovery sources and seeds.
    #[must_use]
    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Shared drain controller, for embedders that coordinate shutdown.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the router: the dispatch surface, the cluster view, and
    /// the health probes, wrapped in the transport middleware.
    #[must_use]
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/api/{service}/{action}", any(gateway_handler))
            .route("/cluster", any(cluster_handler))
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .layer(build_http_layers(&self.network))
            .with_state(self.state.clone())
    }

    /// Binds the listener and returns the bound port (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns an error when the configured address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.network.host, self.network.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        info!(host = %self.network.host, port, "gateway listener bound");
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then drains in-flight calls.
    ///
    /// # Errors
    ///
    /// Returns an error on a fatal listener I/O failure.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called first.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .expect("start() must be called before serve()");
        let router = self.build_router();
        let controller = self.shutdown;

        controller.set_ready();
        info!("gateway accepting traffic");

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        controller.begin_drain();
        if controller.wait_for_drain(DRAIN_TIMEOUT).await {
            info!("drain complete");
        } else {
            warn!(
                in_flight = controller.in_flight_count(),
                "drain timeout expired with calls still in flight"
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
