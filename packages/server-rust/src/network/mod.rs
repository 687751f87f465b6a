//! HTTP surface: router, middleware, handlers, lifecycle, shutdown.

pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use handlers::AppState;
pub use module::GatewayServer;
pub use shutdown::{HealthState, InFlightGuard, ShutdownController};
