//! Gateway and network configuration types.

use std::time::Duration;

// ---------------------------------------------------------------------------
// GatewayConfig
// ---------------------------------------------------------------------------

/// Behavioral configuration for the gateway pipeline.
///
/// Identity fields (`project_name`, `service_name`, `instance_id`) are
/// stamped onto every trace event so aggregated traces can be grouped per
/// deployment and per process.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Deployment-wide project label for trace events.
    pub project_name: String,
    /// This gateway's own service name (as seen in traces).
    pub service_name: String,
    /// Unique identifier for this process instance.
    pub instance_id: String,
    /// Shared secret expected in the `Call-Service-Key` header.
    /// `None` disables the auth check.
    pub call_service_key: Option<String>,
    /// Overall per-request budget; the outbound call deadline derives from it.
    pub request_budget: Duration,
    /// Endpoints without a heartbeat for this long are flagged unhealthy.
    pub heartbeat_timeout: Duration,
    /// Interval between registry staleness sweeps.
    pub sweep_interval: Duration,
    /// Bounded trace queue capacity; full queues drop events.
    pub trace_queue_capacity: usize,
    pub limiter: LimiterConfig,
    pub breaker: BreakerConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            project_name: "meshgate".to_string(),
            service_name: "gateway".to_string(),
            instance_id: uuid::Uuid::new_v4().to_string(),
            call_service_key: None,
            request_budget: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5),
            trace_queue_capacity: 1024,
            limiter: LimiterConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// LimiterConfig
// ---------------------------------------------------------------------------

/// Fixed-window rate limiter settings, applied per target service.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Requests admitted per window per service.
    pub requests_per_window: u32,
    /// Window length.
    pub window: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 100,
            window: Duration::from_secs(60),
        }
    }
}

// ---------------------------------------------------------------------------
// BreakerConfig
// ---------------------------------------------------------------------------

/// Circuit breaker settings, applied per target service.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Failure fraction within the rolling window that opens the breaker.
    pub failure_rate_threshold: f64,
    /// Rolling window over which call outcomes are sampled.
    pub window: Duration,
    /// Minimum samples in the window before the rate is evaluated.
    pub min_samples: u32,
    /// How long an open breaker rejects before allowing trial calls.
    pub cooldown: Duration,
    /// Number of trial calls admitted in the half-open state.
    pub half_open_trials: u32,
    /// How long a claimed trial may stay unresolved before the breaker
    /// gives up on it and reopens. Trials can be abandoned: the request
    /// that claimed one may fail before the outbound call or be cancelled
    /// mid-flight, in which case no outcome is ever recorded.
    pub trial_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            window: Duration::from_secs(10),
            min_samples: 5,
            cooldown: Duration::from_secs(30),
            half_open_trials: 3,
            trial_timeout: Duration::from_secs(10),
        }
    }
}

// ---------------------------------------------------------------------------
// NetworkConfig
// ---------------------------------------------------------------------------

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Allowed CORS origins; `"*"` allows any origin.
    pub cors_origins: Vec<String>,
    /// Transport-level cap on request processing time.
    pub request_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_config_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.project_name, "meshgate");
        assert_eq!(config.service_name, "gateway");
        assert!(config.call_service_key.is_none());
        assert_eq!(config.request_budget, Duration::from_secs(10));
        assert_eq!(config.limiter.requests_per_window, 100);
        assert_eq!(config.limiter.window, Duration::from_secs(60));
    }

    #[test]
    fn instance_ids_are_unique_per_config() {
        let a = GatewayConfig::default();
        let b = GatewayConfig::default();
        assert_ne!(a.instance_id, b.instance_id);
    }

    #[test]
    fn breaker_defaults_are_self_consistent() {
        let breaker = BreakerConfig::default();
        assert!(breaker.failure_rate_threshold > 0.0 && breaker.failure_rate_threshold <= 1.0);
        assert!(breaker.min_samples > 0);
        assert!(breaker.half_open_trials > 0);
        assert!(breaker.cooldown > breaker.window);
        // An unresolved trial must expire before a second cooldown would.
        assert!(breaker.trial_timeout < breaker.cooldown);
    }

    #[test]
    fn network_config_defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 0);
        assert_eq!(config.cors_origins, vec!["*"]);
    }
}
