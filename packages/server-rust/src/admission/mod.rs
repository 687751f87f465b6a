//! Admission control: the per-call policy gate consulted before forwarding.
//!
//! Checks run in a fixed order and the first failing check wins:
//!
//! 1. **Auth** -- the `Call-Service-Key` header must match the configured
//!    shared secret (constant-time compare); mismatch is `NoAuth`.
//! 2. **Rate limit** -- fixed-window counter per service; `ServerLimiter`.
//! 3. **Circuit breaker** -- per-service failure-rate gate; `ServerFusing`.
//!
//! A deny short-circuits the dispatcher before any registry lookup or
//! outbound call. Outcomes of forwarded calls are reported back through
//! [`AdmissionControl::report_outcome`] to drive the breaker.

pub mod breaker;
pub mod limiter;

use std::collections::BTreeMap;

use subtle::ConstantTimeEq;
use tracing::debug;

use meshgate_core::{epoch_ms, CorrelationId, GatewayError};

use crate::config::GatewayConfig;

pub use breaker::{BreakerSnapshot, CircuitBreaker};
pub use limiter::RateLimiter;

/// Header carrying the service-call shared secret.
pub const CALL_SERVICE_KEY_HEADER: &str = "call-service-key";

// ---------------------------------------------------------------------------
// AdmissionControl
// ---------------------------------------------------------------------------

/// The combined policy gate. One instance serves all request tasks; its
/// internal state is per-key atomics and small per-service mutexes, never
/// a lock spanning a whole admission decision.
pub struct AdmissionControl {
    call_service_key: Option<String>,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
}

impl AdmissionControl {
    #[must_use]
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            call_service_key: config.call_service_key.clone(),
            limiter: RateLimiter::new(&config.limiter),
            breaker: CircuitBreaker::new(&config.breaker),
        }
    }

    /// Evaluates the policy chain for one call.
    ///
    /// # Errors
    ///
    /// Returns the first failing check's error kind: `NoAuth`,
    /// `ServerLimiter`, or `ServerFusing`.
    pub fn admit(
        &self,
        correlation_id: &CorrelationId,
        service: &str,
        action: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<(), GatewayError> {
        self.check_auth(headers)?;

        let now_ms = epoch_ms();
        if !self.limiter.check(service, now_ms) {
            debug!(%correlation_id, service, action, "rate limit exceeded");
            return Err(GatewayError::ServerLimiter);
        }
        if !self.breaker.check(service, now_ms) {
            debug!(%correlation_id, service, action, "circuit breaker open");
            return Err(GatewayError::ServerFusing);
        }
        Ok(())
    }

    /// Feeds a forwarded call's outcome into the breaker for `service`.
    pub fn report_outcome(&self, service: &str, success: bool) {
        self.breaker.record(service, epoch_ms(), success);
    }

    /// Breaker state for diagnostics.
    #[must_use]
    pub fn breaker_state(&self, service: &str) -> BreakerSnapshot {
        self.breaker.state(service)
    }

    fn check_auth(&self, headers: &BTreeMap<String, String>) -> Result<(), GatewayError> {
        let Some(expected) = &self.call_service_key else {
            return Ok(());
        };
        let supplied = headers
            .get(CALL_SERVICE_KEY_HEADER)
            .map_or("", String::as_str);
        if bool::from(supplied.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(())
        } else {
            Err(GatewayError::NoAuth)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
