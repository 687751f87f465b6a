//! Gateway error taxonomy.
//!
//! Every per-request failure the gateway can produce is one of these five
//! kinds. They are recovered at the dispatcher boundary and converted into a
//! [`crate::ResponseEnvelope`] -- no error in this taxonomy ever escapes to
//! the transport layer as a raw failure.

/// The five failure kinds a caller can observe.
///
/// The display strings match the failure messages the gateway returns to
/// callers verbatim; internal detail (transport errors, malformed payloads)
/// is logged server-side and never attached here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Unexpected internal, transport, or payload-parse failure.
    #[error("Server Error")]
    ServerError,
    /// Rate limit exceeded for the target service.
    #[error("Server limit flow")]
    ServerLimiter,
    /// Circuit breaker open for the target service.
    #[error("Server fusing flow")]
    ServerFusing,
    /// Shared-secret auth check failed.
    #[error("No access permission")]
    NoAuth,
    /// Unknown service/action, or a service with zero endpoints.
    #[error("The resource could not be found")]
    NotFound,
}

impl GatewayError {
    /// Envelope code for this failure kind. Code 0 is reserved for success.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::NoAuth => 401,
            Self::NotFound => 404,
            Self::ServerLimiter => 429,
            Self::ServerError => 500,
            Self::ServerFusing => 503,
        }
    }

    /// Whether the caller may reasonably retry after this failure.
    #[must_use]
    pub fn retryable(self) -> bool {
        matches!(self, Self::ServerLimiter | Self::ServerFusing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_and_nonzero() {
        let kinds = [
            GatewayError::ServerError,
            GatewayError::ServerLimiter,
            GatewayError::ServerFusing,
            GatewayError::NoAuth,
            GatewayError::NotFound,
        ];
        let mut codes: Vec<i32> = kinds.iter().map(|k| k.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
        assert!(codes.iter().all(|&c| c != 0));
    }

    #[test]
    fn messages_match_caller_facing_strings() {
        assert_eq!(GatewayError::ServerError.to_string(), "Server Error");
        assert_eq!(GatewayError::ServerLimiter.to_string(), "Server limit flow");
        assert_eq!(GatewayError::ServerFusing.to_string(), "Server fusing flow");
        assert_eq!(GatewayError::NoAuth.to_string(), "No access permission");
        assert_eq!(
            GatewayError::NotFound.to_string(),
            "The resource could not be found"
        );
    }

    #[test]
    fn only_limiter_and_fusing_are_retryable() {
        assert!(GatewayError::ServerLimiter.retryable());
        assert!(GatewayError::ServerFusing.retryable());
        assert!(!GatewayError::ServerError.retryable());
        assert!(!GatewayError::NoAuth.retryable());
        assert!(!GatewayError::NotFound.retryable());
    }
}
