//! Correlation IDs linking trace events across hops.
//!
//! A correlation ID is minted once at the outermost (edge) hop of a request
//! and passed unchanged through every downstream hop via the `X-Request-Id`
//! header. Downstream services treat an incoming valid ID as authoritative;
//! an absent or malformed ID means this hop is the edge and mints a fresh one.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header carrying the correlation ID across process boundaries.
pub const CORRELATION_HEADER: &str = "x-request-id";

/// Opaque, globally-unique identifier for one logical request.
///
/// Internally a UUID rendered as a hyphenated lowercase string. The string
/// form is what travels on the wire and what trace events record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Mints a fresh ID. Called only at edge hops.
    #[must_use]
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accepts an upstream-supplied ID if it is a well-formed UUID.
    ///
    /// Returns `None` for anything that fails format validation, in which
    /// case the caller should mint instead and treat itself as the edge.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok().map(|u| Self(u.to_string()))
    }

    /// The wire/string form of the ID.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// FNV-1a hash of the ID string.
    ///
    /// Used for deterministic endpoint selection: the same correlation ID
    /// always maps to the same endpoint within an unchanged candidate set,
    /// while a retried request with a fresh ID may land elsewhere.
    #[must_use]
    pub fn hash64(&self) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;
        let mut hash = OFFSET;
        for byte in self.0.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(PRIME);
        }
        hash
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
