//! Wall-clock helpers shared by the registry, admission, and trace code.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix time in milliseconds.
///
/// Saturates to 0 if the system clock is before the epoch rather than
/// panicking; callers treat timestamps as advisory.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
