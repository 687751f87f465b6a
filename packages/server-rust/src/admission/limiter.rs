//! Fixed-window rate limiter keyed by target service.
//!
//! Each service owns one window slot: a single atomic word packing the
//! window index and the count. Admission is one CAS loop on the slot, so
//! unrelated services never contend on a shared lock and a hot service
//! only contends on its own counter.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::config::LimiterConfig;

// ---------------------------------------------------------------------------
// WindowSlot
// ---------------------------------------------------------------------------

/// Per-key window state, packed as `(window_index << 32) | count` in one
/// atomic word. Rotation and count reset happen in the same CAS, so a
/// caller rotating the window can never wipe increments that landed in it
/// concurrently.
struct WindowSlot {
    packed: AtomicU64,
}

const COUNT_MASK: u64 = 0xFFFF_FFFF;

impl WindowSlot {
    fn new() -> Self {
        Self {
            packed: AtomicU64::new(0),
        }
    }

    /// Counts one request against `window_index` and returns the
    /// post-increment count for that window.
    ///
    /// Rotation is forward-only: a caller holding a stale timestamp counts
    /// against the newest window rather than reviving an old one. The
    /// count saturates at `u32::MAX`.
    fn bump(&self, window_index: u32) -> u64 {
        let mut current = self.packed.load(Ordering::Acquire);
        loop {
            let stored_index = (current >> 32) as u32;
            let next = if window_index > stored_index {
                (u64::from(window_index) << 32) | 1
            } else {
                let count = (current & COUNT_MASK).saturating_add(1).min(COUNT_MASK);
                (current & !COUNT_MASK) | count
            };
            match self.packed.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next & COUNT_MASK,
                Err(observed) => current = observed,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RateLimiter
// ---------------------------------------------------------------------------

/// Fixed-window counter per service key.
pub struct RateLimiter {
    slots: DashMap<String, WindowSlot>,
    limit: u32,
    window_ms: u64,
}

impl RateLimiter {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(config: &LimiterConfig) -> Self {
        Self {
            slots: DashMap::new(),
            limit: config.requests_per_window,
            window_ms: config.window.as_millis() as u64,
        }
    }

    /// Admits or rejects one request for `key` at time `now_ms`.
    ///
    /// Returns `true` while the key's count within the current
    /// epoch-aligned window is at most the limit. The count includes
    /// rejected attempts, so a client hammering past the limit does not
    /// extend its own quota.
    #[allow(clippy::cast_possible_truncation)]
    pub fn check(&self, key: &str, now_ms: u64) -> bool {
        let slot = self
            .slots
            .entry(key.to_string())
            .or_insert_with(WindowSlot::new);
        let window_index = (now_ms / self.window_ms.max(1)) as u32;
        slot.bump(window_index) <= u64::from(self.limit)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn limiter(limit: u32, window: Duration) -> RateLimiter {
        RateLimiter::new(&LimiterConfig {
            requests_per_window: limit,
            window,
        })
    }

    #[test]
    fn admits_up_to_limit_then_rejects() {
        let limiter = limiter(100, Duration::from_secs(60));
        for _ in 0..100 {
            assert!(limiter.check("user", 1_000));
        }
        // The 101st request within the window is rejected.
        assert!(!limiter.check("user", 1_000));
        assert!(!limiter.check("user", 30_000));
    }

    #[test]
    fn window_expiry_resets_the_count() {
        let limiter = limiter(2, Duration::from_secs(60));
        assert!(limiter.check("user", 0));
        assert!(limiter.check("user", 0));
        assert!(!limiter.check("user", 59_999));

        // New window.
        assert!(limiter.check("user", 60_000));
        assert!(limiter.check("user", 60_001));
        assert!(!limiter.check("user", 60_002));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = limiter(1, Duration::from_secs(60));
        assert!(limiter.check("user", 0));
        assert!(!limiter.check("user", 0));
        assert!(limiter.check("order", 0), "other services keep their quota");
    }

    #[test]
    fn concurrent_checks_never_exceed_limit() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let limiter = Arc::new(limiter(50, Duration::from_secs(60)));
        let admitted = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let admitted = Arc::clone(&admitted);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        if limiter.check("user", 1_000) {
                            admitted.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::Relaxed), 50);
    }

    #[test]
    fn rotation_under_contention_admits_exactly_the_limit() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let limiter = Arc::new(limiter(50, Duration::from_secs(60)));
        // Exhaust the first window so every thread below starts by
        // rotating into the second one.
        for _ in 0..60 {
            limiter.check("user", 30_000);
        }
        let admitted = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let admitted = Arc::clone(&admitted);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        if limiter.check("user", 60_000) {
                            admitted.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Racing rotations must not reset the fresh window's count.
        assert_eq!(admitted.load(Ordering::Relaxed), 50);
    }

    proptest::proptest! {
        /// However check calls interleave across keys and times within one
        /// window, no key is ever admitted more than `limit` times.
        #[test]
        fn no_key_exceeds_its_limit(
            limit in 1u32..20,
            calls in proptest::collection::vec((0usize..3, 0u64..50_000), 1..200),
        ) {
            let limiter = limiter(limit, Duration::from_secs(60));
            let keys = ["user", "order", "billing"];
            let mut admitted = [0u32; 3];

            for (key_index, now_ms) in calls {
                if limiter.check(keys[key_index], now_ms) {
                    admitted[key_index] += 1;
                }
            }
            for count in admitted {
                proptest::prop_assert!(count <= limit);
            }
        }
    }
}
