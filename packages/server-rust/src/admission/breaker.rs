//! Per-service circuit breaker with Closed / Open / HalfOpen states.
//!
//! Every forwarded call's outcome feeds the breaker for its service. A
//! failure rate at or above the threshold within the rolling sample window
//! (once enough samples exist) opens the breaker; an open breaker rejects
//! calls for the cooldown period, then admits a bounded number of trial
//! calls in half-open. Any trial failure reopens; all trial successes
//! close the breaker again.
//!
//! State is one small mutex per service inside a `DashMap`, so breaker
//! decisions for unrelated services never serialize against each other.

use std::collections::VecDeque;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::BreakerConfig;

// ---------------------------------------------------------------------------
// Breaker state
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum BreakerState {
    /// Calls flow; outcomes are sampled into the rolling window.
    Closed {
        /// `(timestamp_ms, success)` samples, oldest first.
        samples: VecDeque<(u64, bool)>,
    },
    /// All calls rejected until the cooldown elapses.
    Open { since_ms: u64 },
    /// A bounded number of trial calls probe the service.
    HalfOpen {
        trials_started: u32,
        trials_succeeded: u32,
        /// When a trial slot was last claimed or resolved. Trials can be
        /// abandoned (the claiming request fails before the outbound call
        /// or is cancelled mid-flight); once every slot is claimed and
        /// this timestamp goes stale, the breaker reopens rather than
        /// rejecting forever on trials that will never report back.
        last_claim_ms: u64,
    },
}

/// Snapshot of a breaker's state for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerSnapshot {
    Closed,
    Open,
    HalfOpen,
}

// ---------------------------------------------------------------------------
// CircuitBreaker
// ---------------------------------------------------------------------------

/// Per-service three-state breaker.
pub struct CircuitBreaker {
    entries: DashMap<String, Mutex<BreakerState>>,
    threshold: f64,
    window_ms: u64,
    min_samples: u32,
    cooldown_ms: u64,
    half_open_trials: u32,
    trial_timeout_ms: u64,
}

impl CircuitBreaker {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            entries: DashMap::new(),
            threshold: config.failure_rate_threshold,
            window_ms: config.window.as_millis() as u64,
            min_samples: config.min_samples,
            cooldown_ms: config.cooldown.as_millis() as u64,
            half_open_trials: config.half_open_trials,
            trial_timeout_ms: config.trial_timeout.as_millis() as u64,
        }
    }

    /// Decides whether a call to `service` may proceed at time `now_ms`.
    ///
    /// In half-open this also claims one trial slot, so admission and trial
    /// accounting cannot race apart.
    pub fn check(&self, service: &str, now_ms: u64) -> bool {
        let entry = self
            .entries
            .entry(service.to_string())
            .or_insert_with(|| Mutex::new(BreakerState::Closed {
                samples: VecDeque::new(),
            }));
        let mut state = entry.lock();

        match &mut *state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { since_ms } => {
                if now_ms.saturating_sub(*since_ms) < self.cooldown_ms {
                    return false;
                }
                info!(service, "breaker cooldown elapsed, entering half-open");
                *state = BreakerState::HalfOpen {
                    trials_started: 1,
                    trials_succeeded: 0,
                    last_claim_ms: now_ms,
                };
                true
            }
            BreakerState::HalfOpen {
                trials_started,
                last_claim_ms,
                ..
            } => {
                if *trials_started < self.half_open_trials {
                    *trials_started += 1;
                    *last_claim_ms = now_ms;
                    true
                } else if now_ms.saturating_sub(*last_claim_ms) > self.trial_timeout_ms {
                    // Every slot is claimed and none has reported within the
                    // trial timeout: the trials were abandoned. Reopen so a
                    // fresh cooldown yields fresh trial slots.
                    warn!(service, "trial calls abandoned, breaker reopened");
                    *state = BreakerState::Open { since_ms: now_ms };
                    false
                } else {
                    false
                }
            }
        }
    }

    /// Records the outcome of a forwarded call (timeouts count as failures).
    pub fn record(&self, service: &str, now_ms: u64, success: bool) {
        let entry = self
            .entries
            .entry(service.to_string())
            .or_insert_with(|| Mutex::new(BreakerState::Closed {
                samples: VecDeque::new(),
            }));
        let mut state = entry.lock();

        match &mut *state {
            BreakerState::Closed { samples } => {
                samples.push_back((now_ms, success));
                while let Some(&(ts, _)) = samples.front() {
                    if now_ms.saturating_sub(ts) > self.window_ms {
                        samples.pop_front();
                    } else {
                        break;
                    }
                }

                let total = samples.len() as u32;
                if total < self.min_samples {
                    return;
                }
                let failures = samples.iter().filter(|(_, ok)| !ok).count() as u32;
                let rate = f64::from(failures) / f64::from(total);
                if rate >= self.threshold {
                    warn!(service, failures, total, "failure rate exceeded, breaker open");
                    *state = BreakerState::Open { since_ms: now_ms };
                }
            }
            BreakerState::Open { .. } => {
                // A straggler from before the breaker opened; nothing to do.
            }
            BreakerState::HalfOpen {
                trials_succeeded,
                last_claim_ms,
                ..
            } => {
                if success {
                    *trials_succeeded += 1;
                    *last_claim_ms = now_ms;
                    if *trials_succeeded >= self.half_open_trials {
                        info!(service, "trial calls succeeded, breaker closed");
                        *state = BreakerState::Closed {
                            samples: VecDeque::new(),
                        };
                    }
                } else {
                    warn!(service, "trial call failed, breaker reopened");
                    *state = BreakerState::Open { since_ms: now_ms };
                }
            }
        }
    }

    /// Current state of the breaker for `service`, for diagnostics.
    #[must_use]
    pub fn state(&self, service: &str) -> BreakerSnapshot {
        match self.entries.get(service) {
            None => BreakerSnapshot::Closed,
            Some(entry) => match &*entry.lock() {
                BreakerState::Closed { .. } => BreakerSnapshot::Closed,
                BreakerState::Open { .. } => BreakerSnapshot::Open,
                BreakerState::HalfOpen { .. } => BreakerSnapshot::HalfOpen,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
