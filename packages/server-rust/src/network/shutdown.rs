//! Graceful shutdown coordination and in-flight request accounting.
//!
//! The controller owns the health state machine
//! (Starting -> Ready -> Draining -> Stopped) and an atomic in-flight
//! counter maintained by RAII guards, so the count stays correct even
//! when a handler future is cancelled or panics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;

// ---------------------------------------------------------------------------
// HealthState
// ---------------------------------------------------------------------------

/// Lifecycle phase reported by the health surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Process is up but not yet accepting traffic.
    Starting,
    /// Accepting and forwarding traffic.
    Ready,
    /// Shutdown requested; in-flight calls are completing.
    Draining,
    /// Drain finished; nothing in flight.
    Stopped,
}

impl HealthState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

// ---------------------------------------------------------------------------
// ShutdownController
// ---------------------------------------------------------------------------

/// Coordinates the drain sequence across the server.
///
/// Readiness probes read `health_state()`; each gateway call holds an
/// [`InFlightGuard`] for its duration; `begin_drain()` flips the state and
/// wakes every `subscribe()`d listener; `wait_for_drain()` blocks until
/// the in-flight count reaches zero or the timeout expires.
#[derive(Debug)]
pub struct ShutdownController {
    signal: watch::Sender<bool>,
    in_flight: Arc<AtomicU64>,
    health: ArcSwap<HealthState>,
}

impl ShutdownController {
    /// New controller in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            signal,
            in_flight: Arc::new(AtomicU64::new(0)),
            health: ArcSwap::from_pointee(HealthState::Starting),
        }
    }

    /// Marks the server ready to accept traffic.
    pub fn set_ready(&self) {
        self.health.store(Arc::new(HealthState::Ready));
    }

    /// Requests shutdown: moves to `Draining` and wakes subscribers.
    pub fn begin_drain(&self) {
        self.health.store(Arc::new(HealthState::Draining));
        // Subscribers may already be gone during teardown.
        let _ = self.signal.send(true);
    }

    /// A receiver that flips to `true` when drain begins.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.health.load()
    }

    /// Registers one in-flight call. Dropping the guard deregisters it,
    /// including on cancellation and unwind.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Waits until nothing is in flight, up to `timeout`.
    ///
    /// Returns `true` (and moves to `Stopped`) on a clean drain; `false`
    /// leaves the state at `Draining` so the caller can log what was cut.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.in_flight.load(Ordering::Relaxed) == 0 {
                self.health.store(Arc::new(HealthState::Stopped));
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII handle for one in-flight call.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_the_state_machine_in_order() {
        let controller = ShutdownController::new();
        assert_eq!(controller.health_state(), HealthState::Starting);
        controller.set_ready();
        assert_eq!(controller.health_state(), HealthState::Ready);
        controller.begin_drain();
        assert_eq!(controller.health_state(), HealthState::Draining);
    }

    #[test]
    fn guards_track_the_in_flight_count() {
        let controller = ShutdownController::new();
        let first = controller.in_flight_guard();
        let second = controller.in_flight_guard();
        assert_eq!(controller.in_flight_count(), 2);
        drop(first);
        assert_eq!(controller.in_flight_count(), 1);
        drop(second);
        assert_eq!(controller.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn subscribers_wake_on_drain() {
        let controller = ShutdownController::new();
        let mut rx = controller.subscribe();
        assert!(!*rx.borrow());

        controller.begin_drain();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn clean_drain_reaches_stopped() {
        let controller = ShutdownController::new();
        controller.set_ready();
        controller.begin_drain();

        assert!(controller.wait_for_drain(Duration::from_secs(1)).await);
        assert_eq!(controller.health_state(), HealthState::Stopped);
    }

    #[tokio::test]
    async fn drain_waits_for_outstanding_guards() {
        let controller = Arc::new(ShutdownController::new());
        controller.set_ready();
        let guard = controller.in_flight_guard();
        controller.begin_drain();

        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(guard);
        });

        assert!(controller.wait_for_drain(Duration::from_secs(2)).await);
        assert_eq!(controller.health_state(), HealthState::Stopped);
        release.await.unwrap();
    }

    #[tokio::test]
    async fn drain_timeout_stays_draining() {
        let controller = ShutdownController::new();
        controller.set_ready();
        let _held = controller.in_flight_guard();
        controller.begin_drain();

        assert!(!controller.wait_for_drain(Duration::from_millis(50)).await);
        assert_eq!(controller.health_state(), HealthState::Draining);
    }
}
