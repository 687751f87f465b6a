//! Service registry: copy-on-write table with a single logical writer.
//!
//! All mutations flow through one mpsc-fed writer task and are applied in
//! arrival order; there is no merge logic, last writer wins per endpoint
//! identity. After each applied change the writer publishes a full table
//! snapshot through an `ArcSwap`, so readers always observe a complete,
//! consistent table and never block on a mutation in progress.
//!
//! The writer also runs the staleness sweep: endpoints whose last heartbeat
//! is older than the configured timeout are flagged unhealthy (advisory --
//! they stay lookup-able and are only deprioritized by endpoint selection).

pub mod discovery;

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use meshgate_core::{epoch_ms, GatewayError, ServiceEndpoint, ServiceTable};

// ---------------------------------------------------------------------------
// RegistryChange
// ---------------------------------------------------------------------------

/// A mutation applied to the service table.
#[derive(Debug, Clone)]
pub enum RegistryChange {
    /// Insert or replace an endpoint (idempotent by identity). Heartbeat
    /// refreshes arrive as upserts with a newer `last_seen_ms`.
    Upsert(ServiceEndpoint),
    /// Remove the endpoint with the given identity.
    Remove {
        service_name: String,
        address: String,
        port: u16,
    },
}

/// Writer command: one change plus a completion ack.
///
/// The ack makes `apply` linearizable from the caller's view: once it
/// returns, a subsequent `lookup` observes the change.
struct Command {
    change: RegistryChange,
    ack: oneshot::Sender<()>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Cheaply-cloneable handle to the service table.
///
/// Reads (`lookup`, `snapshot`) are lock-free `ArcSwap` loads; writes are
/// serialized through the writer task spawned by [`Registry::spawn`].
#[derive(Clone)]
pub struct Registry {
    table: Arc<ArcSwap<ServiceTable>>,
    tx: mpsc::Sender<Command>,
}

impl Registry {
    /// Spawns the writer task and returns a handle to it.
    ///
    /// The writer exits when every handle (and thus every sender) is dropped.
    #[must_use]
    pub fn spawn(heartbeat_timeout: Duration, sweep_interval: Duration) -> Self {
        let table = Arc::new(ArcSwap::from_pointee(ServiceTable::new()));
        let (tx, rx) = mpsc::channel::<Command>(256);

        let published = Arc::clone(&table);
        tokio::spawn(writer_loop(rx, published, heartbeat_timeout, sweep_interval));

        Self { table, tx }
    }

    /// Queues a change and waits until the writer has applied it.
    ///
    /// Changes from concurrent callers are applied in channel arrival order.
    pub async fn apply(&self, change: RegistryChange) {
        let (ack, applied) = oneshot::channel();
        if self.tx.send(Command { change, ack }).await.is_err() {
            warn!("registry writer is gone, change dropped");
            return;
        }
        // The writer acks every command it receives; a closed channel here
        // means it shut down between send and apply.
        let _ = applied.await;
    }

    /// Returns all endpoints for `service_name` from the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::NotFound` if the service has zero endpoints
    /// of any health.
    pub fn lookup(&self, service_name: &str) -> Result<Vec<ServiceEndpoint>, GatewayError> {
        let snapshot = self.table.load();
        match snapshot.get(service_name) {
            Some(endpoints) if !endpoints.is_empty() => Ok(endpoints.to_vec()),
            _ => Err(GatewayError::NotFound),
        }
    }

    /// Full table snapshot for the cluster-status surface. No side effects.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ServiceTable> {
        self.table.load_full()
    }
}

// ---------------------------------------------------------------------------
// Writer task
// ---------------------------------------------------------------------------

async fn writer_loop(
    mut rx: mpsc::Receiver<Command>,
    published: Arc<ArcSwap<ServiceTable>>,
    heartbeat_timeout: Duration,
    sweep_interval: Duration,
) {
    let mut working = ServiceTable::new();
    let mut sweep = tokio::time::interval(sweep_interval);
    // Skip the immediate first tick so a sweep doesn't fire at startup.
    sweep.tick().await;

    #[allow(clippy::cast_possible_truncation)]
    let timeout_ms = heartbeat_timeout.as_millis() as u64;

    loop {
        tokio::select! {
            command = rx.recv() => {
                let Some(Command { change, ack }) = command else {
                    info!("registry writer shutting down");
                    break;
                };
                apply_change(&mut working, change);
                published.store(Arc::new(working.clone()));
                let _ = ack.send(());
            }
            _ = sweep.tick() => {
                let marked = working.mark_stale(epoch_ms(), timeout_ms);
                if marked > 0 {
                    warn!(marked, "flagged endpoints unhealthy after missed heartbeats");
                    published.store(Arc::new(working.clone()));
                }
            }
        }
    }
}

fn apply_change(table: &mut ServiceTable, change: RegistryChange) {
    match change {
        RegistryChange::Upsert(endpoint) => {
            debug!(
                service = %endpoint.service_name,
                address = %endpoint.address,
                port = endpoint.port,
                "registry upsert"
            );
            table.upsert(endpoint);
        }
        RegistryChange::Remove {
            service_name,
            address,
            port,
        } => {
            debug!(service = %service_name, address = %address, port, "registry remove");
            table.remove(&service_name, &address, port);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
