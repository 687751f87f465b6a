//! Coordination-store discovery seam.
//!
//! The registry is kept warm by change notifications from an external
//! coordination store (etcd or similar). That wire client lives outside
//! this crate; the registry consumes it through the [`Discovery`] trait,
//! and a watcher task converts its events into registry changes off the
//! request path.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use meshgate_core::{epoch_ms, ServiceEndpoint};

use super::{Registry, RegistryChange};

// ---------------------------------------------------------------------------
// DiscoveryEvent
// ---------------------------------------------------------------------------

/// Change notification from the coordination store's key space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A service instance registered (or re-registered) itself.
    Register {
        service_name: String,
        address: String,
        port: u16,
    },
    /// A service instance deregistered or its key expired.
    Deregister {
        service_name: String,
        address: String,
        port: u16,
    },
    /// A liveness refresh for an already-registered instance.
    Heartbeat {
        service_name: String,
        address: String,
        port: u16,
    },
}

// ---------------------------------------------------------------------------
// Discovery trait
// ---------------------------------------------------------------------------

/// Watch/notify stream over the coordination store's key space.
///
/// Implementations wrap a concrete coordination client (etcd watch, a test
/// channel, a static seed list). Returning `None` ends the stream and stops
/// the watcher task.
#[async_trait]
pub trait Discovery: Send + 'static {
    async fn next_event(&mut self) -> Option<DiscoveryEvent>;
}

// ---------------------------------------------------------------------------
// Watcher task
// ---------------------------------------------------------------------------

/// Spawns the task that drains a discovery stream into the registry.
///
/// Registrations and heartbeats both become upserts with a fresh
/// `last_seen_ms`, which is what keeps the staleness sweep at bay; the
/// sweep flags whatever stops heartbeating.
pub fn spawn_watcher<D: Discovery>(mut discovery: D, registry: Registry) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = discovery.next_event().await {
            let change = match event {
                DiscoveryEvent::Register {
                    service_name,
                    address,
                    port,
                }
                | DiscoveryEvent::Heartbeat {
                    service_name,
                    address,
                    port,
                } => RegistryChange::Upsert(ServiceEndpoint {
                    service_name,
                    address,
                    port,
                    healthy: true,
                    last_seen_ms: epoch_ms(),
                }),
                DiscoveryEvent::Deregister {
                    service_name,
                    address,
                    port,
                } => RegistryChange::Remove {
                    service_name,
                    address,
                    port,
                },
            };
            registry.apply(change).await;
        }
        info!("discovery stream ended, watcher stopping");
    })
}

// ---------------------------------------------------------------------------
// ChannelDiscovery
// ---------------------------------------------------------------------------

/// Channel-backed discovery source.
///
/// Useful for tests and for deployments that bridge an external watch
/// stream into the gateway process via a channel.
pub struct ChannelDiscovery {
    rx: mpsc::Receiver<DiscoveryEvent>,
}

impl ChannelDiscovery {
    /// Creates a discovery stream and the sender that feeds it.
    #[must_use]
    pub fn pair(capacity: usize) -> (mpsc::Sender<DiscoveryEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

#[async_trait]
impl Discovery for ChannelDiscovery {
    async fn next_event(&mut self) -> Option<DiscoveryEvent> {
        self.rx.recv().await
    }
}

// ---------------------------------------------------------------------------
// StaticDiscovery
// ---------------------------------------------------------------------------

/// Emits a fixed set of registrations once, then ends.
///
/// Seeds the registry from command-line flags or test fixtures when no
/// coordination store is wired in.
pub struct StaticDiscovery {
    events: std::vec::IntoIter<DiscoveryEvent>,
}

impl StaticDiscovery {
    #[must_use]
    pub fn new(endpoints: Vec<(String, String, u16)>) -> Self {
        let events: Vec<DiscoveryEvent> = endpoints
            .into_iter()
            .map(|(service_name, address, port)| DiscoveryEvent::Register {
                service_name,
                address,
                port,
            })
            .collect();
        Self {
            events: events.into_iter(),
        }
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn next_event(&mut self) -> Option<DiscoveryEvent> {
        self.events.next()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn test_registry() -> Registry {
        Registry::spawn(Duration::from_secs(30), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn register_event_populates_registry() {
        let registry = test_registry();
        let (tx, discovery) = ChannelDiscovery::pair(8);
        let watcher = spawn_watcher(discovery, registry.clone());

        tx.send(DiscoveryEvent::Register {
            service_name: "user".to_string(),
            address: "10.0.0.1".to_string(),
            port: 9000,
        })
        .await
        .unwrap();
        drop(tx);
        watcher.await.unwrap();

        let endpoints = registry.lookup("user").unwrap();
        assert_eq!(endpoints.len(), 1);
        assert!(endpoints[0].healthy);
    }

    #[tokio::test]
    async fn deregister_event_removes_endpoint() {
        let registry = test_registry();
        let (tx, discovery) = ChannelDiscovery::pair(8);
        let watcher = spawn_watcher(discovery, registry.clone());

        tx.send(DiscoveryEvent::Register {
            service_name: "user".to_string(),
            address: "10.0.0.1".to_string(),
            port: 9000,
        })
        .await
        .unwrap();
        tx.send(DiscoveryEvent::Deregister {
            service_name: "user".to_string(),
            address: "10.0.0.1".to_string(),
            port: 9000,
        })
        .await
        .unwrap();
        drop(tx);
        watcher.await.unwrap();

        assert!(registry.lookup("user").is_err());
    }

    #[tokio::test]
    async fn heartbeat_refreshes_last_seen() {
        let registry = test_registry();
        let (tx, discovery) = ChannelDiscovery::pair(8);
        let watcher = spawn_watcher(discovery, registry.clone());

        tx.send(DiscoveryEvent::Register {
            service_name: "user".to_string(),
            address: "10.0.0.1".to_string(),
            port: 9000,
        })
        .await
        .unwrap();
        tx.send(DiscoveryEvent::Heartbeat {
            service_name: "user".to_string(),
            address: "10.0.0.1".to_string(),
            port: 9000,
        })
        .await
        .unwrap();
        drop(tx);
        watcher.await.unwrap();

        // Still exactly one endpoint: heartbeats upsert by identity.
        let endpoints = registry.lookup("user").unwrap();
        assert_eq!(endpoints.len(), 1);
    }

    #[tokio::test]
    async fn static_discovery_seeds_then_ends() {
        let registry = test_registry();
        let discovery = StaticDiscovery::new(vec![
            ("user".to_string(), "10.0.0.1".to_string(), 9000),
            ("order".to_string(), "10.0.0.2".to_string(), 9001),
        ]);
        spawn_watcher(discovery, registry.clone()).await.unwrap();

        assert!(registry.lookup("user").is_ok());
        assert!(registry.lookup("order").is_ok());
    }
}
