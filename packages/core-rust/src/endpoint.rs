//! Service endpoints and the registry's snapshot table.
//!
//! A `ServiceEndpoint` is one concrete network location implementing a named
//! service; a `ServiceTable` is the full point-in-time mapping from service
//! names to their endpoint sets. Tables are immutable snapshots: the registry
//! writer mutates a private working copy and publishes whole tables, so
//! readers never observe a partially-applied update.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ServiceEndpoint
// ---------------------------------------------------------------------------

/// One live (or recently-live) backend instance of a named service.
///
/// Identity is `(service_name, address, port)`; `healthy` and `last_seen_ms`
/// are advisory health metadata refreshed by registration and heartbeat
/// events from the coordination store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoint {
    pub service_name: String,
    pub address: String,
    pub port: u16,
    /// Advisory flag: stale endpoints stay lookup-able but are deprioritized.
    pub healthy: bool,
    /// Unix millis of the last registration or heartbeat for this endpoint.
    pub last_seen_ms: u64,
}

impl ServiceEndpoint {
    /// Returns `true` if `other` names the same `(service, address, port)`,
    /// regardless of health metadata.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.matches(&other.service_name, &other.address, other.port)
    }

    /// Identity check against raw components.
    #[must_use]
    pub fn matches(&self, service_name: &str, address: &str, port: u16) -> bool {
        self.service_name == service_name && self.address == address && self.port == port
    }

    /// Base HTTP URL for outbound calls to this endpoint.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

// ---------------------------------------------------------------------------
// ServiceTable
// ---------------------------------------------------------------------------

/// Point-in-time mapping from service name to its ordered endpoint set.
///
/// `BTreeMap` keeps both the service listing and the `/cluster` surface
/// deterministic. The `version` counter increments once per applied change,
/// which lets diagnostics (and tests) tell snapshots apart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTable {
    version: u64,
    services: BTreeMap<String, Vec<ServiceEndpoint>>,
}

impl ServiceTable {
    /// Creates an empty table at version 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot version; bumps once per applied change.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// All endpoints registered for `service_name`, in registration order.
    #[must_use]
    pub fn get(&self, service_name: &str) -> Option<&[ServiceEndpoint]> {
        self.services.get(service_name).map(Vec::as_slice)
    }

    /// The full name -> endpoints mapping, for the cluster-status surface.
    #[must_use]
    pub fn services(&self) -> &BTreeMap<String, Vec<ServiceEndpoint>> {
        &self.services
    }

    /// Number of distinct service names with at least one endpoint.
    #[must_use]
    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// Inserts or replaces an endpoint, idempotent by identity.
    ///
    /// A repeated upsert of the same identity replaces the stored entry
    /// (last-writer-wins on health metadata) without duplicating it.
    pub fn upsert(&mut self, endpoint: ServiceEndpoint) {
        let entries = self.services.entry(endpoint.service_name.clone()).or_default();
        match entries.iter_mut().find(|e| e.same_identity(&endpoint)) {
            Some(existing) => *existing = endpoint,
            None => entries.push(endpoint),
        }
        self.version += 1;
    }

    /// Removes the endpoint with the given identity, if present.
    ///
    /// A service whose last endpoint is removed disappears from the table
    /// entirely so lookups report `NotFound` rather than an empty set.
    pub fn remove(&mut self, service_name: &str, address: &str, port: u16) {
        if let Some(entries) = self.services.get_mut(service_name) {
            entries.retain(|e| !e.matches(service_name, address, port));
            if entries.is_empty() {
                self.services.remove(service_name);
            }
        }
        self.version += 1;
    }

    /// Flags endpoints whose `last_seen_ms` is older than `timeout_ms` as
    /// unhealthy. Stale endpoints are never removed here -- staleness is
    /// advisory and only affects endpoint selection preference.
    ///
    /// Returns the number of endpoints newly marked unhealthy.
    pub fn mark_stale(&mut self, now_ms: u64, timeout_ms: u64) -> usize {
        let mut marked = 0;
        for entries in self.services.values_mut() {
            for endpoint in entries.iter_mut() {
                if endpoint.healthy && now_ms.saturating_sub(endpoint.last_seen_ms) > timeout_ms {
                    endpoint.healthy = false;
                    marked += 1;
                }
            }
        }
        if marked > 0 {
            self.version += 1;
        }
        marked
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn ep(service: &str, address: &str, port: u16) -> ServiceEndpoint {
        ServiceEndpoint {
            service_name: service.to_string(),
            address: address.to_string(),
            port,
            healthy: true,
            last_seen_ms: 1_000,
        }
    }

    #[test]
    fn upsert_then_get_returns_endpoint_once() {
        let mut table = ServiceTable::new();
        table.upsert(ep("user", "10.0.0.1", 9000));

        let endpoints = table.get("user").unwrap();
        assert_eq!(endpoints.len(), 1);
        assert!(endpoints[0].matches("user", "10.0.0.1", 9000));
    }

    #[test]
    fn repeated_upsert_is_idempotent_by_identity() {
        let mut table = ServiceTable::new();
        table.upsert(ep("user", "10.0.0.1", 9000));
        table.upsert(ep("user", "10.0.0.1", 9000));
        table.upsert(ep("user", "10.0.0.1", 9000));

        assert_eq!(table.get("user").unwrap().len(), 1);
    }

    #[test]
    fn upsert_replaces_health_metadata_last_writer_wins() {
        let mut table = ServiceTable::new();
        table.upsert(ep("user", "10.0.0.1", 9000));

        let mut refreshed = ep("user", "10.0.0.1", 9000);
        refreshed.healthy = false;
        refreshed.last_seen_ms = 9_999;
        table.upsert(refreshed);

        let endpoints = table.get("user").unwrap();
        assert_eq!(endpoints.len(), 1);
        assert!(!endpoints[0].healthy);
        assert_eq!(endpoints[0].last_seen_ms, 9_999);
    }

    #[test]
    fn multiple_endpoints_share_a_service_name() {
        let mut table = ServiceTable::new();
        table.upsert(ep("user", "10.0.0.1", 9000));
        table.upsert(ep("user", "10.0.0.2", 9000));
        table.upsert(ep("user", "10.0.0.1", 9001));

        assert_eq!(table.get("user").unwrap().len(), 3);
    }

    #[test]
    fn remove_deletes_only_the_matching_identity() {
        let mut table = ServiceTable::new();
        table.upsert(ep("user", "10.0.0.1", 9000));
        table.upsert(ep("user", "10.0.0.2", 9000));

        table.remove("user", "10.0.0.1", 9000);

        let endpoints = table.get("user").unwrap();
        assert_eq!(endpoints.len(), 1);
        assert!(endpoints[0].matches("user", "10.0.0.2", 9000));
    }

    #[test]
    fn removing_last_endpoint_drops_the_service() {
        let mut table = ServiceTable::new();
        table.upsert(ep("user", "10.0.0.1", 9000));
        table.remove("user", "10.0.0.1", 9000);

        assert!(table.get("user").is_none());
        assert_eq!(table.service_count(), 0);
    }

    #[test]
    fn remove_of_unknown_identity_is_a_no_op_on_contents() {
        let mut table = ServiceTable::new();
        table.upsert(ep("user", "10.0.0.1", 9000));
        table.remove("user", "10.9.9.9", 1);
        table.remove("order", "10.0.0.1", 9000);

        assert_eq!(table.get("user").unwrap().len(), 1);
    }

    #[test]
    fn mark_stale_flags_but_keeps_endpoints() {
        let mut table = ServiceTable::new();
        table.upsert(ep("user", "10.0.0.1", 9000)); // last_seen 1000

        let marked = table.mark_stale(10_000, 5_000);
        assert_eq!(marked, 1);

        let endpoints = table.get("user").unwrap();
        assert_eq!(endpoints.len(), 1, "stale endpoints remain lookup-able");
        assert!(!endpoints[0].healthy);

        // A second sweep finds nothing new to mark.
        assert_eq!(table.mark_stale(10_000, 5_000), 0);
    }

    #[test]
    fn mark_stale_spares_recent_endpoints() {
        let mut table = ServiceTable::new();
        let mut recent = ep("user", "10.0.0.1", 9000);
        recent.last_seen_ms = 9_500;
        table.upsert(recent);

        assert_eq!(table.mark_stale(10_000, 5_000), 0);
        assert!(table.get("user").unwrap()[0].healthy);
    }

    #[test]
    fn version_increments_per_change() {
        let mut table = ServiceTable::new();
        assert_eq!(table.version(), 0);
        table.upsert(ep("user", "10.0.0.1", 9000));
        assert_eq!(table.version(), 1);
        table.remove("user", "10.0.0.1", 9000);
        assert_eq!(table.version(), 2);
    }

    // -- Model-based property: table agrees with a naive map of identities --

    #[derive(Debug, Clone)]
    enum Change {
        Upsert(u8, u8),
        Remove(u8, u8),
    }

    fn change_strategy() -> impl Strategy<Value = Change> {
        prop_oneof![
            (0u8..4, 0u8..4).prop_map(|(s, a)| Change::Upsert(s, a)),
            (0u8..4, 0u8..4).prop_map(|(s, a)| Change::Remove(s, a)),
        ]
    }

    proptest! {
        #[test]
        fn sequential_application_matches_model(changes in proptest::collection::vec(change_strategy(), 0..64)) {
            let mut table = ServiceTable::new();
            let mut model: std::collections::BTreeSet<(String, String, u16)> =
                std::collections::BTreeSet::new();

            for change in changes {
                match change {
                    Change::Upsert(s, a) => {
                        let service = format!("svc-{s}");
                        let address = format!("10.0.0.{a}");
                        table.upsert(ep(&service, &address, 9000));
                        model.insert((service, address, 9000));
                    }
                    Change::Remove(s, a) => {
                        let service = format!("svc-{s}");
                        let address = format!("10.0.0.{a}");
                        table.remove(&service, &address, 9000);
                        model.remove(&(service, address, 9000));
                    }
                }
            }

            let mut flattened: Vec<(String, String, u16)> = table
                .services()
                .values()
                .flatten()
                .map(|e| (e.service_name.clone(), e.address.clone(), e.port))
                .collect();
            flattened.sort();
            let expected: Vec<_> = model.into_iter().collect();
            prop_assert_eq!(flattened, expected);
        }
    }
}
