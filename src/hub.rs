//! Registry client: lease-based registration, discovery and endpoint
//! load balancing.

pub mod proxy;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::Result;
use crate::registry::{LeaseId, RegistryStore, WatchEvent};

pub use proxy::HubProxy;

/// Prefix of every registry key written by the engine.
pub const SERVICE_ROOT_PATH: &str = "/radic/index";

/// Service name index workers register under.
pub const INDEX_SERVICE: &str = "index_service";

/// The sealed set of endpoint selection strategies.
pub enum LoadBalancer {
    /// Rotate through the endpoint list with an atomic counter.
    RoundRobin(AtomicU64),
    /// Pick uniformly at random.
    Random,
}

impl LoadBalancer {
    pub fn round_robin() -> Self {
        LoadBalancer::RoundRobin(AtomicU64::new(0))
    }

    /// Select one endpoint, or `None` from an empty list.
    pub fn take<'a>(&self, endpoints: &'a [String]) -> Option<&'a str> {
        if endpoints.is_empty() {
            return None;
        }
        let index = match self {
            LoadBalancer::RoundRobin(counter) => {
                counter.fetch_add(1, Ordering::Relaxed) as usize % endpoints.len()
            }
            LoadBalancer::Random => rand::thread_rng().gen_range(0..endpoints.len()),
        };
        Some(&endpoints[index])
    }
}

/// Client to the service registry.
///
/// The backing [`RegistryStore`] is handed in at construction and shared
/// between every component of the process that talks to the registry.
pub struct ServiceHub {
    store: Arc<dyn RegistryStore>,
    lease_ttl: Duration,
    balancer: LoadBalancer,
}

impl ServiceHub {
    /// A hub whose leases live `heartbeat_seconds`, balancing round-robin.
    pub fn new(store: Arc<dyn RegistryStore>, heartbeat_seconds: u64) -> Self {
        ServiceHub {
            store,
            lease_ttl: Duration::from_secs(heartbeat_seconds.max(1)),
            balancer: LoadBalancer::round_robin(),
        }
    }

    pub fn with_balancer(mut self, balancer: LoadBalancer) -> Self {
        self.balancer = balancer;
        self
    }

    /// TTL of granted leases; renew faster than this.
    pub fn lease_ttl(&self) -> Duration {
        self.lease_ttl
    }

    fn endpoint_key(service: &str, endpoint: &str) -> String {
        format!("{SERVICE_ROOT_PATH}/{service}/{endpoint}")
    }

    fn service_prefix(service: &str) -> String {
        format!("{SERVICE_ROOT_PATH}/{service}/")
    }

    /// Register `endpoint` under `service`.
    ///
    /// With no lease this grants one and writes the key; with a known
    /// lease it renews, falling back to a fresh registration when the
    /// lease has meanwhile expired. Returns the live lease either way.
    pub async fn register(
        &self,
        service: &str,
        endpoint: &str,
        lease: Option<LeaseId>,
    ) -> Result<LeaseId> {
        if let Some(id) = lease {
            if self.store.keep_alive(id).await? {
                return Ok(id);
            }
            debug!(service = %service, endpoint = %endpoint, "lease lost, re-registering");
        }
        let lease = self.store.grant(self.lease_ttl).await?;
        self.store
            .put(&Self::endpoint_key(service, endpoint), lease)
            .await?;
        info!(service = %service, endpoint = %endpoint, lease, "registered service endpoint");
        Ok(lease)
    }

    /// Remove `endpoint` from `service`.
    pub async fn unregister(&self, service: &str, endpoint: &str) -> Result<()> {
        self.store
            .delete(&Self::endpoint_key(service, endpoint))
            .await?;
        info!(service = %service, endpoint = %endpoint, "unregistered service endpoint");
        Ok(())
    }

    /// All endpoints currently registered under `service`.
    pub async fn discover(&self, service: &str) -> Result<Vec<String>> {
        let keys = self.store.get_prefix(&Self::service_prefix(service)).await?;
        let endpoints: Vec<String> = keys
            .iter()
            .filter_map(|key| key.rsplit('/').next())
            .map(str::to_string)
            .collect();
        debug!(service = %service, count = endpoints.len(), "discovered service endpoints");
        Ok(endpoints)
    }

    /// Discover and select one endpoint.
    pub async fn pick(&self, service: &str) -> Result<Option<String>> {
        let endpoints = self.discover(service).await?;
        Ok(self.balance(&endpoints).map(str::to_string))
    }

    /// Apply this hub's load balancer to an endpoint list.
    pub fn balance<'a>(&self, endpoints: &'a [String]) -> Option<&'a str> {
        self.balancer.take(endpoints)
    }

    /// Subscribe to registration changes under `service`.
    pub async fn watch(&self, service: &str) -> Result<mpsc::Receiver<WatchEvent>> {
        self.store
            .watch_prefix(&Self::service_prefix(service))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::registry::MemoryRegistry;

    #[test]
    fn test_round_robin_is_even() {
        let balancer = LoadBalancer::round_robin();
        let endpoints: Vec<String> = (0..3).map(|i| format!("host-{i}:9000")).collect();

        let mut counts: HashMap<&str, u32> = HashMap::new();
        for _ in 0..300 {
            let picked = balancer.take(&endpoints).unwrap();
            *counts.entry(picked).or_default() += 1;
        }
        let max = counts.values().max().unwrap();
        let min = counts.values().min().unwrap();
        assert!(max - min <= 1, "uneven distribution: {counts:?}");
    }

    #[test]
    fn test_balancers_handle_empty_lists() {
        assert!(LoadBalancer::round_robin().take(&[]).is_none());
        assert!(LoadBalancer::Random.take(&[]).is_none());
    }

    #[tokio::test]
    async fn test_register_discover_unregister() {
        let registry = Arc::new(MemoryRegistry::new());
        let hub = ServiceHub::new(registry, 3);

        let lease = hub.register("search", "10.0.0.5:7050", None).await.unwrap();
        // Renewal with the live lease keeps the same id.
        let renewed = hub
            .register("search", "10.0.0.5:7050", Some(lease))
            .await
            .unwrap();
        assert_eq!(lease, renewed);

        assert_eq!(
            hub.discover("search").await.unwrap(),
            vec!["10.0.0.5:7050"]
        );
        assert_eq!(
            hub.pick("search").await.unwrap().as_deref(),
            Some("10.0.0.5:7050")
        );

        hub.unregister("search", "10.0.0.5:7050").await.unwrap();
        assert!(hub.discover("search").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_recovers_lost_lease() {
        let registry = Arc::new(MemoryRegistry::new());
        let hub = ServiceHub::new(registry, 1);

        let lease = hub.register("search", "a:1", None).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        // The old lease is gone; registration transparently starts over.
        let fresh = hub.register("search", "a:1", Some(lease)).await.unwrap();
        assert_ne!(lease, fresh);
        assert_eq!(hub.discover("search").await.unwrap(), vec!["a:1"]);
    }
}
