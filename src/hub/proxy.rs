//! Caching, rate-limited proxy in front of the registry client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::hub::ServiceHub;
use crate::registry::LeaseId;

/// Non-blocking token bucket: `rate` tokens per second, bursting up to
/// `capacity`. A denied caller is never queued.
pub struct TokenBucket {
    capacity: f64,
    rate: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    refreshed: Instant,
}

impl TokenBucket {
    /// A bucket producing `qps` tokens per second with capacity `qps`,
    /// starting full.
    pub fn new(qps: u32) -> Self {
        let capacity = f64::from(qps.max(1));
        TokenBucket {
            capacity,
            rate: capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                refreshed: Instant::now(),
            }),
        }
    }

    /// Take one token if available.
    pub fn allow(&self) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.refreshed).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
        state.refreshed = now;
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Proxy over a [`ServiceHub`] adding an endpoint cache kept fresh by
/// registry watches and a token bucket shielding the registry from
/// discovery storms.
///
/// Registration calls are forwarded untouched; only discovery is cached
/// and rate limited. A denied discovery returns an empty endpoint list,
/// which callers treat the same as no worker being alive.
pub struct HubProxy {
    hub: Arc<ServiceHub>,
    cache: Arc<RwLock<HashMap<String, Vec<String>>>>,
    watchers: AsyncMutex<HashMap<String, JoinHandle<()>>>,
    limiter: TokenBucket,
}

impl HubProxy {
    pub fn new(hub: Arc<ServiceHub>, qps: u32) -> Self {
        HubProxy {
            hub,
            cache: Arc::new(RwLock::new(HashMap::new())),
            watchers: AsyncMutex::new(HashMap::new()),
            limiter: TokenBucket::new(qps),
        }
    }

    pub async fn register(
        &self,
        service: &str,
        endpoint: &str,
        lease: Option<LeaseId>,
    ) -> Result<LeaseId> {
        self.hub.register(service, endpoint, lease).await
    }

    pub async fn unregister(&self, service: &str, endpoint: &str) -> Result<()> {
        self.hub.unregister(service, endpoint).await
    }

    /// Install the prefix watch for `service` once per proxy lifetime.
    /// Every event triggers a full rediscovery whose outcome overwrites
    /// the cache entry (or clears it when the service emptied).
    async fn ensure_watch(&self, service: &str) {
        let mut watchers = self.watchers.lock().await;
        if watchers.contains_key(service) {
            return;
        }
        let mut events = match self.hub.watch(service).await {
            Ok(receiver) => receiver,
            Err(e) => {
                warn!(service = %service, error = %e, "cannot watch service prefix");
                return;
            }
        };

        let hub = self.hub.clone();
        let cache = self.cache.clone();
        let name = service.to_string();
        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                debug!(service = %name, key = %event.key(), "registry watch event, resyncing");
                match hub.discover(&name).await {
                    Ok(endpoints) if !endpoints.is_empty() => {
                        cache.write().await.insert(name.clone(), endpoints);
                    }
                    Ok(_) => {
                        cache.write().await.remove(&name);
                    }
                    Err(e) => {
                        warn!(service = %name, error = %e, "resync after watch event failed");
                    }
                }
            }
        });
        watchers.insert(service.to_string(), handle);
    }

    /// Cached endpoint lookup.
    ///
    /// Returns the empty list when the token bucket denies the call, when
    /// nothing is registered, or when the registry is unreachable; the
    /// caller cannot tell these apart and simply has no one to talk to.
    pub async fn discover(&self, service: &str) -> Vec<String> {
        if !self.limiter.allow() {
            debug!(service = %service, "discovery denied by rate limiter");
            return Vec::new();
        }

        self.ensure_watch(service).await;

        if let Some(endpoints) = self.cache.read().await.get(service) {
            return endpoints.clone();
        }
        match self.hub.discover(service).await {
            Ok(endpoints) => {
                if !endpoints.is_empty() {
                    self.cache
                        .write()
                        .await
                        .insert(service.to_string(), endpoints.clone());
                }
                endpoints
            }
            Err(e) => {
                warn!(service = %service, error = %e, "discovery failed");
                Vec::new()
            }
        }
    }

    /// Discover and load-balance one endpoint.
    pub async fn pick(&self, service: &str) -> Option<String> {
        let endpoints = self.discover(service).await;
        self.hub.balance(&endpoints).map(str::to_string)
    }

    /// Tear down every watch task. The proxy keeps serving cached data
    /// until dropped, but no longer follows registry changes.
    pub async fn close(&self) {
        let mut watchers = self.watchers.lock().await;
        for (_, handle) in watchers.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::hub::ServiceHub;
    use crate::registry::{MemoryRegistry, RegistryStore};

    #[test]
    fn test_token_bucket_burst_then_deny() {
        let bucket = TokenBucket::new(5);
        let allowed = (0..100).filter(|_| bucket.allow()).count();
        // The full burst plus at most a stray refill token.
        assert!((5..=6).contains(&allowed), "allowed {allowed}");
        assert!(!bucket.allow());
    }

    #[test]
    fn test_token_bucket_refills() {
        let bucket = TokenBucket::new(10);
        while bucket.allow() {}
        std::thread::sleep(Duration::from_millis(250));
        // ~2.5 tokens accrued.
        assert!(bucket.allow());
    }

    #[tokio::test]
    async fn test_cache_follows_watch_events() {
        let registry = Arc::new(MemoryRegistry::new());
        let hub = Arc::new(ServiceHub::new(registry.clone(), 3));
        let proxy = HubProxy::new(hub.clone(), 100);

        // First lookup: nothing registered, watch installed.
        assert!(proxy.discover("search").await.is_empty());

        hub.register("search", "127.0.0.1:7051", None).await.unwrap();

        // The watch task resyncs asynchronously; poll until it lands.
        let mut endpoints = Vec::new();
        for _ in 0..50 {
            endpoints = proxy.discover("search").await;
            if !endpoints.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(endpoints, vec!["127.0.0.1:7051"]);

        // Unregistration empties the cache the same way.
        hub.unregister("search", "127.0.0.1:7051").await.unwrap();
        for _ in 0..50 {
            endpoints = proxy.discover("search").await;
            if endpoints.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(endpoints.is_empty());

        proxy.close().await;
        registry.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_rate_limited_discovery_returns_empty() {
        let registry = Arc::new(MemoryRegistry::new());
        let hub = Arc::new(ServiceHub::new(registry.clone(), 3));
        hub.register("search", "127.0.0.1:7052", None).await.unwrap();

        let proxy = HubProxy::new(hub, 3);
        let mut served = 0;
        for _ in 0..20 {
            if !proxy.discover("search").await.is_empty() {
                served += 1;
            }
        }
        // Only the burst gets through; denied calls see an empty list.
        assert!((3..=4).contains(&served), "served {served}");
        proxy.close().await;
    }
}
