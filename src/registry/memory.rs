//! In-process registry backend with real lease expiry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{Result, SedgeError};
use crate::registry::{LeaseId, RegistryStore, WatchEvent};

const SWEEP_INTERVAL: Duration = Duration::from_millis(50);
const WATCH_CHANNEL_CAPACITY: usize = 64;

struct Lease {
    deadline: Instant,
    ttl: Duration,
}

struct Watcher {
    prefix: String,
    tx: mpsc::Sender<WatchEvent>,
}

#[derive(Default)]
struct Inner {
    next_lease: LeaseId,
    leases: HashMap<LeaseId, Lease>,
    keys: HashMap<String, LeaseId>,
    watchers: Vec<Watcher>,
}

impl Inner {
    /// Push an event to every watcher whose prefix matches. Watchers with
    /// a full or closed channel are skipped; a dropped event only delays
    /// the cache resync until the next one.
    fn notify(&mut self, event: WatchEvent) {
        self.watchers
            .retain(|w| !w.tx.is_closed());
        for watcher in &self.watchers {
            if event.key().starts_with(&watcher.prefix) {
                let _ = watcher.tx.try_send(event.clone());
            }
        }
    }

    fn expire(&mut self, now: Instant) {
        let expired: Vec<LeaseId> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.deadline <= now)
            .map(|(&id, _)| id)
            .collect();
        if expired.is_empty() {
            return;
        }
        for id in &expired {
            self.leases.remove(id);
        }
        let dropped: Vec<String> = self
            .keys
            .iter()
            .filter(|(_, lease)| expired.contains(lease))
            .map(|(key, _)| key.clone())
            .collect();
        for key in dropped {
            self.keys.remove(&key);
            debug!(key = %key, "registry lease expired, dropping key");
            self.notify(WatchEvent::Delete(key));
        }
    }
}

/// An in-memory [`RegistryStore`] with a background sweeper enforcing
/// lease TTLs. Must be created inside a Tokio runtime.
pub struct MemoryRegistry {
    inner: Arc<Mutex<Inner>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        let inner = Arc::new(Mutex::new(Inner::default()));
        let sweep_target = inner.clone();
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                sweep_target.lock().expire(Instant::now());
            }
        });
        MemoryRegistry {
            inner,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryRegistry {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistry {
    async fn grant(&self, ttl: Duration) -> Result<LeaseId> {
        let mut inner = self.inner.lock();
        inner.next_lease += 1;
        let id = inner.next_lease;
        inner.leases.insert(
            id,
            Lease {
                deadline: Instant::now() + ttl,
                ttl,
            },
        );
        Ok(id)
    }

    async fn keep_alive(&self, lease: LeaseId) -> Result<bool> {
        let mut inner = self.inner.lock();
        match inner.leases.get_mut(&lease) {
            Some(state) => {
                state.deadline = Instant::now() + state.ttl;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn put(&self, key: &str, lease: LeaseId) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.leases.contains_key(&lease) {
            return Err(SedgeError::registry(format!("lease {lease} not found")));
        }
        inner.keys.insert(key.to_string(), lease);
        inner.notify(WatchEvent::Put(key.to_string()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.keys.remove(key).is_some() {
            inner.notify(WatchEvent::Delete(key.to_string()));
        }
        Ok(())
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock();
        let now = Instant::now();
        let mut keys: Vec<String> = inner
            .keys
            .iter()
            .filter(|(key, lease)| {
                key.starts_with(prefix)
                    && inner
                        .leases
                        .get(lease)
                        .is_some_and(|l| l.deadline > now)
            })
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn watch_prefix(&self, prefix: &str) -> Result<mpsc::Receiver<WatchEvent>> {
        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        self.inner.lock().watchers.push(Watcher {
            prefix: prefix.to_string(),
            tx,
        });
        Ok(rx)
    }

    async fn close(&self) -> Result<()> {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        // Dropping the senders ends every watch stream.
        self.inner.lock().watchers.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_requires_live_lease() {
        let registry = MemoryRegistry::new();
        assert!(registry.put("/k", 99).await.is_err());

        let lease = registry.grant(Duration::from_secs(5)).await.unwrap();
        registry.put("/k", lease).await.unwrap();
        assert_eq!(registry.get_prefix("/").await.unwrap(), vec!["/k"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_expiry_drops_keys_and_notifies() {
        let registry = MemoryRegistry::new();
        let mut watch = registry.watch_prefix("/svc/").await.unwrap();

        let lease = registry.grant(Duration::from_millis(120)).await.unwrap();
        registry.put("/svc/a", lease).await.unwrap();
        assert_eq!(watch.recv().await, Some(WatchEvent::Put("/svc/a".into())));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(registry.get_prefix("/svc/").await.unwrap().is_empty());
        assert_eq!(
            watch.recv().await,
            Some(WatchEvent::Delete("/svc/a".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_extends_lease() {
        let registry = MemoryRegistry::new();
        let lease = registry.grant(Duration::from_millis(200)).await.unwrap();
        registry.put("/svc/a", lease).await.unwrap();

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(120)).await;
            assert!(registry.keep_alive(lease).await.unwrap());
        }
        assert_eq!(registry.get_prefix("/svc/").await.unwrap().len(), 1);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!registry.keep_alive(lease).await.unwrap());
        assert!(registry.get_prefix("/svc/").await.unwrap().is_empty());
    }
}
