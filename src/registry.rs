//! The distributed registry abstraction.
//!
//! The engine only needs a lease-scoped key space with prefix reads and
//! prefix watches; anything providing those operations can back service
//! discovery. [`memory::MemoryRegistry`] is the in-process backend used by
//! tests and single-host deployments; an etcd-like backend plugs in behind
//! the same trait.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

pub use memory::MemoryRegistry;

/// Identifier of a granted lease.
pub type LeaseId = u64;

/// A change under a watched key prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A key appeared or was refreshed.
    Put(String),
    /// A key was removed, by deletion or lease expiry.
    Delete(String),
}

impl WatchEvent {
    pub fn key(&self) -> &str {
        match self {
            WatchEvent::Put(key) | WatchEvent::Delete(key) => key,
        }
    }
}

/// Capability surface of the registry backend.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Create a lease that expires `ttl` from now unless renewed.
    async fn grant(&self, ttl: Duration) -> Result<LeaseId>;

    /// Renew a lease. Returns `Ok(false)` when the lease is unknown
    /// (expired or never granted), in which case the caller re-registers.
    async fn keep_alive(&self, lease: LeaseId) -> Result<bool>;

    /// Bind `key` to a live lease. The key disappears with the lease.
    async fn put(&self, key: &str, lease: LeaseId) -> Result<()>;

    /// Remove `key` immediately.
    async fn delete(&self, key: &str) -> Result<()>;

    /// All live keys starting with `prefix`, in stable order.
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Subscribe to changes under `prefix`. The receiver closes when the
    /// registry shuts down.
    async fn watch_prefix(&self, prefix: &str) -> Result<mpsc::Receiver<WatchEvent>>;

    /// Shut the backend down, closing every watch stream.
    async fn close(&self) -> Result<()>;
}
