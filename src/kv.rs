//! Key-value storage behind the forward index.
//!
//! The engine treats the store as a black box: anything that can set, get,
//! delete, batch-read and iterate byte pairs can back the forward index.

pub mod log;
pub mod memory;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SedgeError};

pub use self::log::LogKv;
pub use self::memory::MemoryKv;

/// Visitor for full key-value iteration.
pub type KvVisitor<'a> = &'a mut dyn FnMut(&[u8], &[u8]) -> Result<()>;

/// Visitor for key-only iteration.
pub type KeyVisitor<'a> = &'a mut dyn FnMut(&[u8]) -> Result<()>;

/// Capability surface required of a forward store backend.
pub trait KvStore: Send + Sync {
    /// Directory the store keeps its data in.
    fn path(&self) -> &Path;

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Write several pairs. The error of the final commit is surfaced.
    fn batch_set(&self, keys: &[Vec<u8>], values: &[Vec<u8>]) -> Result<()>;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Read several keys, preserving input order. Missing keys yield
    /// `None` in their slot.
    fn batch_get(&self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>>;

    fn delete(&self, key: &[u8]) -> Result<()>;

    fn batch_delete(&self, keys: &[Vec<u8>]) -> Result<()>;

    fn has(&self, key: &[u8]) -> bool;

    /// Visit every pair, returning how many were visited. Iteration stops
    /// at the first visitor error.
    fn iter_db(&self, visit: KvVisitor<'_>) -> Result<u64>;

    /// Visit every key, returning how many were visited.
    fn iter_keys(&self, visit: KeyVisitor<'_>) -> Result<u64>;

    /// Flush pending writes and release the store. Further operations fail.
    fn close(&self) -> Result<()>;
}

/// The sealed set of forward store backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KvBackend {
    /// Persistent append-only log replayed into memory on open.
    #[default]
    Log,
    /// Volatile in-memory store, mainly for tests and scratch nodes.
    Memory,
}

/// Open a forward store of the chosen backend rooted at `path`.
///
/// The parent directory is created when missing. A regular file squatting
/// on the store directory path is removed and replaced, matching how a
/// fresh deployment recovers from a half-written setup.
pub fn open_kv(backend: KvBackend, path: &Path) -> Result<Arc<dyn KvStore>> {
    if path.is_file() {
        warn!(path = %path.display(), "store path is a regular file, removing and recreating as a directory");
        std::fs::remove_file(path)
            .map_err(|e| SedgeError::storage(format!("cannot clear store path: {e}")))?;
    }
    match backend {
        KvBackend::Log => Ok(Arc::new(LogKv::open(path)?)),
        KvBackend::Memory => Ok(Arc::new(MemoryKv::new(path))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_serde_names() {
        assert_eq!(serde_json::to_string(&KvBackend::Log).unwrap(), "\"log\"");
        let parsed: KvBackend = serde_json::from_str("\"memory\"").unwrap();
        assert_eq!(parsed, KvBackend::Memory);
    }

    #[test]
    fn test_open_kv_replaces_file_squatter() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("store");
        std::fs::write(&path, b"junk").unwrap();

        let kv = open_kv(KvBackend::Log, &path).unwrap();
        kv.set(b"k", b"v").unwrap();
        assert_eq!(kv.get(b"k").unwrap(), Some(b"v".to_vec()));
        kv.close().unwrap();
    }
}
