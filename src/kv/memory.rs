//! Volatile in-memory key-value store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::error::{Result, SedgeError};
use crate::kv::{KeyVisitor, KvStore, KvVisitor};

/// A [`KvStore`] that keeps everything in a locked `HashMap`. Contents are
/// lost on drop, which suits tests and scratch nodes.
pub struct MemoryKv {
    dir: PathBuf,
    table: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    closed: AtomicBool,
}

impl MemoryKv {
    pub fn new(dir: &Path) -> Self {
        MemoryKv {
            dir: dir.to_path_buf(),
            table: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SedgeError::storage("store is closed"));
        }
        Ok(())
    }
}

impl KvStore for MemoryKv {
    fn path(&self) -> &Path {
        &self.dir
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_open()?;
        self.table.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn batch_set(&self, keys: &[Vec<u8>], values: &[Vec<u8>]) -> Result<()> {
        if keys.len() != values.len() {
            return Err(SedgeError::invalid_argument(
                "batch_set keys and values differ in length",
            ));
        }
        self.check_open()?;
        let mut table = self.table.write();
        for (key, value) in keys.iter().zip(values) {
            table.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        Ok(self.table.read().get(key).cloned())
    }

    fn batch_get(&self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>> {
        self.check_open()?;
        let table = self.table.read();
        Ok(keys.iter().map(|k| table.get(k).cloned()).collect())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.check_open()?;
        self.table.write().remove(key);
        Ok(())
    }

    fn batch_delete(&self, keys: &[Vec<u8>]) -> Result<()> {
        self.check_open()?;
        let mut table = self.table.write();
        for key in keys {
            table.remove(key);
        }
        Ok(())
    }

    fn has(&self, key: &[u8]) -> bool {
        self.table.read().contains_key(key)
    }

    fn iter_db(&self, visit: KvVisitor<'_>) -> Result<u64> {
        self.check_open()?;
        let mut pairs: Vec<(Vec<u8>, Vec<u8>)> = {
            let table = self.table.read();
            table.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        pairs.sort_by(|a, b| a.0.cmp(&b.0));

        let mut count = 0u64;
        for (key, value) in &pairs {
            visit(key, value)?;
            count += 1;
        }
        Ok(count)
    }

    fn iter_keys(&self, visit: KeyVisitor<'_>) -> Result<u64> {
        self.check_open()?;
        let mut keys: Vec<Vec<u8>> = self.table.read().keys().cloned().collect();
        keys.sort();

        let mut count = 0u64;
        for key in &keys {
            visit(key)?;
            count += 1;
        }
        Ok(count)
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_round_trip() {
        let kv = MemoryKv::new(Path::new(""));
        kv.set(b"k", b"v").unwrap();
        assert_eq!(kv.get(b"k").unwrap(), Some(b"v".to_vec()));
        kv.delete(b"k").unwrap();
        assert_eq!(kv.get(b"k").unwrap(), None);
    }

    #[test]
    fn test_iter_counts() {
        let kv = MemoryKv::new(Path::new(""));
        for i in 0..7u8 {
            kv.set(&[i], &[i]).unwrap();
        }
        let visited = kv.iter_db(&mut |_, _| Ok(())).unwrap();
        assert_eq!(visited, 7);
    }

    #[test]
    fn test_closed_store_refuses_writes() {
        let kv = MemoryKv::new(Path::new(""));
        kv.close().unwrap();
        assert!(kv.set(b"k", b"v").is_err());
    }
}
