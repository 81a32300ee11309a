//! Forward store adapter: documents as JSON records keyed by their id.

use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::data::Document;
use crate::error::{Result, SedgeError};
use crate::kv::{open_kv, KvBackend, KvStore};

/// Encodes and decodes [`Document`] records on top of a [`KvStore`].
///
/// Records are tagged JSON, so fields added later decode against older
/// data through their serde defaults.
pub struct DocumentStore {
    kv: Arc<dyn KvStore>,
}

impl DocumentStore {
    /// Open a store of the chosen backend rooted at `path`.
    pub fn open(backend: KvBackend, path: &Path) -> Result<Self> {
        Ok(DocumentStore {
            kv: open_kv(backend, path)?,
        })
    }

    /// Wrap an already opened backend.
    pub fn with_kv(kv: Arc<dyn KvStore>) -> Self {
        DocumentStore { kv }
    }

    pub fn put(&self, doc: &Document) -> Result<()> {
        let bytes = serde_json::to_vec(doc)?;
        self.kv.set(doc.id.as_bytes(), &bytes)
    }

    /// Fetch and decode one record. An undecodable record is an
    /// [`SedgeError::Internal`] error, not a miss.
    pub fn get(&self, id: &str) -> Result<Option<Document>> {
        match self.kv.get(id.as_bytes())? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| SedgeError::internal(format!("undecodable record {id:?}: {e}"))),
            None => Ok(None),
        }
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        self.kv.delete(id.as_bytes())
    }

    /// Fetch several records, preserving input order. Records missing or
    /// undecodable (possible under a concurrent delete) are skipped with a
    /// warning rather than failing the whole read.
    pub fn batch_get(&self, ids: &[String]) -> Result<Vec<Document>> {
        let keys: Vec<Vec<u8>> = ids.iter().map(|id| id.as_bytes().to_vec()).collect();
        let values = self.kv.batch_get(&keys)?;

        let mut docs = Vec::with_capacity(values.len());
        for (id, value) in ids.iter().zip(values) {
            let Some(bytes) = value else {
                warn!(id = %id, "forward record vanished during batch read");
                continue;
            };
            match serde_json::from_slice::<Document>(&bytes) {
                Ok(doc) => docs.push(doc),
                Err(e) => warn!(id = %id, error = %e, "skipping undecodable forward record"),
            }
        }
        Ok(docs)
    }

    /// Visit every decodable record, returning how many were decoded.
    /// Undecodable records are logged and skipped.
    pub fn for_each<F: FnMut(Document)>(&self, mut visit: F) -> Result<u64> {
        let mut decoded = 0u64;
        self.kv.iter_db(&mut |key, value| {
            match serde_json::from_slice::<Document>(value) {
                Ok(doc) => {
                    decoded += 1;
                    visit(doc);
                }
                Err(e) => {
                    warn!(
                        key = %String::from_utf8_lossy(key),
                        error = %e,
                        "skipping undecodable forward record"
                    );
                }
            }
            Ok(())
        })?;
        Ok(decoded)
    }

    /// Flush pending writes and close the backend.
    pub fn flush_close(&self) -> Result<()> {
        self.kv.close()
    }
}
