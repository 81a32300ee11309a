//! The indexer facade: one forward store plus one inverted index with
//! consistent add, delete and search semantics.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{info, warn};

use crate::config::SedgeConfig;
use crate::data::{Document, TermQuery};
use crate::error::Result;
use crate::index::InvertedIndex;
use crate::kv::KvBackend;
use crate::store::DocumentStore;

/// Composes the persistent forward store and the in-memory inverted index.
///
/// The inverted index is volatile; on startup [`Indexer::load_from_forward`]
/// rebuilds it from the forward store before the node serves traffic.
pub struct Indexer {
    forward: DocumentStore,
    inverted: InvertedIndex,
    next_int_id: AtomicU64,
}

impl Indexer {
    /// Open an indexer with default index shape. Fails with a storage
    /// error when the forward store cannot be opened.
    pub fn open(doc_num_estimate: usize, backend: KvBackend, path: &Path) -> Result<Self> {
        Ok(Indexer {
            forward: DocumentStore::open(backend, path)?,
            inverted: InvertedIndex::new(doc_num_estimate),
            next_int_id: AtomicU64::new(1),
        })
    }

    /// Open an indexer shaped by the node configuration.
    pub fn from_config(config: &SedgeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Indexer {
            forward: DocumentStore::open(config.kv_backend, &config.data_dir)?,
            inverted: InvertedIndex::with_shape(
                config.doc_num_estimate,
                config.segments,
                config.mutation_locks,
            ),
            next_int_id: AtomicU64::new(1),
        })
    }

    /// Insert `doc`, replacing any previous version with the same id.
    ///
    /// Returns the number of documents affected: 0 for a blank id, 1
    /// otherwise. The two writes are not atomic; if the forward write
    /// fails after the old version was evicted, the caller should retry.
    pub fn add_doc(&self, mut doc: Document) -> Result<u32> {
        let id = doc.id.trim().to_string();
        if id.is_empty() {
            return Ok(0);
        }

        // Evict the previous version so its postings cannot linger under
        // keywords the new version no longer carries.
        self.delete_doc(&id)?;

        doc.id = id;
        doc.int_id = self.next_int_id.fetch_add(1, Ordering::Relaxed);

        self.forward.put(&doc)?;
        self.inverted.add(&doc);
        Ok(1)
    }

    /// Delete the document with `id`, returning 1 when a record existed.
    /// A missing id is not an error.
    pub fn delete_doc(&self, id: &str) -> Result<u32> {
        let mut affected = 0;
        match self.forward.get(id) {
            Ok(Some(doc)) => {
                for keyword in &doc.keywords {
                    self.inverted.delete(doc.int_id, keyword);
                }
                affected = 1;
            }
            Ok(None) => {}
            Err(e) => {
                // The record existed but cannot be decoded; its postings
                // are unreachable, so just drop the bytes.
                warn!(id = %id, error = %e, "deleting undecodable forward record");
                affected = 1;
            }
        }
        self.forward.remove(id)?;
        Ok(affected)
    }

    /// Evaluate `query` and return the matching documents in ascending
    /// `int_id` order.
    pub fn search(
        &self,
        query: &TermQuery,
        on_flag: u64,
        off_flag: u64,
        or_flags: &[u64],
    ) -> Result<Vec<Document>> {
        let ids = self.inverted.search(query, on_flag, off_flag, or_flags);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.forward.batch_get(&ids)
    }

    /// Rebuild the inverted index from the forward store, advancing the
    /// id counter past the maximum recorded id. Returns the number of
    /// documents loaded. Must complete before the node serves traffic.
    pub fn load_from_forward(&self) -> Result<u64> {
        let mut max_int_id = 0u64;
        let loaded = self.forward.for_each(|doc| {
            max_int_id = max_int_id.max(doc.int_id);
            self.inverted.add(&doc);
        })?;
        self.next_int_id.fetch_max(max_int_id + 1, Ordering::Relaxed);
        info!(loaded, "rebuilt inverted index from forward store");
        Ok(loaded)
    }

    /// Flush and close the forward store. The inverted index is discarded
    /// with the indexer.
    pub fn close(&self) -> Result<()> {
        self.forward.flush_close()
    }
}
