//! Keyword to posting list index with boolean query evaluation.

use std::hash::BuildHasher;
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::RwLock;

use crate::data::{Document, Keyword, TermQuery};
use crate::index::posting::{PostingEntry, PostingList};
use crate::util::ShardedMap;

/// Default size of the mutation lock array.
pub const DEFAULT_MUTATION_LOCKS: usize = 1000;

// Seeded differently from the sharded map so lock routing and segment
// routing stay uncorrelated.
const LOCK_HASH_SEEDS: (u64, u64, u64, u64) =
    (0x243f_6a88, 0x85a3_08d3, 0x1319_8a2e, 0x0370_7344);

type PostingHandle = Arc<RwLock<PostingList>>;

/// The sharded inverted index.
///
/// Posting lists live in a [`ShardedMap`] keyed by the keyword's canonical
/// form. Mutations of any single posting list are serialized by a fixed
/// array of hash-selected locks: the array bounds lock memory no matter
/// how many keywords exist, and a collision merely makes two keywords
/// share a lock. Readers traverse a list under its read lock, so they see
/// either the pre- or post-mutation state but never a torn structure.
pub struct InvertedIndex {
    table: ShardedMap<PostingHandle>,
    locks: Box<[RwLock<()>]>,
    lock_hasher: RandomState,
}

impl InvertedIndex {
    /// Create an index sized for `doc_num_estimate` documents with the
    /// default segment fanout and lock array.
    pub fn new(doc_num_estimate: usize) -> Self {
        Self::with_shape(doc_num_estimate, num_cpus::get(), DEFAULT_MUTATION_LOCKS)
    }

    /// Create an index with an explicit segment fanout and lock array size.
    pub fn with_shape(doc_num_estimate: usize, segments: usize, mutation_locks: usize) -> Self {
        let lock_count = mutation_locks.max(1);
        let locks = (0..lock_count)
            .map(|_| RwLock::new(()))
            .collect::<Vec<_>>();
        InvertedIndex {
            table: ShardedMap::new(segments, doc_num_estimate),
            locks: locks.into_boxed_slice(),
            lock_hasher: RandomState::with_seeds(
                LOCK_HASH_SEEDS.0,
                LOCK_HASH_SEEDS.1,
                LOCK_HASH_SEEDS.2,
                LOCK_HASH_SEEDS.3,
            ),
        }
    }

    fn mutation_lock(&self, key: &str) -> &RwLock<()> {
        let index = self.lock_hasher.hash_one(key) as usize % self.locks.len();
        &self.locks[index]
    }

    /// Index every keyword of `doc` under its assigned `int_id`.
    ///
    /// There is no atomicity across keywords: a concurrent search may
    /// observe the document under some keywords before the rest land.
    pub fn add(&self, doc: &Document) {
        for keyword in &doc.keywords {
            let key = keyword.canonical();
            if key.is_empty() {
                continue;
            }
            let entry = PostingEntry {
                doc_id: doc.id.clone(),
                bits: doc.bits_feature,
            };
            // The keyword lock serializes the lookup-create-publish window
            // so concurrent adds of a brand-new keyword cannot publish two
            // competing lists.
            let _guard = self.mutation_lock(&key).write();
            match self.table.get(&key) {
                Some(handle) => {
                    handle.write().insert(doc.int_id, entry);
                }
                None => {
                    let mut list = PostingList::new();
                    list.insert(doc.int_id, entry);
                    self.table.set(key, Arc::new(RwLock::new(list)));
                }
            }
        }
    }

    /// Remove the posting for `int_id` from one keyword's list.
    ///
    /// Emptied lists are retained; they are cheap and likely to refill.
    pub fn delete(&self, int_id: u64, keyword: &Keyword) {
        let key = keyword.canonical();
        if key.is_empty() {
            return;
        }
        let _guard = self.mutation_lock(&key).write();
        if let Some(handle) = self.table.get(&key) {
            handle.write().remove(int_id);
        }
    }

    /// Evaluate `query` and return matching business ids in ascending
    /// `int_id` order.
    pub fn search(&self, query: &TermQuery, on: u64, off: u64, or_flags: &[u64]) -> Vec<String> {
        self.eval(query, on, off, or_flags).doc_ids()
    }

    fn eval(&self, query: &TermQuery, on: u64, off: u64, or_flags: &[u64]) -> PostingList {
        if !query.keyword.is_empty() {
            let mut result = PostingList::new();
            if let Some(handle) = self.table.get(&query.keyword) {
                let list = handle.read();
                for (int_id, entry) in list.iter() {
                    if filter_bits(entry.bits, on, off, or_flags) {
                        result.insert(*int_id, entry.clone());
                    }
                }
            }
            result
        } else if !query.must.is_empty() {
            let children: Vec<PostingList> = query
                .must
                .iter()
                .map(|child| self.eval(child, on, off, or_flags))
                .collect();
            PostingList::intersection(&children)
        } else if !query.should.is_empty() {
            let children: Vec<PostingList> = query
                .should
                .iter()
                .map(|child| self.eval(child, on, off, or_flags))
                .collect();
            PostingList::union(&children)
        } else {
            PostingList::new()
        }
    }

    /// Number of distinct keywords with a posting list (including emptied
    /// ones).
    pub fn keyword_count(&self) -> usize {
        self.table.len()
    }
}

/// The three-part bitmask predicate applied to a document's feature word.
///
/// 1. every bit of `on` must be set in `bits`,
/// 2. no bit of `off` may be set in `bits`,
/// 3. each nonzero group in `or_flags` must share at least one bit with
///    `bits`.
pub fn filter_bits(bits: u64, on: u64, off: u64, or_flags: &[u64]) -> bool {
    if bits & on != on {
        return false;
    }
    if bits & off != 0 {
        return false;
    }
    for &group in or_flags {
        if group > 0 && bits & group == 0 {
            return false;
        }
    }
    true
}
