//! A segmented concurrent map from string keys to cheaply clonable values.
//!
//! The key space is split across a fixed number of segments, each an
//! independent `HashMap` behind its own reader/writer lock. A seeded
//! non-cryptographic hash routes every key to one segment, so writes to
//! unrelated keys rarely contend and a growing segment rehashes only its
//! own buckets.

use std::collections::HashMap;
use std::hash::BuildHasher;

use ahash::RandomState;
use parking_lot::RwLock;

// Fixed seeds keep the key routing stable for the lifetime of an instance.
const HASH_SEEDS: (u64, u64, u64, u64) = (0x51ab_c0de, 0x9e37_79b9, 0x85eb_ca6b, 0xc2b2_ae35);

struct Segment<V> {
    map: RwLock<HashMap<String, V>>,
}

/// A fixed-fanout sharded map with per-segment read/write locks.
pub struct ShardedMap<V> {
    segments: Box<[Segment<V>]>,
    hasher: RandomState,
}

impl<V: Clone> ShardedMap<V> {
    /// Create a map with `segments` shards, pre-sizing each for an even
    /// share of `expected_entries`.
    pub fn new(segments: usize, expected_entries: usize) -> Self {
        let segments = segments.max(1);
        let per_segment = expected_entries / segments;
        let shards = (0..segments)
            .map(|_| Segment {
                map: RwLock::new(HashMap::with_capacity(per_segment)),
            })
            .collect::<Vec<_>>();
        ShardedMap {
            segments: shards.into_boxed_slice(),
            hasher: RandomState::with_seeds(HASH_SEEDS.0, HASH_SEEDS.1, HASH_SEEDS.2, HASH_SEEDS.3),
        }
    }

    fn segment_for(&self, key: &str) -> &Segment<V> {
        let index = self.hasher.hash_one(key) as usize % self.segments.len();
        &self.segments[index]
    }

    /// Insert or overwrite `key`.
    pub fn set(&self, key: String, value: V) {
        let segment = self.segment_for(&key);
        segment.map.write().insert(key, value);
    }

    /// Fetch a clone of the value for `key`. Values are expected to be
    /// shared handles, so the clone is a reference-count bump.
    pub fn get(&self, key: &str) -> Option<V> {
        let segment = self.segment_for(key);
        segment.map.read().get(key).cloned()
    }

    /// Total number of entries across all segments.
    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.map.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.map.read().is_empty())
    }

    /// Lazily iterate all entries.
    ///
    /// Each segment's key set is snapshotted under the read lock when the
    /// iterator first reaches it; values are then looked up key by key.
    /// Entries mutated concurrently may surface their post-snapshot value,
    /// and keys removed after the snapshot are skipped. Within a segment no
    /// snapshotted key is yielded twice. No ordering is guaranteed.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            map: self,
            next_segment: 0,
            current_segment: 0,
            pending: Vec::new().into_iter(),
        }
    }
}

/// Snapshot iterator over a [`ShardedMap`], see [`ShardedMap::iter`].
pub struct Iter<'a, V> {
    map: &'a ShardedMap<V>,
    next_segment: usize,
    current_segment: usize,
    pending: std::vec::IntoIter<String>,
}

impl<V: Clone> Iterator for Iter<'_, V> {
    type Item = (String, V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(key) = self.pending.next() {
                let segment = &self.map.segments[self.current_segment];
                if let Some(value) = segment.map.read().get(&key) {
                    return Some((key, value.clone()));
                }
                continue;
            }
            if self.next_segment >= self.map.segments.len() {
                return None;
            }
            self.current_segment = self.next_segment;
            let segment = &self.map.segments[self.current_segment];
            let keys: Vec<String> = segment.map.read().keys().cloned().collect();
            self.pending = keys.into_iter();
            self.next_segment += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_get_after_set() {
        let map: ShardedMap<u64> = ShardedMap::new(8, 100);
        map.set("alpha".to_string(), 1);
        map.set("beta".to_string(), 2);
        assert_eq!(map.get("alpha"), Some(1));
        assert_eq!(map.get("beta"), Some(2));
        assert_eq!(map.get("gamma"), None);

        // Last write wins.
        map.set("alpha".to_string(), 3);
        assert_eq!(map.get("alpha"), Some(3));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_iter_sees_all_entries() {
        let map: ShardedMap<usize> = ShardedMap::new(4, 64);
        for i in 0..64 {
            map.set(format!("key-{i}"), i);
        }
        let mut seen: Vec<(String, usize)> = map.iter().collect();
        seen.sort_by(|a, b| a.1.cmp(&b.1));
        assert_eq!(seen.len(), 64);
        for (i, (key, value)) in seen.iter().enumerate() {
            assert_eq!(*value, i);
            assert_eq!(key, &format!("key-{i}"));
        }
    }

    #[test]
    fn test_concurrent_writers() {
        let map: Arc<ShardedMap<u64>> = Arc::new(ShardedMap::new(8, 1024));
        let mut handles = Vec::new();
        for t in 0..8u64 {
            let map = map.clone();
            handles.push(thread::spawn(move || {
                for i in 0..200u64 {
                    map.set(format!("w{t}-{i}"), t * 1000 + i);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(map.len(), 8 * 200);
        assert_eq!(map.get("w3-17"), Some(3017));
    }

    #[test]
    fn test_single_segment_degenerate() {
        let map: ShardedMap<i32> = ShardedMap::new(1, 0);
        map.set("only".to_string(), 7);
        assert_eq!(map.get("only"), Some(7));
        assert_eq!(map.iter().count(), 1);
    }
}
