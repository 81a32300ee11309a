//! Ordered posting lists and their multi-way merge primitives.
//!
//! A posting list maps a worker-local integer document id to the
//! business-side id and feature bits of that document. Lists stay sorted
//! by integer id, which is what lets intersection and union run as
//! cursor-based merges in a single forward pass over every input.

use std::collections::BTreeMap;

/// One document reference inside a posting list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingEntry {
    /// Business-side document id.
    pub doc_id: String,
    /// The document's 64-bit feature word.
    pub bits: u64,
}

/// An ordered map from integer document id to [`PostingEntry`].
///
/// Insert, remove and lookup are logarithmic; forward iteration yields
/// entries in strictly ascending id order.
#[derive(Debug, Clone, Default)]
pub struct PostingList {
    entries: BTreeMap<u64, PostingEntry>,
}

impl PostingList {
    pub fn new() -> Self {
        PostingList::default()
    }

    /// Insert or overwrite the entry for `int_id`.
    pub fn insert(&mut self, int_id: u64, entry: PostingEntry) {
        self.entries.insert(int_id, entry);
    }

    /// Remove the entry for `int_id` if present.
    pub fn remove(&mut self, int_id: u64) -> Option<PostingEntry> {
        self.entries.remove(&int_id)
    }

    pub fn get(&self, int_id: u64) -> Option<&PostingEntry> {
        self.entries.get(&int_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in ascending `int_id` order.
    pub fn iter(&self) -> impl Iterator<Item = (&u64, &PostingEntry)> {
        self.entries.iter()
    }

    /// The business-side ids in ascending `int_id` order.
    pub fn doc_ids(&self) -> Vec<String> {
        self.entries.values().map(|e| e.doc_id.clone()).collect()
    }

    /// Multi-way merge intersection.
    ///
    /// Keeps one cursor per input and repeatedly aligns every cursor on
    /// the current maximum key: cursors below it skip forward, and when
    /// all cursors agree the key is emitted with the first list's value
    /// (which value wins on disagreeing inputs is unspecified). The merge
    /// stops as soon as any cursor runs out.
    pub fn intersection(lists: &[PostingList]) -> PostingList {
        let mut result = PostingList::new();
        if lists.is_empty() {
            return result;
        }
        if lists.len() == 1 {
            return lists[0].clone();
        }
        if lists.iter().any(|l| l.is_empty()) {
            return result;
        }

        let mut cursors: Vec<_> = lists.iter().map(|l| l.entries.iter().peekable()).collect();
        loop {
            let mut max_key = 0u64;
            let mut aligned = 0usize;
            for cursor in cursors.iter_mut() {
                // Cursors are only ever exhausted at the bottom of the loop,
                // where the merge returns, so every peek here has an entry.
                let Some((key, _)) = cursor.peek() else {
                    return result;
                };
                if **key > max_key {
                    max_key = **key;
                    aligned = 1;
                } else if **key == max_key {
                    aligned += 1;
                }
            }

            if aligned == cursors.len() {
                if let Some((key, entry)) = cursors[0].peek() {
                    result.insert(**key, (*entry).clone());
                }
                for cursor in cursors.iter_mut() {
                    cursor.next();
                }
            } else {
                for cursor in cursors.iter_mut() {
                    while let Some((key, _)) = cursor.peek() {
                        if **key < max_key {
                            cursor.next();
                        } else {
                            break;
                        }
                    }
                }
            }

            if cursors.iter_mut().any(|c| c.peek().is_none()) {
                return result;
            }
        }
    }

    /// Multi-way merge union.
    ///
    /// Repeatedly emits the minimum key across all live cursors and
    /// advances every cursor sitting on it; on duplicate keys the value of
    /// the last input holding the key wins.
    pub fn union(lists: &[PostingList]) -> PostingList {
        let mut result = PostingList::new();
        if lists.is_empty() {
            return result;
        }
        if lists.len() == 1 {
            return lists[0].clone();
        }

        let mut cursors: Vec<_> = lists
            .iter()
            .filter(|l| !l.is_empty())
            .map(|l| l.entries.iter().peekable())
            .collect();

        loop {
            let min_key = cursors
                .iter_mut()
                .filter_map(|c| c.peek().map(|(key, _)| **key))
                .min();
            let Some(min_key) = min_key else {
                return result;
            };

            let mut winner = None;
            for cursor in cursors.iter_mut() {
                if let Some((key, entry)) = cursor.peek() {
                    if **key == min_key {
                        winner = Some((*entry).clone());
                        cursor.next();
                    }
                }
            }
            if let Some(entry) = winner {
                result.insert(min_key, entry);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(ids: &[u64]) -> PostingList {
        let mut l = PostingList::new();
        for &id in ids {
            l.insert(
                id,
                PostingEntry {
                    doc_id: format!("doc-{id}"),
                    bits: 0,
                },
            );
        }
        l
    }

    fn keys(l: &PostingList) -> Vec<u64> {
        l.iter().map(|(k, _)| *k).collect()
    }

    #[test]
    fn test_insert_remove_ordered() {
        let mut l = PostingList::new();
        for id in [5u64, 1, 9, 3] {
            l.insert(
                id,
                PostingEntry {
                    doc_id: id.to_string(),
                    bits: 0,
                },
            );
        }
        assert_eq!(keys(&l), vec![1, 3, 5, 9]);
        assert!(l.remove(5).is_some());
        assert!(l.remove(5).is_none());
        assert_eq!(keys(&l), vec![1, 3, 9]);
    }

    #[test]
    fn test_intersection_basic() {
        let a = list(&[1, 3, 5, 7, 9]);
        let b = list(&[2, 3, 5, 8, 9, 12]);
        let c = list(&[3, 4, 5, 9]);
        let out = PostingList::intersection(&[a, b, c]);
        assert_eq!(keys(&out), vec![3, 5, 9]);
    }

    #[test]
    fn test_intersection_is_order_insensitive() {
        let a = list(&[1, 4, 6, 10]);
        let b = list(&[4, 10, 20]);
        let ab = PostingList::intersection(&[a.clone(), b.clone()]);
        let ba = PostingList::intersection(&[b, a]);
        assert_eq!(keys(&ab), keys(&ba));
        assert_eq!(keys(&ab), vec![4, 10]);
    }

    #[test]
    fn test_intersection_empty_input_short_circuits() {
        let a = list(&[1, 2, 3]);
        let out = PostingList::intersection(&[a, PostingList::new()]);
        assert!(out.is_empty());
        assert!(PostingList::intersection(&[]).is_empty());
    }

    #[test]
    fn test_intersection_disjoint() {
        let a = list(&[1, 3, 5]);
        let b = list(&[2, 4, 6]);
        assert!(PostingList::intersection(&[a, b]).is_empty());
    }

    #[test]
    fn test_union_covers_all_inputs() {
        let a = list(&[1, 5, 9]);
        let b = list(&[2, 5, 10]);
        let c = PostingList::new();
        let out = PostingList::union(&[a, b, c]);
        assert_eq!(keys(&out), vec![1, 2, 5, 9, 10]);
    }

    #[test]
    fn test_union_all_empty() {
        let out = PostingList::union(&[PostingList::new(), PostingList::new()]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_union_last_value_wins_on_ties() {
        let mut a = PostingList::new();
        a.insert(
            7,
            PostingEntry {
                doc_id: "from-a".to_string(),
                bits: 0,
            },
        );
        let mut b = PostingList::new();
        b.insert(
            7,
            PostingEntry {
                doc_id: "from-b".to_string(),
                bits: 0,
            },
        );
        let out = PostingList::union(&[a, b]);
        assert_eq!(out.get(7).map(|e| e.doc_id.as_str()), Some("from-b"));
    }

    #[test]
    fn test_intersection_first_value_wins() {
        let mut a = PostingList::new();
        a.insert(
            4,
            PostingEntry {
                doc_id: "from-a".to_string(),
                bits: 1,
            },
        );
        let mut b = PostingList::new();
        b.insert(
            4,
            PostingEntry {
                doc_id: "from-b".to_string(),
                bits: 2,
            },
        );
        let out = PostingList::intersection(&[a, b]);
        assert_eq!(out.get(4).map(|e| e.doc_id.as_str()), Some("from-a"));
    }
}
