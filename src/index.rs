//! The in-memory inverted index and its posting list primitives.

pub mod inverted;
pub mod posting;

pub use inverted::{filter_bits, InvertedIndex};
pub use posting::{PostingEntry, PostingList};
