//! # Sedge
//!
//! A distributed document search engine built around a sharded in-memory
//! inverted index with a persistent forward store.
//!
//! ## Features
//!
//! - Segmented concurrent map with per-segment read/write locks
//! - Ordered posting lists with multi-way merge intersection and union
//! - Boolean term queries (AND/OR trees) with bitmask post-filtering
//! - Forward store rebuilt into the inverted index on startup
//! - Lease-based service registry with prefix watches
//! - Coordinator fanning searches out to all workers in parallel

// Core modules
pub mod config;
pub mod data;
mod error;
pub mod hub;
pub mod index;
pub mod indexer;
pub mod kv;
pub mod registry;
pub mod service;
pub mod store;
pub mod util;

// Re-exports for the public API
pub use config::SedgeConfig;
pub use data::{Document, Keyword, TermQuery};
pub use error::{Result, SedgeError};
pub use hub::{HubProxy, LoadBalancer, ServiceHub, INDEX_SERVICE};
pub use index::{filter_bits, InvertedIndex};
pub use indexer::Indexer;
pub use kv::{KvBackend, KvStore};
pub use registry::{MemoryRegistry, RegistryStore};
pub use service::{IndexWorker, Sentinel};
pub use store::DocumentStore;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
