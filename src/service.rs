//! The worker RPC surface shared by server and coordinator.

pub mod sentinel;
pub mod worker;

use serde::{Deserialize, Serialize};

use crate::data::{Document, TermQuery};

pub use sentinel::Sentinel;
pub use worker::IndexWorker;

pub const ADD_PATH: &str = "/add";
pub const DELETE_PATH: &str = "/delete";
pub const SEARCH_PATH: &str = "/search";
pub const HEALTH_PATH: &str = "/health";

/// Number of documents an add or delete touched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AffectedCount {
    pub count: i32,
}

/// Body of a delete call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub id: String,
}

/// Body of a search call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: TermQuery,
    #[serde(default)]
    pub on_flag: u64,
    #[serde(default)]
    pub off_flag: u64,
    #[serde(default)]
    pub or_flags: Vec<u64>,
}

/// Body of a search response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<Document>,
}
