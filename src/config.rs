//! Node configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SedgeError};
use crate::kv::KvBackend;

/// Configuration for a Sedge node (worker or coordinator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SedgeConfig {
    /// Expected document count, used to pre-size the inverted index.
    pub doc_num_estimate: usize,
    /// Forward store backend.
    pub kv_backend: KvBackend,
    /// Filesystem directory for the forward store.
    pub data_dir: PathBuf,
    /// Registry endpoints for an external registry backend. Empty when the
    /// node is wired to an in-process registry.
    pub registry_endpoints: Vec<String>,
    /// Worker listen port. Must be above the privileged range; 0 asks the
    /// operating system for an ephemeral port.
    pub service_port: u16,
    /// Host to advertise in the registry. Defaults to the machine's
    /// preferred outbound IPv4 address.
    pub advertise_host: Option<String>,
    /// Registry lease TTL in seconds; heartbeats run slightly faster.
    pub heartbeat_seconds: u64,
    /// Token bucket rate applied to proxy discovery calls.
    pub proxy_qps: u32,
    /// Segment fanout of the sharded map underlying the inverted index.
    pub segments: usize,
    /// Size of the posting list mutation lock array.
    pub mutation_locks: usize,
}

impl Default for SedgeConfig {
    fn default() -> Self {
        SedgeConfig {
            doc_num_estimate: 10_000,
            kv_backend: KvBackend::Log,
            data_dir: PathBuf::from("./data"),
            registry_endpoints: Vec::new(),
            service_port: 7050,
            advertise_host: None,
            heartbeat_seconds: 3,
            proxy_qps: 100,
            segments: num_cpus::get(),
            mutation_locks: 1000,
        }
    }
}

impl SedgeConfig {
    /// Reject configurations a worker cannot serve with.
    pub fn validate(&self) -> Result<()> {
        if self.service_port != 0 && self.service_port <= 1024 {
            return Err(SedgeError::invalid_argument(format!(
                "listen port {} is in the privileged range, use a port above 1024",
                self.service_port
            )));
        }
        if self.segments == 0 {
            return Err(SedgeError::invalid_argument("segments must be nonzero"));
        }
        if self.mutation_locks == 0 {
            return Err(SedgeError::invalid_argument(
                "mutation_locks must be nonzero",
            ));
        }
        Ok(())
    }
}
