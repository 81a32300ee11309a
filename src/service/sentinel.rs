//! The coordinator: routes adds to one worker, fans deletes and searches
//! out to every live worker and merges what comes back.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tracing::warn;

use crate::data::{Document, TermQuery};
use crate::error::{Result, SedgeError};
use crate::hub::{HubProxy, INDEX_SERVICE};
use crate::service::{
    AffectedCount, DeleteRequest, SearchRequest, SearchResponse, ADD_PATH, DELETE_PATH,
    SEARCH_PATH,
};

/// Deadline for establishing a connection to a worker.
const DIAL_TIMEOUT: Duration = Duration::from_millis(200);

/// Default whole-call deadline for one worker RPC.
const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// The query coordinator.
///
/// Holds one HTTP client per worker endpoint; a client is evicted when a
/// call through it fails and is lazily re-dialed on next use. Losing an
/// eviction race is harmless, the slower writer just dials again.
pub struct Sentinel {
    proxy: Arc<HubProxy>,
    pool: RwLock<HashMap<String, Client>>,
    rpc_timeout: Duration,
}

impl Sentinel {
    pub fn new(proxy: Arc<HubProxy>) -> Self {
        Sentinel {
            proxy,
            pool: RwLock::new(HashMap::new()),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    /// Override the per-RPC deadline applied to worker calls.
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    async fn conn(&self, endpoint: &str) -> Result<Client> {
        if let Some(client) = self.pool.read().await.get(endpoint) {
            return Ok(client.clone());
        }
        let client = Client::builder()
            .connect_timeout(DIAL_TIMEOUT)
            .timeout(self.rpc_timeout)
            .build()
            .map_err(|e| SedgeError::transport(format!("cannot build client: {e}")))?;
        self.pool
            .write()
            .await
            .insert(endpoint.to_string(), client.clone());
        Ok(client)
    }

    async fn evict(&self, endpoint: &str) {
        self.pool.write().await.remove(endpoint);
    }

    /// Route `doc` to one load-balanced worker and return how many
    /// documents it affected.
    pub async fn add_doc(&self, doc: &Document) -> Result<i32> {
        let Some(endpoint) = self.proxy.pick(INDEX_SERVICE).await else {
            return Err(SedgeError::no_live_worker(INDEX_SERVICE));
        };
        let client = self.conn(&endpoint).await?;
        match post_json::<_, AffectedCount>(&client, &endpoint, ADD_PATH, doc).await {
            Ok(affected) => Ok(affected.count),
            Err(e) => {
                self.evict(&endpoint).await;
                Err(e)
            }
        }
    }

    /// Fan a delete out to every live worker and sum the counts. A
    /// failing endpoint is logged and contributes zero.
    pub async fn delete_doc(&self, id: &str) -> Result<i32> {
        let endpoints = self.proxy.discover(INDEX_SERVICE).await;
        if endpoints.is_empty() {
            return Err(SedgeError::no_live_worker(INDEX_SERVICE));
        }

        let request = DeleteRequest { id: id.to_string() };
        let mut calls = JoinSet::new();
        for endpoint in endpoints {
            let client = match self.conn(&endpoint).await {
                Ok(client) => client,
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "skipping undialable worker");
                    continue;
                }
            };
            let request = request.clone();
            calls.spawn(async move {
                let outcome =
                    post_json::<_, AffectedCount>(&client, &endpoint, DELETE_PATH, &request).await;
                (endpoint, outcome)
            });
        }

        let mut total = 0;
        let mut failed = Vec::new();
        while let Some(joined) = calls.join_next().await {
            match joined {
                Ok((_, Ok(affected))) => total += affected.count,
                Ok((endpoint, Err(e))) => {
                    warn!(endpoint = %endpoint, error = %e, "delete fan-out call failed");
                    failed.push(endpoint);
                }
                Err(e) => warn!(error = %e, "delete fan-out task failed"),
            }
        }
        for endpoint in failed {
            self.evict(&endpoint).await;
        }
        Ok(total)
    }

    /// Fan a search out to every live worker in parallel and merge the
    /// results.
    ///
    /// Each worker's documents are streamed into a channel drained by a
    /// concurrent collector; once the last RPC settles the channel closes
    /// and the merged, unordered result comes back. Workers partition the
    /// document space, so no cross-worker deduplication is needed. A
    /// failing endpoint is logged and contributes nothing.
    pub async fn search(
        &self,
        query: &TermQuery,
        on_flag: u64,
        off_flag: u64,
        or_flags: &[u64],
    ) -> Result<Vec<Document>> {
        let endpoints = self.proxy.discover(INDEX_SERVICE).await;
        if endpoints.is_empty() {
            return Err(SedgeError::no_live_worker(INDEX_SERVICE));
        }

        let request = SearchRequest {
            query: query.clone(),
            on_flag,
            off_flag,
            or_flags: or_flags.to_vec(),
        };

        let (tx, mut rx) = mpsc::channel::<Vec<Document>>(endpoints.len());
        let collector = tokio::spawn(async move {
            let mut merged = Vec::new();
            while let Some(mut batch) = rx.recv().await {
                merged.append(&mut batch);
            }
            merged
        });

        let mut calls = JoinSet::new();
        for endpoint in endpoints {
            let client = match self.conn(&endpoint).await {
                Ok(client) => client,
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "skipping undialable worker");
                    continue;
                }
            };
            let request = request.clone();
            let tx = tx.clone();
            calls.spawn(async move {
                match post_json::<_, SearchResponse>(&client, &endpoint, SEARCH_PATH, &request)
                    .await
                {
                    Ok(response) => {
                        let _ = tx.send(response.results).await;
                        (endpoint, Ok(()))
                    }
                    Err(e) => (endpoint, Err(e)),
                }
            });
        }
        // The collector only finishes once every in-flight sender is gone.
        drop(tx);

        let mut failed = Vec::new();
        while let Some(joined) = calls.join_next().await {
            match joined {
                Ok((endpoint, Err(e))) => {
                    warn!(endpoint = %endpoint, error = %e, "search fan-out call failed");
                    failed.push(endpoint);
                }
                Ok((_, Ok(()))) => {}
                Err(e) => warn!(error = %e, "search fan-out task failed"),
            }
        }
        for endpoint in failed {
            self.evict(&endpoint).await;
        }

        collector
            .await
            .map_err(|e| SedgeError::internal(format!("search collector failed: {e}")))
    }

    /// Stop following registry changes.
    pub async fn close(&self) {
        self.proxy.close().await;
    }
}

async fn post_json<Req: Serialize, Resp: DeserializeOwned>(
    client: &Client,
    endpoint: &str,
    path: &str,
    body: &Req,
) -> Result<Resp> {
    let url = format!("http://{endpoint}{path}");
    let response = client
        .post(&url)
        .json(body)
        .send()
        .await
        .map_err(|e| SedgeError::transport(format!("POST {url}: {e}")))?
        .error_for_status()
        .map_err(|e| SedgeError::transport(format!("POST {url}: {e}")))?;
    response
        .json::<Resp>()
        .await
        .map_err(|e| SedgeError::transport(format!("decoding response of POST {url}: {e}")))
}
