//! The index worker: one indexer served over HTTP, self-registered in
//! the service registry.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::SedgeConfig;
use crate::data::Document;
use crate::error::{Result, SedgeError};
use crate::hub::{ServiceHub, INDEX_SERVICE};
use crate::indexer::Indexer;
use crate::registry::RegistryStore;
use crate::service::{
    AffectedCount, DeleteRequest, SearchRequest, SearchResponse, ADD_PATH, DELETE_PATH,
    HEALTH_PATH, SEARCH_PATH,
};
use crate::util::net;

/// Margin by which heartbeats run ahead of lease expiry.
const HEARTBEAT_MARGIN: Duration = Duration::from_millis(100);

type ApiResult<T> = std::result::Result<T, (StatusCode, String)>;

/// A running index worker.
///
/// [`IndexWorker::start`] opens the indexer, rebuilds the inverted index
/// from the forward store, binds the HTTP service and (when a registry is
/// wired in) registers the advertised endpoint with a heartbeat task
/// renewing the lease slightly faster than it expires.
pub struct IndexWorker {
    indexer: Arc<Indexer>,
    endpoint: String,
    hub: Option<Arc<ServiceHub>>,
    server: JoinHandle<()>,
    heartbeat: Option<JoinHandle<()>>,
}

impl IndexWorker {
    pub async fn start(
        config: &SedgeConfig,
        registry: Option<Arc<dyn RegistryStore>>,
    ) -> Result<IndexWorker> {
        config.validate()?;

        let indexer = Arc::new(Indexer::from_config(config)?);
        let loaded = indexer.load_from_forward()?;

        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.service_port)).await?;
        let port = listener.local_addr()?.port();
        let host = match &config.advertise_host {
            Some(host) => host.clone(),
            None => net::local_ip()?.to_string(),
        };
        let endpoint = format!("{host}:{port}");
        info!(endpoint = %endpoint, loaded, "index worker listening");

        let app = Router::new()
            .route(HEALTH_PATH, get(health))
            .route(ADD_PATH, post(add_doc))
            .route(DELETE_PATH, post(delete_doc))
            .route(SEARCH_PATH, post(search))
            .layer(TraceLayer::new_for_http())
            .with_state(indexer.clone());

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "index worker server exited");
            }
        });

        let mut hub = None;
        let mut heartbeat = None;
        if let Some(store) = registry {
            let service_hub = Arc::new(ServiceHub::new(store, config.heartbeat_seconds));
            let lease = service_hub.register(INDEX_SERVICE, &endpoint, None).await?;

            let interval = service_hub
                .lease_ttl()
                .saturating_sub(HEARTBEAT_MARGIN)
                .max(HEARTBEAT_MARGIN);
            let beat_hub = service_hub.clone();
            let beat_endpoint = endpoint.clone();
            heartbeat = Some(tokio::spawn(async move {
                let mut lease = lease;
                loop {
                    tokio::time::sleep(interval).await;
                    match beat_hub
                        .register(INDEX_SERVICE, &beat_endpoint, Some(lease))
                        .await
                    {
                        Ok(renewed) => lease = renewed,
                        Err(e) => {
                            warn!(endpoint = %beat_endpoint, error = %e, "heartbeat failed")
                        }
                    }
                }
            }));
            hub = Some(service_hub);
        }

        Ok(IndexWorker {
            indexer,
            endpoint,
            hub,
            server,
            heartbeat,
        })
    }

    /// The advertised `host:port` of this worker.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Direct access to the owned indexer, for local administration.
    pub fn indexer(&self) -> &Arc<Indexer> {
        &self.indexer
    }

    /// Unregister, stop serving and close the indexer.
    pub async fn close(&self) -> Result<()> {
        if let Some(hub) = &self.hub {
            if let Err(e) = hub.unregister(INDEX_SERVICE, &self.endpoint).await {
                warn!(endpoint = %self.endpoint, error = %e, "unregister failed");
            }
        }
        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.abort();
        }
        self.server.abort();
        self.indexer.close()
    }
}

fn internal_error(e: SedgeError) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn add_doc(
    State(indexer): State<Arc<Indexer>>,
    Json(doc): Json<Document>,
) -> ApiResult<Json<AffectedCount>> {
    let affected = indexer.add_doc(doc).map_err(internal_error)?;
    Ok(Json(AffectedCount {
        count: affected as i32,
    }))
}

async fn delete_doc(
    State(indexer): State<Arc<Indexer>>,
    Json(request): Json<DeleteRequest>,
) -> ApiResult<Json<AffectedCount>> {
    let affected = indexer.delete_doc(&request.id).map_err(internal_error)?;
    Ok(Json(AffectedCount {
        count: affected as i32,
    }))
}

async fn search(
    State(indexer): State<Arc<Indexer>>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<SearchResponse>> {
    let results = indexer
        .search(
            &request.query,
            request.on_flag,
            request.off_flag,
            &request.or_flags,
        )
        .map_err(internal_error)?;
    Ok(Json(SearchResponse { results }))
}
