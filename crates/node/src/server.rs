//! HTTP transport for validator requests.

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use zkminer_core::{Address, Identity, MemberRecord, ProofResponse};

use crate::cache::NetworkStateCache;
use crate::handler::{HandlerStats, ProofRequestHandler};

/// Shared state of the request-serving router.
#[derive(Clone)]
pub struct AppState {
    handler: Arc<ProofRequestHandler>,
    cache: NetworkStateCache,
    identity: Identity,
    started_at: DateTime<Utc>,
}

impl AppState {
    /// Bundle the collaborators the routes need.
    pub fn new(handler: Arc<ProofRequestHandler>, cache: NetworkStateCache, identity: Identity) -> Self {
        Self {
            handler,
            cache,
            identity,
            started_at: Utc::now(),
        }
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/proof", post(post_proof))
        .route("/v1/status", get(get_status))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `app` on `listener` until `shutdown` flips to `true`, then drain
/// in-flight requests.
pub async fn serve(listener: TcpListener, app: Router, shutdown: watch::Receiver<bool>) -> Result<()> {
    let addr = listener.local_addr()?;
    info!("Axon listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await?;

    info!("Axon on {} stopped", addr);
    Ok(())
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn post_proof(State(state): State<AppState>, body: Bytes) -> Json<ProofResponse> {
    // Own task: a panic inside the backend becomes an error marker, not a
    // dropped connection.
    let handler = Arc::clone(&state.handler);
    let task = tokio::spawn(async move { handler.handle_bytes(&body).await });

    match task.await {
        Ok(response) => Json(response),
        Err(e) => {
            error!("Proof request task failed: {}", e);
            Json(ProofResponse::failed(None, "internal error"))
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    hotkey: Address,
    uid: u16,
    netuid: u16,
    block: u64,
    members: usize,
    snapshot_age_secs: Option<u64>,
    registered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<MemberRecord>,
    requests: HandlerStats,
    started_at: String,
    now: String,
}

async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.cache.current().await;
    let age = state.cache.age().await;
    let uid = state.identity.uid();
    let registered = snapshot.uid_of(&state.identity.address()) == Some(uid);

    Json(StatusResponse {
        hotkey: state.identity.address(),
        uid,
        netuid: snapshot.netuid,
        block: snapshot.block,
        members: snapshot.len(),
        snapshot_age_secs: age.map(|a| a.as_secs()),
        registered,
        metrics: snapshot.member(uid).ok().cloned(),
        requests: state.handler.stats(),
        started_at: state.started_at.to_rfc3339(),
        now: Utc::now().to_rfc3339(),
    })
}
