// src/core/replica/http.rs

//! The replica's HTTP surface (spec.md §6), plus the WebSocket upgrades
//! wired in alongside it, served from one `axum::Router` in the teacher's
//! single-router style (`examples/spineldb-spineldb/src/server/metrics_server.rs`).

use super::state::ReplicaState;
use super::{token, ws};
use crate::core::errors::ReplicaError;
use crate::core::metrics;
use crate::core::protocol::{DocListEntry, NewDocIdReply, ServerList, UsingReply};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

pub fn router(state: Arc<ReplicaState>) -> Router {
    Router::new()
        .route("/newDocID/{name}", post(new_doc_id))
        .route("/docList", get(doc_list))
        .route("/updateServerList", post(update_server_list))
        .route("/initializeTokens", post(initialize_tokens))
        .route("/initializeToken/{doc_id}/{serial}", post(initialize_token))
        .route("/recvToken/{doc_id}/{serial}", post(recv_token))
        .route("/ws/{document_id}/{doc_name}/{edit_perm}", get(ws::client_channel))
        .route("/replica/ws/{document_id}/{doc_name}", get(ws::peer_channel))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn new_doc_id(State(state): State<Arc<ReplicaState>>, Path(name): Path<String>) -> impl IntoResponse {
    let doc_id = state.store.create(name);
    Json(NewDocIdReply { doc_id })
}

async fn doc_list(State(state): State<Arc<ReplicaState>>) -> impl IntoResponse {
    let docs: Vec<DocListEntry> = state.store.list().into_iter().map(|d| DocListEntry { id: d.id, name: d.name }).collect();
    Json(docs)
}

async fn update_server_list(State(state): State<Arc<ReplicaState>>, Json(list): Json<ServerList>) -> impl IntoResponse {
    info!(count = list.len(), "updated membership list");
    state.update_ring(list);
    Json(json!({ "message": "Server list updated successfully" }))
}

async fn initialize_tokens(State(state): State<Arc<ReplicaState>>) -> impl IntoResponse {
    token::initialize_tokens(state).await;
    Json(json!({ "Message": "Tokens initialized" }))
}

async fn initialize_token(State(state): State<Arc<ReplicaState>>, Path((doc_id, serial)): Path<(u64, u64)>) -> impl IntoResponse {
    token::initialize_token(state, doc_id, serial).await;
    Json(json!({ "Message": "Token initialized" }))
}

async fn recv_token(State(state): State<Arc<ReplicaState>>, Path((doc_id, serial)): Path<(u64, u64)>) -> impl IntoResponse {
    let using = token::recv_token(state, doc_id, serial).await;
    Json(UsingReply { using: crate::core::protocol::BoolString(using) })
}

async fn healthz(State(state): State<Arc<ReplicaState>>) -> impl IntoResponse {
    Json(json!({
        "role": "replica",
        "address": state.address,
        "ring_size": state.ring_size(),
        "document_count": state.store.list().len(),
    }))
}

async fn metrics_handler(State(state): State<Arc<ReplicaState>>) -> impl IntoResponse {
    metrics::MEMBERSHIP_SIZE.set(state.ring_size() as f64);
    metrics::WEBSOCKET_SESSIONS.set(state.websocket_sessions.load(std::sync::atomic::Ordering::Relaxed) as f64);
    (StatusCode::OK, [("content-type", "text/plain; version=0.0.4")], metrics::gather_metrics())
}

/// Registers this replica with the master, then binds and serves its
/// router until the process is terminated.
pub async fn run(addr: SocketAddr, state: Arc<ReplicaState>) -> anyhow::Result<()> {
    join_master(&state).await?;
    let app = router(Arc::clone(&state));
    info!(%addr, "replica HTTP surface listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn join_master(state: &ReplicaState) -> Result<(), ReplicaError> {
    let (ip, port) = state.address.split_once(':').unwrap_or((state.address.as_str(), ""));
    let url = format!("http://{}/addServer?IP={ip}&port={port}", state.master_addr);
    state.http.post(url).send().await?.error_for_status()?;
    info!(master = %state.master_addr, "joined cluster");
    Ok(())
}
