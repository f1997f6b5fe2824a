// src/core/master/http.rs

//! The master's HTTP surface (spec.md §6), served with `axum` in the same
//! single-router style as the teacher's metrics server
//! (`examples/spineldb-spineldb/src/server/metrics_server.rs`).

use super::state::MasterState;
use crate::core::errors::MasterError;
use crate::core::metrics;
use crate::core::protocol::{AddServerQuery, LostConnectionRequest, ReplicaAddress, TokenValidityReply};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

pub fn router(state: Arc<MasterState>) -> Router {
    Router::new()
        .route("/addServer", post(add_server))
        .route("/lostClient/{ip}/{port}", post(lost_client))
        .route("/createDocAndConnect", post(create_doc_and_connect))
        .route("/connectToExistingDoc", post(connect_to_existing_doc))
        .route("/docList", get(doc_list))
        .route("/tokenInUse/{doc_id}/{serial}", post(token_in_use))
        .route("/replicaRecvToken/{doc_id}/{serial}", post(replica_recv_token))
        .route("/replicaCrashed/{ip}/{port}", post(replica_crashed))
        .route("/lostConnection", post(lost_connection))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn add_server(State(state): State<Arc<MasterState>>, Query(q): Query<AddServerQuery>) -> Result<impl IntoResponse, MasterError> {
    state.join(q.ip, q.port).await?;
    Ok(Json(json!({ "Message": "Server added to cluster" })))
}

async fn lost_client(State(state): State<Arc<MasterState>>, Path((ip, port)): Path<(String, String)>) -> impl IntoResponse {
    state.lost_client(&ip, &port);
    StatusCode::OK
}

async fn create_doc_and_connect(State(state): State<Arc<MasterState>>, Json(name): Json<String>) -> Result<impl IntoResponse, MasterError> {
    let reply = state.create_doc_and_connect(name).await?;
    Ok(Json(reply))
}

async fn connect_to_existing_doc(State(state): State<Arc<MasterState>>) -> Result<Json<ReplicaAddress>, MasterError> {
    Ok(Json(state.connect_existing()?))
}

async fn doc_list(State(state): State<Arc<MasterState>>) -> Result<impl IntoResponse, MasterError> {
    Ok(Json(state.doc_list().await?))
}

async fn token_in_use(State(state): State<Arc<MasterState>>, Path((doc_id, serial)): Path<(u64, u64)>) -> impl IntoResponse {
    state.token_in_use(doc_id, serial);
    Json(json!({ "Message": format!("ack for {doc_id}:{serial}") }))
}

async fn replica_recv_token(State(state): State<Arc<MasterState>>, Path((doc_id, serial)): Path<(u64, u64)>) -> impl IntoResponse {
    let token = state.replica_received(doc_id, serial);
    Json(TokenValidityReply { token })
}

async fn replica_crashed(State(state): State<Arc<MasterState>>, Path((ip, port)): Path<(String, String)>) -> impl IntoResponse {
    state.replica_crashed(&format!("{ip}:{port}")).await;
    Json(json!({ "Message": "ack crash of successor" }))
}

async fn lost_connection(State(state): State<Arc<MasterState>>, Json(req): Json<LostConnectionRequest>) -> Result<impl IntoResponse, MasterError> {
    info!(doc_id = req.doc_id, "client reported lost connection");
    let reply = state.lost_connection(&req.ip, &req.port).await?;
    Ok(Json(reply))
}

async fn healthz(State(state): State<Arc<MasterState>>) -> impl IntoResponse {
    Json(json!({
        "role": "master",
        "membership_size": state.membership_size(),
        "token_registry_size": state.token_registry_size(),
    }))
}

async fn metrics_handler(State(state): State<Arc<MasterState>>) -> impl IntoResponse {
    metrics::MEMBERSHIP_SIZE.set(state.membership_size() as f64);
    metrics::TOKEN_REGISTRY_SIZE.set(state.token_registry_size() as f64);
    (StatusCode::OK, [("content-type", "text/plain; version=0.0.4")], metrics::gather_metrics())
}

/// Binds and serves the master's router until the process is terminated.
pub async fn run(addr: SocketAddr, state: Arc<MasterState>) -> anyhow::Result<()> {
    let app = router(state);
    info!(%addr, "master HTTP surface listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
