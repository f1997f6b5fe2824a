// src/core/replica/ws.rs

//! The two WebSocket surfaces: the client edit session (spec.md §4.6) and
//! the peer propagation channel (spec.md §4.7). The event loop shape —
//! `tokio::select!` over an inbound frame and a side-channel event,
//! falling through to cleanup on disconnect — follows the teacher's
//! `ConnectionHandler` (`examples/spineldb-spineldb/src/connection/handler.rs`);
//! the outbound peer dial uses `tokio-tungstenite` since `axum` can only
//! accept WebSocket upgrades, never originate one (see DESIGN.md).

use super::state::{EditWaiter, ReplicaState};
use super::token;
use crate::core::protocol::{EditFrame, PeerUpdateFrame, START_EDITING, STOP_EDITING};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{info, warn};

pub async fn client_channel(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ReplicaState>>,
    Path((document_id, doc_name, edit_perm)): Path<(u64, String, String)>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_client_session(socket, state, document_id, doc_name, edit_perm == "true"))
}

async fn handle_client_session(socket: WebSocket, state: Arc<ReplicaState>, doc_id: u64, doc_name: String, edit_perm: bool) {
    state.websocket_sessions.fetch_add(1, Ordering::Relaxed);
    ensure_document_exists(&state, doc_id, &doc_name);

    let (mut sink, mut stream) = socket.split();
    let waiter = EditWaiter::new();
    let mut rx = state.broadcast_channel(doc_id).subscribe();

    if edit_perm {
        // Rerouted client that already held permission before its old
        // replica crashed: resume straight into editing (spec.md §4.6.1).
        waiter.granted.store(true, Ordering::SeqCst);
        if sink.send(Message::Text(START_EDITING.into())).await.is_err() {
            cleanup(&state, doc_id, &waiter).await;
            return;
        }
    } else {
        let content = state.store.get(doc_id).map(|d| d.content).unwrap_or_default();
        if sink.send(Message::Text(content.into())).await.is_err() {
            cleanup(&state, doc_id, &waiter).await;
            return;
        }
    }

    loop {
        if waiter.granted.load(Ordering::SeqCst) {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    if !handle_edit_frame(&state, &waiter, doc_id, &doc_name, &text).await {
                        continue;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(_)) => break,
            }
        } else {
            tokio::select! {
                biased;
                msg = stream.next() => match msg {
                    Some(Ok(_)) => {
                        state.enqueue(doc_id, Arc::clone(&waiter));
                        info!(doc_id, "session queued for edit permission");
                        waiter.wait_for_permission().await;
                        if sink.send(Message::Text(START_EDITING.into())).await.is_err() {
                            break;
                        }
                    }
                    _ => break,
                },
                content = rx.recv() => match content {
                    Ok(content) => {
                        if sink.send(Message::Text(content.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => continue,
                },
            }
        }
    }

    cleanup(&state, doc_id, &waiter).await;
}

/// Applies one frame received while `EDITING`. Returns `false` when the
/// session should return to `CONNECTED` (stop editing was requested).
async fn handle_edit_frame(
    state: &Arc<ReplicaState>,
    waiter: &Arc<EditWaiter>,
    doc_id: u64,
    doc_name: &str,
    text: &str,
) -> bool {
    let frame: EditFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(_) => return true,
    };

    if frame.content == STOP_EDITING {
        info!(doc_id, "session released edit permission");
        let serial = waiter.serial.load(Ordering::SeqCst);
        waiter.granted.store(false, Ordering::SeqCst);
        let release_state = Arc::clone(state);
        tokio::spawn(async move { token::send_token(release_state, doc_id, serial).await });
        return false;
    }

    apply_and_propagate(state, doc_id, doc_name, frame.content).await;
    true
}

async fn apply_and_propagate(state: &Arc<ReplicaState>, doc_id: u64, doc_name: &str, content: String) {
    if state.store.update(doc_id, content.clone()).is_err() {
        warn!(doc_id, "edit for missing document, creating placeholder row");
        state.store.create_with_id(doc_id, doc_name.to_string());
        let _ = state.store.update(doc_id, content.clone());
    }

    let _ = state.broadcast_channel(doc_id).send(content.clone());

    for peer in state.peers() {
        if propagate_to_peer(&peer, doc_id, doc_name, &content).await.is_err() {
            warn!(%peer, "peer forward failed, removing from ring");
            state.remove_peer(&peer);
        }
    }
}

async fn propagate_to_peer(peer: &str, doc_id: u64, doc_name: &str, content: &str) -> Result<(), ()> {
    let uri = format!("ws://{peer}/replica/ws/{doc_id}/{doc_name}");
    let (mut stream, _) = tokio_tungstenite::connect_async(&uri).await.map_err(|_| ())?;
    let frame = serde_json::to_string(&PeerUpdateFrame { content: content.to_string() }).map_err(|_| ())?;
    stream
        .send(tokio_tungstenite::tungstenite::Message::Text(frame.into()))
        .await
        .map_err(|_| ())?;
    let _ = stream.next().await;
    Ok(())
}

async fn cleanup(state: &Arc<ReplicaState>, doc_id: u64, waiter: &Arc<EditWaiter>) {
    state.websocket_sessions.fetch_sub(1, Ordering::Relaxed);
    let (ip, port) = state.address.split_once(':').unwrap_or((state.address.as_str(), ""));
    let url = format!("http://{}/lostClient/{ip}/{port}", state.master_addr);
    let _ = state.http.post(url).send().await;

    if waiter.granted.load(Ordering::SeqCst) {
        let serial = waiter.serial.load(Ordering::SeqCst);
        let release_state = Arc::clone(state);
        tokio::spawn(async move { token::send_token(release_state, doc_id, serial).await });
    }
}

fn ensure_document_exists(state: &ReplicaState, doc_id: u64, doc_name: &str) {
    if state.store.get(doc_id).is_none() {
        warn!(doc_id, "session for document missing locally, creating placeholder row");
        state.store.create_with_id(doc_id, doc_name.to_string());
    }
}

// --- peer propagation channel (spec.md §4.7) ---

pub async fn peer_channel(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ReplicaState>>,
    Path((document_id, doc_name)): Path<(u64, String)>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_peer_session(socket, state, document_id, doc_name))
}

async fn handle_peer_session(socket: WebSocket, state: Arc<ReplicaState>, doc_id: u64, doc_name: String) {
    let (mut sink, mut stream) = socket.split();
    while let Some(Ok(Message::Text(text))) = stream.next().await {
        let frame: PeerUpdateFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(_) => continue,
        };

        if state.store.update(doc_id, frame.content.clone()).is_err() {
            state.store.create_with_id(doc_id, doc_name.clone());
            let _ = state.store.update(doc_id, frame.content.clone());
        }
        let _ = state.broadcast_channel(doc_id).send(frame.content.clone());

        let port = state.address.rsplit(':').next().unwrap_or_default();
        let ack = format!("ack from replica {port}");
        if sink.send(Message::Text(ack.into())).await.is_err() {
            break;
        }
    }
}
