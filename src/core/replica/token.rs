// src/core/replica/token.rs

//! Token transport: `recv_token`, `send_token`, and the two bootstrap
//! entry points the master calls. Grounded on
//! `examples/original_source/backend/replica/server.py`'s `recv_token`/
//! `send_token` for the retry-with-backoff shape; the master-ack-per-hop
//! structure follows spec.md §4.5 literally (the original only acks once
//! before the successor-retry loop, but spec.md frames the ack as the
//! first step of every loop iteration, which additionally re-validates the
//! token's freshness on every retry).

use super::state::ReplicaState;
use crate::core::errors::ReplicaError;
use crate::core::protocol::{TokenValidity, TokenValidityReply, UsingReply};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Recommended pacing in spec.md §4.5 / §5: far below `TOKEN_TIMEOUT` so
/// healthy circulation is never misread as loss.
const HOP_SLEEP: Duration = Duration::from_secs(2);

/// Handles a token landing on this replica, whether from a predecessor hop
/// or from the master's bootstrap calls. Returns whether this replica
/// started using it (spec.md §4.5).
pub async fn recv_token(state: Arc<ReplicaState>, doc_id: u64, serial: u64) -> bool {
    if !ask_master_valid(&state, doc_id, serial).await {
        info!(doc_id, serial, "dropped zombie token on arrival");
        return false;
    }

    if let Some(waiter) = state.dequeue(doc_id) {
        waiter.grant(serial);
        info!(doc_id, serial, "token granted to waiting session");
        true
    } else {
        let forward_state = Arc::clone(&state);
        tokio::spawn(async move { send_token(forward_state, doc_id, serial).await });
        false
    }
}

/// Forwards a token around the ring, hopping past dead successors until
/// one accepts it or the master declares it a zombie (spec.md §4.5).
pub async fn send_token(state: Arc<ReplicaState>, doc_id: u64, serial: u64) {
    loop {
        if !ask_master_valid(&state, doc_id, serial).await {
            info!(doc_id, serial, "dropped zombie token before forwarding");
            return;
        }

        tokio::time::sleep(HOP_SLEEP).await;

        let Some(successor) = state.current_successor() else {
            warn!(doc_id, serial, error = %ReplicaError::RingEmpty, "token cannot circulate");
            return;
        };

        let url = format!("http://{successor}/recvToken/{doc_id}/{serial}");
        match state.http.post(url).send().await.and_then(|r| r.error_for_status()) {
            Ok(resp) => {
                if let Ok(body) = resp.json::<UsingReply>().await {
                    if body.using.0 {
                        notify_token_in_use(&state, doc_id, serial).await;
                    }
                }
                return;
            }
            Err(_) => {
                warn!(%successor, doc_id, serial, "hop failed, removing successor and retrying");
                report_crashed(&state, &successor).await;
                state.remove_peer(&successor);
                continue;
            }
        }
    }
}

/// Entry point invoked by the master at bootstrap: one `send_token` task
/// per document already in the store, each starting at serial 1.
pub async fn initialize_tokens(state: Arc<ReplicaState>) {
    let docs = state.store.list();
    info!(count = docs.len(), "initializing tokens for all documents");
    for doc in docs {
        let state = Arc::clone(&state);
        tokio::spawn(async move { send_token(state, doc.id, 1).await });
    }
}

/// Entry point invoked by the master for one newly created or reissued
/// token.
pub async fn initialize_token(state: Arc<ReplicaState>, doc_id: u64, serial: u64) {
    tokio::spawn(async move { send_token(state, doc_id, serial).await });
}

async fn ask_master_valid(state: &ReplicaState, doc_id: u64, serial: u64) -> bool {
    let url = format!("http://{}/replicaRecvToken/{doc_id}/{serial}", state.master_addr);
    match state.http.post(url).send().await {
        Ok(resp) => resp
            .json::<TokenValidityReply>()
            .await
            .map(|r| r.token == TokenValidity::Valid)
            .unwrap_or(false),
        Err(_) => false,
    }
}

async fn notify_token_in_use(state: &ReplicaState, doc_id: u64, serial: u64) {
    let url = format!("http://{}/tokenInUse/{doc_id}/{serial}", state.master_addr);
    let _ = state.http.post(url).send().await;
}

async fn report_crashed(state: &ReplicaState, address: &str) {
    if let Some((ip, port)) = address.split_once(':') {
        let url = format!("http://{}/replicaCrashed/{ip}/{port}", state.master_addr);
        let _ = state.http.post(url).send().await;
    }
}
