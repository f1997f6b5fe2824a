// tests/common/mod.rs

//! Shared harness for spinning up a real master and replicas bound to
//! OS-assigned ports, reused by the membership and edit-session tests.

use scriptorium::core::master::{self, MasterState};
use scriptorium::core::replica::{self, DocumentStore, ReplicaState};
use std::sync::Arc;
use std::time::Duration;

pub async fn spawn_master() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let state = MasterState::new(reqwest::Client::new());
    let router = master::http::router(state);
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    addr
}

pub async fn spawn_replica(master_addr: &str) -> (String, Arc<ReplicaState>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::open(dir.path().join("docs.json")).unwrap();
    let http = reqwest::Client::new();
    let state = ReplicaState::new(addr.clone(), master_addr.to_string(), http.clone(), store);

    let (ip, port) = addr.split_once(':').unwrap();
    http.post(format!("http://{master_addr}/addServer?IP={ip}&port={port}")).send().await.unwrap().error_for_status().unwrap();

    let router = replica::http::router(Arc::clone(&state));
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    tokio::time::sleep(Duration::from_millis(100)).await;
    (addr, state)
}

/// Waits until `state`'s ring view has grown to `expected` entries, to
/// avoid racing the master's best-effort `updateServerList` broadcast.
pub async fn wait_for_ring_size(state: &ReplicaState, expected: usize) {
    for _ in 0..50 {
        if state.ring_size() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("ring never reached size {expected}, stuck at {}", state.ring_size());
}
