// tests/edit_session_test.rs

//! Drives a real client edit session over WebSocket against a live
//! master + two replicas: queueing for permission, editing, peer
//! propagation, and release. Mirrors scenario S2 in spec.md §8.

mod common;

use common::{spawn_master, spawn_replica, wait_for_ring_size};
use futures::{SinkExt, StreamExt};
use scriptorium::core::protocol::{CreateDocReply, EditFrame, START_EDITING, STOP_EDITING};
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn client_gains_permission_edits_and_propagates_to_peer() {
    let master_addr = spawn_master().await;
    let (r1, state1) = spawn_replica(&master_addr).await;
    let (r2, state2) = spawn_replica(&master_addr).await;
    wait_for_ring_size(&state1, 2).await;
    wait_for_ring_size(&state2, 2).await;

    let client = reqwest::Client::new();
    let reply: CreateDocReply = client
        .post(format!("http://{master_addr}/createDocAndConnect"))
        .json(&"notes".to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let home = format!("{}:{}", reply.ip, reply.port);
    let (home_state, peer_state) = if home == r1 { (&state1, &state2) } else { (&state2, &state1) };

    let url = format!("ws://{home}/ws/{}/{}/false", reply.doc_id, reply.doc_name);
    let (mut ws, _) = connect_async(&url).await.unwrap();

    // initial frame is the current (empty) document content.
    let initial = ws.next().await.unwrap().unwrap();
    assert_eq!(initial.into_text().unwrap(), "");

    // any message requests edit permission; contents are ignored.
    ws.send(Message::Text("request edit".into())).await.unwrap();

    // the token must circulate to the home replica before permission is
    // granted; HOP_SLEEP paces each ring hop at ~2s.
    let granted = tokio::time::timeout(Duration::from_secs(10), ws.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(granted.into_text().unwrap(), START_EDITING);

    let edit = EditFrame { content: "hello".to_string(), ip: "test-client".to_string() };
    ws.send(Message::Text(serde_json::to_string(&edit).unwrap().into())).await.unwrap();

    for _ in 0..30 {
        if home_state.store.get(reply.doc_id).map(|d| d.content).as_deref() == Some("hello") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(home_state.store.get(reply.doc_id).map(|d| d.content), Some("hello".to_string()));

    // peer propagation is asynchronous; give it a little longer.
    for _ in 0..30 {
        if peer_state.store.get(reply.doc_id).map(|d| d.content).as_deref() == Some("hello") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(peer_state.store.get(reply.doc_id).map(|d| d.content), Some("hello".to_string()));

    let stop = EditFrame { content: STOP_EDITING.to_string(), ip: "test-client".to_string() };
    ws.send(Message::Text(serde_json::to_string(&stop).unwrap().into())).await.unwrap();
}

#[tokio::test]
async fn reconnecting_with_edit_perm_flag_bypasses_the_queue() {
    let master_addr = spawn_master().await;
    let (r1, _state1) = spawn_replica(&master_addr).await;

    let client = reqwest::Client::new();
    let reply: CreateDocReply = client
        .post(format!("http://{master_addr}/createDocAndConnect"))
        .json(&"notes".to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let url = format!("ws://{r1}/ws/{}/{}/true", reply.doc_id, reply.doc_name);
    let (mut ws, _) = connect_async(&url).await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(2), ws.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(first.into_text().unwrap(), START_EDITING);
}
