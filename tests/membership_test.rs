// tests/membership_test.rs

//! End-to-end admission tests driven over real HTTP, one master and two
//! replicas each bound to an OS-assigned port, mirroring scenario S1 in
//! spec.md §8.

mod common;

use common::{spawn_master, spawn_replica};
use scriptorium::core::protocol::{CreateDocReply, DocListEntry};

#[tokio::test]
async fn creates_document_on_first_reachable_replica() {
    let master_addr = spawn_master().await;
    let (r1, _) = spawn_replica(&master_addr).await;
    let (_r2, _) = spawn_replica(&master_addr).await;

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

    assert_eq!(reply.doc_name, "notes");
    assert_eq!(reply.doc_id, 1);

    let docs: Vec<DocListEntry> = client.get(format!("http://{r1}/docList")).send().await.unwrap().json().await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].name, "notes");
}

#[tokio::test]
async fn lost_connection_reroutes_to_a_live_replica() {
    let master_addr = spawn_master().await;
    let (r1, _) = spawn_replica(&master_addr).await;
    let (r2, _) = spawn_replica(&master_addr).await;

    let client = reqwest::Client::new();
    let (dead_ip, dead_port) = r1.split_once(':').unwrap();
    let rerouted: scriptorium::core::protocol::ReplicaAddress = client
        .post(format!("http://{master_addr}/lostConnection"))
        .json(&serde_json::json!({ "IP": dead_ip, "PORT": dead_port, "docID": 1 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let rerouted_addr = format!("{}:{}", rerouted.ip, rerouted.port);
    assert_eq!(rerouted_addr, r2);
}

#[tokio::test]
async fn lost_connection_with_no_replicas_reports_explicit_error() {
    let master_addr = spawn_master().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{master_addr}/lostConnection"))
        .json(&serde_json::json!({ "IP": "127.0.0.1", "PORT": "9999", "docID": 1 }))
        .send()
        .await
        .unwrap();

    assert!(!resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body.get("Error").is_some());
}
