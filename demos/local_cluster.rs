// demos/local_cluster.rs

//! Launches a master and two replicas in one process on loopback ports,
//! creates a document, and prints the token's first few hops around the
//! ring. A manual walkthrough of scenario S1 in spec.md §8, useful for
//! poking at the cluster by hand without juggling three terminals.

use scriptorium::core::master::{self, MasterState};
use scriptorium::core::protocol::CreateDocReply;
use scriptorium::core::replica::{self, DocumentStore, ReplicaState};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").compact().with_ansi(true).init();

    let master_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let master_addr = master_listener.local_addr()?.to_string();
    let master_state = MasterState::new(reqwest::Client::new());
    let master_router = master::http::router(master_state);
    tokio::spawn(async move { axum::serve(master_listener, master_router).await.unwrap() });
    info!(%master_addr, "master listening");

    let mut replicas = Vec::new();
    for _ in 0..2 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?.to_string();
        let store = DocumentStore::open(format!("/tmp/scriptorium_demo_{}.json", addr.replace(':', "_")))?;
        let http = reqwest::Client::new();
        let state = ReplicaState::new(addr.clone(), master_addr.clone(), http.clone(), store);

        let (ip, port) = addr.split_once(':').unwrap();
        http.post(format!("http://{master_addr}/addServer?IP={ip}&port={port}")).send().await?.error_for_status()?;

        let replica_router = replica::http::router(Arc::clone(&state));
        tokio::spawn(async move { axum::serve(listener, replica_router).await.unwrap() });
        info!(%addr, "replica listening");
        replicas.push(addr);
    }

    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = reqwest::Client::new();
    let reply: CreateDocReply = client
        .post(format!("http://{master_addr}/createDocAndConnect"))
        .json(&"demo-notes".to_string())
        .send()
        .await?
        .json()
        .await?;
    info!(?reply, "document created, token now circulating");

    println!("master:   http://{master_addr}");
    for addr in &replicas {
        println!("replica:  http://{addr}");
    }
    println!("document: id={} name={} home={}:{}", reply.doc_id, reply.doc_name, reply.ip, reply.port);
    println!("connect a client to: ws://{}:{}/ws/{}/{}/false", reply.ip, reply.port, reply.doc_id, reply.doc_name);

    tokio::signal::ctrl_c().await?;
    Ok(())
}
