// src/main.rs

//! Entry point. Dispatches between the two process roles spec.md §6
//! describes, mirroring the original prototype's split into a master
//! server and a replica server (`examples/original_source/backend/master/server.py`,
//! `examples/original_source/backend/replica/server.py`).

use anyhow::Result;
use scriptorium::config::{MasterConfig, ReplicaConfig};
use scriptorium::core::master::{self, MasterState};
use scriptorium::core::replica::{self, DocumentStore, ReplicaState};
use std::env;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(log_level).compact().with_ansi(true).init();

    let role = args.get(1).map(String::as_str);
    let result = match role {
        Some("master") => run_master().await,
        Some("replica") => run_replica().await,
        _ => {
            eprintln!("Usage: scriptorium <master|replica>");
            eprintln!("  master:  requires IP");
            eprintln!("  replica: requires IP, PORT, MASTER_IP");
            std::process::exit(1);
        }
    };

    if let Err(e) = &result {
        error!("runtime error: {e}");
    }
    result
}

async fn run_master() -> Result<()> {
    let config = MasterConfig::from_env()?;
    info!(%config.addr, "starting master");
    let state = MasterState::new(reqwest::Client::new());
    master::http::run(config.addr, state).await
}

async fn run_replica() -> Result<()> {
    let config = ReplicaConfig::from_env()?;
    info!(%config.addr, master = %config.master_addr, "starting replica");
    let store = DocumentStore::open(config.store_path())?;
    let http = reqwest::Client::new();
    let state = ReplicaState::new(config.addr.to_string(), config.master_addr.to_string(), http, store);
    replica::http::run(config.addr, state).await
}
