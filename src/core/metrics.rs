// src/core/metrics.rs

//! Prometheus metrics exposed by both roles on `GET /metrics`.

use once_cell::sync::Lazy;
use prometheus::{Gauge, GaugeVec, TextEncoder, register_gauge, register_gauge_vec};

pub static MEMBERSHIP_SIZE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("scriptorium_membership_size", "Number of replicas currently in the cluster.").unwrap()
});

pub static TOKEN_REGISTRY_SIZE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("scriptorium_token_registry_size", "Number of live tokens tracked by the master.").unwrap()
});

pub static WEBSOCKET_SESSIONS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("scriptorium_websocket_sessions", "Number of active client WebSocket sessions on this replica.").unwrap()
});

pub static WAITER_QUEUE_DEPTH: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "scriptorium_waiter_queue_depth",
        "Number of sessions waiting for edit permission, per document.",
        &["document_id"]
    )
    .unwrap()
});

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}
