// src/core/replica/state.rs

//! A replica's view of the ring, its per-document edit-waiter queues, and
//! the handle bundle passed through every HTTP and WebSocket handler.
//!
//! The ring is guarded by one exclusive lock (`succ_lock` in the original
//! prototype) so that a crash-driven pop and a master-driven replacement
//! never interleave (spec.md §4.4), following the same
//! single-mutex-over-a-small-struct shape the teacher uses for
//! `ClusterState`'s mutable views
//! (`examples/spineldb-spineldb/src/core/cluster/state.rs`).

use super::store::DocumentStore;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Notify, broadcast};

/// A client session waiting for, or currently holding, edit permission on
/// one document at this replica.
pub struct EditWaiter {
    pub notify: Notify,
    pub granted: AtomicBool,
    /// The token serial this session is using, meaningful only once
    /// `granted` is true (spec.md §3 "Session").
    pub serial: AtomicU64,
}

impl EditWaiter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { notify: Notify::new(), granted: AtomicBool::new(false), serial: AtomicU64::new(0) })
    }

    pub fn grant(&self, serial: u64) {
        self.serial.store(serial, Ordering::SeqCst);
        self.granted.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub async fn wait_for_permission(&self) {
        while !self.granted.load(Ordering::SeqCst) {
            self.notify.notified().await;
        }
    }
}

struct RingState {
    list: Vec<String>,
    successor: usize,
}

pub struct ReplicaState {
    pub address: String,
    pub master_addr: String,
    pub http: reqwest::Client,
    pub store: DocumentStore,
    ring: Mutex<RingState>,
    queues: Mutex<HashMap<u64, VecDeque<Arc<EditWaiter>>>>,
    local_broadcasts: DashMap<u64, broadcast::Sender<String>>,
    pub websocket_sessions: AtomicU64,
}

impl ReplicaState {
    pub fn new(address: String, master_addr: String, http: reqwest::Client, store: DocumentStore) -> Arc<Self> {
        Arc::new(Self {
            address,
            master_addr,
            http,
            store,
            ring: Mutex::new(RingState { list: Vec::new(), successor: 0 }),
            queues: Mutex::new(HashMap::new()),
            local_broadcasts: DashMap::new(),
            websocket_sessions: AtomicU64::new(0),
        })
    }

    /// The per-document fan-out channel used to relay edits to every local
    /// viewer session (spec.md §4.6 point 4: "broadcast the new content to
    /// all local sessions attached to this document").
    pub fn broadcast_channel(&self, doc_id: u64) -> broadcast::Sender<String> {
        self.local_broadcasts.entry(doc_id).or_insert_with(|| broadcast::channel(32).0).clone()
    }

    pub fn ring_size(&self) -> usize {
        self.ring.lock().list.len()
    }

    /// Replaces the local ring view and recomputes this replica's
    /// successor index (spec.md §4.4).
    pub fn update_ring(&self, list: Vec<String>) {
        let mut ring = self.ring.lock();
        let own_index = list.iter().position(|a| a == &self.address);
        ring.successor = match own_index {
            Some(i) if !list.is_empty() => (i + 1) % list.len(),
            _ => 0,
        };
        ring.list = list;
    }

    /// All other replicas currently in the ring, for peer content
    /// propagation (spec.md §4.6).
    pub fn peers(&self) -> Vec<String> {
        let ring = self.ring.lock();
        ring.list.iter().filter(|a| *a != &self.address).cloned().collect()
    }

    pub fn current_successor(&self) -> Option<String> {
        let ring = self.ring.lock();
        ring.list.get(ring.successor).cloned()
    }

    /// Drops `address` from the ring if present and recomputes the
    /// successor index, used when a hop to a peer fails (spec.md §4.4,
    /// §4.5).
    pub fn remove_peer(&self, address: &str) {
        let mut ring = self.ring.lock();
        if let Some(pos) = ring.list.iter().position(|a| a == address) {
            ring.list.remove(pos);
            let own_index = ring.list.iter().position(|a| a == &self.address);
            ring.successor = match own_index {
                Some(i) if !ring.list.is_empty() => (i + 1) % ring.list.len(),
                _ => 0,
            };
        }
    }

    /// Appends a waiter to the document's FIFO queue.
    pub fn enqueue(&self, doc_id: u64, waiter: Arc<EditWaiter>) {
        self.queues.lock().entry(doc_id).or_default().push_back(waiter);
        crate::core::metrics::WAITER_QUEUE_DEPTH
            .with_label_values(&[&doc_id.to_string()])
            .set(self.queue_depth(doc_id) as f64);
    }

    /// Pops the head waiter for a document, if any are queued.
    pub fn dequeue(&self, doc_id: u64) -> Option<Arc<EditWaiter>> {
        let waiter = self.queues.lock().get_mut(&doc_id).and_then(|q| q.pop_front());
        crate::core::metrics::WAITER_QUEUE_DEPTH
            .with_label_values(&[&doc_id.to_string()])
            .set(self.queue_depth(doc_id) as f64);
        waiter
    }

    pub fn queue_depth(&self, doc_id: u64) -> usize {
        self.queues.lock().get(&doc_id).map(|q| q.len()).unwrap_or(0)
    }
}
