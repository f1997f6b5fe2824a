// src/core/master/state.rs

//! The master's coordinating state: cluster membership, the leader index,
//! and the live-token registry with its liveness timers. All of it is
//! soft state (spec.md §1 non-goal: "persistent state on the master") and
//! lives behind one coarse lock, mirroring spec.md §5's "Shared state" note
//! and the teacher's `GlobalWardenState`/`MasterState` split between
//! process-wide identity and mutex-guarded state
//! (`examples/spineldb-spineldb/src/core/warden/state.rs`).

use super::timer::TimerHandle;
use crate::core::errors::MasterError;
use crate::core::metrics;
use crate::core::protocol::{CreateDocReply, DocListEntry, NewDocIdReply, ReplicaAddress, TokenKey, TokenValidity};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// A replica as known to the master.
#[derive(Debug, Clone)]
pub struct ReplicaDescriptor {
    pub address: String,
    pub clients_online: u64,
}

struct TokenEntry {
    serial: u64,
    handle: Arc<TimerHandle>,
}

struct Inner {
    members: Vec<ReplicaDescriptor>,
    leader_index: usize,
    tokens: HashMap<u64, TokenEntry>,
    tokens_not_initialized: bool,
}

pub struct MasterState {
    http: reqwest::Client,
    inner: Mutex<Inner>,
}

impl MasterState {
    pub fn new(http: reqwest::Client) -> Arc<Self> {
        Arc::new(Self {
            http,
            inner: Mutex::new(Inner {
                members: Vec::new(),
                leader_index: 0,
                tokens: HashMap::new(),
                tokens_not_initialized: true,
            }),
        })
    }

    pub fn membership_size(&self) -> usize {
        self.inner.lock().members.len()
    }

    pub fn token_registry_size(&self) -> usize {
        self.inner.lock().tokens.len()
    }

    fn leader_address(&self) -> Option<String> {
        let inner = self.inner.lock();
        inner.members.get(inner.leader_index).map(|m| m.address.clone())
    }

    fn pick_min_load_and_increment(&self) -> Option<String> {
        let mut inner = self.inner.lock();
        let idx = (0..inner.members.len()).min_by_key(|&i| inner.members[i].clients_online)?;
        inner.members[idx].clients_online += 1;
        Some(inner.members[idx].address.clone())
    }

    // --- 4.1 membership and leader election ---

    /// Rejects a non-numeric port without mutating membership
    /// (spec.md §4.1, §7).
    pub async fn join(self: &Arc<Self>, ip: String, port: String) -> Result<(), MasterError> {
        let port_num: u16 = port.parse().map_err(|_| MasterError::BadPort(port.clone()))?;
        let address = format!("{ip}:{port_num}");
        {
            let mut inner = self.inner.lock();
            if !inner.members.iter().any(|m| m.address == address) {
                inner.members.push(ReplicaDescriptor { address: address.clone(), clients_online: 0 });
            }
            recompute_leader(&mut inner);
        }
        info!(%address, "replica joined cluster");
        metrics::MEMBERSHIP_SIZE.set(self.membership_size() as f64);

        let state = Arc::clone(self);
        tokio::spawn(async move { state.broadcast_servers().await });
        Ok(())
    }

    /// Idempotent removal from membership with leader recomputation
    /// (spec.md §4.1, §8 property 6).
    pub async fn replica_crashed(&self, address: &str) {
        let mut inner = self.inner.lock();
        if let Some(pos) = inner.members.iter().position(|m| m.address == address) {
            inner.members.remove(pos);
            recompute_leader(&mut inner);
            warn!(%address, "removed crashed replica from membership");
        }
    }

    pub fn increment_load(&self, address: &str) {
        let mut inner = self.inner.lock();
        if let Some(m) = inner.members.iter_mut().find(|m| m.address == address) {
            m.clients_online += 1;
        }
    }

    pub fn decrement_load(&self, address: &str) {
        let mut inner = self.inner.lock();
        if let Some(m) = inner.members.iter_mut().find(|m| m.address == address) {
            m.clients_online = m.clients_online.saturating_sub(1);
        }
    }

    /// Best-effort fan-out of the current membership list to every replica;
    /// a replica that fails to receive it is treated as crashed and
    /// dropped, then broadcasting continues (spec.md §4.1). Also fires
    /// one-time token bootstrap the first time any replica has been seen.
    async fn broadcast_servers(self: Arc<Self>) {
        let server_list: Vec<String> = {
            let inner = self.inner.lock();
            inner.members.iter().map(|m| m.address.clone()).collect()
        };
        info!(count = server_list.len(), "broadcasting membership list");
        for server in &server_list {
            let url = format!("http://{server}/updateServerList");
            if self.http.post(url).json(&server_list).send().await.and_then(|r| r.error_for_status()).is_err() {
                warn!(%server, "failed to broadcast membership, treating as crashed");
                self.replica_crashed(server).await;
            }
        }

        let should_bootstrap = {
            let mut inner = self.inner.lock();
            if inner.tokens_not_initialized {
                inner.tokens_not_initialized = false;
                true
            } else {
                false
            }
        };
        if should_bootstrap {
            self.bootstrap_tokens().await;
        }
    }

    // --- 4.2 token registry and liveness ---

    async fn bootstrap_tokens(self: &Arc<Self>) {
        let Some(leader) = self.leader_address() else { return };
        let docs: Vec<DocListEntry> = match self.http.get(format!("http://{leader}/docList")).send().await {
            Ok(resp) => resp.json().await.unwrap_or_default(),
            Err(_) => {
                self.replica_crashed(&leader).await;
                Vec::new()
            }
        };
        info!(count = docs.len(), "bootstrapping tokens for existing documents");
        for doc in docs {
            self.start_new_token(doc.id, 1).await;
        }

        loop {
            let Some(leader) = self.leader_address() else { break };
            let url = format!("http://{leader}/initializeTokens");
            match self.http.post(url).send().await.and_then(|r| r.error_for_status()) {
                Ok(_) => break,
                Err(_) => self.replica_crashed(&leader).await,
            }
        }
    }

    /// Called from the `create_doc` path for a document created after
    /// bootstrap (spec.md §4.2).
    pub async fn on_token_initialized_for_new_doc(self: &Arc<Self>, doc_id: u64) {
        self.initialize_token_and_circulate(doc_id, 1).await;
    }

    async fn initialize_token_and_circulate(self: &Arc<Self>, doc_id: u64, serial: u64) {
        self.start_new_token(doc_id, serial).await;
        loop {
            let Some(leader) = self.leader_address() else { break };
            let url = format!("http://{leader}/initializeToken/{doc_id}/{serial}");
            match self.http.post(url).send().await.and_then(|r| r.error_for_status()) {
                Ok(_) => break,
                Err(_) => self.replica_crashed(&leader).await,
            }
        }
    }

    async fn start_new_token(self: &Arc<Self>, doc_id: u64, serial: u64) {
        let handle = TimerHandle::new();
        {
            let mut inner = self.inner.lock();
            inner.tokens.insert(doc_id, TokenEntry { serial, handle: Arc::clone(&handle) });
        }
        handle.arm(Arc::clone(self), TokenKey::new(doc_id, serial));
        metrics::TOKEN_REGISTRY_SIZE.set(self.token_registry_size() as f64);
    }

    /// The key primitive that silences zombie tokens: a replica must ask
    /// before using or forwarding a token (spec.md §4.2, §4.5).
    pub fn replica_received(self: &Arc<Self>, doc_id: u64, serial: u64) -> TokenValidity {
        let handle = {
            let inner = self.inner.lock();
            inner.tokens.get(&doc_id).filter(|e| e.serial == serial).map(|e| Arc::clone(&e.handle))
        };
        match handle {
            Some(handle) => {
                handle.reset(Arc::clone(self), TokenKey::new(doc_id, serial));
                TokenValidity::Valid
            }
            None => TokenValidity::Invalid,
        }
    }

    /// Pauses the liveness timer while a client holds the token.
    pub fn token_in_use(&self, doc_id: u64, serial: u64) {
        let inner = self.inner.lock();
        if let Some(entry) = inner.tokens.get(&doc_id) {
            if entry.serial == serial {
                entry.handle.cancel();
            }
        }
    }

    /// Timer fired: the holder is presumed crashed. Reissue at `serial + 1`
    /// and hand the new token to the leader for circulation (spec.md
    /// §4.2). Retries against successive leaders until one accepts or the
    /// cluster is empty.
    pub async fn token_timeout(self: &Arc<Self>, key: TokenKey) {
        let still_current = {
            let mut inner = self.inner.lock();
            match inner.tokens.get(&key.doc_id) {
                Some(entry) if entry.serial == key.serial => {
                    inner.tokens.remove(&key.doc_id);
                    true
                }
                _ => false,
            }
        };
        if !still_current {
            return;
        }
        warn!(%key, "token timed out, reissuing");
        let next = key.next();
        self.initialize_token_and_circulate(next.doc_id, next.serial).await;
    }

    // --- 4.3 admission and rerouting ---

    pub async fn create_doc_and_connect(self: &Arc<Self>, name: String) -> Result<CreateDocReply, MasterError> {
        let doc_id = loop {
            let candidate = {
                let inner = self.inner.lock();
                inner.members.first().map(|m| m.address.clone())
            };
            let Some(candidate) = candidate else { return Err(MasterError::NoServersOnline) };
            let url = format!("http://{candidate}/newDocID/{name}");
            let created = match self.http.post(url).send().await {
                Ok(resp) => match resp.error_for_status() {
                    Ok(resp) => resp.json::<NewDocIdReply>().await.ok(),
                    Err(_) => None,
                },
                Err(_) => None,
            };
            match created {
                Some(body) => break body.doc_id,
                None => self.replica_crashed(&candidate).await,
            }
        };

        let address = self.pick_min_load_and_increment().ok_or(MasterError::NoServersOnline)?;
        self.initialize_token_and_circulate(doc_id, 1).await;

        let (ip, port) = split_address(&address);
        Ok(CreateDocReply { doc_id, doc_name: name, ip, port })
    }

    pub fn connect_existing(&self) -> Result<ReplicaAddress, MasterError> {
        let address = self.pick_min_load_and_increment().ok_or(MasterError::NoServersOnline)?;
        let (ip, port) = split_address(&address);
        Ok(ReplicaAddress { ip, port })
    }

    pub async fn lost_connection(&self, crashed_ip: &str, crashed_port: &str) -> Result<ReplicaAddress, MasterError> {
        let crashed_address = format!("{crashed_ip}:{crashed_port}");
        self.replica_crashed(&crashed_address).await;
        let address = self.pick_min_load_and_increment().ok_or(MasterError::NoServersOnline)?;
        let (ip, port) = split_address(&address);
        Ok(ReplicaAddress { ip, port })
    }

    pub fn lost_client(&self, ip: &str, port: &str) {
        self.decrement_load(&format!("{ip}:{port}"));
    }

    pub async fn doc_list(self: &Arc<Self>) -> Result<Vec<DocListEntry>, MasterError> {
        loop {
            let Some(leader) = self.leader_address() else { return Err(MasterError::NoServersOnline) };
            match self.http.get(format!("http://{leader}/docList")).send().await {
                Ok(resp) => match resp.error_for_status() {
                    Ok(resp) => return Ok(resp.json().await.unwrap_or_default()),
                    Err(_) => self.replica_crashed(&leader).await,
                },
                Err(_) => self.replica_crashed(&leader).await,
            }
        }
    }
}

fn recompute_leader(inner: &mut Inner) {
    inner.leader_index = inner
        .members
        .iter()
        .enumerate()
        .min_by_key(|(_, m)| port_of(&m.address).unwrap_or(u16::MAX))
        .map(|(i, _)| i)
        .unwrap_or(0);
    if let Some(leader) = inner.members.get(inner.leader_index) {
        info!(leader = %leader.address, "leader recomputed");
    }
}

fn port_of(address: &str) -> Option<u16> {
    address.rsplit(':').next()?.parse().ok()
}

fn split_address(address: &str) -> (String, String) {
    match address.rsplit_once(':') {
        Some((ip, port)) => (ip.to_string(), port.to_string()),
        None => (address.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(addrs: &[&str]) -> Vec<ReplicaDescriptor> {
        addrs.iter().map(|a| ReplicaDescriptor { address: a.to_string(), clients_online: 0 }).collect()
    }

    #[test]
    fn leader_is_lowest_port() {
        let mut inner = Inner {
            members: members(&["10.0.0.1:8002", "10.0.0.1:8000", "10.0.0.1:8001"]),
            leader_index: 0,
            tokens: HashMap::new(),
            tokens_not_initialized: true,
        };
        recompute_leader(&mut inner);
        assert_eq!(inner.members[inner.leader_index].address, "10.0.0.1:8000");
    }

    #[test]
    fn leader_recompute_on_empty_membership_does_not_panic() {
        let mut inner = Inner { members: Vec::new(), leader_index: 5, tokens: HashMap::new(), tokens_not_initialized: true };
        recompute_leader(&mut inner);
        assert_eq!(inner.leader_index, 0);
    }

    #[test]
    fn split_address_roundtrips() {
        assert_eq!(split_address("127.0.0.1:9000"), ("127.0.0.1".to_string(), "9000".to_string()));
    }

    #[tokio::test]
    async fn replica_received_invalid_for_unknown_token() {
        let state = MasterState::new(reqwest::Client::new());
        assert_eq!(state.replica_received(1, 1), TokenValidity::Invalid);
    }

    #[tokio::test]
    async fn join_rejects_non_numeric_port() {
        let state = MasterState::new(reqwest::Client::new());
        let err = state.join("127.0.0.1".to_string(), "not-a-port".to_string()).await;
        assert!(err.is_err());
        assert_eq!(state.membership_size(), 0);
    }

    /// `tokenInUse` then `replicaRecvToken` must leave the entry valid and
    /// in place (spec.md §8 property 8). A missed reset would let the
    /// timeout race ahead of the next real use instead of restarting at
    /// full duration.
    #[tokio::test]
    async fn token_in_use_then_received_keeps_the_entry_valid() {
        let state = MasterState::new(reqwest::Client::new());
        state.join("127.0.0.1".to_string(), "9100".to_string()).await.unwrap();
        state.on_token_initialized_for_new_doc(7).await;

        state.token_in_use(7, 1);
        assert_eq!(state.replica_received(7, 1), TokenValidity::Valid);
        assert_eq!(state.token_registry_size(), 1);
    }
}
