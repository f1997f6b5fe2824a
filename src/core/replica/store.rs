// src/core/replica/store.rs

//! The per-replica document store: `get`, `create`, `create_with_id`,
//! `update`, `list`, matching the interface spec.md §1 fixes without
//! mandating an implementation. The original prototype backs this with a
//! SQLite file per replica port
//! (`examples/original_source/backend/replica/db.py`); this keeps the
//! on-disk, one-file-per-port shape but snapshots an in-memory map to JSON
//! on every mutation rather than pulling in a SQL engine for something
//! spec.md explicitly scopes as interface-only (see DESIGN.md).

use crate::core::errors::ReplicaError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: u64,
    pub name: String,
    pub content: String,
}

#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
    documents: Vec<DocumentRecord>,
}

pub struct DocumentStore {
    path: PathBuf,
    documents: RwLock<HashMap<u64, DocumentRecord>>,
    next_id: AtomicU64,
}

impl DocumentStore {
    /// Loads an existing snapshot from `path`, or starts empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReplicaError> {
        let path = path.as_ref().to_path_buf();
        let documents = if path.exists() {
            let bytes = std::fs::read(&path)?;
            let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
            snapshot.documents.into_iter().map(|d| (d.id, d)).collect()
        } else {
            HashMap::new()
        };
        let next_id = documents.keys().copied().max().map(|m| m + 1).unwrap_or(1);
        Ok(Self { path, documents: RwLock::new(documents), next_id: AtomicU64::new(next_id) })
    }

    pub fn get(&self, id: u64) -> Option<DocumentRecord> {
        self.documents.read().get(&id).cloned()
    }

    pub fn list(&self) -> Vec<DocumentRecord> {
        self.documents.read().values().cloned().collect()
    }

    /// Assigns the next free id and persists an empty document.
    pub fn create(&self, name: String) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.documents.write().insert(id, DocumentRecord { id, name, content: String::new() });
        self.persist();
        id
    }

    /// Creates a document at a caller-supplied id, used both for peer
    /// replication of a newly created document and for the placeholder-row
    /// recovery path in spec.md §7 ("Edit request for a document whose
    /// entry is missing locally").
    pub fn create_with_id(&self, id: u64, name: String) {
        let mut documents = self.documents.write();
        documents.entry(id).or_insert(DocumentRecord { id, name, content: String::new() });
        let bump = id + 1;
        self.next_id.fetch_max(bump, Ordering::SeqCst);
        drop(documents);
        self.persist();
    }

    pub fn update(&self, id: u64, content: String) -> Result<DocumentRecord, ReplicaError> {
        let mut documents = self.documents.write();
        let doc = documents.get_mut(&id).ok_or(ReplicaError::DocumentNotFound(id))?;
        doc.content = content;
        let result = doc.clone();
        drop(documents);
        self.persist();
        Ok(result)
    }

    fn persist(&self) {
        let documents: Vec<DocumentRecord> = self.documents.read().values().cloned().collect();
        let snapshot = Snapshot { documents };
        match serde_json::to_vec_pretty(&snapshot) {
            Ok(bytes) => {
                let tmp = self.path.with_extension("tmp");
                if let Err(e) = std::fs::write(&tmp, &bytes).and_then(|_| std::fs::rename(&tmp, &self.path)) {
                    warn!(path = %self.path.display(), error = %e, "failed to persist document snapshot");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize document snapshot"),
        }
    }
}
