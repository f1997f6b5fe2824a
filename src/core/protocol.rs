// src/core/protocol.rs

//! Wire types shared by the master and replica HTTP surfaces, matching the
//! JSON shapes spec.md §6 specifies (field names and string-literal
//! booleans mirror the original prototype's FastAPI responses so that the
//! existing UI client needs no changes).

use serde::{Deserialize, Serialize};
use std::fmt;

/// `(document_id, serial)` — identifies a single circulating token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenKey {
    pub doc_id: u64,
    pub serial: u64,
}

impl TokenKey {
    pub fn new(doc_id: u64, serial: u64) -> Self {
        Self { doc_id, serial }
    }

    pub fn next(self) -> Self {
        Self { doc_id: self.doc_id, serial: self.serial + 1 }
    }
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.doc_id, self.serial)
    }
}

/// Query parameters for `POST /addServer`.
#[derive(Debug, Deserialize)]
pub struct AddServerQuery {
    #[serde(rename = "IP")]
    pub ip: String,
    pub port: String,
}

/// Body of `POST /lostConnection`.
#[derive(Debug, Deserialize)]
pub struct LostConnectionRequest {
    #[serde(rename = "IP")]
    pub ip: String,
    #[serde(rename = "PORT")]
    pub port: String,
    #[serde(rename = "docID")]
    pub doc_id: u64,
}

/// Reply carrying a replica's address, used by every admission endpoint.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReplicaAddress {
    #[serde(rename = "IP")]
    pub ip: String,
    pub port: String,
}

/// Reply for `POST /createDocAndConnect`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateDocReply {
    #[serde(rename = "docID")]
    pub doc_id: u64,
    #[serde(rename = "docName")]
    pub doc_name: String,
    #[serde(rename = "IP")]
    pub ip: String,
    pub port: String,
}

/// Reply for `POST /newDocID/{name}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct NewDocIdReply {
    #[serde(rename = "docID")]
    pub doc_id: u64,
}

/// One row of `GET /docList`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DocListEntry {
    pub id: u64,
    pub name: String,
}

/// Reply for `POST /recvToken/{d}/{s}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct UsingReply {
    #[serde(rename = "Using")]
    pub using: BoolString,
}

/// Reply for `POST /replicaRecvToken/{d}/{s}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenValidityReply {
    #[serde(rename = "Token")]
    pub token: TokenValidity,
}

/// A boolean serialized as the string literals `"true"`/`"false"`, matching
/// the original prototype's `{"Using": "true"}` responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoolString(pub bool);

impl Serialize for BoolString {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(if self.0 { "true" } else { "false" })
    }
}

impl<'de> Deserialize<'de> for BoolString {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Ok(BoolString(s == "true"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenValidity {
    Valid,
    Invalid,
}

impl Serialize for TokenValidity {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(match self {
            TokenValidity::Valid => "valid",
            TokenValidity::Invalid => "invalid",
        })
    }
}

impl<'de> Deserialize<'de> for TokenValidity {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Ok(if s == "valid" { TokenValidity::Valid } else { TokenValidity::Invalid })
    }
}

/// Frame carried on the client edit channel while editing:
/// `{"content": "...", "ip": "..."}`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EditFrame {
    pub content: String,
    pub ip: String,
}

/// The sentinel payload that ends an edit session.
pub const STOP_EDITING: &str = "*** STOP EDITING ***";
/// The marker sent to a client the moment it gains edit permission.
pub const START_EDITING: &str = "*** START EDITING ***";

/// Frame carried on the peer propagation channel: `{"content": "..."}`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PeerUpdateFrame {
    pub content: String,
}

/// Body of `POST /updateServerList`: the ordered ring membership.
pub type ServerList = Vec<String>;
