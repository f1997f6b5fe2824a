// src/core/errors.rs

//! Error types for the master and replica roles.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the master's HTTP handlers.
#[derive(Error, Debug)]
pub enum MasterError {
    #[error("port '{0}' is not a valid positive integer")]
    BadPort(String),

    #[error("no servers online to connect too")]
    NoServersOnline,

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("malformed request body: {0}")]
    BadRequest(String),
}

impl From<reqwest::Error> for MasterError {
    fn from(e: reqwest::Error) -> Self {
        MasterError::HttpClient(e.to_string())
    }
}

impl From<serde_json::Error> for MasterError {
    fn from(e: serde_json::Error) -> Self {
        MasterError::BadRequest(e.to_string())
    }
}

impl IntoResponse for MasterError {
    fn into_response(self) -> Response {
        // The original prototype's only client-visible failure body is
        // `{"Error": "..."}`; every master error is reported the same way.
        let status = match self {
            MasterError::BadPort(_) | MasterError::BadRequest(_) => StatusCode::BAD_REQUEST,
            MasterError::NoServersOnline => StatusCode::SERVICE_UNAVAILABLE,
            MasterError::HttpClient(_) => StatusCode::BAD_GATEWAY,
        };
        (status, axum::Json(json!({ "Error": self.to_string() }))).into_response()
    }
}

/// Errors surfaced by a replica's HTTP and WebSocket handlers.
#[derive(Error, Debug)]
pub enum ReplicaError {
    #[error("document {0} not found")]
    DocumentNotFound(u64),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error("no live successor in ring")]
    RingEmpty,
}

impl From<reqwest::Error> for ReplicaError {
    fn from(e: reqwest::Error) -> Self {
        ReplicaError::HttpClient(e.to_string())
    }
}

impl From<std::io::Error> for ReplicaError {
    fn from(e: std::io::Error) -> Self {
        ReplicaError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for ReplicaError {
    fn from(e: serde_json::Error) -> Self {
        ReplicaError::BadRequest(e.to_string())
    }
}

impl IntoResponse for ReplicaError {
    fn into_response(self) -> Response {
        let status = match self {
            ReplicaError::DocumentNotFound(_) => StatusCode::NOT_FOUND,
            ReplicaError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ReplicaError::HttpClient(_) | ReplicaError::RingEmpty => StatusCode::BAD_GATEWAY,
            ReplicaError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, axum::Json(json!({ "Error": self.to_string() }))).into_response()
    }
}
