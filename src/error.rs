//! Per-request fault records.
//!
//! # Responsibilities
//! - Carry status, message, diagnostic state and a captured stack for any
//!   fault raised by a stage or a mounted handler
//! - Classify faults as client (4xx) or server (5xx) at construction
//! - Hand the record to the error chain via response extensions
//!
//! # Design Decisions
//! - `IntoResponse` only sets the status and stashes the record; the render
//!   stage of the error chain owns the final body
//! - Missing or out-of-range statuses are normalized to 500

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::backtrace::Backtrace;

/// Fault classification.
///
/// Client-fault messages are safe to surface verbatim; server-fault messages
/// are replaced by a generic message outside debug contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    ClientFault,
    ServerFault,
}

/// A fault raised by a pipeline stage or a mounted handler.
///
/// Created once, consumed exactly once by the error chain, never retained
/// after the response is sent.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub kind: FaultKind,
    pub status: StatusCode,
    pub message: String,
    /// Arbitrary diagnostic payload attached at the fault site.
    pub state: Option<serde_json::Value>,
    /// Captured stack trace, rendered to text at construction.
    pub stack: String,
}

impl ApiError {
    /// A fault with an explicit status, classified by the status code.
    /// Statuses below 400 are normalized to 500.
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        let status = StatusCode::from_u16(status)
            .ok()
            .filter(|s| s.as_u16() >= 400)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let kind = if status.as_u16() >= 500 {
            FaultKind::ServerFault
        } else {
            FaultKind::ClientFault
        };
        Self {
            kind,
            status,
            message: message.into(),
            state: None,
            stack: Backtrace::capture().to_string(),
        }
    }

    /// A client fault (4xx); the message is surfaced to the caller.
    pub fn client(status: StatusCode, message: impl Into<String>) -> Self {
        Self::with_status(status.as_u16(), message)
    }

    /// A server fault; always status 500.
    pub fn server(message: impl Into<String>) -> Self {
        Self::with_status(500, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_status(404, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_status(400, message)
    }

    /// Attach a diagnostic payload to the record.
    pub fn state(mut self, state: serde_json::Value) -> Self {
        self.state = Some(state);
        self
    }

    /// The record as a serializable diagnostic object (the `trace` field of
    /// the debug error body).
    pub fn trace(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": self.kind,
            "status": self.status.as_u16(),
            "message": self.message,
            "state": self.state,
        })
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = self.status;
        response.extensions_mut().insert(self);
        response
    }
}
