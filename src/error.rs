//! Typed errors for the memory store and the request protocol.
//!
//! Most plumbing in this crate returns [`anyhow::Result`]. The enums here
//! cover the failures callers need to match on: a second session start,
//! persistence failures, and protocol-level errors that map onto a
//! machine-readable code and HTTP status.

use axum::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by [`MemoryStore`](crate::store::MemoryStore).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("session {0} is already active; end it before starting another")]
    SessionAlreadyActive(String),

    #[error("failed to persist memory document to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to import {path}: {reason}")]
    Import { path: PathBuf, reason: String },

    #[error("invalid cleanup age: {0} days")]
    InvalidAge(i64),

    #[error("failed to serialize memory document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failures surfaced through the request/response envelope.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed request: {0}")]
    Parse(String),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("unknown prompt: {0}")]
    UnknownPrompt(String),

    #[error("{0}")]
    InvalidParams(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProtocolError {
    /// Machine-readable error code carried in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::Parse(_) => "parse_error",
            ProtocolError::UnknownMethod(_) => "method_not_found",
            ProtocolError::UnknownResource(_) | ProtocolError::UnknownPrompt(_) => "not_found",
            ProtocolError::InvalidParams(_) => "bad_request",
            ProtocolError::Internal(_) => "internal",
        }
    }

    /// HTTP status used when the error crosses the HTTP transport.
    pub fn status(&self) -> StatusCode {
        match self {
            ProtocolError::Parse(_) | ProtocolError::InvalidParams(_) => StatusCode::BAD_REQUEST,
            ProtocolError::UnknownMethod(_)
            | ProtocolError::UnknownResource(_)
            | ProtocolError::UnknownPrompt(_) => StatusCode::NOT_FOUND,
            ProtocolError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for ProtocolError {
    fn from(err: anyhow::Error) -> Self {
        ProtocolError::Internal(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_map_to_codes_and_statuses() {
        let err = ProtocolError::UnknownMethod("bogus".into());
        assert_eq!(err.code(), "method_not_found");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "unknown method: bogus");

        let err = ProtocolError::Parse("expected value".into());
        assert_eq!(err.code(), "parse_error");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn anyhow_errors_become_internal() {
        let err: ProtocolError = anyhow::anyhow!("disk on fire").into();
        assert_eq!(err.code(), "internal");
        assert!(err.to_string().contains("disk on fire"));
    }
}
