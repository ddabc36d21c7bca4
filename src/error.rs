//! Error types for Switchyard
//!
//! This module defines the gateway's error taxonomy. Errors that occur before
//! a session stream is opened surface as HTTP error responses; errors that
//! occur mid-stream surface as terminal `error` events on the stream instead
//! (see `events`).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Gateway-level errors
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Request failed validation before any backend activity.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The requested session id is unknown to the registry.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// No per-request tokens were supplied and no ambient default
    /// credentials are configured for the chosen backend.
    #[error("Credential error: {0}")]
    Credential(String),

    /// The remote shell channel could not be established or authenticated.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Cooperative cancellation. Benign: surfaced to stream consumers as a
    /// terminal `error` event with message "Cancelled", never as a failure.
    #[error("Cancelled")]
    Aborted,

    /// The backend process failed in a way that is not a protocol matter
    /// (spawn failure, premature exit).
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// Message used when this error terminates an already-open event stream.
    pub fn stream_message(&self) -> String {
        match self {
            GatewayError::Aborted => "Cancelled".to_string(),
            other => other.to_string(),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error details
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            GatewayError::Validation(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION", msg.clone())
            }
            GatewayError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            GatewayError::Credential(msg) => (StatusCode::BAD_REQUEST, "CREDENTIAL", msg.clone()),
            GatewayError::Connection(msg) => (StatusCode::BAD_GATEWAY, "CONNECTION", msg.clone()),
            GatewayError::Aborted => (StatusCode::OK, "CANCELLED", "Cancelled".to_string()),
            GatewayError::Backend(msg) => (StatusCode::BAD_GATEWAY, "BACKEND", msg.clone()),
            GatewayError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                "I/O error".to_string(),
            ),
            GatewayError::Json(_) => (
                StatusCode::BAD_REQUEST,
                "INVALID_JSON",
                "Invalid JSON in request".to_string(),
            ),
            GatewayError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for convenience
pub type GatewayResult<T> = Result<T, GatewayError>;
