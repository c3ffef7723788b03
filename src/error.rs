//! Error types for the gateway
//!
//! Two families live here. [`Failure`] is the request-path taxonomy every
//! component returns and the boundary renders; [`AppError`] covers startup and
//! infrastructure problems that never reach a client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

/// The closed set of failure kinds a request can end with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    BackendUnavailable,
    BackendTimeout,
    BackendProtocolError,
    Internal,
}

impl FailureKind {
    /// Transport status selected at the boundary
    pub fn status_code(self) -> StatusCode {
        match self {
            FailureKind::Validation => StatusCode::BAD_REQUEST,
            FailureKind::BackendUnavailable
            | FailureKind::BackendTimeout
            | FailureKind::BackendProtocolError => StatusCode::BAD_GATEWAY,
            FailureKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::BackendUnavailable => "backend_unavailable",
            FailureKind::BackendTimeout => "backend_timeout",
            FailureKind::BackendProtocolError => "backend_protocol_error",
            FailureKind::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed request failure: one kind plus a message crafted by the component
/// that produced it. The message is what clients see.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Validation, message)
    }

    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::BackendUnavailable, message)
    }

    pub fn backend_timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::BackendTimeout, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(FailureKind::BackendProtocolError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Internal, message)
    }

    pub fn status_code(&self) -> StatusCode {
        self.kind.status_code()
    }
}

/// Uniform error envelope
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status_code: u16,
}

impl From<&Failure> for ErrorResponse {
    fn from(failure: &Failure) -> Self {
        Self {
            error: failure.message.clone(),
            status_code: failure.status_code().as_u16(),
        }
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(
                kind = %self.kind,
                status = status.as_u16(),
                message = %self.message,
                "Request failed"
            );
        } else {
            warn!(
                kind = %self.kind,
                status = status.as_u16(),
                message = %self.message,
                "Request rejected"
            );
        }

        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

/// Startup and infrastructure errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Device unavailable: {0}")]
    Device(String),

    #[error("Pipeline load failed: {0}")]
    PipelineLoad(String),
}

/// Result type alias for startup paths
pub type Result<T> = std::result::Result<T, AppError>;
