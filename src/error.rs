//! Error types for the action gateway

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{DownstreamErrorKind, FieldViolation};

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {

    // =============================
    // Invocation Pipeline Errors
    // =============================

    #[error("unrecognized request: {0}")]
    UnrecognizedInput(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("validation failed: {}", format_violations(.0))]
    ValidationFailed(Vec<FieldViolation>),

    #[error("downstream timeout after {0} ms")]
    DownstreamTimeout(u64),

    #[error("downstream error ({kind}): {message}")]
    DownstreamError {
        kind: DownstreamErrorKind,
        message: String,
    },

    #[error("audit write failure: {0}")]
    AuditWriteFailure(String),

    #[error("configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Caller-visible classification of a failed invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnrecognizedInput,
    UnknownAction,
    PermissionDenied,
    ValidationFailed,
    DownstreamTimeout,
    DownstreamError,
    AuditWriteFailure,
}

impl GatewayError {
    /// Kind reported in the response envelope. Ambient failures (config,
    /// serialization, transport) have no envelope kind of their own.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            GatewayError::UnrecognizedInput(_) => Some(ErrorKind::UnrecognizedInput),
            GatewayError::UnknownAction(_) => Some(ErrorKind::UnknownAction),
            GatewayError::PermissionDenied(_) => Some(ErrorKind::PermissionDenied),
            GatewayError::ValidationFailed(_) => Some(ErrorKind::ValidationFailed),
            GatewayError::DownstreamTimeout(_) => Some(ErrorKind::DownstreamTimeout),
            GatewayError::DownstreamError { kind, .. } => match kind {
                DownstreamErrorKind::Timeout => Some(ErrorKind::DownstreamTimeout),
                _ => Some(ErrorKind::DownstreamError),
            },
            GatewayError::AuditWriteFailure(_) => Some(ErrorKind::AuditWriteFailure),
            GatewayError::Config(_)
            | GatewayError::SerializationError(_)
            | GatewayError::HttpError(_)
            | GatewayError::IoError(_) => None,
        }
    }
}

fn format_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
