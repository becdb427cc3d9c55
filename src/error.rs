//! Unified API error model and mapping helpers.
//! This module provides the common error enum used across the gateway, store,
//! filter evaluator, and resource handlers, along with the HTTP status mapping
//! for the wire envelope.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The full error taxonomy surfaced over the wire. Every variant carries a
/// stable symbolic `code` (e.g. `InvalidVpcID.NotFound`, `DependencyViolation`)
/// and a human-readable message; the gateway serializes both into the
/// provider's standard error document.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiError {
    /// Wire decoding failure: inconsistent indices, wrong type for a field.
    #[error("{code}: {message}")]
    MalformedParameter { code: String, message: String },
    /// A resource-specific precondition failed; the code is surfaced verbatim.
    #[error("{code}: {message}")]
    Validation { code: String, message: String },
    /// Referenced resource id does not exist; the code names the resource type.
    #[error("{code}: {message}")]
    NotFound { code: String, message: String },
    /// Delete blocked by a live reference.
    #[error("{code}: {message}")]
    DependencyViolation { code: String, message: String },
    /// No handler registered for the requested action.
    #[error("{code}: {message}")]
    UnsupportedAction { code: String, message: String },
    /// ID-allocation exhaustion or invariant violation. Logged loudly.
    #[error("{code}: {message}")]
    Internal { code: String, message: String },
}

impl ApiError {
    pub fn code_str(&self) -> &str {
        match self {
            ApiError::MalformedParameter { code, .. }
            | ApiError::Validation { code, .. }
            | ApiError::NotFound { code, .. }
            | ApiError::DependencyViolation { code, .. }
            | ApiError::UnsupportedAction { code, .. }
            | ApiError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::MalformedParameter { message, .. }
            | ApiError::Validation { message, .. }
            | ApiError::NotFound { message, .. }
            | ApiError::DependencyViolation { message, .. }
            | ApiError::UnsupportedAction { message, .. }
            | ApiError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        ApiError::MalformedParameter { code: "MalformedQueryString".into(), message: msg.into() }
    }
    pub fn validation(code: impl Into<String>, msg: impl Into<String>) -> Self {
        ApiError::Validation { code: code.into(), message: msg.into() }
    }
    pub fn missing_parameter(name: &str) -> Self {
        ApiError::Validation {
            code: "MissingParameter".into(),
            message: format!("The request must contain the parameter {}", name),
        }
    }
    pub fn not_found(code: impl Into<String>, msg: impl Into<String>) -> Self {
        ApiError::NotFound { code: code.into(), message: msg.into() }
    }
    pub fn dependency(msg: impl Into<String>) -> Self {
        ApiError::DependencyViolation { code: "DependencyViolation".into(), message: msg.into() }
    }
    pub fn unsupported(action: &str) -> Self {
        ApiError::UnsupportedAction {
            code: "InvalidAction".into(),
            message: format!("The action {} is not valid for this web service.", action),
        }
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::Internal { code: "InternalError".into(), message: msg.into() }
    }

    /// Map to HTTP status code. The provider reports not-found and dependency
    /// failures as client errors with a typed code, not as HTTP 404.
    pub fn http_status(&self) -> u16 {
        match self {
            ApiError::MalformedParameter { .. }
            | ApiError::Validation { .. }
            | ApiError::NotFound { .. }
            | ApiError::DependencyViolation { .. }
            | ApiError::UnsupportedAction { .. } => 400,
            ApiError::Internal { .. } => 500,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal { code: "InternalError".into(), message: err.to_string() }
    }
}
