//! Error types shared by the database core.
//!
//! Every fallible operation in the crate returns [`Result`]. Store drivers
//! classify their failures into a [`StoreErrorKind`] so the retry policy can
//! decide on structured information before falling back to message matching.

pub mod retry;
pub mod sanitizer;

use crate::config::Environment;
use serde::{Deserialize, Serialize};

pub use retry::{RetryAttempt, RetryPolicy};
pub use sanitizer::{sanitize, sanitize_message, SanitizedError, MASK};

/// Coarse classification of a failure reported by a store driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreErrorKind {
    ConnectionRefused,
    HostNotFound,
    TimedOut,
    ConnectionReset,
    ConnectionTerminated,
    Authentication,
    Integrity,
    Other,
}

impl StoreErrorKind {
    /// Kinds that describe a network hiccup rather than a rejected request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreErrorKind::ConnectionRefused
                | StoreErrorKind::HostNotFound
                | StoreErrorKind::TimedOut
                | StoreErrorKind::ConnectionReset
                | StoreErrorKind::ConnectionTerminated
        )
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Startup connection gave up. Carries the attempt count only so no
    /// driver text (and therefore no credential) can leak through it.
    #[error("Failed to connect to the database after {attempts} attempts")]
    ConnectionError { attempts: u32 },

    #[error("Database error: {message}")]
    StoreError {
        kind: StoreErrorKind,
        message: String,
    },

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Database is not connected")]
    NotConnected,

    #[error("Transaction timed out after {timeout_ms}ms")]
    TransactionTimeout { timeout_ms: u64 },

    #[error("{operation} is not permitted in the {environment} environment")]
    MaintenanceForbidden {
        operation: &'static str,
        environment: Environment,
    },

    #[error("Disconnect failed: {0}")]
    DisconnectError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl AppError {
    /// Shorthand used by the store drivers.
    pub fn store(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        AppError::StoreError {
            kind,
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            AppError::TransactionTimeout { .. }
                | AppError::StoreError {
                    kind: StoreErrorKind::TimedOut,
                    ..
                }
        )
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(format!("JSON error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
