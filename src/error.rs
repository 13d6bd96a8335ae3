//! Error types for the volume orchestrator.
//!
//! Provides structured error types for the orchestrator core, the
//! backend drivers, and the persistent store client.

use crate::domain::types::Protocol;
use crate::persistence::StoreError;
use thiserror::Error;

/// Unified error type for the orchestrator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Catalog Errors
    // =========================================================================
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} {name} already exists")]
    Exists { kind: &'static str, name: String },

    #[error("cannot update backend {backend}: {}", reasons.join("; "))]
    InvalidUpdate { backend: String, reasons: Vec<String> },

    // =========================================================================
    // Placement Errors
    // =========================================================================
    #[error("no available {protocol} backends for storage class {storage_class}")]
    NoBackend {
        storage_class: String,
        protocol: Protocol,
    },

    #[error("backend {backend} failed: {reason}")]
    BackendFailed { backend: String, reason: String },

    #[error("encountered error(s) in creating the volume: {}", errors.join(", "))]
    AllBackendsFailed { errors: Vec<String> },

    // =========================================================================
    // Recovery Errors
    // =========================================================================
    #[error("volume operation failed and recovery was incomplete: {}", errors.join("; "))]
    RecoveryFailed { errors: Vec<String> },

    #[error("catalog cannot be reconciled with the persistent store: {0}")]
    Inconsistent(String),

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    #[error("persistent store error: {0}")]
    Store(#[from] StoreError),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("capacity parse error: {0}")]
    CapacityParse(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check whether this error names an absent entity.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Check whether this error is a duplicate-name rejection.
    pub fn is_exists(&self) -> bool {
        matches!(self, Error::Exists { .. })
    }

    /// Check whether this error stems from the persistent store.
    pub fn is_store(&self) -> bool {
        matches!(self, Error::Store(_))
    }
}

/// Result type alias for the orchestrator
pub type Result<T> = std::result::Result<T, Error>;
