//! Persistent store client.
//!
//! The orchestrator keeps four flat namespaces durable: backends,
//! storage classes, volumes, and volume transactions, each keyed by
//! entity name. Every record carries a version field reserved for
//! future schema evolution.
//!
//! Two implementations ship with the crate: an in-memory store with
//! fault injection for tests and standalone runs, and a JSON-file
//! store for single-node deployments.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::storage_class::StorageClassConfig;
use crate::storage::volume::VolumeConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Store Errors
// =============================================================================

/// Errors surfaced by a persistent store client.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The named key is absent. Callers rely on distinguishing this
    /// from transport failures.
    #[error("key {key} not found")]
    KeyNotFound { key: String },

    /// The store did not answer in time; bootstrap retries on this.
    #[error("persistent store deadline exceeded")]
    DeadlineExceeded,

    #[error("persistent store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, StoreError::KeyNotFound { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// =============================================================================
// Persisted Records
// =============================================================================

/// Durable form of a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendRecord {
    pub version: String,
    pub name: String,
    /// The backend definition, as submitted.
    pub config: serde_json::Value,
    pub online: bool,
}

/// Durable form of a storage class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageClassRecord {
    pub version: String,
    pub config: StorageClassConfig,
}

/// Durable form of a volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeRecord {
    pub version: String,
    pub config: VolumeConfig,
    pub backend: String,
    pub pool: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Volume Transactions
// =============================================================================

/// The two volume mutations covered by the write-ahead log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VolumeOperation {
    AddVolume,
    DeleteVolume,
}

impl std::fmt::Display for VolumeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeOperation::AddVolume => write!(f, "addVolume"),
            VolumeOperation::DeleteVolume => write!(f, "deleteVolume"),
        }
    }
}

/// Write-ahead record of an in-flight volume mutation. Transactions
/// record intent, never result; at most one may exist per volume name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeTransaction {
    pub op: VolumeOperation,
    pub config: VolumeConfig,
}

impl VolumeTransaction {
    pub fn name(&self) -> &str {
        &self.config.name
    }
}

// =============================================================================
// Persistent Store Port
// =============================================================================

/// Durable CRUD over the four orchestrator namespaces.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    // -- backends
    async fn add_backend(&self, backend: &BackendRecord) -> StoreResult<()>;
    async fn update_backend(&self, backend: &BackendRecord) -> StoreResult<()>;
    async fn get_backends(&self) -> StoreResult<Vec<BackendRecord>>;
    async fn delete_backend(&self, name: &str) -> StoreResult<()>;

    // -- storage classes
    async fn add_storage_class(&self, storage_class: &StorageClassRecord) -> StoreResult<()>;
    async fn get_storage_classes(&self) -> StoreResult<Vec<StorageClassRecord>>;
    async fn delete_storage_class(&self, name: &str) -> StoreResult<()>;

    // -- volumes
    async fn add_volume(&self, volume: &VolumeRecord) -> StoreResult<()>;
    async fn get_volumes(&self) -> StoreResult<Vec<VolumeRecord>>;
    async fn delete_volume(&self, name: &str) -> StoreResult<()>;

    /// Delete a volume, treating an absent key as success. Recovery
    /// paths may delete volumes that never reached the store.
    async fn delete_volume_ignore_not_found(&self, name: &str) -> StoreResult<()> {
        match self.delete_volume(name).await {
            Err(StoreError::KeyNotFound { .. }) => Ok(()),
            other => other,
        }
    }

    // -- volume transactions
    async fn get_volume_transactions(&self) -> StoreResult<Vec<VolumeTransaction>>;
    async fn add_volume_transaction(&self, txn: &VolumeTransaction) -> StoreResult<()>;
    async fn delete_volume_transaction(&self, txn: &VolumeTransaction) -> StoreResult<()>;

    /// Any outstanding transaction recorded under the same volume name.
    async fn get_existing_volume_transaction(
        &self,
        txn: &VolumeTransaction,
    ) -> StoreResult<Option<VolumeTransaction>> {
        let transactions = self.get_volume_transactions().await?;
        Ok(transactions.into_iter().find(|t| t.name() == txn.name()))
    }
}
