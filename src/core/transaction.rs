//! Write-ahead transaction log.
//!
//! A thin wrapper over the persistent store's transaction namespace.
//! Transactions record intent, never result; at most one may exist per
//! volume name at a time, and rollback is idempotent.

use crate::error::Result;
use crate::persistence::{PersistentStore, StoreError, StoreResult, VolumeTransaction};
use std::sync::Arc;

pub struct TransactionLog {
    store: Arc<dyn PersistentStore>,
}

impl TransactionLog {
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self { store }
    }

    /// Any live transaction recorded under the same volume name.
    pub async fn get_existing(
        &self,
        txn: &VolumeTransaction,
    ) -> Result<Option<VolumeTransaction>> {
        Ok(self.store.get_existing_volume_transaction(txn).await?)
    }

    /// Persist a transaction before acting on its intent.
    pub async fn add(&self, txn: &VolumeTransaction) -> Result<()> {
        Ok(self.store.add_volume_transaction(txn).await?)
    }

    /// Remove a completed or rolled-back transaction. Removing a
    /// transaction that is already gone is a success; rollback may run
    /// more than once.
    pub async fn delete(&self, txn: &VolumeTransaction) -> Result<()> {
        match self.store.delete_volume_transaction(txn).await {
            Err(StoreError::KeyNotFound { .. }) => Ok(()),
            other => Ok(other?),
        }
    }

    /// All transactions left over from a previous run.
    pub async fn outstanding(&self) -> StoreResult<Vec<VolumeTransaction>> {
        self.store.get_volume_transactions().await
    }
}
