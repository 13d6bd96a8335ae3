//! In-memory persistent store.
//!
//! Backs tests and standalone runs. Supports fault injection: the
//! whole store can be marked unavailable, individual operations can be
//! made to fail, and the initial backend fetch can report
//! deadline-exceeded for a number of rounds to exercise the bootstrap
//! retry loop.

use crate::persistence::{
    BackendRecord, PersistentStore, StorageClassRecord, StoreError, StoreResult, VolumeRecord,
    VolumeTransaction,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

#[derive(Default)]
struct StoreState {
    backends: BTreeMap<String, BackendRecord>,
    storage_classes: BTreeMap<String, StorageClassRecord>,
    volumes: BTreeMap<String, VolumeRecord>,
    volume_transactions: BTreeMap<String, VolumeTransaction>,
}

/// In-memory store with fault injection.
pub struct MemoryStore {
    state: RwLock<StoreState>,
    available: AtomicBool,
    failing_ops: RwLock<BTreeSet<String>>,
    missing_key_ops: RwLock<BTreeSet<String>>,
    deadline_rounds: AtomicU32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            available: AtomicBool::new(true),
            failing_ops: RwLock::new(BTreeSet::new()),
            missing_key_ops: RwLock::new(BTreeSet::new()),
            deadline_rounds: AtomicU32::new(0),
        }
    }

    /// Mark the whole store reachable or unreachable (for testing).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make one named operation fail until cleared (for testing).
    pub fn fail_operation(&self, op: &str) {
        self.failing_ops.write().insert(op.to_string());
    }

    /// Make one named operation report a missing key (for testing).
    pub fn fail_operation_with_key_not_found(&self, op: &str) {
        self.missing_key_ops.write().insert(op.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing_ops.write().clear();
        self.missing_key_ops.write().clear();
    }

    /// Make the next `rounds` backend fetches report deadline-exceeded
    /// (for testing the bootstrap retry loop).
    pub fn set_deadline_rounds(&self, rounds: u32) {
        self.deadline_rounds.store(rounds, Ordering::SeqCst);
    }

    fn guard(&self, op: &str) -> StoreResult<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store marked unavailable".into()));
        }
        if self.failing_ops.read().contains(op) {
            return Err(StoreError::Unavailable(format!("injected fault for {op}")));
        }
        if self.missing_key_ops.read().contains(op) {
            return Err(StoreError::KeyNotFound {
                key: format!("injected/{op}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn add_backend(&self, backend: &BackendRecord) -> StoreResult<()> {
        self.guard("add_backend")?;
        self.state
            .write()
            .backends
            .insert(backend.name.clone(), backend.clone());
        Ok(())
    }

    async fn update_backend(&self, backend: &BackendRecord) -> StoreResult<()> {
        self.guard("update_backend")?;
        let mut state = self.state.write();
        if !state.backends.contains_key(&backend.name) {
            return Err(StoreError::KeyNotFound {
                key: format!("backends/{}", backend.name),
            });
        }
        state.backends.insert(backend.name.clone(), backend.clone());
        Ok(())
    }

    async fn get_backends(&self) -> StoreResult<Vec<BackendRecord>> {
        if self.deadline_rounds.load(Ordering::SeqCst) > 0 {
            self.deadline_rounds.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::DeadlineExceeded);
        }
        self.guard("get_backends")?;
        Ok(self.state.read().backends.values().cloned().collect())
    }

    async fn delete_backend(&self, name: &str) -> StoreResult<()> {
        self.guard("delete_backend")?;
        self.state
            .write()
            .backends
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::KeyNotFound {
                key: format!("backends/{name}"),
            })
    }

    async fn add_storage_class(&self, storage_class: &StorageClassRecord) -> StoreResult<()> {
        self.guard("add_storage_class")?;
        self.state
            .write()
            .storage_classes
            .insert(storage_class.config.name.clone(), storage_class.clone());
        Ok(())
    }

    async fn get_storage_classes(&self) -> StoreResult<Vec<StorageClassRecord>> {
        self.guard("get_storage_classes")?;
        Ok(self.state.read().storage_classes.values().cloned().collect())
    }

    async fn delete_storage_class(&self, name: &str) -> StoreResult<()> {
        self.guard("delete_storage_class")?;
        self.state
            .write()
            .storage_classes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::KeyNotFound {
                key: format!("storageclasses/{name}"),
            })
    }

    async fn add_volume(&self, volume: &VolumeRecord) -> StoreResult<()> {
        self.guard("add_volume")?;
        self.state
            .write()
            .volumes
            .insert(volume.config.name.clone(), volume.clone());
        Ok(())
    }

    async fn get_volumes(&self) -> StoreResult<Vec<VolumeRecord>> {
        self.guard("get_volumes")?;
        Ok(self.state.read().volumes.values().cloned().collect())
    }

    async fn delete_volume(&self, name: &str) -> StoreResult<()> {
        self.guard("delete_volume")?;
        self.state
            .write()
            .volumes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::KeyNotFound {
                key: format!("volumes/{name}"),
            })
    }

    async fn get_volume_transactions(&self) -> StoreResult<Vec<VolumeTransaction>> {
        self.guard("get_volume_transactions")?;
        Ok(self
            .state
            .read()
            .volume_transactions
            .values()
            .cloned()
            .collect())
    }

    async fn add_volume_transaction(&self, txn: &VolumeTransaction) -> StoreResult<()> {
        self.guard("add_volume_transaction")?;
        self.state
            .write()
            .volume_transactions
            .insert(txn.name().to_string(), txn.clone());
        Ok(())
    }

    async fn delete_volume_transaction(&self, txn: &VolumeTransaction) -> StoreResult<()> {
        self.guard("delete_volume_transaction")?;
        self.state
            .write()
            .volume_transactions
            .remove(txn.name())
            .map(|_| ())
            .ok_or_else(|| StoreError::KeyNotFound {
                key: format!("transactions/{}", txn.name()),
            })
    }
}
