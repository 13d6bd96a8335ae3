//! JSON-file persistent store.
//!
//! Serializes the four namespaces into a single JSON document and
//! rewrites it atomically (temp file + rename) after every mutation.
//! Suitable for single-node deployments.

use crate::persistence::{
    BackendRecord, PersistentStore, StorageClassRecord, StoreError, StoreResult, VolumeRecord,
    VolumeTransaction,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileState {
    backends: BTreeMap<String, BackendRecord>,
    storage_classes: BTreeMap<String, StorageClassRecord>,
    volumes: BTreeMap<String, VolumeRecord>,
    volume_transactions: BTreeMap<String, VolumeTransaction>,
}

/// Persistent store backed by a single JSON file.
pub struct FileStore {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl FileStore {
    /// Open the store, loading any existing state from disk.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => FileState::default(),
            Err(err) => return Err(err.into()),
        };
        info!("Opened file store at {}", path.display());
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Mutate the state under the lock, then rewrite the file.
    async fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut FileState) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let (result, serialized) = {
            let mut state = self.state.lock();
            let result = apply(&mut state)?;
            (result, serde_json::to_vec_pretty(&*state)?)
        };

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serialized).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(result)
    }
}

#[async_trait]
impl PersistentStore for FileStore {
    async fn add_backend(&self, backend: &BackendRecord) -> StoreResult<()> {
        let backend = backend.clone();
        self.mutate(move |state| {
            state.backends.insert(backend.name.clone(), backend);
            Ok(())
        })
        .await
    }

    async fn update_backend(&self, backend: &BackendRecord) -> StoreResult<()> {
        let backend = backend.clone();
        self.mutate(move |state| {
            if !state.backends.contains_key(&backend.name) {
                return Err(StoreError::KeyNotFound {
                    key: format!("backends/{}", backend.name),
                });
            }
            state.backends.insert(backend.name.clone(), backend);
            Ok(())
        })
        .await
    }

    async fn get_backends(&self) -> StoreResult<Vec<BackendRecord>> {
        Ok(self.state.lock().backends.values().cloned().collect())
    }

    async fn delete_backend(&self, name: &str) -> StoreResult<()> {
        let name = name.to_string();
        self.mutate(move |state| {
            state
                .backends
                .remove(&name)
                .map(|_| ())
                .ok_or_else(|| StoreError::KeyNotFound {
                    key: format!("backends/{name}"),
                })
        })
        .await
    }

    async fn add_storage_class(&self, storage_class: &StorageClassRecord) -> StoreResult<()> {
        let storage_class = storage_class.clone();
        self.mutate(move |state| {
            state
                .storage_classes
                .insert(storage_class.config.name.clone(), storage_class);
            Ok(())
        })
        .await
    }

    async fn get_storage_classes(&self) -> StoreResult<Vec<StorageClassRecord>> {
        Ok(self.state.lock().storage_classes.values().cloned().collect())
    }

    async fn delete_storage_class(&self, name: &str) -> StoreResult<()> {
        let name = name.to_string();
        self.mutate(move |state| {
            state
                .storage_classes
                .remove(&name)
                .map(|_| ())
                .ok_or_else(|| StoreError::KeyNotFound {
                    key: format!("storageclasses/{name}"),
                })
        })
        .await
    }

    async fn add_volume(&self, volume: &VolumeRecord) -> StoreResult<()> {
        let volume = volume.clone();
        self.mutate(move |state| {
            state.volumes.insert(volume.config.name.clone(), volume);
            Ok(())
        })
        .await
    }

    async fn get_volumes(&self) -> StoreResult<Vec<VolumeRecord>> {
        Ok(self.state.lock().volumes.values().cloned().collect())
    }

    async fn delete_volume(&self, name: &str) -> StoreResult<()> {
        let name = name.to_string();
        self.mutate(move |state| {
            state
                .volumes
                .remove(&name)
                .map(|_| ())
                .ok_or_else(|| StoreError::KeyNotFound {
                    key: format!("volumes/{name}"),
                })
        })
        .await
    }

    async fn get_volume_transactions(&self) -> StoreResult<Vec<VolumeTransaction>> {
        Ok(self
            .state
            .lock()
            .volume_transactions
            .values()
            .cloned()
            .collect())
    }

    async fn add_volume_transaction(&self, txn: &VolumeTransaction) -> StoreResult<()> {
        let txn = txn.clone();
        self.mutate(move |state| {
            state
                .volume_transactions
                .insert(txn.name().to_string(), txn);
            Ok(())
        })
        .await
    }

    async fn delete_volume_transaction(&self, txn: &VolumeTransaction) -> StoreResult<()> {
        let name = txn.name().to_string();
        self.mutate(move |state| {
            state
                .volume_transactions
                .remove(&name)
                .map(|_| ())
                .ok_or_else(|| StoreError::KeyNotFound {
                    key: format!("transactions/{name}"),
                })
        })
        .await
    }
}
