//! Orchestrator core.
//!
//! Owns the in-memory catalog of backends, storage classes, and
//! volumes, serializes every public operation behind a single mutation
//! lock, and coordinates the three failure domains (memory, backend,
//! persistent store) through the write-ahead transaction log.
//!
//! The lock is deliberately held across driver and store I/O: placement
//! decisions, transaction writes, and catalog updates must not
//! interleave. Collaborator I/O is expected to carry its own timeouts.

use crate::config::{
    BOOTSTRAP_RETRY_DELAY, MAX_BOOTSTRAP_ATTEMPTS, ORCHESTRATOR_MAJOR_VERSION, ORCHESTRATOR_NAME,
    ORCHESTRATOR_VERSION, UNKNOWN_DRIVER,
};
use crate::core::placement::{place_volume, PermutationSource, WallClockShuffle};
use crate::core::transaction::TransactionLog;
use crate::domain::ports::FrontendPluginRef;
use crate::domain::types::{Protocol, VolumeType};
use crate::error::{Error, Result};
use crate::persistence::{
    PersistentStore, StoreError, VolumeOperation, VolumeTransaction,
};
use crate::storage::backend::{new_backend_from_config, Backend, BackendExternal};
use crate::storage::drivers;
use crate::storage::volume::{Volume, VolumeConfig, VolumeExternal};
use crate::storage_class::{StorageClass, StorageClassConfig, StorageClassExternal};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

// =============================================================================
// Catalog State
// =============================================================================

/// Everything behind the mutation lock.
#[derive(Default)]
struct CatalogState {
    backends: BTreeMap<String, Backend>,
    volumes: BTreeMap<String, Volume>,
    storage_classes: BTreeMap<String, StorageClass>,
    frontends: BTreeMap<String, FrontendPluginRef>,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// The storage orchestrator: provisions, tracks, and deletes volumes
/// across the backend fleet on behalf of registered frontends.
pub struct Orchestrator {
    state: Mutex<CatalogState>,
    store: Arc<dyn PersistentStore>,
    transactions: TransactionLog,
    placement_order: Arc<dyn PermutationSource>,
    /// Gates backend persistence: while bootstrap replays backends the
    /// store already holds their records.
    bootstrapped: AtomicBool,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn PersistentStore>) -> Arc<Self> {
        Self::with_placement_order(store, Arc::new(WallClockShuffle))
    }

    /// Create an orchestrator with an explicit candidate ordering.
    pub fn with_placement_order(
        store: Arc<dyn PersistentStore>,
        placement_order: Arc<dyn PermutationSource>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(CatalogState::default()),
            store: store.clone(),
            transactions: TransactionLog::new(store),
            placement_order,
            bootstrapped: AtomicBool::new(false),
        })
    }

    pub fn get_version(&self) -> &'static str {
        ORCHESTRATOR_VERSION
    }

    // =========================================================================
    // Bootstrap & Recovery
    // =========================================================================

    /// Rebuild the catalog from the persistent store and roll back any
    /// unfinished transactions. Must run to completion before the
    /// orchestrator accepts requests.
    pub async fn bootstrap(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        tolerate_missing_key(self.bootstrap_backends(state).await, "backends")?;
        tolerate_missing_key(
            self.bootstrap_storage_classes(state).await,
            "storage classes",
        )?;
        tolerate_missing_key(self.bootstrap_volumes(state).await, "volumes")?;
        tolerate_missing_key(
            self.bootstrap_transactions(state).await,
            "volume transactions",
        )?;

        // Clean up offline backends that lack volumes. A crash between
        // offline and delete leaves them behind.
        let stale: Vec<String> = state
            .backends
            .values()
            .filter(|backend| !backend.online && !backend.has_volumes())
            .map(|backend| backend.name.clone())
            .collect();
        for backend_name in stale {
            state.backends.remove(&backend_name);
            self.store
                .delete_backend(&backend_name)
                .await
                .map_err(|err| {
                    Error::Inconsistent(format!(
                        "failed to delete empty offline backend {backend_name}: {err}"
                    ))
                })?;
        }

        self.bootstrapped.store(true, Ordering::SeqCst);
        info!("{} bootstrapped successfully", ORCHESTRATOR_NAME);
        Ok(())
    }

    async fn bootstrap_backends(&self, state: &mut CatalogState) -> Result<()> {
        let mut attempts = 0;
        let records = loop {
            match self.store.get_backends().await {
                Ok(records) => {
                    if attempts > 0 {
                        info!("Persistent store is up after {} attempt(s)", attempts);
                    }
                    break records;
                }
                Err(StoreError::DeadlineExceeded) if attempts < MAX_BOOTSTRAP_ATTEMPTS => {
                    attempts += 1;
                    tokio::time::sleep(BOOTSTRAP_RETRY_DELAY).await;
                }
                Err(err @ StoreError::DeadlineExceeded) => {
                    warn!(
                        "Persistent store failed to come online after {} attempts",
                        attempts
                    );
                    return Err(err.into());
                }
                Err(err) => return Err(err.into()),
            }
        };

        for record in records {
            let serialized = serde_json::to_string(&record.config)?;
            self.add_storage_backend_locked(state, &serialized).await?;
            if let Some(backend) = state.backends.get_mut(&record.name) {
                backend.online = record.online;
            }
            info!("Restored backend {} from the persistent store", record.name);
        }
        Ok(())
    }

    async fn bootstrap_storage_classes(&self, state: &mut CatalogState) -> Result<()> {
        let records = self.store.get_storage_classes().await?;
        for record in records {
            let mut storage_class = StorageClass::from_record(record);
            for backend in state.backends.values_mut() {
                storage_class.check_and_add_backend(backend);
            }
            info!(
                "Restored storage class {} from the persistent store",
                storage_class.name()
            );
            state
                .storage_classes
                .insert(storage_class.name().to_string(), storage_class);
        }
        Ok(())
    }

    async fn bootstrap_volumes(&self, state: &mut CatalogState) -> Result<()> {
        let records = self.store.get_volumes().await?;
        for record in records {
            let backend = state.backends.get_mut(&record.backend).ok_or_else(|| {
                Error::Inconsistent(format!(
                    "volume {} references missing backend {}",
                    record.config.name, record.backend
                ))
            })?;
            let pool = backend.pools.get_mut(&record.pool).ok_or_else(|| {
                Error::Inconsistent(format!(
                    "volume {} references missing pool {} on backend {}",
                    record.config.name, record.pool, record.backend
                ))
            })?;
            pool.volumes.insert(record.config.name.clone());
            let volume = Volume::from_record(record);
            info!("Restored volume {} from the persistent store", volume.config.name);
            state.volumes.insert(volume.config.name.clone(), volume);
        }
        Ok(())
    }

    async fn bootstrap_transactions(&self, state: &mut CatalogState) -> Result<()> {
        let transactions = match self.transactions.outstanding().await {
            Ok(transactions) => transactions,
            Err(err) => {
                warn!("Couldn't retrieve volume transaction log: {}", err);
                return Ok(());
            }
        };
        for txn in transactions {
            self.roll_back_transaction(state, &txn).await?;
        }
        Ok(())
    }

    /// Undo whatever a half-finished transaction may have left behind.
    /// Idempotent; safe to run on every retry and every bootstrap.
    async fn roll_back_transaction(
        &self,
        state: &mut CatalogState,
        txn: &VolumeTransaction,
    ) -> Result<()> {
        info!(
            "Rolling back {} transaction for volume {} (size {}, class {})",
            txn.op,
            txn.name(),
            txn.config.size,
            txn.config.storage_class
        );
        match txn.op {
            VolumeOperation::AddVolume => {
                if state.volumes.contains_key(txn.name()) {
                    // The create reached the store, so the volume was
                    // loaded at bootstrap; the normal delete path applies.
                    self.delete_volume_locked(state, txn.name()).await?;
                } else {
                    // The create may have landed on any backend before
                    // the crash. Internal names are disjoint per backend,
                    // so a blanket destroy on every online backend is
                    // safe. Backend offlining is serialized with volume
                    // creation, so offline backends cannot hold it.
                    let online: Vec<String> = state
                        .backends
                        .values()
                        .filter(|backend| backend.online)
                        .map(|backend| backend.name.clone())
                        .collect();
                    for backend_name in online {
                        let Some(backend) = state.backends.get(&backend_name) else {
                            continue;
                        };
                        let driver = backend.driver().clone();
                        let internal_name = driver.internal_volume_name(txn.name());
                        driver.destroy_volume(&internal_name).await.map_err(|err| {
                            Error::Internal(format!(
                                "error cleaning up volume {} on backend {backend_name}: {err}",
                                txn.name()
                            ))
                        })?;
                    }
                }
                self.transactions.delete(txn).await
            }
            VolumeOperation::DeleteVolume => {
                // The volume leaves the store only after it leaves the
                // backend, so work remains only while it is still in the
                // catalog.
                if state.volumes.contains_key(txn.name()) {
                    info!("Volume {} for delete transaction found", txn.name());
                    self.delete_volume_locked(state, txn.name()).await?;
                } else {
                    info!("Volume {} for delete transaction not found", txn.name());
                }
                self.transactions.delete(txn).await
            }
        }
    }

    // =========================================================================
    // Frontends
    // =========================================================================

    /// Register a frontend plugin under its unique name.
    pub async fn add_frontend(&self, plugin: FrontendPluginRef) {
        let mut state = self.state.lock().await;
        let name = plugin.name().to_string();
        if state.frontends.contains_key(&name) {
            warn!("Frontend {} already registered", name);
            return;
        }
        info!("Registered frontend {}", name);
        state.frontends.insert(name, plugin);
    }

    // =========================================================================
    // Backends
    // =========================================================================

    /// Add a backend, or update an existing backend submitted under the
    /// same name.
    pub async fn add_storage_backend(&self, config_json: &str) -> Result<BackendExternal> {
        let mut guard = self.state.lock().await;
        self.add_storage_backend_locked(&mut guard, config_json).await
    }

    async fn add_storage_backend_locked(
        &self,
        state: &mut CatalogState,
        config_json: &str,
    ) -> Result<BackendExternal> {
        let backend = new_backend_from_config(config_json)?;
        let backend_name = backend.name.clone();
        let protocol = backend.protocol();

        if let Some(original) = state.backends.get(&backend_name) {
            validate_backend_update(original, &backend, &state.storage_classes, &state.volumes)?;
        }
        let new_backend = !state.backends.contains_key(&backend_name);

        debug!(
            "Adding backend {} (protocol {}, new: {})",
            backend_name, protocol, new_backend
        );
        self.update_backend_on_persistent_store(&backend, new_backend)
            .await?;

        let previous = state.backends.insert(backend_name.clone(), backend);

        let CatalogState {
            backends,
            storage_classes,
            ..
        } = state;

        // Recompute class membership: drop the old backend's pools, then
        // re-evaluate the new pools.
        let mut satisfied = Vec::new();
        for (class_name, storage_class) in storage_classes.iter_mut() {
            if let Some(previous) = &previous {
                storage_class.remove_pools_for_backend(&previous.name);
            }
            if let Some(current) = backends.get_mut(&backend_name) {
                if storage_class.check_and_add_backend(current) > 0 {
                    satisfied.push(class_name.clone());
                }
            }
        }
        if satisfied.is_empty() {
            info!("Backend {} satisfies no storage classes", backend_name);
        } else {
            info!(
                "Backend {} satisfies storage classes {}",
                backend_name,
                satisfied.join(", ")
            );
        }

        if let Some(previous) = previous {
            // Validation guaranteed that every in-use pool survives;
            // carry the hosted volume names over to the new pool objects.
            if let Some(current) = backends.get_mut(&backend_name) {
                for (pool_name, old_pool) in &previous.pools {
                    if old_pool.volumes.is_empty() {
                        continue;
                    }
                    if let Some(new_pool) = current.pools.get_mut(pool_name) {
                        new_pool.volumes.extend(old_pool.volumes.iter().cloned());
                    }
                }
            }
        }

        backends
            .get(&backend_name)
            .map(Backend::to_external)
            .ok_or_else(|| Error::Internal(format!("backend {backend_name} missing after insert")))
    }

    async fn update_backend_on_persistent_store(
        &self,
        backend: &Backend,
        new_backend: bool,
    ) -> Result<()> {
        // During bootstrap the store already holds the record.
        if !self.bootstrapped.load(Ordering::SeqCst) {
            return Ok(());
        }
        let record = backend.to_record()?;
        if new_backend {
            self.store.add_backend(&record).await?;
        } else {
            info!("Updating existing backend {}", backend.name);
            self.store.update_backend(&record).await?;
        }
        Ok(())
    }

    pub async fn get_backend(&self, backend_name: &str) -> Result<BackendExternal> {
        let state = self.state.lock().await;
        state
            .backends
            .get(backend_name)
            .map(Backend::to_external)
            .ok_or_else(|| Error::NotFound {
                kind: "backend",
                name: backend_name.to_string(),
            })
    }

    /// Online backends only.
    pub async fn list_backends(&self) -> Vec<BackendExternal> {
        let state = self.state.lock().await;
        state
            .backends
            .values()
            .filter(|backend| backend.online)
            .map(Backend::to_external)
            .collect()
    }

    /// Take a backend out of placement. A backend with no volumes is
    /// destroyed outright; one with volumes lingers until its last
    /// volume is deleted.
    pub async fn offline_backend(&self, backend_name: &str) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let backend = state
            .backends
            .get_mut(backend_name)
            .ok_or_else(|| Error::NotFound {
                kind: "backend",
                name: backend_name.to_string(),
            })?;
        backend.online = false;

        let mut affected: BTreeSet<String> = BTreeSet::new();
        for pool in backend.pools.values_mut() {
            affected.extend(pool.storage_classes.drain(..));
        }
        let has_volumes = backend.has_volumes();

        for class_name in &affected {
            if let Some(storage_class) = state.storage_classes.get_mut(class_name) {
                storage_class.remove_pools_for_backend(backend_name);
            }
        }

        if !has_volumes {
            state.backends.remove(backend_name);
            self.store.delete_backend(backend_name).await?;
            info!("Deleted offline backend {}", backend_name);
        } else if let Some(backend) = state.backends.get(backend_name) {
            self.store.update_backend(&backend.to_record()?).await?;
            info!(
                "Backend {} is offline; it will be deleted with its last volume",
                backend_name
            );
        }
        Ok(())
    }

    // =========================================================================
    // Storage Classes
    // =========================================================================

    pub async fn add_storage_class(
        &self,
        config: StorageClassConfig,
    ) -> Result<StorageClassExternal> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if state.storage_classes.contains_key(&config.name) {
            return Err(Error::Exists {
                kind: "storage class",
                name: config.name,
            });
        }
        let mut storage_class = StorageClass::new(config);
        self.store
            .add_storage_class(&storage_class.to_record())
            .await?;

        let mut added = 0;
        for backend in state.backends.values_mut() {
            added += storage_class.check_and_add_backend(backend);
        }
        if added == 0 {
            info!(
                "No backends currently satisfy storage class {}",
                storage_class.name()
            );
        } else {
            info!(
                "Storage class {} satisfied by {} storage pools",
                storage_class.name(),
                added
            );
        }

        let external = storage_class.to_external();
        state
            .storage_classes
            .insert(storage_class.name().to_string(), storage_class);
        Ok(external)
    }

    pub async fn get_storage_class(&self, class_name: &str) -> Result<StorageClassExternal> {
        let state = self.state.lock().await;
        // Storage classes are mutated at runtime; hand out a snapshot,
        // never the original.
        state
            .storage_classes
            .get(class_name)
            .map(StorageClass::to_external)
            .ok_or_else(|| Error::NotFound {
                kind: "storage class",
                name: class_name.to_string(),
            })
    }

    pub async fn list_storage_classes(&self) -> Vec<StorageClassExternal> {
        let state = self.state.lock().await;
        state
            .storage_classes
            .values()
            .map(StorageClass::to_external)
            .collect()
    }

    /// Delete a storage class. Volumes still referencing the class are
    /// left intact and continue to name it.
    pub async fn delete_storage_class(&self, class_name: &str) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if !state.storage_classes.contains_key(class_name) {
            return Err(Error::NotFound {
                kind: "storage class",
                name: class_name.to_string(),
            });
        }

        let still_referencing: Vec<&str> = state
            .volumes
            .values()
            .filter(|volume| volume.config.storage_class == class_name)
            .map(|volume| volume.config.name.as_str())
            .collect();
        if !still_referencing.is_empty() {
            warn!(
                "Storage class {} still has volumes in use; they will continue to refer to it: {}",
                class_name,
                still_referencing.join(", ")
            );
        }

        // No transaction needed: a crash before the store delete simply
        // reloads the class at the next bootstrap.
        self.store.delete_storage_class(class_name).await?;
        if let Some(storage_class) = state.storage_classes.remove(class_name) {
            for pool_ref in storage_class.pool_refs() {
                if let Some(backend) = state.backends.get_mut(&pool_ref.backend) {
                    if let Some(pool) = backend.pools.get_mut(&pool_ref.pool) {
                        pool.storage_classes.retain(|name| name != class_name);
                    }
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Volumes
    // =========================================================================

    /// Provision a volume: write the intent to the transaction log, run
    /// placement, persist the result, and clear the transaction. Any
    /// failure after the transaction write triggers the recovery
    /// routine.
    pub async fn add_volume(&self, mut config: VolumeConfig) -> Result<VolumeExternal> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if state.volumes.contains_key(&config.name) {
            return Err(Error::Exists {
                kind: "volume",
                name: config.name,
            });
        }
        config.version = ORCHESTRATOR_MAJOR_VERSION.to_string();

        let storage_class = state
            .storage_classes
            .get(&config.storage_class)
            .ok_or_else(|| Error::NotFound {
                kind: "storage class",
                name: config.storage_class.clone(),
            })?;

        let effective_protocol = if config.protocol == Protocol::Any {
            config.access_mode.effective_protocol()
        } else {
            config.protocol
        };
        let candidates = storage_class.pools_for_protocol(&state.backends, effective_protocol);
        let class_attributes = storage_class.attributes().clone();
        if candidates.is_empty() {
            return Err(Error::NoBackend {
                storage_class: config.storage_class.clone(),
                protocol: effective_protocol,
            });
        }

        // A transaction left behind by an earlier attempt under this
        // name means that attempt failed mid-flight; roll it back before
        // proceeding.
        let txn = VolumeTransaction {
            op: VolumeOperation::AddVolume,
            config: config.clone(),
        };
        if let Some(stale) = self.transactions.get_existing(&txn).await? {
            self.roll_back_transaction(state, &stale).await.map_err(|err| {
                Error::Internal(format!(
                    "unable to roll back existing transaction for volume {}: {err}",
                    config.name
                ))
            })?;
        }
        self.transactions.add(&txn).await?;

        let placed = place_volume(
            &mut state.backends,
            &candidates,
            effective_protocol,
            &config,
            &class_attributes,
            self.placement_order.as_ref(),
        )
        .await;

        let volume = match placed {
            Ok(volume) => volume,
            Err(err) => {
                // Nothing landed on a backend; only the transaction
                // needs clearing.
                return match self.transactions.delete(&txn).await {
                    Ok(()) => Err(err),
                    Err(txn_err) => Err(Error::RecoveryFailed {
                        errors: vec![
                            err.to_string(),
                            format!("unable to clean up volume transaction: {txn_err}"),
                        ],
                    }),
                };
            }
        };

        if let Err(store_err) = self.store.add_volume(&volume.to_record()).await {
            return Err(self
                .recover_failed_create(state, &volume, store_err.into(), &txn)
                .await);
        }
        state.volumes.insert(volume.config.name.clone(), volume.clone());

        if let Err(txn_err) = self.transactions.delete(&txn).await {
            // The persisted volume plus the stale transaction are
            // reconciled at the next bootstrap; drop the in-memory entry
            // so the caller can retry.
            state.volumes.remove(&volume.config.name);
            return Err(Error::RecoveryFailed {
                errors: vec![format!("unable to clean up volume transaction: {txn_err}")],
            });
        }

        info!(
            "Created volume {} on backend {} pool {}",
            volume.config.name, volume.backend, volume.pool
        );
        Ok(volume.to_external())
    }

    /// Clean up after a create that failed past the backend step: remove
    /// the backend-side volume, then clear the transaction. If cleanup
    /// itself fails the transaction stays behind for the next bootstrap
    /// or the next create under the same name.
    async fn recover_failed_create(
        &self,
        state: &mut CatalogState,
        volume: &Volume,
        original: Error,
        txn: &VolumeTransaction,
    ) -> Error {
        let cleanup_err = match state.backends.get_mut(&volume.backend) {
            Some(backend) => backend
                .remove_volume(volume)
                .await
                .err()
                .map(|err| format!("unable to delete volume from backend during cleanup: {err}")),
            None => None,
        };

        let mut txn_err = None;
        if cleanup_err.is_none() {
            txn_err = self
                .transactions
                .delete(txn)
                .await
                .err()
                .map(|err| format!("unable to clean up volume transaction: {err}"));
        }

        if cleanup_err.is_none() && txn_err.is_none() {
            return original;
        }

        state.volumes.remove(volume.config.name.as_str());
        let mut errors = vec![original.to_string()];
        errors.extend(cleanup_err);
        errors.extend(txn_err);
        Error::RecoveryFailed { errors }
    }

    pub async fn get_volume(&self, volume_name: &str) -> Result<VolumeExternal> {
        let state = self.state.lock().await;
        state
            .volumes
            .get(volume_name)
            .map(Volume::to_external)
            .ok_or_else(|| Error::NotFound {
                kind: "volume",
                name: volume_name.to_string(),
            })
    }

    pub async fn list_volumes(&self) -> Vec<VolumeExternal> {
        let state = self.state.lock().await;
        state.volumes.values().map(Volume::to_external).collect()
    }

    /// Volumes hosted on backends whose driver carries the given name.
    pub async fn list_volumes_by_plugin(&self, plugin_name: &str) -> Vec<VolumeExternal> {
        let state = self.state.lock().await;
        let mut volumes = Vec::new();
        for backend in state.backends.values() {
            if backend.driver().name() != plugin_name {
                continue;
            }
            for pool in backend.pools.values() {
                for volume_name in &pool.volumes {
                    if let Some(volume) = state.volumes.get(volume_name) {
                        volumes.push(volume.to_external());
                    }
                }
            }
        }
        volumes
    }

    /// Delete a volume under a transaction so the deletion completes on
    /// retry or restart even if a step fails.
    pub async fn delete_volume(&self, volume_name: &str) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let volume = state
            .volumes
            .get(volume_name)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "volume",
                name: volume_name.to_string(),
            })?;

        let txn = VolumeTransaction {
            op: VolumeOperation::DeleteVolume,
            config: volume.config.clone(),
        };
        self.transactions.add(&txn).await?;

        // On failure the transaction stays behind; a retry or the next
        // bootstrap completes the deletion.
        self.delete_volume_locked(state, volume_name).await?;

        if self.transactions.delete(&txn).await.is_err() {
            warn!(
                "Unable to delete volume transaction for {}; repeat deletion to finalize",
                volume_name
            );
            state.volumes.insert(volume_name.to_string(), volume);
        }
        Ok(())
    }

    /// The full deletion sequence, without transaction handling. Callers
    /// hold the lock and own the transaction.
    async fn delete_volume_locked(
        &self,
        state: &mut CatalogState,
        volume_name: &str,
    ) -> Result<()> {
        let volume = state
            .volumes
            .get(volume_name)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "volume",
                name: volume_name.to_string(),
            })?;

        {
            let backend = state.backends.get_mut(&volume.backend).ok_or_else(|| {
                Error::Inconsistent(format!(
                    "volume {volume_name} references missing backend {}",
                    volume.backend
                ))
            })?;
            backend.remove_volume(&volume).await.map_err(|err| {
                error!(
                    "Unable to delete volume {} from backend {}: {}",
                    volume_name, volume.backend, err
                );
                err
            })?;
        }

        // The record may already be gone when this runs during recovery.
        self.store
            .delete_volume_ignore_not_found(volume_name)
            .await?;

        let offline_and_empty = state
            .backends
            .get(&volume.backend)
            .map(|backend| !backend.online && !backend.has_volumes())
            .unwrap_or(false);
        if offline_and_empty {
            self.store
                .delete_backend(&volume.backend)
                .await
                .map_err(|err| {
                    error!(
                        "Unable to delete offline backend {} after its last volume was deleted; \
                         delete the volume again to remove the backend",
                        volume.backend
                    );
                    err
                })?;
            state.backends.remove(&volume.backend);
            info!(
                "Removed offline backend {} after deleting its last volume",
                volume.backend
            );
        }

        state.volumes.remove(volume_name);
        Ok(())
    }

    // =========================================================================
    // Volume Projections
    // =========================================================================

    /// Driver name for a volume's backend, or "unknown" once the
    /// backend is gone.
    pub async fn get_driver_type_for_volume(&self, volume: &VolumeExternal) -> String {
        let state = self.state.lock().await;
        state
            .backends
            .get(&volume.backend)
            .map(|backend| backend.driver().name().to_string())
            .unwrap_or_else(|| UNKNOWN_DRIVER.to_string())
    }

    /// Driver-kind to volume-type projection.
    pub async fn get_volume_type(&self, volume: &VolumeExternal) -> VolumeType {
        let state = self.state.lock().await;
        state
            .backends
            .get(&volume.backend)
            .map(|backend| drivers::volume_type_for_driver(backend.driver().name()))
            .unwrap_or(VolumeType::Unknown)
    }
}

// =============================================================================
// Validation
// =============================================================================

/// A backend resubmitted under an existing name must keep its protocol,
/// keep every pool that hosts volumes, and keep those pools acceptable
/// to the storage classes that placed volumes there.
fn validate_backend_update(
    original: &Backend,
    updated: &Backend,
    storage_classes: &BTreeMap<String, StorageClass>,
    volumes: &BTreeMap<String, Volume>,
) -> Result<()> {
    let mut reasons = Vec::new();

    if original.protocol() != updated.protocol() {
        reasons.push("cannot change backend protocol".to_string());
    }

    for (pool_name, pool) in &original.pools {
        if !pool.volumes.is_empty() && !updated.pools.contains_key(pool_name) {
            reasons.push(format!(
                "in-use storage pool {pool_name} not present in updated backend"
            ));
        }
    }

    // Only the storage classes actually in use on this backend matter.
    let mut pools_for_class: BTreeMap<&str, BTreeSet<&String>> = BTreeMap::new();
    for (pool_name, pool) in &original.pools {
        for volume_name in &pool.volumes {
            if let Some(volume) = volumes.get(volume_name) {
                pools_for_class
                    .entry(volume.config.storage_class.as_str())
                    .or_default()
                    .insert(pool_name);
            }
        }
    }
    for (class_name, pool_names) in pools_for_class {
        let Some(storage_class) = storage_classes.get(class_name) else {
            continue;
        };
        for pool_name in pool_names {
            if let Some(updated_pool) = updated.pools.get(pool_name) {
                if !storage_class.matches(updated_pool) {
                    reasons.push(format!(
                        "storage pool {pool_name} has volumes with storage class {class_name}, \
                         but it no longer satisfies that storage class"
                    ));
                }
            }
        }
    }

    if reasons.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidUpdate {
            backend: updated.name.clone(),
            reasons,
        })
    }
}

fn tolerate_missing_key(result: Result<()>, what: &str) -> Result<()> {
    match result {
        Err(Error::Store(StoreError::KeyNotFound { key })) => {
            warn!(
                "Unable to find key {} while loading {}; continuing bootstrap, but consider \
                 checking store integrity if this installation is not new",
                key, what
            );
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::placement::SequentialOrder;
    use crate::domain::types::AccessMode;
    use crate::persistence::MemoryStore;
    use crate::storage::attributes::AttributeMatch;
    use crate::storage::drivers::mock;

    // -------------------------------------------------------------------------
    // Fixtures
    // -------------------------------------------------------------------------

    fn mock_backend_json(name: &str, protocol: &str, pools: &[&str]) -> String {
        let pool_entries = pools
            .iter()
            .map(|pool| format!(r#""{pool}": {{"media": "ssd"}}"#))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            r#"{{
                "storageDriverName": "mock",
                "backendName": "{name}",
                "pools": {{{pool_entries}}},
                "parameters": {{"protocol": "{protocol}"}}
            }}"#
        )
    }

    fn ssd_class_config(name: &str) -> StorageClassConfig {
        StorageClassConfig {
            version: String::new(),
            name: name.into(),
            attributes: BTreeMap::from([(
                "media".to_string(),
                AttributeMatch::Equals("ssd".into()),
            )]),
        }
    }

    fn volume_config(name: &str, class: &str) -> VolumeConfig {
        VolumeConfig {
            version: String::new(),
            name: name.into(),
            size: "1Gi".into(),
            storage_class: class.into(),
            protocol: Protocol::Any,
            access_mode: AccessMode::ReadWriteOnce,
            snapshot_policy: None,
            export_policy: None,
            unix_permissions: None,
        }
    }

    async fn bootstrapped(store: &Arc<MemoryStore>) -> Arc<Orchestrator> {
        let orchestrator =
            Orchestrator::with_placement_order(store.clone(), Arc::new(SequentialOrder));
        orchestrator.bootstrap().await.unwrap();
        orchestrator
    }

    /// Orchestrator with one mock backend and one matching class.
    async fn simple_fleet(
        store: &Arc<MemoryStore>,
        backend: &str,
        class: &str,
    ) -> Arc<Orchestrator> {
        let orchestrator = bootstrapped(store).await;
        orchestrator
            .add_storage_backend(&mock_backend_json(backend, "block", &["p1"]))
            .await
            .unwrap();
        orchestrator
            .add_storage_class(ssd_class_config(class))
            .await
            .unwrap();
        orchestrator
    }

    // -------------------------------------------------------------------------
    // Volume Creation
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_happy_add_creates_volume_and_clears_transaction() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = simple_fleet(&store, "orch-happy-b1", "gold").await;

        let external = orchestrator
            .add_volume(volume_config("v1", "gold"))
            .await
            .unwrap();
        assert_eq!(external.backend, "orch-happy-b1");
        assert_eq!(external.pool, "p1");
        // The version is stamped and the unconstrained protocol resolved.
        assert_eq!(external.config.version, ORCHESTRATOR_MAJOR_VERSION);
        assert_eq!(external.config.protocol, Protocol::Block);

        assert_eq!(store.get_volumes().await.unwrap().len(), 1);
        assert!(store.get_volume_transactions().await.unwrap().is_empty());
        assert!(mock::array("orch-happy-b1").has_volume("orch-happy-b1-v1"));

        let fetched = orchestrator.get_volume("v1").await.unwrap();
        assert_eq!(fetched.backend, "orch-happy-b1");
    }

    #[tokio::test]
    async fn test_add_volume_rejects_duplicate_name() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = simple_fleet(&store, "orch-dup-b1", "gold").await;

        orchestrator
            .add_volume(volume_config("v1", "gold"))
            .await
            .unwrap();
        let err = orchestrator
            .add_volume(volume_config("v1", "gold"))
            .await
            .unwrap_err();
        assert!(err.is_exists());
    }

    #[tokio::test]
    async fn test_add_volume_unknown_storage_class() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = simple_fleet(&store, "orch-noclass-b1", "gold").await;

        let err = orchestrator
            .add_volume(volume_config("v1", "platinum"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_shared_access_mode_needs_file_protocol() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = simple_fleet(&store, "orch-rwx-b1", "gold").await;

        // Protocol "any" + many-writer access resolves to file, and the
        // fleet is block-only.
        let mut config = volume_config("v1", "gold");
        config.access_mode = AccessMode::ReadWriteMany;
        let err = orchestrator.add_volume(config).await.unwrap_err();
        assert!(matches!(
            err,
            Error::NoBackend {
                protocol: Protocol::File,
                ..
            }
        ));
        assert!(store.get_volume_transactions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_all_backends_failed_aggregates_messages() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = bootstrapped(&store).await;
        for name in ["orch-agg-b1", "orch-agg-b2"] {
            orchestrator
                .add_storage_backend(&mock_backend_json(name, "block", &["p1"]))
                .await
                .unwrap();
            mock::array(name).set_fail_creates(true);
        }
        orchestrator
            .add_storage_class(ssd_class_config("gold"))
            .await
            .unwrap();

        let err = orchestrator
            .add_volume(volume_config("v1", "gold"))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("orch-agg-b1"));
        assert!(message.contains("orch-agg-b2"));

        // No volume and no transaction remain anywhere.
        assert!(orchestrator.get_volume("v1").await.is_err());
        assert!(store.get_volumes().await.unwrap().is_empty());
        assert!(store.get_volume_transactions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recovery_after_store_write_failure() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = simple_fleet(&store, "orch-crash-b1", "gold").await;

        // The backend create succeeds, then the store write fails.
        store.fail_operation("add_volume");
        let err = orchestrator
            .add_volume(volume_config("v1", "gold"))
            .await
            .unwrap_err();
        assert!(err.is_store());

        // Recovery removed the backend-side volume and the transaction.
        let array = mock::array("orch-crash-b1");
        assert!(!array.has_volume("orch-crash-b1-v1"));
        assert!(array
            .destroyed_names()
            .contains(&"orch-crash-b1-v1".to_string()));
        assert!(store.get_volume_transactions().await.unwrap().is_empty());
        assert!(orchestrator.get_volume("v1").await.is_err());

        // A retry under the same name succeeds.
        store.clear_failures();
        orchestrator
            .add_volume(volume_config("v1", "gold"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stale_add_transaction_rolled_back_on_retry() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = simple_fleet(&store, "orch-stale-b1", "gold").await;

        // A transaction without a volume simulates a crash right after
        // the transaction write.
        let stale = VolumeTransaction {
            op: VolumeOperation::AddVolume,
            config: volume_config("v1", "gold"),
        };
        store.add_volume_transaction(&stale).await.unwrap();

        orchestrator
            .add_volume(volume_config("v1", "gold"))
            .await
            .unwrap();

        // The rollback destroyed the possibly-leaked name before the
        // fresh create.
        let destroyed = mock::array("orch-stale-b1").destroyed_names();
        assert!(destroyed.contains(&"orch-stale-b1-v1".to_string()));
        assert_eq!(store.get_volumes().await.unwrap().len(), 1);
        assert!(store.get_volume_transactions().await.unwrap().is_empty());
    }

    // -------------------------------------------------------------------------
    // Volume Deletion
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_add_then_delete_returns_to_prior_state() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = simple_fleet(&store, "orch-roundtrip-b1", "gold").await;

        orchestrator
            .add_volume(volume_config("v1", "gold"))
            .await
            .unwrap();
        orchestrator.delete_volume("v1").await.unwrap();

        assert!(orchestrator.list_volumes().await.is_empty());
        assert!(store.get_volumes().await.unwrap().is_empty());
        assert!(store.get_volume_transactions().await.unwrap().is_empty());
        assert!(!mock::array("orch-roundtrip-b1").has_volume("orch-roundtrip-b1-v1"));

        let backend = orchestrator.get_backend("orch-roundtrip-b1").await.unwrap();
        assert!(backend.pools["p1"].volumes.is_empty());
    }

    #[tokio::test]
    async fn test_delete_volume_not_found() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = bootstrapped(&store).await;
        assert!(orchestrator.delete_volume("ghost").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_volume_keeps_transaction_on_backend_failure() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = simple_fleet(&store, "orch-deletefail-b1", "gold").await;
        orchestrator
            .add_volume(volume_config("v1", "gold"))
            .await
            .unwrap();

        let array = mock::array("orch-deletefail-b1");
        array.set_fail_destroys(true);
        assert!(orchestrator.delete_volume("v1").await.is_err());

        // The transaction stays for a later retry, and the volume is
        // still tracked.
        assert_eq!(store.get_volume_transactions().await.unwrap().len(), 1);
        assert!(orchestrator.get_volume("v1").await.is_ok());

        array.set_fail_destroys(false);
        orchestrator.delete_volume("v1").await.unwrap();
        assert!(store.get_volume_transactions().await.unwrap().is_empty());
        assert!(orchestrator.get_volume("v1").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_last_volume_removes_offline_backend() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = simple_fleet(&store, "orch-offdel-b1", "gold").await;
        orchestrator
            .add_volume(volume_config("v1", "gold"))
            .await
            .unwrap();

        orchestrator.offline_backend("orch-offdel-b1").await.unwrap();
        // Still present while it hosts a volume.
        assert!(orchestrator.get_backend("orch-offdel-b1").await.is_ok());

        orchestrator.delete_volume("v1").await.unwrap();
        assert!(orchestrator.get_backend("orch-offdel-b1").await.is_err());
        assert!(store.get_backends().await.unwrap().is_empty());
    }

    // -------------------------------------------------------------------------
    // Backends
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_list_backends_excludes_offline() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = simple_fleet(&store, "orch-list-b1", "gold").await;
        orchestrator
            .add_storage_backend(&mock_backend_json("orch-list-b2", "block", &["p1"]))
            .await
            .unwrap();
        orchestrator
            .add_volume(volume_config("v1", "gold"))
            .await
            .unwrap();

        orchestrator.offline_backend("orch-list-b1").await.unwrap();
        let online: Vec<String> = orchestrator
            .list_backends()
            .await
            .into_iter()
            .map(|backend| backend.name)
            .collect();
        assert_eq!(online, vec!["orch-list-b2"]);

        // Offline backends no longer receive placements; the surviving
        // backend picks up the volume.
        let placed = orchestrator
            .add_volume(volume_config("v2", "gold"))
            .await
            .unwrap();
        assert_eq!(placed.backend, "orch-list-b2");
    }

    #[tokio::test]
    async fn test_offline_backend_without_volumes_is_deleted() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = simple_fleet(&store, "orch-offempty-b1", "gold").await;

        orchestrator.offline_backend("orch-offempty-b1").await.unwrap();
        assert!(orchestrator.get_backend("orch-offempty-b1").await.is_err());
        assert!(store.get_backends().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_backend_with_volumes_persists_offline() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = simple_fleet(&store, "orch-offkeep-b1", "gold").await;
        orchestrator
            .add_volume(volume_config("v1", "gold"))
            .await
            .unwrap();

        orchestrator.offline_backend("orch-offkeep-b1").await.unwrap();
        let records = store.get_backends().await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].online);

        // The class dropped the backend's pools on both sides.
        let class = orchestrator.get_storage_class("gold").await.unwrap();
        assert!(class.storage_pools.is_empty());
        let backend = orchestrator.get_backend("orch-offkeep-b1").await.unwrap();
        assert!(backend.pools["p1"].storage_classes.is_empty());
    }

    #[tokio::test]
    async fn test_backend_update_rejects_dropped_pool() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = bootstrapped(&store).await;
        orchestrator
            .add_storage_backend(
                r#"{
                    "storageDriverName": "mock",
                    "backendName": "orch-droppool-b1",
                    "pools": {"a": {"media": "ssd"}, "b": {"media": "hdd"}}
                }"#,
            )
            .await
            .unwrap();
        orchestrator
            .add_storage_class(ssd_class_config("gold"))
            .await
            .unwrap();
        let placed = orchestrator
            .add_volume(volume_config("v1", "gold"))
            .await
            .unwrap();
        assert_eq!(placed.pool, "a");

        // Dropping the in-use pool "a" must be rejected.
        let err = orchestrator
            .add_storage_backend(
                r#"{
                    "storageDriverName": "mock",
                    "backendName": "orch-droppool-b1",
                    "pools": {"b": {"media": "hdd"}}
                }"#,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUpdate { .. }));
        assert!(err.to_string().contains("in-use storage pool a"));

        // Catalog unchanged.
        let backend = orchestrator.get_backend("orch-droppool-b1").await.unwrap();
        assert!(backend.pools.contains_key("a"));
        assert!(orchestrator.get_volume("v1").await.is_ok());
    }

    #[tokio::test]
    async fn test_backend_update_rejects_protocol_change() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = bootstrapped(&store).await;
        orchestrator
            .add_storage_backend(&mock_backend_json("orch-proto-b1", "block", &["p1"]))
            .await
            .unwrap();

        let err = orchestrator
            .add_storage_backend(&mock_backend_json("orch-proto-b1", "file", &["p1"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot change backend protocol"));
    }

    #[tokio::test]
    async fn test_backend_update_rejects_pool_no_longer_matching_class() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = simple_fleet(&store, "orch-demote-b1", "gold").await;
        orchestrator
            .add_volume(volume_config("v1", "gold"))
            .await
            .unwrap();

        // The surviving pool p1 no longer satisfies "gold".
        let err = orchestrator
            .add_storage_backend(
                r#"{
                    "storageDriverName": "mock",
                    "backendName": "orch-demote-b1",
                    "pools": {"p1": {"media": "hdd"}}
                }"#,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no longer satisfies"));
    }

    #[tokio::test]
    async fn test_backend_update_rebinds_volumes() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = simple_fleet(&store, "orch-rebind-b1", "gold").await;
        orchestrator
            .add_volume(volume_config("v1", "gold"))
            .await
            .unwrap();

        // Same pool plus a new one; the update must carry the volume
        // over to the new pool objects.
        orchestrator
            .add_storage_backend(
                r#"{
                    "storageDriverName": "mock",
                    "backendName": "orch-rebind-b1",
                    "pools": {"p1": {"media": "ssd"}, "p2": {"media": "ssd"}}
                }"#,
            )
            .await
            .unwrap();

        let backend = orchestrator.get_backend("orch-rebind-b1").await.unwrap();
        assert!(backend.pools["p1"].volumes.contains(&"v1".to_string()));
        assert_eq!(backend.pools.len(), 2);

        // Class membership was recomputed over the new pools.
        let class = orchestrator.get_storage_class("gold").await.unwrap();
        assert_eq!(class.storage_pools["orch-rebind-b1"].len(), 2);

        // The volume remains fully operable.
        orchestrator.delete_volume("v1").await.unwrap();
    }

    // -------------------------------------------------------------------------
    // Storage Classes
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_add_storage_class_duplicate() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = bootstrapped(&store).await;
        orchestrator
            .add_storage_class(ssd_class_config("gold"))
            .await
            .unwrap();
        let err = orchestrator
            .add_storage_class(ssd_class_config("gold"))
            .await
            .unwrap_err();
        assert!(err.is_exists());
    }

    #[tokio::test]
    async fn test_add_storage_class_persists_before_memory() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = bootstrapped(&store).await;

        store.fail_operation("add_storage_class");
        assert!(orchestrator
            .add_storage_class(ssd_class_config("gold"))
            .await
            .is_err());
        assert!(orchestrator.get_storage_class("gold").await.is_err());

        store.clear_failures();
        orchestrator
            .add_storage_class(ssd_class_config("gold"))
            .await
            .unwrap();
        assert_eq!(store.get_storage_classes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_storage_class_tolerates_referencing_volumes() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = simple_fleet(&store, "orch-scdel-b1", "gold").await;
        orchestrator
            .add_volume(volume_config("v1", "gold"))
            .await
            .unwrap();

        orchestrator.delete_storage_class("gold").await.unwrap();
        assert!(orchestrator.get_storage_class("gold").await.is_err());
        assert!(store.get_storage_classes().await.unwrap().is_empty());

        // The volume stays and keeps naming the deleted class.
        let volume = orchestrator.get_volume("v1").await.unwrap();
        assert_eq!(volume.config.storage_class, "gold");

        // The backend's pool dropped its membership mark.
        let backend = orchestrator.get_backend("orch-scdel-b1").await.unwrap();
        assert!(backend.pools["p1"].storage_classes.is_empty());
    }

    // -------------------------------------------------------------------------
    // Bootstrap
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_bootstrap_restores_catalog() {
        let store = Arc::new(MemoryStore::new());
        {
            let orchestrator = simple_fleet(&store, "orch-boot-b1", "gold").await;
            orchestrator
                .add_volume(volume_config("v1", "gold"))
                .await
                .unwrap();
        }

        let restarted = bootstrapped(&store).await;
        let backend = restarted.get_backend("orch-boot-b1").await.unwrap();
        assert!(backend.online);
        assert!(backend.pools["p1"].volumes.contains(&"v1".to_string()));

        let volume = restarted.get_volume("v1").await.unwrap();
        assert_eq!(volume.backend, "orch-boot-b1");

        let class = restarted.get_storage_class("gold").await.unwrap();
        assert_eq!(class.storage_pools["orch-boot-b1"], vec!["p1"]);
    }

    #[tokio::test]
    async fn test_bootstrap_restores_offline_flag() {
        let store = Arc::new(MemoryStore::new());
        {
            let orchestrator = simple_fleet(&store, "orch-bootoff-b1", "gold").await;
            orchestrator
                .add_volume(volume_config("v1", "gold"))
                .await
                .unwrap();
            orchestrator.offline_backend("orch-bootoff-b1").await.unwrap();
        }

        let restarted = bootstrapped(&store).await;
        let backend = restarted.get_backend("orch-bootoff-b1").await.unwrap();
        assert!(!backend.online);
        assert!(restarted.list_backends().await.is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = simple_fleet(&store, "orch-bootid-b1", "gold").await;
        orchestrator
            .add_volume(volume_config("v1", "gold"))
            .await
            .unwrap();

        let restarted = bootstrapped(&store).await;
        restarted.bootstrap().await.unwrap();

        assert_eq!(restarted.list_volumes().await.len(), 1);
        assert_eq!(restarted.list_backends().await.len(), 1);
        let backend = restarted.get_backend("orch-bootid-b1").await.unwrap();
        assert_eq!(
            backend.pools["p1"].volumes,
            vec!["v1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_bootstrap_replays_add_transaction() {
        let store = Arc::new(MemoryStore::new());
        {
            simple_fleet(&store, "orch-replay-b1", "gold").await;
        }

        // A stale create intent with no corresponding volume.
        let stale = VolumeTransaction {
            op: VolumeOperation::AddVolume,
            config: volume_config("v2", "gold"),
        };
        store.add_volume_transaction(&stale).await.unwrap();

        let restarted = bootstrapped(&store).await;
        assert!(restarted.get_volume("v2").await.is_err());
        assert!(store.get_volume_transactions().await.unwrap().is_empty());
        assert!(mock::array("orch-replay-b1")
            .destroyed_names()
            .contains(&"orch-replay-b1-v2".to_string()));

        // Replaying the same transaction again changes nothing.
        store.add_volume_transaction(&stale).await.unwrap();
        let again = bootstrapped(&store).await;
        assert!(again.get_volume("v2").await.is_err());
        assert!(store.get_volume_transactions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_replays_delete_transaction() {
        let store = Arc::new(MemoryStore::new());
        {
            let orchestrator = simple_fleet(&store, "orch-delreplay-b1", "gold").await;
            orchestrator
                .add_volume(volume_config("v1", "gold"))
                .await
                .unwrap();
        }

        // A delete that crashed after the transaction write: the volume
        // is still everywhere.
        let stale = VolumeTransaction {
            op: VolumeOperation::DeleteVolume,
            config: volume_config("v1", "gold"),
        };
        store.add_volume_transaction(&stale).await.unwrap();

        let restarted = bootstrapped(&store).await;
        assert!(restarted.get_volume("v1").await.is_err());
        assert!(store.get_volumes().await.unwrap().is_empty());
        assert!(store.get_volume_transactions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_fails_on_missing_backend_for_volume() {
        let store = Arc::new(MemoryStore::new());
        let volume = Volume::new(volume_config("v1", "gold"), "ghost", "p1");
        store.add_volume(&volume.to_record()).await.unwrap();

        let orchestrator =
            Orchestrator::with_placement_order(store.clone(), Arc::new(SequentialOrder));
        let err = orchestrator.bootstrap().await.unwrap_err();
        assert!(matches!(err, Error::Inconsistent(_)));
    }

    #[tokio::test]
    async fn test_bootstrap_tolerates_missing_keys() {
        let store = Arc::new(MemoryStore::new());
        store.fail_operation_with_key_not_found("get_storage_classes");

        let orchestrator =
            Orchestrator::with_placement_order(store.clone(), Arc::new(SequentialOrder));
        orchestrator.bootstrap().await.unwrap();
    }

    #[tokio::test]
    async fn test_bootstrap_aborts_on_store_failure() {
        let store = Arc::new(MemoryStore::new());
        store.fail_operation("get_volumes");

        let orchestrator =
            Orchestrator::with_placement_order(store.clone(), Arc::new(SequentialOrder));
        assert!(orchestrator.bootstrap().await.is_err());
    }

    #[tokio::test]
    async fn test_bootstrap_retries_deadline_exceeded() {
        let store = Arc::new(MemoryStore::new());
        {
            simple_fleet(&store, "orch-retry-b1", "gold").await;
        }

        store.set_deadline_rounds(1);
        let restarted = bootstrapped(&store).await;
        assert!(restarted.get_backend("orch-retry-b1").await.is_ok());
    }

    #[tokio::test]
    async fn test_bootstrap_collects_offline_empty_backends() {
        let store = Arc::new(MemoryStore::new());
        {
            simple_fleet(&store, "orch-gc-b1", "gold").await;
        }

        // Simulate a crash between offline and delete by flipping the
        // persisted record.
        let mut record = store.get_backends().await.unwrap().remove(0);
        record.online = false;
        store.update_backend(&record).await.unwrap();

        let restarted = bootstrapped(&store).await;
        assert!(restarted.get_backend("orch-gc-b1").await.is_err());
        assert!(store.get_backends().await.unwrap().is_empty());
    }

    // -------------------------------------------------------------------------
    // Projections
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_driver_type_and_volume_type_lookup() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = bootstrapped(&store).await;
        orchestrator
            .add_storage_backend(
                r#"{
                    "storageDriverName": "mayastor",
                    "backendName": "orch-types-b1",
                    "pools": {"p1": {"media": "ssd"}}
                }"#,
            )
            .await
            .unwrap();
        orchestrator
            .add_storage_class(ssd_class_config("gold"))
            .await
            .unwrap();
        let volume = orchestrator
            .add_volume(volume_config("v1", "gold"))
            .await
            .unwrap();

        assert_eq!(
            orchestrator.get_driver_type_for_volume(&volume).await,
            "mayastor"
        );
        assert_eq!(
            orchestrator.get_volume_type(&volume).await,
            VolumeType::BlockNvmf
        );

        // A volume whose backend is gone projects as unknown.
        let mut orphan = volume.clone();
        orphan.backend = "ghost".into();
        assert_eq!(
            orchestrator.get_driver_type_for_volume(&orphan).await,
            UNKNOWN_DRIVER
        );
        assert_eq!(
            orchestrator.get_volume_type(&orphan).await,
            VolumeType::Unknown
        );
    }

    #[tokio::test]
    async fn test_list_volumes_by_plugin() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = simple_fleet(&store, "orch-plugin-b1", "gold").await;
        orchestrator
            .add_volume(volume_config("v1", "gold"))
            .await
            .unwrap();

        let mock_volumes = orchestrator.list_volumes_by_plugin("mock").await;
        assert_eq!(mock_volumes.len(), 1);
        assert_eq!(mock_volumes[0].config.name, "v1");

        assert!(orchestrator
            .list_volumes_by_plugin("mayastor")
            .await
            .is_empty());
    }
}
