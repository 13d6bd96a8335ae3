//! Storage classes: named predicates over pool attributes.
//!
//! A storage class materializes, at runtime, the set of pools that
//! currently satisfy its predicate. Membership is recomputed whenever a
//! backend is added, updated, or taken offline. Classes are not
//! thread-safe; external callers only ever receive snapshots.

use crate::config::CONFIG_VERSION;
use crate::domain::types::Protocol;
use crate::persistence::StorageClassRecord;
use crate::storage::attributes::AttributeMatch;
use crate::storage::backend::Backend;
use crate::storage::pool::Pool;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// Configuration
// =============================================================================

/// Caller-supplied storage class definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageClassConfig {
    #[serde(default)]
    pub version: String,
    pub name: String,
    /// Predicate over pool attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeMatch>,
}

/// Reference to one pool on one backend.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolRef {
    pub backend: String,
    pub pool: String,
}

// =============================================================================
// Storage Class
// =============================================================================

/// A storage class plus its current pool membership.
#[derive(Debug, Clone)]
pub struct StorageClass {
    config: StorageClassConfig,
    pools: BTreeSet<PoolRef>,
}

impl StorageClass {
    pub fn new(config: StorageClassConfig) -> Self {
        Self {
            config,
            pools: BTreeSet::new(),
        }
    }

    pub fn from_record(record: StorageClassRecord) -> Self {
        Self::new(record.config)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeMatch> {
        &self.config.attributes
    }

    pub fn pool_refs(&self) -> impl Iterator<Item = &PoolRef> {
        self.pools.iter()
    }

    /// Predicate evaluation against a single pool.
    pub fn matches(&self, pool: &Pool) -> bool {
        self.config
            .attributes
            .iter()
            .all(|(key, matcher)| matcher.matches(pool.attributes.get(key)))
    }

    /// Add every matching pool of an online backend to the membership,
    /// recording the class name on the pool. Returns how many pools
    /// newly satisfied the class.
    pub fn check_and_add_backend(&mut self, backend: &mut Backend) -> usize {
        if !backend.online {
            return 0;
        }
        let mut added = 0;
        for pool in backend.pools.values_mut() {
            if !self.matches(pool) {
                continue;
            }
            let pool_ref = PoolRef {
                backend: backend.name.clone(),
                pool: pool.name.clone(),
            };
            if self.pools.insert(pool_ref) {
                added += 1;
            }
            pool.add_storage_class(&self.config.name);
        }
        added
    }

    /// Drop every pool of the named backend from the membership.
    pub fn remove_pools_for_backend(&mut self, backend_name: &str) {
        self.pools.retain(|pool_ref| pool_ref.backend != backend_name);
    }

    /// Current members whose backend serves the requested protocol.
    pub fn pools_for_protocol(
        &self,
        backends: &BTreeMap<String, Backend>,
        protocol: Protocol,
    ) -> Vec<PoolRef> {
        self.pools
            .iter()
            .filter(|pool_ref| {
                backends
                    .get(&pool_ref.backend)
                    .map(|backend| backend.protocol().serves(protocol))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Snapshot for external callers.
    pub fn to_external(&self) -> StorageClassExternal {
        let mut storage_pools: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for pool_ref in &self.pools {
            storage_pools
                .entry(pool_ref.backend.clone())
                .or_default()
                .push(pool_ref.pool.clone());
        }
        StorageClassExternal {
            config: self.config.clone(),
            storage_pools,
        }
    }

    /// Persistent-store record for this class. Membership is derived
    /// state and is never persisted.
    pub fn to_record(&self) -> StorageClassRecord {
        StorageClassRecord {
            version: CONFIG_VERSION.to_string(),
            config: self.config.clone(),
        }
    }
}

/// Read-only snapshot of a storage class: its config plus the pools
/// currently satisfying it, grouped by backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageClassExternal {
    pub config: StorageClassConfig,
    pub storage_pools: BTreeMap<String, Vec<String>>,
}
