//! Storage pools: provisionable slices of a backend with uniform
//! capability attributes.

use crate::storage::attributes::AttributeValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A provisionable slice of a backend.
///
/// Pools are created and destroyed together with their owning backend.
/// The volume set holds orchestrator-level volume names; the volume
/// catalog is the authoritative owner of volume state.
#[derive(Debug, Clone)]
pub struct Pool {
    pub name: String,
    /// Capability attributes advertised to storage classes.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Names of storage classes this pool currently satisfies.
    pub storage_classes: Vec<String>,
    /// Names of volumes hosted on this pool.
    pub volumes: BTreeSet<String>,
}

impl Pool {
    pub fn new(name: impl Into<String>, attributes: BTreeMap<String, AttributeValue>) -> Self {
        Self {
            name: name.into(),
            attributes,
            storage_classes: Vec::new(),
            volumes: BTreeSet::new(),
        }
    }

    /// Record membership in a storage class, once.
    pub fn add_storage_class(&mut self, name: &str) {
        if !self.storage_classes.iter().any(|sc| sc == name) {
            self.storage_classes.push(name.to_string());
        }
    }

    /// Snapshot for external callers.
    pub fn to_external(&self) -> PoolExternal {
        PoolExternal {
            name: self.name.clone(),
            attributes: self.attributes.clone(),
            storage_classes: self.storage_classes.clone(),
            volumes: self.volumes.iter().cloned().collect(),
        }
    }
}

/// Read-only snapshot of a pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolExternal {
    pub name: String,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub storage_classes: Vec<String>,
    pub volumes: Vec<String>,
}
