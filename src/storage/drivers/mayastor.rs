//! Mayastor block storage driver.
//!
//! Fronts an OpenEBS Mayastor deployment. This adapter tracks array
//! state in memory; a production build would talk to the Mayastor
//! control-plane REST API here.

use crate::domain::ports::BackendDriver;
use crate::domain::types::Protocol;
use crate::error::{Error, Result};
use crate::storage::attributes::AttributeMatch;
use crate::storage::backend::BackendDefinition;
use crate::storage::drivers::{default_storage_prefix, parse_capacity, MAYASTOR_DRIVER};
use crate::storage::pool::Pool;
use crate::storage::volume::VolumeConfig;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Driver for Mayastor block storage.
pub struct MayastorDriver {
    backend_name: String,
    prefix: String,
    /// Replication factor applied to every replica set.
    replicas: u32,
    /// Volumes present on the array, internal name to size in bytes.
    volumes: RwLock<BTreeMap<String, u64>>,
}

impl MayastorDriver {
    pub fn new(definition: &BackendDefinition) -> Self {
        let replicas = definition
            .parameters
            .get("replicas")
            .and_then(|r| r.parse().ok())
            .unwrap_or(3);
        Self {
            backend_name: definition.name().to_string(),
            prefix: default_storage_prefix(definition),
            replicas,
            volumes: RwLock::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl BackendDriver for MayastorDriver {
    fn name(&self) -> &str {
        MAYASTOR_DRIVER
    }

    fn protocol(&self) -> Protocol {
        Protocol::Block
    }

    fn storage_prefix(&self) -> &str {
        &self.prefix
    }

    async fn create_volume(
        &self,
        internal_name: &str,
        config: &VolumeConfig,
        pool: &Pool,
        _class_attributes: &BTreeMap<String, AttributeMatch>,
    ) -> Result<()> {
        let capacity_bytes = parse_capacity(&config.size)?;

        let mut volumes = self.volumes.write();
        if volumes.contains_key(internal_name) {
            return Err(Error::BackendFailed {
                backend: self.backend_name.clone(),
                reason: format!("volume {internal_name} already present on array"),
            });
        }
        volumes.insert(internal_name.to_string(), capacity_bytes);

        info!(
            "Created Mayastor volume {} on pool {} ({} bytes, {} replicas)",
            internal_name, pool.name, capacity_bytes, self.replicas
        );
        Ok(())
    }

    async fn destroy_volume(&self, internal_name: &str) -> Result<()> {
        // Destroy must succeed for volumes the array has never seen.
        if self.volumes.write().remove(internal_name).is_some() {
            info!("Destroyed Mayastor volume {}", internal_name);
        } else {
            debug!("Mayastor volume {} not on array, nothing to destroy", internal_name);
        }
        Ok(())
    }
}
