//! SeaweedFS file storage driver.
//!
//! Fronts a SeaweedFS filer. This adapter tracks array state in memory;
//! a production build would call the filer HTTP API here.

use crate::domain::ports::BackendDriver;
use crate::domain::types::Protocol;
use crate::error::{Error, Result};
use crate::storage::attributes::AttributeMatch;
use crate::storage::backend::BackendDefinition;
use crate::storage::drivers::{default_storage_prefix, parse_capacity, SEAWEEDFS_DRIVER};
use crate::storage::pool::Pool;
use crate::storage::volume::VolumeConfig;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Driver for SeaweedFS file storage.
pub struct SeaweedFsDriver {
    backend_name: String,
    prefix: String,
    /// Filer path under which volume directories are created.
    root_path: String,
    /// Volumes present on the filer, internal name to size in bytes.
    volumes: RwLock<BTreeMap<String, u64>>,
}

impl SeaweedFsDriver {
    pub fn new(definition: &BackendDefinition) -> Self {
        let root_path = definition
            .parameters
            .get("rootPath")
            .cloned()
            .unwrap_or_else(|| "/volumes".to_string());
        Self {
            backend_name: definition.name().to_string(),
            prefix: default_storage_prefix(definition),
            root_path,
            volumes: RwLock::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl BackendDriver for SeaweedFsDriver {
    fn name(&self) -> &str {
        SEAWEEDFS_DRIVER
    }

    fn protocol(&self) -> Protocol {
        Protocol::File
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
                reason: format!("volume {internal_name} already present on filer"),
            });
        }
        volumes.insert(internal_name.to_string(), capacity_bytes);

        info!(
            "Created SeaweedFS volume {}/{} on pool {} ({} bytes)",
            self.root_path, internal_name, pool.name, capacity_bytes
        );
        Ok(())
    }

    async fn destroy_volume(&self, internal_name: &str) -> Result<()> {
        if self.volumes.write().remove(internal_name).is_some() {
            info!("Destroyed SeaweedFS volume {}/{}", self.root_path, internal_name);
        } else {
            debug!("SeaweedFS volume {} not on filer, nothing to destroy", internal_name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::AccessMode;

    #[tokio::test]
    async fn test_create_and_destroy() {
        let definition = BackendDefinition::parse(
            r#"{"storageDriverName": "seaweedfs", "backendName": "swb1", "pools": {"p1": {}}}"#,
        )
        .unwrap();
        let driver = SeaweedFsDriver::new(&definition);
        assert_eq!(driver.protocol(), Protocol::File);

        let config = VolumeConfig {
            version: String::new(),
            name: "v1".into(),
            size: "2Gi".into(),
            storage_class: "bronze".into(),
            protocol: Protocol::File,
            access_mode: AccessMode::ReadWriteMany,
            snapshot_policy: None,
            export_policy: None,
            unix_permissions: None,
        };
        let pool = Pool::new("p1", BTreeMap::new());
        let internal = driver.internal_volume_name("v1");
        assert_eq!(internal, "swb1-v1");

        driver
            .create_volume(&internal, &config, &pool, &BTreeMap::new())
            .await
            .unwrap();
        driver.destroy_volume(&internal).await.unwrap();
        driver.destroy_volume(&internal).await.unwrap();
    }
}
