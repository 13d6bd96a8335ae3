//! Storage backends: a single array instance plus the driver that
//! fronts it.

use crate::config::CONFIG_VERSION;
use crate::domain::ports::BackendDriverRef;
use crate::domain::types::Protocol;
use crate::error::{Error, Result};
use crate::persistence::BackendRecord;
use crate::storage::attributes::{AttributeMatch, AttributeValue};
use crate::storage::drivers;
use crate::storage::pool::{Pool, PoolExternal};
use crate::storage::volume::{Volume, VolumeConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Backend Definition
// =============================================================================

/// Parsed backend configuration, as submitted by operators and as
/// persisted in the store. A backend re-marshals its definition during
/// bootstrap so the same add path handles fresh and restored backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendDefinition {
    #[serde(default = "default_definition_version")]
    pub version: u32,
    pub storage_driver_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_prefix: Option<String>,
    /// Pool name to capability attributes.
    #[serde(default)]
    pub pools: BTreeMap<String, BTreeMap<String, AttributeValue>>,
    /// Driver-specific settings, passed through opaquely.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

fn default_definition_version() -> u32 {
    1
}

impl BackendDefinition {
    /// Parse a JSON backend configuration.
    pub fn parse(config_json: &str) -> Result<Self> {
        let definition: BackendDefinition = serde_json::from_str(config_json)?;
        if definition.pools.is_empty() {
            return Err(Error::Configuration(format!(
                "backend {} declares no storage pools",
                definition.name()
            )));
        }
        Ok(definition)
    }

    /// The backend's unique name; defaults to the driver name.
    pub fn name(&self) -> &str {
        self.backend_name
            .as_deref()
            .unwrap_or(&self.storage_driver_name)
    }
}

// =============================================================================
// Backend
// =============================================================================

/// A single storage system instance; owns pools.
pub struct Backend {
    pub name: String,
    pub online: bool,
    pub pools: BTreeMap<String, Pool>,
    definition: BackendDefinition,
    driver: BackendDriverRef,
}

impl Backend {
    pub fn new(definition: BackendDefinition, driver: BackendDriverRef) -> Self {
        let pools = definition
            .pools
            .iter()
            .map(|(name, attributes)| (name.clone(), Pool::new(name, attributes.clone())))
            .collect();
        Self {
            name: definition.name().to_string(),
            online: true,
            pools,
            definition,
            driver,
        }
    }

    pub fn driver(&self) -> &BackendDriverRef {
        &self.driver
    }

    pub fn protocol(&self) -> Protocol {
        self.driver.protocol()
    }

    /// True iff any pool hosts at least one volume.
    pub fn has_volumes(&self) -> bool {
        self.pools.values().any(|pool| !pool.volumes.is_empty())
    }

    /// Serialize the definition this backend was built from.
    pub fn marshal_config(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.definition)?)
    }

    /// Create a volume on the named pool and register it there.
    pub async fn add_volume(
        &mut self,
        config: &VolumeConfig,
        pool_name: &str,
        class_attributes: &BTreeMap<String, AttributeMatch>,
    ) -> Result<Volume> {
        let pool = self.pools.get(pool_name).ok_or_else(|| Error::NotFound {
            kind: "storage pool",
            name: pool_name.to_string(),
        })?;

        let internal_name = self.driver.internal_volume_name(&config.name);
        self.driver
            .create_volume(&internal_name, config, pool, class_attributes)
            .await?;

        // Guaranteed present: looked up above and create_volume holds no
        // reference into the pool map.
        if let Some(pool) = self.pools.get_mut(pool_name) {
            pool.volumes.insert(config.name.clone());
        }

        Ok(Volume::new(config.clone(), self.name.clone(), pool_name))
    }

    /// Destroy a volume on the array and drop it from its pool.
    pub async fn remove_volume(&mut self, volume: &Volume) -> Result<()> {
        let internal_name = self.driver.internal_volume_name(&volume.config.name);
        self.driver.destroy_volume(&internal_name).await?;
        if let Some(pool) = self.pools.get_mut(&volume.pool) {
            pool.volumes.remove(&volume.config.name);
        }
        Ok(())
    }

    /// Persistent-store record for this backend.
    pub fn to_record(&self) -> Result<BackendRecord> {
        Ok(BackendRecord {
            version: CONFIG_VERSION.to_string(),
            name: self.name.clone(),
            config: serde_json::to_value(&self.definition)?,
            online: self.online,
        })
    }

    /// Snapshot for external callers.
    pub fn to_external(&self) -> BackendExternal {
        BackendExternal {
            name: self.name.clone(),
            driver: self.driver.name().to_string(),
            protocol: self.protocol(),
            online: self.online,
            pools: self
                .pools
                .values()
                .map(|pool| (pool.name.clone(), pool.to_external()))
                .collect(),
        }
    }
}

/// Build a backend (driver included) from a JSON configuration.
pub fn new_backend_from_config(config_json: &str) -> Result<Backend> {
    let definition = BackendDefinition::parse(config_json)?;
    let driver = drivers::new_driver_for_definition(&definition)?;
    Ok(Backend::new(definition, driver))
}

/// Read-only snapshot of a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendExternal {
    pub name: String,
    pub driver: String,
    pub protocol: Protocol,
    pub online: bool,
    pub pools: BTreeMap<String, PoolExternal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::AccessMode;

    fn backend_json(name: &str) -> String {
        format!(
            r#"{{
                "storageDriverName": "mayastor",
                "backendName": "{name}",
                "pools": {{
                    "p1": {{"media": "ssd", "iops": 10000}},
                    "p2": {{"media": "hdd"}}
                }}
            }}"#
        )
    }

    fn volume_config(name: &str) -> VolumeConfig {
        VolumeConfig {
            version: String::new(),
            name: name.into(),
            size: "1Gi".into(),
            storage_class: "gold".into(),
            protocol: Protocol::Block,
            access_mode: AccessMode::ReadWriteOnce,
            snapshot_policy: None,
            export_policy: None,
            unix_permissions: None,
        }
    }

    #[test]
    fn test_parse_rejects_poolless_backend() {
        let err = BackendDefinition::parse(r#"{"storageDriverName": "mayastor"}"#).unwrap_err();
        assert!(err.to_string().contains("no storage pools"));
    }

    #[test]
    fn test_backend_name_defaults_to_driver() {
        let definition = BackendDefinition::parse(
            r#"{"storageDriverName": "mayastor", "pools": {"p1": {}}}"#,
        )
        .unwrap();
        assert_eq!(definition.name(), "mayastor");
    }

    #[test]
    fn test_marshal_config_round_trips() {
        let backend = new_backend_from_config(&backend_json("b1")).unwrap();
        let serialized = backend.marshal_config().unwrap();
        let reparsed = BackendDefinition::parse(&serialized).unwrap();
        assert_eq!(reparsed.name(), "b1");
        assert_eq!(reparsed.pools.len(), 2);
    }

    #[tokio::test]
    async fn test_add_and_remove_volume_updates_pool() {
        let mut backend = new_backend_from_config(&backend_json("backend-test-b1")).unwrap();
        assert!(!backend.has_volumes());

        let volume = backend
            .add_volume(&volume_config("v1"), "p1", &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(volume.backend, "backend-test-b1");
        assert_eq!(volume.pool, "p1");
        assert!(backend.has_volumes());
        assert!(backend.pools["p1"].volumes.contains("v1"));

        backend.remove_volume(&volume).await.unwrap();
        assert!(!backend.has_volumes());
    }

    #[tokio::test]
    async fn test_add_volume_to_unknown_pool_fails() {
        let mut backend = new_backend_from_config(&backend_json("backend-test-b2")).unwrap();
        let err = backend
            .add_volume(&volume_config("v1"), "nope", &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
