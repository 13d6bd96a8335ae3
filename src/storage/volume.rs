//! Volumes and their caller-supplied configuration.

use crate::config::CONFIG_VERSION;
use crate::domain::types::{AccessMode, Protocol};
use crate::persistence::VolumeRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Volume Configuration
// =============================================================================

/// Caller-supplied description of a volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeConfig {
    /// Orchestrator major version stamped at creation time.
    #[serde(default)]
    pub version: String,
    pub name: String,
    /// Requested size, e.g. "1Gi".
    pub size: String,
    pub storage_class: String,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub access_mode: AccessMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unix_permissions: Option<String>,
}

// =============================================================================
// Volume
// =============================================================================

/// A provisioned unit of storage on one pool.
///
/// Volumes carry the names of their hosting backend and pool; the
/// backend registry owns the corresponding objects.
#[derive(Debug, Clone)]
pub struct Volume {
    pub config: VolumeConfig,
    pub backend: String,
    pub pool: String,
    pub created_at: DateTime<Utc>,
}

impl Volume {
    pub fn new(config: VolumeConfig, backend: impl Into<String>, pool: impl Into<String>) -> Self {
        Self {
            config,
            backend: backend.into(),
            pool: pool.into(),
            created_at: Utc::now(),
        }
    }

    /// Snapshot for external callers.
    pub fn to_external(&self) -> VolumeExternal {
        VolumeExternal {
            config: self.config.clone(),
            backend: self.backend.clone(),
            pool: self.pool.clone(),
            created_at: self.created_at,
        }
    }

    /// Persistent-store record for this volume.
    pub fn to_record(&self) -> VolumeRecord {
        VolumeRecord {
            version: CONFIG_VERSION.to_string(),
            config: self.config.clone(),
            backend: self.backend.clone(),
            pool: self.pool.clone(),
            created_at: self.created_at,
        }
    }

    /// Rebuild a volume from its persisted record.
    pub fn from_record(record: VolumeRecord) -> Self {
        Self {
            config: record.config,
            backend: record.backend,
            pool: record.pool,
            created_at: record.created_at,
        }
    }
}

/// Read-only snapshot of a volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeExternal {
    pub config: VolumeConfig,
    pub backend: String,
    pub pool: String,
    pub created_at: DateTime<Utc>,
}
