//! Domain Ports - Core trait definitions for the volume orchestrator
//!
//! These traits define the boundaries between the orchestrator core and
//! its external collaborators: the per-array backend drivers and the
//! frontend plugins that call in. Adapters implement these traits to
//! provide concrete functionality.

use crate::error::Result;
use crate::storage::attributes::AttributeMatch;
use crate::storage::pool::Pool;
use crate::storage::volume::VolumeConfig;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::types::Protocol;

// =============================================================================
// Backend Driver Port
// =============================================================================

/// Port for per-array volume operations.
///
/// One driver instance serves one backend. The driver owns the mapping
/// from orchestrator-level volume names to the names used on the array:
/// every backend carries a storage prefix, and prefixed names must be
/// disjoint across backends so that recovery can blindly destroy a
/// volume's internal name on every online backend.
#[async_trait]
pub trait BackendDriver: Send + Sync {
    /// Driver kind name (e.g. "mayastor").
    fn name(&self) -> &str;

    /// Protocol served by the array this driver fronts.
    fn protocol(&self) -> Protocol;

    /// Prefix applied to every volume name on the array.
    fn storage_prefix(&self) -> &str;

    /// The name of a volume as it appears on the array.
    fn internal_volume_name(&self, external: &str) -> String {
        format!("{}{}", self.storage_prefix(), external)
    }

    /// Create a volume on the array.
    async fn create_volume(
        &self,
        internal_name: &str,
        config: &VolumeConfig,
        pool: &Pool,
        class_attributes: &BTreeMap<String, AttributeMatch>,
    ) -> Result<()>;

    /// Destroy a volume on the array. Destroying a volume that does not
    /// exist must succeed; rollback relies on this.
    async fn destroy_volume(&self, internal_name: &str) -> Result<()>;
}

// =============================================================================
// Frontend Plugin Port
// =============================================================================

/// Port for external callers (container platforms, CLI servers) that
/// register with the orchestrator. The orchestrator holds these purely
/// as pass-through references.
#[async_trait]
pub trait FrontendPlugin: Send + Sync {
    /// Unique frontend name.
    fn name(&self) -> &str;

    /// Frontend version string.
    fn version(&self) -> &str;

    /// Start serving requests.
    async fn activate(&self) -> Result<()>;

    /// Stop serving requests.
    async fn deactivate(&self) -> Result<()>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type BackendDriverRef = Arc<dyn BackendDriver>;
pub type FrontendPluginRef = Arc<dyn FrontendPlugin>;
