//! Backend driver adapters.
//!
//! Provides drivers for the supported array types:
//! - Mayastor: block storage
//! - SeaweedFS: file storage
//! - Mock: in-memory array for tests and standalone runs

pub mod mayastor;
pub mod mock;
pub mod seaweedfs;

pub use mayastor::MayastorDriver;
pub use mock::MockDriver;
pub use seaweedfs::SeaweedFsDriver;

use crate::domain::ports::BackendDriverRef;
use crate::domain::types::VolumeType;
use crate::error::{Error, Result};
use crate::storage::backend::BackendDefinition;
use std::sync::Arc;

pub const MAYASTOR_DRIVER: &str = "mayastor";
pub const SEAWEEDFS_DRIVER: &str = "seaweedfs";
pub const MOCK_DRIVER: &str = "mock";

/// Create the driver a backend definition names.
pub fn new_driver_for_definition(definition: &BackendDefinition) -> Result<BackendDriverRef> {
    match definition.storage_driver_name.as_str() {
        MAYASTOR_DRIVER => Ok(Arc::new(MayastorDriver::new(definition))),
        SEAWEEDFS_DRIVER => Ok(Arc::new(SeaweedFsDriver::new(definition))),
        MOCK_DRIVER => Ok(Arc::new(MockDriver::new(definition)?)),
        other => Err(Error::Configuration(format!(
            "unknown storage driver {other}"
        ))),
    }
}

/// Driver-kind to volume-type lookup.
pub fn volume_type_for_driver(driver_name: &str) -> VolumeType {
    match driver_name {
        MAYASTOR_DRIVER => VolumeType::BlockNvmf,
        SEAWEEDFS_DRIVER => VolumeType::FileNfs,
        _ => VolumeType::Unknown,
    }
}

/// Parse a capacity string ("1Gi", "512Mi", bare bytes) into bytes.
pub fn parse_capacity(size: &str) -> Result<u64> {
    let size = size.trim();
    let (digits, multiplier) = match size {
        s if s.ends_with("Ki") => (&s[..s.len() - 2], 1u64 << 10),
        s if s.ends_with("Mi") => (&s[..s.len() - 2], 1u64 << 20),
        s if s.ends_with("Gi") => (&s[..s.len() - 2], 1u64 << 30),
        s if s.ends_with("Ti") => (&s[..s.len() - 2], 1u64 << 40),
        s => (s, 1u64),
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| Error::CapacityParse(size.to_string()))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| Error::CapacityParse(size.to_string()))
}

/// Default internal-name prefix for a backend. Prefixing with the
/// backend name keeps internal names disjoint across the fleet.
pub(crate) fn default_storage_prefix(definition: &BackendDefinition) -> String {
    definition
        .storage_prefix
        .clone()
        .unwrap_or_else(|| format!("{}-", definition.name()))
}
