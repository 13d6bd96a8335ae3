//! Core domain vocabulary shared by every component.

use serde::{Deserialize, Serialize};

// =============================================================================
// Protocol
// =============================================================================

/// Coarse storage capability that gates volume placement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    File,
    Block,
    #[default]
    Any,
}

impl Protocol {
    /// Whether a backend carrying `self` can serve a request for `requested`.
    pub fn serves(&self, requested: Protocol) -> bool {
        matches!(requested, Protocol::Any) || *self == Protocol::Any || *self == requested
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::File => write!(f, "file"),
            Protocol::Block => write!(f, "block"),
            Protocol::Any => write!(f, "any"),
        }
    }
}

// =============================================================================
// Access Mode
// =============================================================================

/// Caller-stated sharing intent for a volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessMode {
    #[default]
    ReadWriteOnce,
    ReadOnlyMany,
    ReadWriteMany,
}

impl AccessMode {
    /// The protocol implied by this access mode when a request leaves the
    /// protocol unspecified. Single-writer volumes can land anywhere;
    /// shared volumes need a file protocol.
    pub fn effective_protocol(&self) -> Protocol {
        match self {
            AccessMode::ReadWriteOnce => Protocol::Any,
            AccessMode::ReadOnlyMany => Protocol::File,
            AccessMode::ReadWriteMany => Protocol::File,
        }
    }
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessMode::ReadWriteOnce => write!(f, "readWriteOnce"),
            AccessMode::ReadOnlyMany => write!(f, "readOnlyMany"),
            AccessMode::ReadWriteMany => write!(f, "readWriteMany"),
        }
    }
}

// =============================================================================
// Volume Type
// =============================================================================

/// The concrete flavour of a provisioned volume, derived from the driver
/// that hosts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeType {
    BlockNvmf,
    FileNfs,
    Unknown,
}

impl std::fmt::Display for VolumeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeType::BlockNvmf => write!(f, "block-nvmf"),
            VolumeType::FileNfs => write!(f, "file-nfs"),
            VolumeType::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_display() {
        assert_eq!(format!("{}", Protocol::File), "file");
        assert_eq!(format!("{}", Protocol::Block), "block");
        assert_eq!(format!("{}", Protocol::Any), "any");
    }

    #[test]
    fn test_protocol_serves() {
        assert!(Protocol::Block.serves(Protocol::Block));
        assert!(Protocol::Block.serves(Protocol::Any));
        assert!(Protocol::Any.serves(Protocol::File));
        assert!(!Protocol::Block.serves(Protocol::File));
    }

    #[test]
    fn test_effective_protocol() {
        assert_eq!(AccessMode::ReadWriteOnce.effective_protocol(), Protocol::Any);
        assert_eq!(AccessMode::ReadOnlyMany.effective_protocol(), Protocol::File);
        assert_eq!(AccessMode::ReadWriteMany.effective_protocol(), Protocol::File);
    }

    #[test]
    fn test_access_mode_serde() {
        let mode: AccessMode = serde_json::from_str("\"readWriteMany\"").unwrap();
        assert_eq!(mode, AccessMode::ReadWriteMany);
        assert_eq!(serde_json::to_string(&mode).unwrap(), "\"readWriteMany\"");
    }
}
