//! Mock backend driver.
//!
//! Simulates a storage array whose state survives orchestrator
//! restarts within a process: array state is keyed by backend name in
//! a process-wide registry, so a rebuilt backend (bootstrap, config
//! update) reattaches to the same simulated array. Tests use the
//! [`array`] handle to inject faults and observe destroy calls.

use crate::domain::ports::BackendDriver;
use crate::domain::types::Protocol;
use crate::error::{Error, Result};
use crate::storage::attributes::AttributeMatch;
use crate::storage::backend::BackendDefinition;
use crate::storage::drivers::{default_storage_prefix, MOCK_DRIVER};
use crate::storage::pool::Pool;
use crate::storage::volume::VolumeConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

// =============================================================================
// Simulated Array
// =============================================================================

/// State of one simulated array.
#[derive(Default)]
pub struct MockArray {
    /// When set, every create is rejected.
    pub fail_creates: AtomicBool,
    /// When set, every destroy is rejected.
    pub fail_destroys: AtomicBool,
    /// Internal names of volumes currently on the array.
    pub volumes: Mutex<BTreeSet<String>>,
    /// Every internal name a destroy was issued for, in order.
    pub destroyed: Mutex<Vec<String>>,
}

impl MockArray {
    pub fn set_fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_destroys(&self, fail: bool) {
        self.fail_destroys.store(fail, Ordering::SeqCst);
    }

    pub fn has_volume(&self, internal_name: &str) -> bool {
        self.volumes.lock().contains(internal_name)
    }

    pub fn destroyed_names(&self) -> Vec<String> {
        self.destroyed.lock().clone()
    }
}

static ARRAYS: OnceLock<Mutex<BTreeMap<String, Arc<MockArray>>>> = OnceLock::new();

/// Handle to the simulated array behind the named backend, creating it
/// on first use.
pub fn array(backend_name: &str) -> Arc<MockArray> {
    let arrays = ARRAYS.get_or_init(|| Mutex::new(BTreeMap::new()));
    arrays
        .lock()
        .entry(backend_name.to_string())
        .or_default()
        .clone()
}

// =============================================================================
// Mock Driver
// =============================================================================

/// Driver fronting a simulated array.
pub struct MockDriver {
    backend_name: String,
    prefix: String,
    protocol: Protocol,
    array: Arc<MockArray>,
}

impl MockDriver {
    /// The protocol is read from the definition's `protocol` parameter
    /// and defaults to block.
    pub fn new(definition: &BackendDefinition) -> Result<Self> {
        let protocol = match definition.parameters.get("protocol").map(String::as_str) {
            None | Some("block") => Protocol::Block,
            Some("file") => Protocol::File,
            Some(other) => {
                return Err(Error::Configuration(format!(
                    "mock driver protocol must be block or file, got {other}"
                )))
            }
        };
        Ok(Self {
            backend_name: definition.name().to_string(),
            prefix: default_storage_prefix(definition),
            protocol,
            array: array(definition.name()),
        })
    }
}

#[async_trait]
impl BackendDriver for MockDriver {
    fn name(&self) -> &str {
        MOCK_DRIVER
    }

    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn storage_prefix(&self) -> &str {
        &self.prefix
    }

    async fn create_volume(
        &self,
        internal_name: &str,
        _config: &VolumeConfig,
        _pool: &Pool,
        _class_attributes: &BTreeMap<String, AttributeMatch>,
    ) -> Result<()> {
        if self.array.fail_creates.load(Ordering::SeqCst) {
            return Err(Error::BackendFailed {
                backend: self.backend_name.clone(),
                reason: "injected create failure".into(),
            });
        }
        let mut volumes = self.array.volumes.lock();
        if !volumes.insert(internal_name.to_string()) {
            return Err(Error::BackendFailed {
                backend: self.backend_name.clone(),
                reason: format!("volume {internal_name} already present on array"),
            });
        }
        Ok(())
    }

    async fn destroy_volume(&self, internal_name: &str) -> Result<()> {
        if self.array.fail_destroys.load(Ordering::SeqCst) {
            return Err(Error::BackendFailed {
                backend: self.backend_name.clone(),
                reason: "injected destroy failure".into(),
            });
        }
        self.array.volumes.lock().remove(internal_name);
        self.array.destroyed.lock().push(internal_name.to_string());
        Ok(())
    }
}
