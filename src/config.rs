//! Orchestrator-wide constants.

use std::time::Duration;

/// Human-readable orchestrator name, used in logs and version reporting.
pub const ORCHESTRATOR_NAME: &str = "volume-orchestrator";

/// Full orchestrator version.
pub const ORCHESTRATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Major version stamped into every volume config at creation time.
pub const ORCHESTRATOR_MAJOR_VERSION: &str = "1";

/// Version field written into every persisted record, reserved for
/// future schema evolution.
pub const CONFIG_VERSION: &str = "1";

/// How many times bootstrap retries the initial backend fetch while the
/// persistent store reports deadline-exceeded.
pub const MAX_BOOTSTRAP_ATTEMPTS: u32 = 10;

/// Pause between bootstrap retries.
pub const BOOTSTRAP_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Driver name reported for volumes whose backend is no longer present.
pub const UNKNOWN_DRIVER: &str = "unknown";
