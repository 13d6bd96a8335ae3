//! Volume Orchestrator - Unified Storage Control Plane
//!
//! A storage orchestrator that provisions, tracks, and deletes volumes
//! across a heterogeneous fleet of storage backends on behalf of
//! external consumers (container platforms and CLI clients).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Frontends (REST)                        │
//! └────────────────────────────────┬────────────────────────────────┘
//!                                  │
//! ┌────────────────────────────────┴────────────────────────────────┐
//! │                       Orchestrator Core                         │
//! │   backend registry · storage classes · volume catalog           │
//! │   placement engine · transaction log · bootstrap recovery       │
//! └───────────────┬────────────────────────────────┬────────────────┘
//!                 │                                │
//! ┌───────────────┴───────────────┐ ┌──────────────┴────────────────┐
//! │        Backend Drivers        │ │       Persistent Store        │
//! │  Mayastor (block) · SeaweedFS │ │     memory · JSON file        │
//! │        (file) · mock          │ │                               │
//! └───────────────────────────────┘ └───────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`core`]: orchestrator state machine, placement, transactions, bootstrap
//! - [`storage`]: backends, pools, volumes, and driver adapters
//! - [`storage_class`]: storage classes and pool predicates
//! - [`persistence`]: persistent store port and implementations
//! - [`api`]: REST frontend
//! - [`domain`]: shared types and ports
//! - [`error`]: error types and handling

pub mod api;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod storage;
pub mod storage_class;

// Re-export commonly used types
pub use api::{ApiServer, ApiServerConfig};
pub use core::{Orchestrator, PermutationSource, SequentialOrder, WallClockShuffle};
pub use domain::ports::{BackendDriver, BackendDriverRef, FrontendPlugin, FrontendPluginRef};
pub use domain::types::{AccessMode, Protocol, VolumeType};
pub use error::{Error, Result};
pub use persistence::{FileStore, MemoryStore, PersistentStore, StoreError, VolumeTransaction};
pub use storage::{
    Backend, BackendDefinition, BackendExternal, Pool, PoolExternal, Volume, VolumeConfig,
    VolumeExternal,
};
pub use storage_class::{StorageClass, StorageClassConfig, StorageClassExternal};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
