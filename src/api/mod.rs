//! REST frontend.
//!
//! A thin HTTP surface over the orchestrator's public operations. All
//! returned entities are snapshots; mutating them has no effect on
//! catalog state.

pub mod rest;
pub mod server;

pub use rest::RestRouter;
pub use server::{ApiServer, ApiServerConfig};
