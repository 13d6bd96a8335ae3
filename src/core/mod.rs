//! Orchestrator core: the serialized catalog state machine, the
//! placement engine, the write-ahead transaction log, and bootstrap
//! recovery.

pub mod orchestrator;
pub mod placement;
pub mod transaction;

pub use orchestrator::Orchestrator;
pub use placement::{PermutationSource, SequentialOrder, WallClockShuffle};
pub use transaction::TransactionLog;
