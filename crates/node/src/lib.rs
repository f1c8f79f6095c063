//! Per-shard wiring of the incentive and scheduling core.
//!
//! One [`ShardContext`] is built per shard process and holds the
//! components every other piece references: fee tracker, subsidy engine,
//! pending ledger, transaction pool and scheduler. Consensus, transport
//! and persistence are collaborators; they drive this crate through
//! three seams:
//!
//! - [`ShardContext::propose_block`] when it is this shard's turn to
//!   propose,
//! - [`FeeSyncBroadcaster`] around every committed local block and every
//!   received fee-sync message,
//! - [`SettlementPipeline`] for the two commit phases of a cross-shard
//!   transfer.
//!
//! Per-block ordering is: score and pack, commit, record pending entries
//! and relays, fold fees into the tracker, broadcast the new mean.

mod config;
mod context;
mod fee_sync;
mod memory_network;
mod settlement;

pub use config::{NodeConfigError, ShardConfig, SubsidySettings};
pub use context::ShardContext;
pub use fee_sync::{FeeSyncBroadcaster, FeeSyncNetwork};
pub use memory_network::MemoryNetwork;
pub use settlement::SettlementPipeline;
