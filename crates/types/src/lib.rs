//! Core types for the fairshard incentive and scheduling core.
//!
//! This crate provides the foundational types used throughout the
//! workspace:
//!
//! - **Primitives**: Hash, addresses
//! - **Identifiers**: ShardId, BlockHeight, ProposerId
//! - **Routing**: deterministic address to shard mapping
//! - **Domain types**: Transaction, Block, InclusionClass
//! - **Network traits**: message markers for serialization
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not
//! depend on any other workspace crates, making it the foundation layer.

mod block;
mod hash;
mod identifiers;
mod network;
mod routing;
mod transaction;

pub use block::Block;
pub use hash::{Hash, HexError};
pub use identifiers::{Address, BlockHeight, ProposerId, ShardId};
pub use network::{MessagePriority, NetworkMessage};
pub use routing::{is_cross_shard, shard_of, tx_shards};
pub use transaction::{InclusionClass, Transaction};
