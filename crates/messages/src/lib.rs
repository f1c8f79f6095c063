//! Cross-shard coordination messages.
//!
//! The incentive core exchanges exactly one message kind between shards:
//! the fee-sync broadcast that makes a shard's average ITX fee visible to
//! its peers. Delivery is best-effort and unordered; a later message
//! simply overwrites an earlier one on the receiving side.
//!
//! Encoding is bincode over serde. Compatibility only needs to hold
//! within one deployment.

use fairshard_types::{BlockHeight, MessagePriority, NetworkMessage, ShardId};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Broadcast of a shard's rolling average ITX fee `E(f_s)`.
///
/// Sent by the shard leader after each committed block, once the local
/// fee window has been updated, so peers observe the new mean and not the
/// previous one. This is the sole mechanism that makes multi-process
/// `DestAvg` subsidies correct: without it, the source shard would price
/// every destination at the bootstrap value of zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSyncGossip {
    /// Shard reporting its fee expectation.
    pub shard: ShardId,
    /// Current `E(f_s)` of that shard.
    pub avg_itx_fee: BigUint,
    /// Height of the block that produced this mean.
    pub block_height: BlockHeight,
    /// Creation time in milliseconds. Informational only; never used for
    /// ordering.
    pub timestamp_ms: u64,
}

impl FeeSyncGossip {
    /// Create a fee-sync message.
    pub fn new(
        shard: ShardId,
        avg_itx_fee: BigUint,
        block_height: BlockHeight,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            shard,
            avg_itx_fee,
            block_height,
            timestamp_ms,
        }
    }

    /// Encode for transmission.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        bincode::serialize(self).map_err(|e| WireError::Encode(e.to_string()))
    }

    /// Decode a received message.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        bincode::deserialize(bytes).map_err(|e| WireError::Decode(e.to_string()))
    }
}

impl NetworkMessage for FeeSyncGossip {
    fn message_type_id() -> &'static str {
        "fee.sync"
    }

    fn priority() -> MessagePriority {
        MessagePriority::Coordination
    }
}

/// Errors from wire encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),
}
