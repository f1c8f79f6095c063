//! Fee synchronization across shards.

use fairshard_fees::FeeTracker;
use fairshard_messages::{FeeSyncGossip, WireError};
use fairshard_types::{Block, ShardId};
use std::sync::Arc;
use tracing::{debug, warn};

/// Transport seam for fee-sync traffic.
///
/// `broadcast` dispatches an encoded message to the leader of every
/// other shard, fire-and-forget. Implementations must not block the
/// caller on delivery; loss and reordering are acceptable.
pub trait FeeSyncNetwork: Send + Sync {
    fn broadcast(&self, from: ShardId, bytes: Vec<u8>);
}

/// Publishes the local fee expectation after each committed block and
/// applies the means received from peers.
///
/// Without this exchange, a source shard would price every remote
/// destination at the bootstrap value of zero and `DestAvg` subsidies
/// would vanish in multi-process deployments.
pub struct FeeSyncBroadcaster {
    local_shard: ShardId,
    tracker: Arc<FeeTracker>,
    network: Arc<dyn FeeSyncNetwork>,
}

impl FeeSyncBroadcaster {
    pub fn new(
        local_shard: ShardId,
        tracker: Arc<FeeTracker>,
        network: Arc<dyn FeeSyncNetwork>,
    ) -> Self {
        Self {
            local_shard,
            tracker,
            network,
        }
    }

    /// Fold a committed local block into the fee window, then announce
    /// the updated mean to peers.
    ///
    /// The tracker update happens before the read, so peers observe the
    /// mean that includes this block.
    pub fn on_block_committed(&self, block: &Block) {
        let itx_fees = block.itx_fees();
        self.tracker.on_block_finalized(block.shard, &itx_fees);

        let avg = self.tracker.get_avg_itx_fee(block.shard);
        let message = FeeSyncGossip::new(block.shard, avg, block.height, block.timestamp_ms);

        match message.encode() {
            Ok(bytes) => {
                debug!(
                    shard = block.shard.0,
                    height = block.height.0,
                    avg = %message.avg_itx_fee,
                    "Broadcasting fee sync"
                );
                self.network.broadcast(self.local_shard, bytes);
            }
            Err(error) => warn!(%error, "Failed to encode fee sync message"),
        }
    }

    /// Apply a fee-sync message received from a peer shard.
    ///
    /// Messages about the local shard are ignored; the local window is
    /// authoritative here.
    pub fn on_fee_sync_received(&self, bytes: &[u8]) -> Result<(), WireError> {
        let message = FeeSyncGossip::decode(bytes)?;

        if message.shard == self.local_shard {
            return Ok(());
        }

        debug!(
            shard = message.shard.0,
            height = message.block_height.0,
            avg = %message.avg_itx_fee,
            "Applying remote fee sync"
        );
        self.tracker
            .update_remote_shard_fee(message.shard, message.avg_itx_fee);
        Ok(())
    }
}
