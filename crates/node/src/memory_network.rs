//! In-memory fee-sync network for tests and single-process simulation.

use crate::fee_sync::FeeSyncNetwork;
use fairshard_types::ShardId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Delivers encoded fee-sync messages over per-shard channels.
///
/// Messages travel as wire bytes, so the full encode/decode path is
/// exercised exactly as it would be over a real transport. Sends are
/// fire-and-forget: a shard whose receiver is gone simply stops getting
/// updates, which is indistinguishable from message loss and therefore
/// safe.
pub struct MemoryNetwork {
    senders: HashMap<ShardId, mpsc::UnboundedSender<Vec<u8>>>,
}

impl MemoryNetwork {
    /// Create a network connecting the given shards.
    ///
    /// Returns the network and one inbound receiver per shard; the
    /// owner of each shard drains its receiver into
    /// [`FeeSyncBroadcaster::on_fee_sync_received`].
    ///
    /// [`FeeSyncBroadcaster::on_fee_sync_received`]:
    ///     crate::FeeSyncBroadcaster::on_fee_sync_received
    pub fn new(
        shards: &[ShardId],
    ) -> (Arc<Self>, HashMap<ShardId, mpsc::UnboundedReceiver<Vec<u8>>>) {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for &shard in shards {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(shard, tx);
            receivers.insert(shard, rx);
        }
        (Arc::new(Self { senders }), receivers)
    }
}

impl FeeSyncNetwork for MemoryNetwork {
    fn broadcast(&self, from: ShardId, bytes: Vec<u8>) {
        for (&shard, sender) in &self.senders {
            if shard == from {
                continue;
            }
            if sender.send(bytes.clone()).is_err() {
                debug!(shard = shard.0, "Fee sync receiver dropped");
            }
        }
    }
}
