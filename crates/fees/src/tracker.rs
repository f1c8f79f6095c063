//! Rolling fee expectation tracker.

use fairshard_types::ShardId;
use num_bigint::BigUint;
use num_traits::Zero;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Default number of blocks in the sliding window.
pub const DEFAULT_WINDOW_BLOCKS: usize = 16;

/// Per-shard window state.
///
/// The local shard maintains the full window; shards known only through
/// fee-sync messages keep an empty window and a directly-set mean.
#[derive(Debug, Default)]
struct ShardWindow {
    /// Per-block mean ITX fees, oldest first. Bounded by the window size.
    block_means: VecDeque<BigUint>,
    /// Number of blocks ever folded in (not capped by the window).
    block_count: u64,
    /// Current rolling mean `E(f_s)`.
    avg: BigUint,
}

/// Tracks the rolling average intra-shard proposer fee per shard.
///
/// All money arithmetic is exact: block means and the rolling mean are
/// integer divisions of integer sums. Readers receive owned snapshots and
/// proceed concurrently; mutators serialize on the write half of one
/// read-write guard.
#[derive(Debug)]
pub struct FeeTracker {
    window_blocks: usize,
    windows: RwLock<HashMap<ShardId, ShardWindow>>,
}

impl FeeTracker {
    /// Create a tracker with the given window size.
    ///
    /// A zero window falls back to [`DEFAULT_WINDOW_BLOCKS`].
    pub fn new(window_blocks: usize) -> Self {
        let window_blocks = if window_blocks == 0 {
            DEFAULT_WINDOW_BLOCKS
        } else {
            window_blocks
        };
        Self {
            window_blocks,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Window size in blocks.
    pub fn window_blocks(&self) -> usize {
        self.window_blocks
    }

    /// Fold a freshly committed local block into a shard's window.
    ///
    /// `itx_fees` must contain only intra-shard proposer fees; the caller
    /// extracts them from the block body. The block mean is the integer
    /// division of the sum by the count (an empty block contributes 0).
    /// The oldest block mean drops once the window exceeds its capacity,
    /// and the shard's rolling mean is recomputed.
    pub fn on_block_finalized(&self, shard: ShardId, itx_fees: &[BigUint]) {
        let block_mean = if itx_fees.is_empty() {
            BigUint::zero()
        } else {
            let sum: BigUint = itx_fees.iter().sum();
            sum / BigUint::from(itx_fees.len())
        };

        let mut windows = self.windows.write();
        let window = windows.entry(shard).or_default();

        window.block_means.push_back(block_mean);
        window.block_count += 1;
        if window.block_means.len() > self.window_blocks {
            window.block_means.pop_front();
        }

        let sum: BigUint = window.block_means.iter().sum();
        window.avg = sum / BigUint::from(window.block_means.len());

        debug!(
            shard = shard.0,
            blocks = window.block_count,
            avg = %window.avg,
            "Fee window updated"
        );
    }

    /// Overwrite the stored mean for a remote shard.
    ///
    /// Fee-sync receive path. The value arrives already averaged from the
    /// remote shard, so it bypasses the window. Later messages overwrite
    /// earlier ones; delivery order is not tracked.
    pub fn update_remote_shard_fee(&self, shard: ShardId, avg: BigUint) {
        let mut windows = self.windows.write();
        let window = windows.entry(shard).or_default();
        window.avg = avg;
    }

    /// Current rolling mean `E(f_s)` for a shard.
    ///
    /// Returns an owned snapshot; 0 while no data has arrived (bootstrap).
    pub fn get_avg_itx_fee(&self, shard: ShardId) -> BigUint {
        self.windows
            .read()
            .get(&shard)
            .map(|w| w.avg.clone())
            .unwrap_or_else(BigUint::zero)
    }

    /// Snapshot of every known shard's mean.
    pub fn all_avg_fees(&self) -> HashMap<ShardId, BigUint> {
        self.windows
            .read()
            .iter()
            .map(|(shard, window)| (*shard, window.avg.clone()))
            .collect()
    }

    /// Number of blocks folded into a shard's window so far.
    pub fn block_count(&self, shard: ShardId) -> u64 {
        self.windows
            .read()
            .get(&shard)
            .map(|w| w.block_count)
            .unwrap_or(0)
    }

    /// Number of block means currently held in a shard's window.
    pub fn window_len(&self, shard: ShardId) -> usize {
        self.windows
            .read()
            .get(&shard)
            .map(|w| w.block_means.len())
            .unwrap_or(0)
    }

    /// Drop all data for one shard.
    pub fn reset(&self, shard: ShardId) {
        self.windows.write().remove(&shard);
    }

    /// Drop all data for all shards.
    pub fn reset_all(&self) {
        self.windows.write().clear();
    }
}

impl Default for FeeTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_BLOCKS)
    }
}
