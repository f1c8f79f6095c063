//! Pending cross-shard settlement ledger.
//!
//! A cross-shard transfer commits twice: once in its source shard, once
//! in its destination. The rewards computed at the first commit are paid
//! only when the second commit lands. This ledger tracks the gap and
//! enforces exactly-once payout: a pair id is in exactly one of
//! {absent, pending, settled} at any time, and a settled pair can never
//! re-enter the ledger.

use fairshard_types::{Hash, ProposerId, ShardId};
use num_bigint::BigUint;
use num_traits::Zero;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// A committed-but-unsettled cross-shard transfer.
///
/// Created when the source shard packs the transfer; consumed when the
/// destination shard's commit settles it. The fee expectations are frozen
/// at entry time so settlement pays what was promised, not what the
/// windows drifted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    /// Pair id linking the two phases (the transfer's hash).
    pub pair_id: Hash,
    /// Source shard A.
    pub source_shard: ShardId,
    /// Destination shard B.
    pub dest_shard: ShardId,
    /// Transfer fee `f_AB`.
    pub fee: BigUint,
    /// Subsidy `R_AB` granted at scheduling time.
    pub subsidy: BigUint,
    /// `E(f_A)` at entry time.
    pub expected_source_fee: BigUint,
    /// `E(f_B)` at entry time.
    pub expected_dest_fee: BigUint,
    /// Utility promised to the source proposer.
    pub utility_a: BigUint,
    /// Utility promised to the destination proposer.
    pub utility_b: BigUint,
    /// Block that packed the first phase.
    pub source_block: Hash,
    /// Entry creation time in milliseconds, for relay-failure cleanup.
    pub created_at_ms: u64,
}

/// Errors returned by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The pair id is already awaiting settlement.
    #[error("transfer {0} is already pending")]
    DuplicatePending(Hash),

    /// The pair id has already been settled.
    #[error("transfer {0} was already settled")]
    AlreadySettled(Hash),

    /// The pair id is not in the pending set.
    #[error("transfer {0} is not pending")]
    UnknownPairId(Hash),
}

/// Aggregate ledger statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LedgerStats {
    pub pending_count: usize,
    pub settled_count: usize,
    /// Sum of `f_AB` over pending entries.
    pub total_fees: BigUint,
    /// Sum of `R_AB` over pending entries.
    pub total_subsidy: BigUint,
}

#[derive(Debug, Default)]
struct LedgerState {
    pending: HashMap<Hash, PendingEntry>,
    settled: HashSet<Hash>,
}

/// Tracks committed-but-unsettled cross-shard transfers.
///
/// One read-write guard protects both sets. `settle` holds the write half
/// across the credit callback, so a concurrent second settle of the same
/// pair cannot observe the entry before it moves to the settled set.
#[derive(Debug, Default)]
pub struct PendingLedger {
    state: RwLock<LedgerState>,
}

impl PendingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transfer awaiting its destination commit.
    ///
    /// Rejects pair ids that are already pending or already settled.
    pub fn add(&self, entry: PendingEntry) -> Result<(), LedgerError> {
        let mut state = self.state.write();

        if state.settled.contains(&entry.pair_id) {
            return Err(LedgerError::AlreadySettled(entry.pair_id));
        }
        if state.pending.contains_key(&entry.pair_id) {
            return Err(LedgerError::DuplicatePending(entry.pair_id));
        }

        debug!(
            pair_id = %entry.pair_id,
            source = entry.source_shard.0,
            dest = entry.dest_shard.0,
            fee = %entry.fee,
            subsidy = %entry.subsidy,
            "Transfer pending settlement"
        );
        state.pending.insert(entry.pair_id, entry);
        Ok(())
    }

    /// Snapshot of one pending entry.
    pub fn get(&self, pair_id: &Hash) -> Option<PendingEntry> {
        self.state.read().pending.get(pair_id).cloned()
    }

    /// Settle a transfer once its second phase has committed.
    ///
    /// Credits `u_A` to the source block's proposer and `u_B` to the
    /// destination block's proposer through `credit`, then moves the pair
    /// from pending to settled. The two credits always sum to
    /// `f_AB + R_AB`. Fails without invoking the callback when the pair
    /// is unknown or already settled.
    pub fn settle(
        &self,
        pair_id: &Hash,
        dest_block: &Hash,
        mut credit: impl FnMut(ShardId, &ProposerId, &BigUint),
    ) -> Result<(), LedgerError> {
        let mut state = self.state.write();

        if state.settled.contains(pair_id) {
            return Err(LedgerError::AlreadySettled(*pair_id));
        }
        let Some(entry) = state.pending.remove(pair_id) else {
            return Err(LedgerError::UnknownPairId(*pair_id));
        };

        let source_proposer = ProposerId::for_block(entry.source_shard, &entry.source_block);
        let dest_proposer = ProposerId::for_block(entry.dest_shard, dest_block);

        credit(entry.source_shard, &source_proposer, &entry.utility_a);
        credit(entry.dest_shard, &dest_proposer, &entry.utility_b);

        info!(
            pair_id = %pair_id,
            u_a = %entry.utility_a,
            u_b = %entry.utility_b,
            "Cross-shard transfer settled"
        );
        state.settled.insert(*pair_id);
        Ok(())
    }

    /// Whether a pair id awaits settlement.
    pub fn is_pending(&self, pair_id: &Hash) -> bool {
        self.state.read().pending.contains_key(pair_id)
    }

    /// Whether a pair id has been settled.
    pub fn is_settled(&self, pair_id: &Hash) -> bool {
        self.state.read().settled.contains(pair_id)
    }

    pub fn pending_count(&self) -> usize {
        self.state.read().pending.len()
    }

    pub fn settled_count(&self) -> usize {
        self.state.read().settled.len()
    }

    /// Copies of all pending entries.
    pub fn all_pending(&self) -> Vec<PendingEntry> {
        self.state.read().pending.values().cloned().collect()
    }

    /// Aggregate counts and pending money totals.
    pub fn stats(&self) -> LedgerStats {
        let state = self.state.read();
        let mut stats = LedgerStats {
            pending_count: state.pending.len(),
            settled_count: state.settled.len(),
            total_fees: BigUint::zero(),
            total_subsidy: BigUint::zero(),
        };
        for entry in state.pending.values() {
            stats.total_fees += &entry.fee;
            stats.total_subsidy += &entry.subsidy;
        }
        stats
    }

    /// Drop pending entries created before `older_than_ms`.
    ///
    /// For transfers whose relay was lost. Settled entries are never
    /// touched. Returns the number of entries removed.
    pub fn cleanup_old(&self, older_than_ms: u64) -> usize {
        let mut state = self.state.write();
        let before = state.pending.len();
        state
            .pending
            .retain(|_, entry| entry.created_at_ms >= older_than_ms);
        let removed = before - state.pending.len();
        if removed > 0 {
            info!(removed, "Dropped stale pending transfers");
        }
        removed
    }

    /// Clear everything. Test-only utility.
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.pending.clear();
        state.settled.clear();
    }
}
