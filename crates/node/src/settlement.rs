//! Two-phase settlement pipeline.
//!
//! A cross-shard transfer earns its rewards in two commits. When the
//! source shard commits, the pipeline freezes the promised utilities in
//! the pending ledger and produces the second-phase transfer for the
//! destination. When the destination commits, the matching entries are
//! settled and both proposers credited. The required ordering per block
//! is: score, commit, record pending, relay.

use fairshard_fees::FeeTracker;
use fairshard_incentive::budget::{apply_to_block, Budget};
use fairshard_incentive::split_reward;
use fairshard_ledger::{PendingEntry, PendingLedger};
use fairshard_types::{Block, ProposerId, ShardId, Transaction};
use num_bigint::BigUint;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives pending-ledger bookkeeping around block commits.
pub struct SettlementPipeline {
    local_shard: ShardId,
    tracker: Arc<FeeTracker>,
    ledger: Arc<PendingLedger>,
    /// Optional per-block subsidy bound; applied before entries freeze.
    budget: Option<Budget>,
}

impl SettlementPipeline {
    pub fn new(
        local_shard: ShardId,
        tracker: Arc<FeeTracker>,
        ledger: Arc<PendingLedger>,
        budget: Option<Budget>,
    ) -> Self {
        Self {
            local_shard,
            tracker,
            ledger,
            budget,
        }
    }

    /// Process a committed block of this (source) shard.
    ///
    /// Applies the block subsidy budget, records a pending entry per
    /// outgoing transfer and returns the second-phase transfers to relay
    /// to their destination shards. A transfer whose pair id is already
    /// pending or settled produces no relay; the first commit won.
    pub fn on_source_block_committed(&self, block: &mut Block, now_ms: u64) -> Vec<Transaction> {
        self.enforce_block_budget(block);

        let mut relays = Vec::new();
        for tx in &block.transactions {
            if !tx.is_cross_shard() || tx.is_second_phase || tx.from_shard != self.local_shard {
                continue;
            }

            let entry = PendingEntry {
                pair_id: tx.pair_id(),
                source_shard: tx.from_shard,
                dest_shard: tx.to_shard,
                fee: tx.fee_to_proposer.clone(),
                subsidy: tx.subsidy.clone(),
                expected_source_fee: self.tracker.get_avg_itx_fee(tx.from_shard),
                expected_dest_fee: self.tracker.get_avg_itx_fee(tx.to_shard),
                utility_a: tx.utility_a.clone(),
                utility_b: tx.utility_b.clone(),
                source_block: block.id,
                created_at_ms: now_ms,
            };

            match self.ledger.add(entry) {
                Ok(()) => relays.push(tx.second_phase()),
                Err(error) => {
                    warn!(pair_id = %tx.pair_id(), %error, "Skipping duplicate transfer");
                }
            }
        }

        debug!(
            shard = self.local_shard.0,
            height = block.height.0,
            relays = relays.len(),
            "Source commit recorded"
        );
        relays
    }

    /// Settle against a committed destination-side block.
    ///
    /// The block may be local or observed from a peer shard; every
    /// second-phase transfer whose pair id is tracked in this ledger is
    /// settled through the credit callback. Returns the number settled.
    /// Pairs tracked elsewhere are skipped quietly; an already-settled
    /// pair (duplicate relay) is logged and skipped, and settlement of
    /// the rest proceeds.
    pub fn on_dest_block_committed(
        &self,
        block: &Block,
        mut credit: impl FnMut(ShardId, &ProposerId, &BigUint),
    ) -> usize {
        let mut settled = 0;
        for tx in &block.transactions {
            if !tx.is_second_phase {
                continue;
            }

            match self.ledger.settle(&tx.pair_id(), &block.id, &mut credit) {
                Ok(()) => settled += 1,
                Err(fairshard_ledger::LedgerError::UnknownPairId(_)) => {
                    debug!(pair_id = %tx.pair_id(), "Transfer not tracked in this ledger");
                }
                Err(error) => {
                    warn!(pair_id = %tx.pair_id(), %error, "Settlement failed");
                }
            }
        }

        debug!(
            shard = self.local_shard.0,
            height = block.height.0,
            settled,
            "Destination commit settled"
        );
        settled
    }

    /// Scale the block's outgoing subsidies into the configured bounds.
    ///
    /// When scaling applies, the utilities are re-split from the scaled
    /// subsidy so `u_A + u_B == f_AB + R` keeps holding. The inclusion
    /// class is left as scored; the block is already packed.
    fn enforce_block_budget(&self, block: &mut Block) {
        let Some(budget) = &self.budget else {
            return;
        };

        let outgoing: Vec<usize> = block
            .transactions
            .iter()
            .enumerate()
            .filter(|(_, tx)| {
                tx.is_cross_shard() && !tx.is_second_phase && tx.from_shard == self.local_shard
            })
            .map(|(idx, _)| idx)
            .collect();
        if outgoing.is_empty() {
            return;
        }

        let subsidies: Vec<BigUint> = outgoing
            .iter()
            .map(|&idx| block.transactions[idx].subsidy.clone())
            .collect();
        let (scaled, factor) = apply_to_block(budget, &subsidies);
        if !factor.is_scaling() {
            return;
        }

        for (&idx, subsidy) in outgoing.iter().zip(scaled) {
            let tx = &mut block.transactions[idx];
            let e_a = self.tracker.get_avg_itx_fee(tx.from_shard);
            let e_b = self.tracker.get_avg_itx_fee(tx.to_shard);
            let (u_a, u_b) = split_reward(&tx.fee_to_proposer, &subsidy, &e_a, &e_b);
            tx.subsidy = subsidy;
            tx.utility_a = u_a;
            tx.utility_b = u_b;
        }

        info!(
            shard = self.local_shard.0,
            height = block.height.0,
            %factor,
            "Block subsidy budget applied"
        );
    }
}
