//! Three-phase block selector.

use fairshard_fees::FeeTracker;
use fairshard_incentive::{classify, split_reward, QueueMetrics, SubsidyEngine, SubsidyMode};
use fairshard_types::{InclusionClass, ShardId, Transaction};
use num_bigint::BigUint;
use num_traits::Zero;
use std::sync::Arc;
use tracing::debug;

/// Outcome of one selection round.
///
/// `selected` is the block content in priority order; `remaining` goes
/// back to the pool. The scheduler retains neither.
#[derive(Debug)]
pub struct BlockSelection {
    pub selected: Vec<Transaction>,
    pub remaining: Vec<Transaction>,
}

/// Scores, classifies and packs transactions for one shard.
///
/// Holds non-owning references to the fee tracker and the subsidy engine;
/// both outlive every selection. Scoring writes the subsidy, utilities
/// and inclusion class back onto each cross-shard transaction, making the
/// scheduler the authoritative source of those fields.
pub struct Scheduler {
    shard: ShardId,
    tracker: Arc<FeeTracker>,
    engine: Arc<SubsidyEngine>,

    /// Snapshot of queue state fed to the control-loop policies.
    queue_metrics: QueueMetrics,

    /// Subsidy issued since the last epoch update. Only accumulated under
    /// the Lagrangian policy; the epoch update feeds it back into the
    /// shadow price.
    epoch_subsidy_total: BigUint,
    epoch_tx_count: u64,
}

struct Scored {
    tx: Transaction,
    score: BigUint,
}

impl Scheduler {
    pub fn new(shard: ShardId, tracker: Arc<FeeTracker>, engine: Arc<SubsidyEngine>) -> Self {
        Self {
            shard,
            tracker,
            engine,
            queue_metrics: QueueMetrics {
                // Moderate congestion assumed until a collaborator feeds
                // real queue state.
                queue_length_b: 600,
                ..QueueMetrics::default()
            },
            epoch_subsidy_total: BigUint::zero(),
            epoch_tx_count: 0,
        }
    }

    /// Shard this scheduler proposes for.
    pub fn shard(&self) -> ShardId {
        self.shard
    }

    /// Replace the queue snapshot used by the control-loop policies.
    pub fn set_queue_metrics(&mut self, metrics: QueueMetrics) {
        self.queue_metrics = metrics;
    }

    /// Select up to `capacity` transactions for the next block.
    ///
    /// Phases:
    ///
    /// | Phase | Intra-shard | Cross-shard |
    /// |-------|-------------|-------------|
    /// | 1     | `fee >= E(f_local)` | `Include` |
    /// | 2     | `fee < E(f_local)`  | `IfSpace` |
    /// | 3     | (none)              | `Defer`   |
    ///
    /// Within a phase: descending score, FIFO on ties. Selection stops
    /// the moment the block is full.
    pub fn select_for_block(
        &mut self,
        capacity: usize,
        candidates: Vec<Transaction>,
    ) -> BlockSelection {
        if capacity == 0 || candidates.is_empty() {
            return BlockSelection {
                selected: Vec::new(),
                remaining: candidates,
            };
        }

        let e_local = self.tracker.get_avg_itx_fee(self.shard);

        let mut phases: [Vec<Scored>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for mut tx in candidates {
            let (score, phase) = if tx.is_cross_shard() {
                self.score_cross_shard(&mut tx, &e_local)
            } else {
                self.score_intra_shard(&mut tx, &e_local)
            };
            phases[phase].push(Scored { tx, score });
        }

        debug!(
            shard = self.shard.0,
            high = phases[0].len(),
            medium = phases[1].len(),
            low = phases[2].len(),
            e_local = %e_local,
            "Selection phases"
        );

        let mut selected = Vec::with_capacity(capacity);
        let mut remaining = Vec::new();
        for mut phase in phases {
            phase.sort_by(|a, b| {
                b.score
                    .cmp(&a.score)
                    .then_with(|| a.tx.arrival_ms.cmp(&b.tx.arrival_ms))
            });
            for scored in phase {
                if selected.len() < capacity {
                    selected.push(scored.tx);
                } else {
                    remaining.push(scored.tx);
                }
            }
        }

        let cross = selected.iter().filter(|tx| tx.is_cross_shard()).count();
        debug!(
            shard = self.shard.0,
            selected = selected.len(),
            capacity,
            cross_shard = cross,
            "Block selection done"
        );

        BlockSelection {
            selected,
            remaining,
        }
    }

    /// Score an intra-shard transaction: the proposer fee, no subsidy.
    ///
    /// The fee flows through `utility_a` so block reward estimation sees
    /// intra- and cross-shard income uniformly.
    fn score_intra_shard(&self, tx: &mut Transaction, e_local: &BigUint) -> (BigUint, usize) {
        tx.subsidy = BigUint::zero();
        tx.utility_a = tx.fee_to_proposer.clone();
        tx.utility_b = BigUint::zero();
        tx.inclusion = None;

        let phase = if &tx.fee_to_proposer >= e_local { 0 } else { 1 };
        (tx.fee_to_proposer.clone(), phase)
    }

    /// Score a cross-shard transfer from this shard's point of view.
    ///
    /// The subsidy never sees the transfer fee; it is computed from the
    /// fee expectations and the queue snapshot only.
    fn score_cross_shard(&mut self, tx: &mut Transaction, e_local: &BigUint) -> (BigUint, usize) {
        let is_source = tx.from_shard == self.shard;

        let (e_a, e_b) = if is_source {
            (e_local.clone(), self.tracker.get_avg_itx_fee(tx.to_shard))
        } else {
            (
                self.tracker.get_avg_itx_fee(tx.from_shard),
                self.tracker.get_avg_itx_fee(self.shard),
            )
        };

        let subsidy = self
            .engine
            .calculate_subsidy(&e_a, &e_b, Some(&self.queue_metrics));

        if self.engine.mode() == SubsidyMode::Lagrangian {
            self.epoch_subsidy_total += &subsidy;
            self.epoch_tx_count += 1;
        }

        let (u_a, u_b) = split_reward(&tx.fee_to_proposer, &subsidy, &e_a, &e_b);

        tx.subsidy = subsidy;
        tx.utility_a = u_a.clone();
        tx.utility_b = u_b.clone();

        if is_source {
            let class = classify(&u_a, &e_a, &e_b);
            tx.inclusion = Some(class);
            let phase = match class {
                InclusionClass::Include => 0,
                InclusionClass::IfSpace => 1,
                InclusionClass::Defer => 2,
            };
            (u_a, phase)
        } else {
            // The source shard already filtered this transfer; the
            // destination packs it at high priority regardless of the
            // class stamped on the first phase.
            tx.inclusion = Some(InclusionClass::Include);
            (u_b, 0)
        }
    }

    /// Expected proposer income of this shard for a packed block.
    pub fn estimate_block_reward(&self, txs: &[Transaction]) -> BigUint {
        let mut total = BigUint::zero();
        for tx in txs {
            if tx.from_shard == self.shard {
                total += &tx.utility_a;
            } else if tx.to_shard == self.shard {
                total += &tx.utility_b;
            }
        }
        total
    }

    /// Feed the epoch's subsidy total into the shadow price and start a
    /// new epoch. Called by the block-commit collaborator at epoch
    /// boundaries; a no-op under non-Lagrangian policies.
    pub fn update_epoch(&mut self) {
        if self.engine.mode() != SubsidyMode::Lagrangian {
            return;
        }

        self.engine
            .update_shadow_price(&self.epoch_subsidy_total, self.engine.max_inflation());

        debug!(
            shard = self.shard.0,
            total_subsidy = %self.epoch_subsidy_total,
            tx_count = self.epoch_tx_count,
            lambda = self.engine.shadow_price(),
            "Epoch update"
        );

        self.engine.reset_epoch();
        self.epoch_subsidy_total = BigUint::zero();
        self.epoch_tx_count = 0;
    }

    /// Subsidy issued and transfers scored in the current epoch, plus the
    /// current shadow price.
    pub fn epoch_stats(&self) -> (BigUint, u64, f64) {
        (
            self.epoch_subsidy_total.clone(),
            self.epoch_tx_count,
            self.engine.shadow_price(),
        )
    }
}
