//! Per-shard system context.

use crate::config::{NodeConfigError, ShardConfig};
use fairshard_fees::FeeTracker;
use fairshard_incentive::{CustomSubsidyFn, QueueMetrics, SubsidyEngine};
use fairshard_ledger::PendingLedger;
use fairshard_scheduler::{PriorityPool, Scheduler};
use fairshard_types::{Block, BlockHeight, ShardId, Transaction};
use num_bigint::BigUint;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Everything one shard process needs, wired together once.
///
/// Replaces the process-global singletons of older designs with explicit
/// dependencies: the tracker, engine and ledger are shared `Arc`s that
/// outlive every scheduler invocation, and nothing here owns anything
/// else cyclically.
pub struct ShardContext {
    shard: ShardId,
    config: ShardConfig,
    tracker: Arc<FeeTracker>,
    engine: Arc<SubsidyEngine>,
    ledger: Arc<PendingLedger>,
    pool: Arc<PriorityPool>,
    scheduler: Mutex<Scheduler>,
}

impl ShardContext {
    /// Build the context from a validated configuration.
    ///
    /// `custom` supplies the subsidy formula when the configured mode is
    /// `Custom`.
    pub fn new(
        config: ShardConfig,
        custom: Option<CustomSubsidyFn>,
    ) -> Result<Self, NodeConfigError> {
        config.validate()?;
        let incentive = config.subsidy.to_incentive_config(custom)?;

        let tracker = Arc::new(FeeTracker::new(incentive.window_blocks));
        let engine = Arc::new(SubsidyEngine::new(incentive));
        let ledger = Arc::new(PendingLedger::new());
        let pool = Arc::new(PriorityPool::new());
        let shard = ShardId(config.shard_id);
        let scheduler = Mutex::new(Scheduler::new(
            shard,
            Arc::clone(&tracker),
            Arc::clone(&engine),
        ));

        info!(
            shard = shard.0,
            num_shards = config.num_shards,
            mode = %engine.mode(),
            "Shard context ready"
        );

        Ok(Self {
            shard,
            config,
            tracker,
            engine,
            ledger,
            pool,
            scheduler,
        })
    }

    pub fn shard(&self) -> ShardId {
        self.shard
    }

    pub fn num_shards(&self) -> u64 {
        self.config.num_shards
    }

    pub fn config(&self) -> &ShardConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<FeeTracker> {
        &self.tracker
    }

    pub fn engine(&self) -> &Arc<SubsidyEngine> {
        &self.engine
    }

    pub fn ledger(&self) -> &Arc<PendingLedger> {
        &self.ledger
    }

    pub fn pool(&self) -> &Arc<PriorityPool> {
        &self.pool
    }

    /// Admit a transaction into the pool.
    pub fn submit(&self, tx: Transaction) {
        self.pool.add(tx);
    }

    /// Admit relayed second-phase transfers into the pool.
    pub fn submit_relays(&self, relays: Vec<Transaction>) {
        self.pool.add_many(relays);
    }

    /// Pack the next block for this shard.
    ///
    /// Runs the three-phase selector over the pool and stamps each packed
    /// transfer with the height it was included at.
    pub fn propose_block(&self, height: BlockHeight, now_ms: u64) -> Block {
        let mut scheduler = self.scheduler.lock();
        let mut selected = self.pool.pack(self.config.block_capacity, &mut scheduler);
        drop(scheduler);

        for tx in &mut selected {
            if tx.is_cross_shard() {
                if tx.is_second_phase {
                    tx.included_in_dest = Some(height);
                } else {
                    tx.included_in_source = Some(height);
                }
            }
        }

        Block::new(self.shard, height, now_ms, selected)
    }

    /// Expected proposer income for a packed block.
    pub fn estimate_block_reward(&self, txs: &[Transaction]) -> BigUint {
        self.scheduler.lock().estimate_block_reward(txs)
    }

    /// Feed a fresh queue snapshot to the control-loop policies.
    pub fn set_queue_metrics(&self, metrics: QueueMetrics) {
        self.scheduler.lock().set_queue_metrics(metrics);
    }

    /// Epoch boundary: fold the accumulated subsidy into the shadow
    /// price and reset the epoch counters.
    pub fn update_epoch(&self) {
        self.scheduler.lock().update_epoch();
    }

    /// Subsidy issued and transfers scored this epoch, plus the shadow
    /// price.
    pub fn epoch_stats(&self) -> (BigUint, u64, f64) {
        self.scheduler.lock().epoch_stats()
    }

    /// Drop pending settlements older than the configured age.
    pub fn cleanup_stale_pending(&self, now_ms: u64) -> usize {
        let cutoff = now_ms.saturating_sub(self.config.pending_cleanup_age_ms);
        self.ledger.cleanup_old(cutoff)
    }
}
