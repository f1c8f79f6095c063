//! Priority transaction pool.

use crate::select::Scheduler;
use fairshard_incentive::QueueMetrics;
use fairshard_types::{ShardId, Transaction};
use num_bigint::BigUint;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Heap entry ordered by proposer fee (descending), then arrival (FIFO),
/// then hash for a total order.
#[derive(Debug)]
struct PoolEntry(Transaction);

impl PartialEq for PoolEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PoolEntry {}

impl PartialOrd for PoolEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PoolEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .fee_to_proposer
            .cmp(&other.0.fee_to_proposer)
            .then_with(|| other.0.arrival_ms.cmp(&self.0.arrival_ms))
            .then_with(|| other.0.hash.cmp(&self.0.hash))
    }
}

#[derive(Debug, Default)]
struct PoolState {
    queue: BinaryHeap<PoolEntry>,
    /// Second-phase transfers buffered per destination shard until the
    /// relay batch thresholds are met.
    relay: HashMap<ShardId, Vec<Transaction>>,
}

/// Holds candidate transactions between block proposals.
///
/// The heap keeps a fee-then-FIFO order for the simple packing path; the
/// scheduler re-scores everything on [`PriorityPool::pack`], so the heap
/// order is a fair baseline, not the final word.
#[derive(Debug, Default)]
pub struct PriorityPool {
    state: Mutex<PoolState>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl PriorityPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a transaction, stamping arrival and proposal times if the
    /// producer left them unset.
    pub fn add(&self, mut tx: Transaction) {
        if tx.arrival_ms == 0 {
            tx.arrival_ms = now_ms();
        }
        if tx.proposed_ms == 0 {
            tx.proposed_ms = tx.arrival_ms;
        }
        self.state.lock().queue.push(PoolEntry(tx));
    }

    /// Admit a batch of transactions.
    pub fn add_many(&self, txs: Vec<Transaction>) {
        let now = now_ms();
        let mut state = self.state.lock();
        for mut tx in txs {
            if tx.arrival_ms == 0 {
                tx.arrival_ms = now;
            }
            if tx.proposed_ms == 0 {
                tx.proposed_ms = tx.arrival_ms;
            }
            state.queue.push(PoolEntry(tx));
        }
    }

    /// Number of queued candidates.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    /// Pack a block through the scheduler.
    ///
    /// Drains the whole queue, lets the scheduler score and select, then
    /// requeues the remainder. The pool lock is not held across the
    /// scheduler call; admissions racing the pack land in the next round.
    pub fn pack(&self, capacity: usize, scheduler: &mut Scheduler) -> Vec<Transaction> {
        let candidates: Vec<Transaction> = {
            let mut state = self.state.lock();
            std::mem::take(&mut state.queue)
                .into_iter()
                .map(|entry| entry.0)
                .collect()
        };

        if candidates.is_empty() {
            return Vec::new();
        }

        let selection = scheduler.select_for_block(capacity, candidates);

        let mut state = self.state.lock();
        for tx in selection.remaining {
            state.queue.push(PoolEntry(tx));
        }

        debug!(
            selected = selection.selected.len(),
            requeued = state.queue.len(),
            "Packed block from pool"
        );
        selection.selected
    }

    /// Pack by plain fee order, without scoring. Fallback for callers
    /// running without an incentive scheduler.
    pub fn pack_simple(&self, capacity: usize) -> Vec<Transaction> {
        let mut state = self.state.lock();
        let mut packed = Vec::with_capacity(capacity.min(state.queue.len()));
        while packed.len() < capacity {
            match state.queue.pop() {
                Some(entry) => packed.push(entry.0),
                None => break,
            }
        }
        packed
    }

    /// Buffer a second-phase transfer for a destination shard.
    pub fn add_relay(&self, dest: ShardId, tx: Transaction) {
        self.state.lock().relay.entry(dest).or_default().push(tx);
    }

    /// Take up to `max` buffered transfers for `dest`, but only once at
    /// least `min` have accumulated. Returns `None` below the threshold.
    pub fn pack_relay(&self, dest: ShardId, min: usize, max: usize) -> Option<Vec<Transaction>> {
        let mut state = self.state.lock();
        let buffered = state.relay.get_mut(&dest)?;
        if buffered.len() < min {
            return None;
        }
        let take = buffered.len().min(max);
        Some(buffered.drain(..take).collect())
    }

    /// Buffered second-phase transfers for a destination shard.
    pub fn relay_len(&self, dest: ShardId) -> usize {
        self.state
            .lock()
            .relay
            .get(&dest)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Drop all buffered relays.
    pub fn clear_relay(&self) {
        self.state.lock().relay.clear();
    }

    /// Local-side queue snapshot for the control-loop policies.
    ///
    /// The wait estimate is the age of the oldest queued transaction.
    pub fn metrics(&self) -> QueueMetrics {
        let state = self.state.lock();
        let queue_length_a = state.queue.len() as u64;

        let avg_wait_ms_a = state
            .queue
            .iter()
            .map(|entry| entry.0.arrival_ms)
            .min()
            .map(|oldest| now_ms().saturating_sub(oldest) as f64)
            .unwrap_or(0.0);

        QueueMetrics {
            queue_length_a,
            avg_wait_ms_a,
            ..QueueMetrics::default()
        }
    }
}
