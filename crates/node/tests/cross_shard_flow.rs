//! End-to-end lifecycle of a cross-shard transfer across two shard
//! contexts connected by the in-memory fee-sync network.

use fairshard_ingest::TxRow;
use fairshard_node::{
    FeeSyncBroadcaster, MemoryNetwork, SettlementPipeline, ShardConfig, ShardContext,
};
use fairshard_types::{Address, Block, BlockHeight, InclusionClass, ShardId, Transaction};
use num_bigint::BigUint;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

fn big(v: u64) -> BigUint {
    BigUint::from(v)
}

/// One shard's moving parts, wired the way a shard process would.
struct Shard {
    context: ShardContext,
    broadcaster: FeeSyncBroadcaster,
    pipeline: SettlementPipeline,
    inbox: UnboundedReceiver<Vec<u8>>,
    next_height: u64,
}

impl Shard {
    fn commit_block(&mut self, mut block: Block, now_ms: u64) -> Vec<Transaction> {
        let relays = self.pipeline.on_source_block_committed(&mut block, now_ms);
        self.broadcaster.on_block_committed(&block);
        relays
    }

    fn drain_fee_sync(&mut self) {
        while let Ok(bytes) = self.inbox.try_recv() {
            self.broadcaster.on_fee_sync_received(&bytes).unwrap();
        }
    }

    fn propose(&mut self, now_ms: u64) -> Block {
        let height = BlockHeight(self.next_height);
        self.next_height += 1;
        self.context.propose_block(height, now_ms)
    }
}

fn make_shards(num_shards: u64) -> Vec<Shard> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let ids: Vec<ShardId> = (0..num_shards).map(ShardId).collect();
    let (network, mut receivers) = MemoryNetwork::new(&ids);

    ids.iter()
        .map(|&id| {
            let context = ShardContext::new(ShardConfig::for_shard(id.0, num_shards), None)
                .expect("valid config");
            let broadcaster = FeeSyncBroadcaster::new(
                id,
                Arc::clone(context.tracker()),
                Arc::clone(&network) as Arc<dyn fairshard_node::FeeSyncNetwork>,
            );
            let pipeline = SettlementPipeline::new(
                id,
                Arc::clone(context.tracker()),
                Arc::clone(context.ledger()),
                None,
            );
            let inbox = receivers.remove(&id).expect("receiver for shard");
            Shard {
                context,
                broadcaster,
                pipeline,
                inbox,
                next_height: 1,
            }
        })
        .collect()
}

fn make_itx(shard: u64, fee: u64, tag: u64) -> Transaction {
    let mut tx = Transaction::new(
        Address::new(format!("0xitx-a-{shard}-{tag}")),
        Address::new(format!("0xitx-b-{shard}-{tag}")),
        big(1),
        tag,
        2,
        tag + 1,
    );
    tx.from_shard = ShardId(shard);
    tx.to_shard = ShardId(shard);
    tx.fee_to_proposer = big(fee);
    tx.arrival_ms = tag + 1;
    tx
}

fn make_ctx(from: u64, to: u64, fee: u64, tag: u64) -> Transaction {
    let mut tx = Transaction::new(
        Address::new(format!("0xctx-a-{from}-{tag}")),
        Address::new(format!("0xctx-b-{to}-{tag}")),
        big(1),
        tag,
        2,
        tag + 1,
    );
    tx.from_shard = ShardId(from);
    tx.to_shard = ShardId(to);
    tx.fee_to_proposer = big(fee);
    tx.arrival_ms = tag + 1;
    tx
}

/// Seed both shards' fee expectations and exchange them over fee sync.
///
/// Shard 0 settles at E(f_0) = 1000, shard 1 at E(f_1) = 500.
fn seed_fee_expectations(shards: &mut [Shard]) {
    for round in 0..4u64 {
        for (shard_id, fee) in [(0u64, 1000u64), (1, 500)] {
            let txs = (0..3)
                .map(|i| make_itx(shard_id, fee, round * 100 + i))
                .collect();
            let block = Block::new(
                ShardId(shard_id),
                BlockHeight(round + 1),
                round,
                txs,
            );
            shards[shard_id as usize].commit_block(block, round);
        }
    }
    for shard in shards.iter_mut() {
        shard.drain_fee_sync();
    }
}

#[test]
fn test_cross_shard_transfer_lifecycle() {
    let mut shards = make_shards(2);
    seed_fee_expectations(&mut shards);

    // Both shards agree on both means after the exchange.
    assert_eq!(
        shards[0].context.tracker().get_avg_itx_fee(ShardId(1)),
        big(500)
    );
    assert_eq!(
        shards[1].context.tracker().get_avg_itx_fee(ShardId(0)),
        big(1000)
    );

    // A transfer from shard 0 to shard 1 paying 800.
    let ctx = make_ctx(0, 1, 800, 7);
    let pair_id = ctx.pair_id();
    shards[0].context.submit(ctx);

    // Source shard packs it. DestAvg: R = E(f_1) = 500; split of
    // total 1300 with diff 500 gives u_A = 900, u_B = 400.
    let source_block = shards[0].propose(10_000);
    assert_eq!(source_block.transaction_count(), 1);
    let scored = &source_block.transactions[0];
    assert_eq!(scored.subsidy, big(500));
    assert_eq!(scored.utility_a, big(900));
    assert_eq!(scored.utility_b, big(400));
    assert_eq!(scored.inclusion, Some(InclusionClass::IfSpace));
    assert_eq!(scored.included_in_source, Some(BlockHeight(1)));

    // Conservation on the scored transfer.
    assert_eq!(
        &scored.utility_a + &scored.utility_b,
        &scored.fee_to_proposer + &scored.subsidy
    );

    // Committing the source block records the pending entry and yields
    // the second phase for the destination.
    let relays = shards[0].commit_block(source_block, 10_000);
    assert_eq!(relays.len(), 1);
    assert!(shards[0].context.ledger().is_pending(&pair_id));

    let entry = shards[0].context.ledger().get(&pair_id).unwrap();
    assert_eq!(entry.fee, big(800));
    assert_eq!(entry.subsidy, big(500));
    assert_eq!(entry.expected_source_fee, big(1000));
    assert_eq!(entry.expected_dest_fee, big(500));

    // Destination shard receives the relay and packs it at high
    // priority.
    shards[1].context.submit_relays(relays);
    let dest_block = shards[1].propose(12_000);
    assert_eq!(dest_block.transaction_count(), 1);
    assert!(dest_block.transactions[0].is_second_phase);
    assert_eq!(
        dest_block.transactions[0].included_in_dest,
        Some(BlockHeight(1))
    );

    // The source shard observes the destination commit and settles.
    let mut credits: HashMap<u64, BigUint> = HashMap::new();
    let settled = shards[0]
        .pipeline
        .on_dest_block_committed(&dest_block, |shard, _, amount| {
            *credits.entry(shard.0).or_default() += amount;
        });
    assert_eq!(settled, 1);
    assert_eq!(credits[&0], big(900));
    assert_eq!(credits[&1], big(400));

    assert!(!shards[0].context.ledger().is_pending(&pair_id));
    assert!(shards[0].context.ledger().is_settled(&pair_id));

    // A replayed destination block settles nothing and credits no one.
    let settled_again = shards[0]
        .pipeline
        .on_dest_block_committed(&dest_block, |_, _, _| {
            panic!("double settlement must not credit");
        });
    assert_eq!(settled_again, 0);
}

#[test]
fn test_fee_sync_keeps_local_window_authoritative() {
    let mut shards = make_shards(2);
    seed_fee_expectations(&mut shards);

    // Shard 0's own mean comes from its window, not from gossip.
    assert_eq!(
        shards[0].context.tracker().get_avg_itx_fee(ShardId(0)),
        big(1000)
    );
    // The remote mean has no window behind it.
    assert_eq!(shards[0].context.tracker().window_len(ShardId(1)), 0);
    assert_eq!(shards[0].context.tracker().window_len(ShardId(0)), 4);
}

#[test]
fn test_stale_fee_sync_is_overwritten_by_later_message() {
    let mut shards = make_shards(2);
    seed_fee_expectations(&mut shards);

    // Shard 1's fees shift upward; one more commit re-broadcasts.
    let txs = (0..3).map(|i| make_itx(1, 2000, 900 + i)).collect();
    let block = Block::new(ShardId(1), BlockHeight(9), 50, txs);
    shards[1].commit_block(block, 50);
    shards[0].drain_fee_sync();

    // (500 * 4 + 2000) / 5 = 800.
    assert_eq!(
        shards[0].context.tracker().get_avg_itx_fee(ShardId(1)),
        big(800)
    );
}

#[test]
fn test_block_reward_estimate_matches_settlement() {
    let mut shards = make_shards(2);
    seed_fee_expectations(&mut shards);

    shards[0].context.submit(make_ctx(0, 1, 800, 11));
    shards[0].context.submit(make_itx(0, 1200, 12));

    let block = shards[0].propose(20_000);
    let reward = shards[0].context.estimate_block_reward(&block.transactions);
    // ITX fee 1200 plus the transfer's u_A = 900.
    assert_eq!(reward, big(2100));
}

#[test]
fn test_ingested_row_flows_through_scheduler() {
    let mut shards = make_shards(2);
    seed_fee_expectations(&mut shards);

    // A legacy transfer: 21000 gas at 20 gwei.
    let fields = [
        "18000000",
        "1700000000",
        "0xhash",
        "0x1111111111111111",
        "0xaaaaaaaaaaaaaaaa",
        "",
        "1000000000000000000",
        "21000",
        "20000000000",
        "21000",
        "0",
        "None",
        "None",
        "None",
        "0",
        "None",
        "None",
        "0",
    ];
    let row = TxRow::parse(&fields).unwrap();
    let tx = row.into_transaction(2, 0);
    let expected_fee = big(21_000) * big(20_000_000_000);
    assert_eq!(tx.fee_to_proposer, expected_fee);

    let local = tx.from_shard;
    let shard = &mut shards[local.0 as usize];
    shard.context.submit(tx);

    let block = shard.propose(30_000);
    assert_eq!(block.transaction_count(), 1);
    // The fee dwarfs every expectation, so it packs in phase one with
    // a classification only if it crosses shards.
    let packed = &block.transactions[0];
    if packed.is_cross_shard() {
        assert_eq!(packed.inclusion, Some(InclusionClass::Include));
    } else {
        assert_eq!(packed.inclusion, None);
    }
}
