//! Committed-block view consumed by the incentive core.
//!
//! Consensus, gossip and persistence live in collaborator components.
//! The core only needs to see which transactions a committed block
//! carries, which shard produced it and at what height.

use crate::{BlockHeight, Hash, ProposerId, ShardId, Transaction};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// A committed block in one shard's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Shard that produced the block.
    pub shard: ShardId,
    /// Height within that shard's chain.
    pub height: BlockHeight,
    /// Block identity, derived from shard, height and transaction hashes.
    pub id: Hash,
    /// Commit timestamp in milliseconds.
    pub timestamp_ms: u64,
    /// Transactions packed by the scheduler, in selection order.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Build a block, deriving its identity.
    pub fn new(
        shard: ShardId,
        height: BlockHeight,
        timestamp_ms: u64,
        transactions: Vec<Transaction>,
    ) -> Self {
        let mut parts: Vec<&[u8]> = Vec::with_capacity(transactions.len() + 3);
        let shard_bytes = shard.0.to_be_bytes();
        let height_bytes = height.0.to_be_bytes();
        let ts_bytes = timestamp_ms.to_be_bytes();
        parts.push(&shard_bytes);
        parts.push(&height_bytes);
        parts.push(&ts_bytes);
        for tx in &transactions {
            parts.push(tx.hash.as_bytes());
        }
        let id = Hash::from_parts(&parts);

        Self {
            shard,
            height,
            id,
            timestamp_ms,
            transactions,
        }
    }

    /// Proposer credited for this block.
    pub fn proposer(&self) -> ProposerId {
        ProposerId::for_block(self.shard, &self.id)
    }

    /// Proposer fees of the intra-shard transactions in this block.
    ///
    /// This is the input to the fee expectation tracker. Cross-shard fees
    /// are excluded so the subsidy cannot feed back into the reference
    /// quantity it is computed from.
    pub fn itx_fees(&self) -> Vec<BigUint> {
        self.transactions
            .iter()
            .filter(|tx| !tx.is_cross_shard())
            .map(|tx| tx.fee_to_proposer.clone())
            .collect()
    }

    /// Cross-shard transactions in this block, in selection order.
    pub fn cross_shard_transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(|tx| tx.is_cross_shard())
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Address, BlockHeight};

    fn make_tx(sender: &str, recipient: &str, fee: u32) -> Transaction {
        let mut tx = Transaction::new(
            Address::new(sender),
            Address::new(recipient),
            BigUint::from(1u32),
            0,
            4,
            0,
        );
        tx.fee_to_proposer = BigUint::from(fee);
        tx
    }

    #[test]
    fn test_block_id_depends_on_contents() {
        let a = Block::new(ShardId(0), BlockHeight(1), 0, vec![make_tx("0x01", "0x02", 5)]);
        let b = Block::new(ShardId(0), BlockHeight(1), 0, vec![make_tx("0x01", "0x03", 5)]);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_itx_fees_excludes_cross_shard() {
        // Find a cross-shard pair under 4 shards.
        let ctx = (0..200u32)
            .map(|i| make_tx("0x1111111111111111", &format!("0x{i:040x}"), 999))
            .find(|tx| tx.is_cross_shard())
            .unwrap();
        let itx = (0..200u32)
            .map(|i| make_tx("0x1111111111111111", &format!("0x{i:040x}"), 7))
            .find(|tx| !tx.is_cross_shard())
            .unwrap();

        let block = Block::new(ShardId(0), BlockHeight(1), 0, vec![ctx, itx]);
        let fees = block.itx_fees();
        assert_eq!(fees, vec![BigUint::from(7u32)]);
    }
}
