//! Transaction model with incentive attributes.

use crate::{routing, Address, BlockHeight, Hash, ShardId};
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// Inclusion category assigned to a scored cross-shard transaction.
///
/// Drives the three-phase selector: `Include` is packed first, `IfSpace`
/// fills remaining capacity, `Defer` is considered last but never dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InclusionClass {
    /// The source proposer's utility covers its opportunity cost
    /// (`u_A >= E(f_A)`).
    Include,
    /// Utility strictly between the defer and include thresholds.
    IfSpace,
    /// Utility at or below `E(f_A) - E(f_B)`. Scheduled only when space
    /// remains after the other phases.
    Defer,
}

/// A transfer between two accounts, routed by sender and recipient shard.
///
/// Routing attributes are derived once at construction and never change.
/// The incentive attributes (`subsidy`, `utility_a`, `utility_b`,
/// `inclusion`) are zero until the scheduler scores the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Stable content hash. Also the pair id linking a cross-shard
    /// transfer with its second phase.
    pub hash: Hash,
    pub sender: Address,
    pub recipient: Address,
    pub value: BigUint,
    pub nonce: u64,

    /// Shard owning the sender address.
    pub from_shard: ShardId,
    /// Shard owning the recipient address.
    pub to_shard: ShardId,

    /// Fee paid to the including proposer. `f_AB` for a cross-shard
    /// transfer, the full proposer fee for an intra-shard one. Computed
    /// once at ingest.
    pub fee_to_proposer: BigUint,

    /// Original proposal time in milliseconds. Preserved when the
    /// transfer is relayed so end-to-end latency can be measured.
    pub proposed_ms: u64,
    /// When the transaction entered the local pool, in milliseconds.
    /// FIFO tie-break for the selector.
    pub arrival_ms: u64,

    /// True for the destination-shard phase of a cross-shard transfer.
    pub is_second_phase: bool,
    /// Height at which the first phase was packed in the source shard.
    pub included_in_source: Option<BlockHeight>,
    /// Height at which the second phase was packed in the destination.
    pub included_in_dest: Option<BlockHeight>,

    /// Subsidy `R_AB` granted to this transfer. Zero for intra-shard.
    pub subsidy: BigUint,
    /// Shapley utility of the source shard proposer.
    pub utility_a: BigUint,
    /// Shapley utility of the destination shard proposer.
    pub utility_b: BigUint,
    /// Inclusion category. `None` until scored, and always `None` for
    /// intra-shard transactions.
    pub inclusion: Option<InclusionClass>,
}

impl Transaction {
    /// Build a transaction, deriving its hash and shard routing.
    pub fn new(
        sender: Address,
        recipient: Address,
        value: BigUint,
        nonce: u64,
        num_shards: u64,
        proposed_ms: u64,
    ) -> Self {
        let hash = Hash::from_parts(&[
            sender.as_str().as_bytes(),
            recipient.as_str().as_bytes(),
            &value.to_bytes_be(),
            &nonce.to_be_bytes(),
            &proposed_ms.to_be_bytes(),
        ]);
        let (from_shard, to_shard) = routing::tx_shards(&sender, &recipient, num_shards);

        Self {
            hash,
            sender,
            recipient,
            value,
            nonce,
            from_shard,
            to_shard,
            fee_to_proposer: BigUint::zero(),
            proposed_ms,
            arrival_ms: proposed_ms,
            is_second_phase: false,
            included_in_source: None,
            included_in_dest: None,
            subsidy: BigUint::zero(),
            utility_a: BigUint::zero(),
            utility_b: BigUint::zero(),
            inclusion: None,
        }
    }

    /// Whether sender and recipient live in different shards.
    pub fn is_cross_shard(&self) -> bool {
        self.from_shard != self.to_shard
    }

    /// Identifier linking the two phases of a cross-shard transfer.
    pub fn pair_id(&self) -> Hash {
        self.hash
    }

    /// Create the second phase of this transfer for the destination shard.
    ///
    /// Keeps the pair id, economics and original proposal time; the
    /// arrival time is reset when the destination pool admits it.
    pub fn second_phase(&self) -> Transaction {
        let mut relayed = self.clone();
        relayed.is_second_phase = true;
        relayed.arrival_ms = 0;
        relayed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tx(sender: &str, recipient: &str) -> Transaction {
        Transaction::new(
            Address::new(sender),
            Address::new(recipient),
            BigUint::from(100u32),
            1,
            4,
            1_000,
        )
    }

    #[test]
    fn test_routing_derived_from_addresses() {
        let tx = make_tx("0x1111111111111111", "0xaaaaaaaaaaaaaaaa");
        assert_eq!(tx.from_shard, routing::shard_of(&tx.sender, 4));
        assert_eq!(tx.to_shard, routing::shard_of(&tx.recipient, 4));
        assert_eq!(tx.is_cross_shard(), tx.from_shard != tx.to_shard);
    }

    #[test]
    fn test_hash_stable() {
        let a = make_tx("0x01", "0x02");
        let b = make_tx("0x01", "0x02");
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn test_hash_differs_by_nonce() {
        let a = make_tx("0x01", "0x02");
        let mut b = Transaction::new(
            Address::new("0x01"),
            Address::new("0x02"),
            BigUint::from(100u32),
            2,
            4,
            1_000,
        );
        b.fee_to_proposer = a.fee_to_proposer.clone();
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_unscored_incentive_fields_are_zero() {
        let tx = make_tx("0x01", "0x02");
        assert_eq!(tx.subsidy, BigUint::zero());
        assert_eq!(tx.utility_a, BigUint::zero());
        assert_eq!(tx.utility_b, BigUint::zero());
        assert_eq!(tx.inclusion, None);
    }

    #[test]
    fn test_second_phase_preserves_pair_id_and_proposal_time() {
        let tx = make_tx("0x1111111111111111", "0xaaaaaaaaaaaaaaaa");
        let relayed = tx.second_phase();
        assert!(relayed.is_second_phase);
        assert_eq!(relayed.pair_id(), tx.pair_id());
        assert_eq!(relayed.proposed_ms, tx.proposed_ms);
        assert_eq!(relayed.arrival_ms, 0);
    }
}
