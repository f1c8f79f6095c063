//! Deterministic address to shard mapping.
//!
//! Every node must agree on which shard owns an address without any
//! coordination, so the mapping is a fixed cryptographic hash: SHA-256 of
//! the normalized address, first 8 bytes interpreted as an unsigned
//! big-endian integer, modulo the shard count. Stable across processes
//! and architectures.

use crate::{Address, ShardId};
use sha2::{Digest, Sha256};

/// Map an address to its owning shard.
///
/// Returns shard 0 when `num_shards <= 1`.
pub fn shard_of(address: &Address, num_shards: u64) -> ShardId {
    if num_shards <= 1 {
        return ShardId(0);
    }

    let digest = Sha256::digest(address.normalized().as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let value = u64::from_be_bytes(prefix);

    ShardId(value % num_shards)
}

/// Whether a transfer between two addresses crosses a shard boundary.
///
/// Always false in a single-shard deployment.
pub fn is_cross_shard(sender: &Address, recipient: &Address, num_shards: u64) -> bool {
    if num_shards <= 1 {
        return false;
    }
    shard_of(sender, num_shards) != shard_of(recipient, num_shards)
}

/// Source and destination shards for a transfer.
pub fn tx_shards(sender: &Address, recipient: &Address, num_shards: u64) -> (ShardId, ShardId) {
    (shard_of(sender, num_shards), shard_of(recipient, num_shards))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_of_deterministic() {
        let addr = Address::new("0x1111111111111111");
        assert_eq!(shard_of(&addr, 4), shard_of(&addr, 4));
        assert_eq!(shard_of(&addr, 16), shard_of(&addr, 16));
    }

    #[test]
    fn test_shard_of_in_range() {
        for i in 0..64u32 {
            let addr = Address::new(format!("0x{i:040x}"));
            let shard = shard_of(&addr, 5);
            assert!(shard.0 < 5);
        }
    }

    #[test]
    fn test_shard_of_single_shard() {
        let addr = Address::new("0xdeadbeef");
        assert_eq!(shard_of(&addr, 1), ShardId(0));
        assert_eq!(shard_of(&addr, 0), ShardId(0));
    }

    #[test]
    fn test_shard_of_case_insensitive() {
        let upper = Address::new("0xABCDEF0123456789");
        let lower = Address::new("0xabcdef0123456789");
        assert_eq!(shard_of(&upper, 8), shard_of(&lower, 8));
    }

    #[test]
    fn test_cross_shard_single_shard_is_false() {
        let a = Address::new("0x01");
        let b = Address::new("0x02");
        assert!(!is_cross_shard(&a, &b, 1));
    }

    #[test]
    fn test_cross_shard_matches_shard_of() {
        let a = Address::new("0x1111111111111111");
        let b = Address::new("0xaaaaaaaaaaaaaaaa");
        let expected = shard_of(&a, 4) != shard_of(&b, 4);
        assert_eq!(is_cross_shard(&a, &b, 4), expected);
    }

    #[test]
    fn test_roughly_uniform_distribution() {
        // With 4 shards and 4000 addresses, each bucket should land well
        // away from empty. Loose bound to keep the test robust.
        let mut counts = [0usize; 4];
        for i in 0..4000u32 {
            let addr = Address::new(format!("0x{i:040x}"));
            counts[shard_of(&addr, 4).0 as usize] += 1;
        }
        for count in counts {
            assert!(count > 700, "distribution too skewed: {counts:?}");
        }
    }
}
