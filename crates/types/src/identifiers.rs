//! Identifier newtypes used throughout the workspace.

use crate::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a shard within the network.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct ShardId(pub u64);

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Height of a block within a shard's chain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct BlockHeight(pub u64);

impl fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An account address.
///
/// Stored as the raw string form seen at ingest. Shard routing normalizes
/// the address (lowercase, `0x` prefix stripped) before hashing so that
/// equivalent spellings map to the same shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Create an address from any string-like value.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw address string as supplied.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical form used for shard routing: lowercase, no `0x` prefix.
    pub fn normalized(&self) -> String {
        let lower = self.0.to_lowercase();
        lower
            .strip_prefix("0x")
            .map(str::to_owned)
            .unwrap_or(lower)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Identifies the proposer credited for a block.
///
/// Derived from the shard and block identity, which is all the settlement
/// path knows about the proposer. Collaborators owning a validator registry
/// can map this back to a concrete account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposerId(String);

impl ProposerId {
    /// Proposer identity for a given block in a given shard.
    pub fn for_block(shard: ShardId, block: &Hash) -> Self {
        Self(format!("proposer-{}-{}", shard.0, &block.to_hex()[..16]))
    }

    /// The identity as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProposerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
