//! Transaction selection for block proposals.
//!
//! The scheduler scores every candidate, classifies cross-shard
//! transfers with the Shapley split, and packs a block in three phases:
//! high (profitable now), medium (worth including if space remains), low
//! (deferred transfers, delayed but never dropped).
//!
//! The [`PriorityPool`] holds candidates between proposals and hands the
//! unselected remainder back to itself after each pack.

mod pool;
mod select;

pub use pool::PriorityPool;
pub use select::{BlockSelection, Scheduler};
