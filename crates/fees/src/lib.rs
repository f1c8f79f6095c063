//! Per-shard rolling expectation of intra-shard proposer fees.
//!
//! `E(f_s)` is the reference quantity the subsidy engine and the scheduler
//! compare against: the integer mean of per-block mean ITX fees over a
//! bounded window. The local shard feeds its window block by block; remote
//! shards' means arrive pre-averaged through fee-sync messages and are
//! stored directly.

mod tracker;

pub use tracker::{FeeTracker, DEFAULT_WINDOW_BLOCKS};
