//! Incentive mechanism for cross-shard transfers.
//!
//! Three pieces make up the mechanism:
//!
//! - [`SubsidyEngine`]: computes the per-transfer subsidy `R_AB` under a
//!   configured [`SubsidyPolicy`]. The PID and Lagrangian policies are
//!   stateful control loops; the rest are pure formulas.
//! - [`split_reward`]: the two-party Shapley split of `f_AB + R` between
//!   the source and destination proposers.
//! - [`classify`]: the inclusion category of a transfer from the source
//!   proposer's point of view, which the scheduler turns into phases.
//!
//! The engine never reads the transfer fee `f_AB`. Subsidies depend only
//! on the fee expectations and queue state, so a sender cannot inflate
//! its own subsidy by overpaying.

pub mod budget;
mod config;
mod engine;
mod split;

pub use config::{
    ConfigError, CustomSubsidyFn, IncentiveConfig, LagrangianParams, PidParams, SubsidyMode,
    SubsidyPolicy,
};
pub use engine::{stateless_subsidy, QueueMetrics, SubsidyEngine};
pub use split::{classify, split_reward};
