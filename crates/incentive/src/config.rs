//! Subsidy policy configuration and validation.

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// User-supplied subsidy formula for [`SubsidyPolicy::Custom`].
pub type CustomSubsidyFn = Arc<dyn Fn(&BigUint, &BigUint) -> BigUint + Send + Sync>;

/// Plain policy tag, used by configuration files, wire formats and the
/// stateless fallback path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubsidyMode {
    /// No subsidy, `R = 0`.
    None,
    /// `R = E(f_B)`, the destination shard average.
    #[default]
    DestAvg,
    /// `R = E(f_A) + E(f_B)`.
    SumAvg,
    /// User-supplied formula over the two averages.
    Custom,
    /// Fixed `10^18` wei per transfer, for stress experiments.
    ExtremeFixed,
    /// PID controller over destination queue utilization.
    Pid,
    /// Lagrangian shadow-price controller under an inflation budget.
    Lagrangian,
}

impl fmt::Display for SubsidyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubsidyMode::None => "None",
            SubsidyMode::DestAvg => "DestAvg",
            SubsidyMode::SumAvg => "SumAvg",
            SubsidyMode::Custom => "Custom",
            SubsidyMode::ExtremeFixed => "ExtremeFixed",
            SubsidyMode::Pid => "PID",
            SubsidyMode::Lagrangian => "Lagrangian",
        };
        write!(f, "{name}")
    }
}

/// PID controller parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidParams {
    /// Proportional gain.
    pub kp: f64,
    /// Integral gain.
    pub ki: f64,
    /// Derivative gain.
    pub kd: f64,
    /// Target destination-queue utilization, in `(0, 1)`.
    pub target_utilization: f64,
    /// Destination queue capacity the utilization is normalized by.
    pub capacity_b: f64,
    /// Lower bound on the subsidy multiplier.
    pub min_subsidy: f64,
    /// Upper bound on the subsidy multiplier.
    pub max_subsidy: f64,
}

impl Default for PidParams {
    fn default() -> Self {
        Self {
            kp: 1.5,
            ki: 0.1,
            kd: 0.05,
            target_utilization: 0.7,
            capacity_b: 1000.0,
            min_subsidy: 0.0,
            max_subsidy: 5.0,
        }
    }
}

/// Lagrangian shadow-price controller parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagrangianParams {
    /// Learning rate for the shadow price update.
    pub alpha: f64,
    /// Reference window the destination queue length is normalized by.
    pub window_size: f64,
    /// Lower bound on the shadow price. Must be at least 1.
    pub lambda_min: f64,
    /// Upper bound on the shadow price.
    pub lambda_max: f64,
    /// Exponent of the congestion factor. The default of 2 concentrates
    /// subsidy quadratically on congested destinations.
    pub congestion_exp: f64,
}

impl Default for LagrangianParams {
    fn default() -> Self {
        Self {
            alpha: 0.01,
            window_size: 1000.0,
            lambda_min: 1.0,
            lambda_max: 10.0,
            congestion_exp: 2.0,
        }
    }
}

/// Subsidy policy as a tagged sum: one variant per mode, each carrying
/// its parameters. [`SubsidyEngine::calculate_subsidy`] dispatches over
/// the tag.
///
/// [`SubsidyEngine::calculate_subsidy`]: crate::SubsidyEngine::calculate_subsidy
#[derive(Clone)]
pub enum SubsidyPolicy {
    None,
    DestAvg,
    SumAvg,
    Custom(CustomSubsidyFn),
    ExtremeFixed,
    Pid(PidParams),
    Lagrangian(LagrangianParams),
}

impl SubsidyPolicy {
    /// The plain tag for this policy.
    pub fn mode(&self) -> SubsidyMode {
        match self {
            SubsidyPolicy::None => SubsidyMode::None,
            SubsidyPolicy::DestAvg => SubsidyMode::DestAvg,
            SubsidyPolicy::SumAvg => SubsidyMode::SumAvg,
            SubsidyPolicy::Custom(_) => SubsidyMode::Custom,
            SubsidyPolicy::ExtremeFixed => SubsidyMode::ExtremeFixed,
            SubsidyPolicy::Pid(_) => SubsidyMode::Pid,
            SubsidyPolicy::Lagrangian(_) => SubsidyMode::Lagrangian,
        }
    }
}

impl fmt::Debug for SubsidyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubsidyPolicy::Custom(_) => f.write_str("Custom(..)"),
            SubsidyPolicy::Pid(p) => f.debug_tuple("Pid").field(p).finish(),
            SubsidyPolicy::Lagrangian(p) => f.debug_tuple("Lagrangian").field(p).finish(),
            other => write!(f, "{}", other.mode()),
        }
    }
}

impl Default for SubsidyPolicy {
    fn default() -> Self {
        SubsidyPolicy::DestAvg
    }
}

/// Immutable configuration of the incentive mechanism.
#[derive(Debug, Clone)]
pub struct IncentiveConfig {
    /// Subsidy policy, parameters included.
    pub policy: SubsidyPolicy,
    /// Fee expectation window size in blocks. Must be at least 1.
    pub window_blocks: usize,
    /// Optional minimum total subsidy per block (0 means unset).
    pub gamma_min: BigUint,
    /// Optional maximum total subsidy per block (0 means unset).
    pub gamma_max: BigUint,
    /// Subsidy budget per epoch, enforced by the Lagrangian controller.
    pub max_inflation: BigUint,
}

impl Default for IncentiveConfig {
    fn default() -> Self {
        Self {
            policy: SubsidyPolicy::DestAvg,
            window_blocks: 16,
            gamma_min: BigUint::zero(),
            gamma_max: BigUint::zero(),
            // 1 ETH in wei.
            max_inflation: BigUint::from(1_000_000_000_000_000_000u64),
        }
    }
}

impl IncentiveConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_blocks == 0 {
            return Err(ConfigError::NonPositiveWindow);
        }
        if !self.gamma_max.is_zero() && self.gamma_min > self.gamma_max {
            return Err(ConfigError::GammaBoundsInverted);
        }
        Ok(())
    }
}

/// Configuration errors surfaced at construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("fee window must span at least one block")]
    NonPositiveWindow,

    #[error("custom subsidy mode selected but no custom function supplied")]
    MissingCustomFn,

    #[error("gamma_min cannot exceed gamma_max")]
    GammaBoundsInverted,
}
