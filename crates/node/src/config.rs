//! Per-shard configuration.

use fairshard_incentive::budget::Budget;
use fairshard_incentive::{
    ConfigError, CustomSubsidyFn, IncentiveConfig, LagrangianParams, PidParams, SubsidyMode,
    SubsidyPolicy,
};
use num_bigint::BigUint;
use serde::Deserialize;

/// Configuration for one shard process.
///
/// Deserializable from JSON; every field except `shard_id` has a default
/// so minimal configs stay minimal.
#[derive(Debug, Clone, Deserialize)]
pub struct ShardConfig {
    /// This shard's id.
    pub shard_id: u64,

    /// Total number of shards in the deployment.
    #[serde(default = "default_num_shards")]
    pub num_shards: u64,

    /// Maximum transactions per block.
    #[serde(default = "default_block_capacity")]
    pub block_capacity: usize,

    /// Subsidy mechanism settings.
    #[serde(default)]
    pub subsidy: SubsidySettings,

    /// Age after which an unsettled pending entry is considered lost.
    /// Orders of magnitude above typical cross-shard latency.
    #[serde(default = "default_pending_cleanup_age_ms")]
    pub pending_cleanup_age_ms: u64,
}

fn default_num_shards() -> u64 {
    4
}

fn default_block_capacity() -> usize {
    2000
}

fn default_pending_cleanup_age_ms() -> u64 {
    // 10 minutes.
    600_000
}

/// Subsidy mechanism settings in a serde-friendly shape.
///
/// The mode tag plus both parameter blocks; [`Self::to_incentive_config`]
/// folds them into the tagged-sum policy the engine runs on.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SubsidySettings {
    #[serde(default)]
    pub mode: SubsidyMode,

    /// Fee expectation window, in blocks.
    #[serde(default = "default_window_blocks")]
    pub window_blocks: usize,

    #[serde(default)]
    pub pid: PidParams,

    #[serde(default)]
    pub lagrangian: LagrangianParams,

    /// Minimum total subsidy per block, in wei (0 disables).
    #[serde(default)]
    pub gamma_min: u128,

    /// Maximum total subsidy per block, in wei (0 disables).
    #[serde(default)]
    pub gamma_max: u128,

    /// Lagrangian inflation budget per epoch, in wei.
    #[serde(default = "default_max_inflation")]
    pub max_inflation: u128,
}

fn default_window_blocks() -> usize {
    16
}

fn default_max_inflation() -> u128 {
    // 1 ETH in wei.
    1_000_000_000_000_000_000
}

impl SubsidySettings {
    /// Build the validated engine configuration.
    ///
    /// `custom` is required exactly when the mode is `Custom`.
    pub fn to_incentive_config(
        &self,
        custom: Option<CustomSubsidyFn>,
    ) -> Result<IncentiveConfig, ConfigError> {
        let policy = match self.mode {
            SubsidyMode::None => SubsidyPolicy::None,
            SubsidyMode::DestAvg => SubsidyPolicy::DestAvg,
            SubsidyMode::SumAvg => SubsidyPolicy::SumAvg,
            SubsidyMode::Custom => match custom {
                Some(f) => SubsidyPolicy::Custom(f),
                None => return Err(ConfigError::MissingCustomFn),
            },
            SubsidyMode::ExtremeFixed => SubsidyPolicy::ExtremeFixed,
            SubsidyMode::Pid => SubsidyPolicy::Pid(self.pid.clone()),
            SubsidyMode::Lagrangian => SubsidyPolicy::Lagrangian(self.lagrangian.clone()),
        };

        let config = IncentiveConfig {
            policy,
            window_blocks: self.window_blocks,
            gamma_min: BigUint::from(self.gamma_min),
            gamma_max: BigUint::from(self.gamma_max),
            max_inflation: BigUint::from(self.max_inflation),
        };
        config.validate()?;
        Ok(config)
    }

    /// The per-block subsidy budget, when either gamma bound is set.
    pub fn block_budget(&self) -> Result<Option<Budget>, ConfigError> {
        if self.gamma_min == 0 && self.gamma_max == 0 {
            return Ok(None);
        }
        Budget::new(
            BigUint::from(self.gamma_min),
            BigUint::from(self.gamma_max),
        )
        .map(Some)
    }
}

impl ShardConfig {
    /// Minimal config for a shard in an `num_shards`-shard deployment.
    pub fn for_shard(shard_id: u64, num_shards: u64) -> Self {
        Self {
            shard_id,
            num_shards,
            block_capacity: default_block_capacity(),
            subsidy: SubsidySettings::default(),
            pending_cleanup_age_ms: default_pending_cleanup_age_ms(),
        }
    }

    /// Parse from JSON.
    pub fn from_json(raw: &str) -> Result<Self, NodeConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| NodeConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation; the subsidy settings validate separately
    /// when the engine config is built.
    pub fn validate(&self) -> Result<(), NodeConfigError> {
        if self.num_shards == 0 {
            return Err(NodeConfigError::NoShards);
        }
        if self.shard_id >= self.num_shards {
            return Err(NodeConfigError::ShardIdOutOfRange {
                shard_id: self.shard_id,
                num_shards: self.num_shards,
            });
        }
        if self.subsidy.window_blocks == 0 {
            return Err(ConfigError::NonPositiveWindow.into());
        }
        if self.subsidy.gamma_max > 0 && self.subsidy.gamma_min > self.subsidy.gamma_max {
            return Err(ConfigError::GammaBoundsInverted.into());
        }
        Ok(())
    }
}

/// Node-level configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeConfigError {
    #[error("config parse error: {0}")]
    Parse(String),

    #[error("deployment must have at least one shard")]
    NoShards,

    #[error("shard_id {shard_id} out of range for {num_shards} shards")]
    ShardIdOutOfRange { shard_id: u64, num_shards: u64 },

    #[error(transparent)]
    Invalid(#[from] ConfigError),
}
