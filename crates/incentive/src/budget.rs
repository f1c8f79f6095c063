//! Per-block subsidy budget.
//!
//! Bounds the total subsidy a single block may carry. When the sum of
//! subsidies in a block falls outside `[b_min, b_max]`, every subsidy is
//! scaled by the same rational factor, keeping relative allocations
//! intact while the total lands on the violated bound.

use crate::ConfigError;
use num_bigint::BigUint;
use num_traits::Zero;

/// Per-block subsidy bounds. A zero `b_max` disables the budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Budget {
    /// Minimum total subsidy per block (0 means unset).
    pub b_min: BigUint,
    /// Maximum total subsidy per block (0 means unset).
    pub b_max: BigUint,
}

impl Budget {
    /// Create a budget, rejecting inverted bounds.
    pub fn new(b_min: BigUint, b_max: BigUint) -> Result<Self, ConfigError> {
        if !b_max.is_zero() && b_min > b_max {
            return Err(ConfigError::GammaBoundsInverted);
        }
        Ok(Self { b_min, b_max })
    }

    /// Scaling factor for a block whose subsidies sum to `sum_r`.
    ///
    /// - above `b_max`: scale down by `b_max / sum_r`
    /// - below a set `b_min` (and non-zero): scale up by `b_min / sum_r`
    /// - otherwise: identity
    pub fn apply(&self, sum_r: &BigUint) -> ScalingFactor {
        if self.b_max.is_zero() {
            return ScalingFactor::identity();
        }

        if sum_r > &self.b_max {
            return ScalingFactor {
                num: self.b_max.clone(),
                den: sum_r.clone(),
            };
        }

        if !self.b_min.is_zero() && !sum_r.is_zero() && sum_r < &self.b_min {
            return ScalingFactor {
                num: self.b_min.clone(),
                den: sum_r.clone(),
            };
        }

        ScalingFactor::identity()
    }
}

/// Rational scaling factor applied to each subsidy in a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingFactor {
    num: BigUint,
    den: BigUint,
}

impl ScalingFactor {
    /// The factor that leaves subsidies unchanged.
    pub fn identity() -> Self {
        Self {
            num: BigUint::from(1u8),
            den: BigUint::from(1u8),
        }
    }

    /// Whether applying this factor changes anything.
    pub fn is_scaling(&self) -> bool {
        self.num != self.den
    }

    /// Scale one subsidy. Multiplies before dividing to keep precision.
    pub fn scale(&self, r: &BigUint) -> BigUint {
        if self.den.is_zero() {
            return r.clone();
        }
        (r * &self.num) / &self.den
    }
}

impl std::fmt::Display for ScalingFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_scaling() {
            write!(f, "{}/{}", self.num, self.den)
        } else {
            write!(f, "1")
        }
    }
}

/// Scale a block's subsidies against a budget.
///
/// Returns the adjusted subsidies and the factor used.
pub fn apply_to_block(budget: &Budget, subsidies: &[BigUint]) -> (Vec<BigUint>, ScalingFactor) {
    let sum: BigUint = subsidies.iter().sum();
    let factor = budget.apply(&sum);

    if !factor.is_scaling() {
        return (subsidies.to_vec(), factor);
    }

    let scaled = subsidies.iter().map(|r| factor.scale(r)).collect();
    (scaled, factor)
}

/// Convert an annual subsidy budget to a per-block budget.
pub fn annual_to_per_block(annual: &BigUint, blocks_per_year: u64) -> BigUint {
    if blocks_per_year == 0 {
        return BigUint::zero();
    }
    annual / BigUint::from(blocks_per_year)
}

/// Expected blocks per year for a given block interval.
pub fn blocks_per_year(block_interval_ms: u64) -> u64 {
    if block_interval_ms == 0 {
        return 0;
    }
    // 365.25 days of milliseconds.
    const MS_PER_YEAR: u64 = 31_557_600_000;
    MS_PER_YEAR / block_interval_ms
}
