//! Subsidy engine with PID and Lagrangian control loops.

use crate::config::{
    CustomSubsidyFn, IncentiveConfig, LagrangianParams, PidParams, SubsidyMode, SubsidyPolicy,
};
use num_bigint::{BigInt, BigUint};
use num_traits::{ToPrimitive, Zero};
use parking_lot::Mutex;
use std::time::Instant;
use tracing::{debug, warn};

/// Fixed subsidy paid under [`SubsidyMode::ExtremeFixed`]: 1 ETH in wei.
const EXTREME_FIXED_WEI: u64 = 1_000_000_000_000_000_000;

/// Fixed-point denominator for re-entering integer space from the
/// control-loop multiplier. One conversion per subsidy calculation.
const MULTIPLIER_SCALE: u64 = 1_000_000;

/// Dynamic shard state consumed by the control-loop policies.
///
/// The destination-side queue length drives both controllers. The other
/// fields are carried for collaborators that assemble the snapshot from
/// pool state.
#[derive(Debug, Clone, Default)]
pub struct QueueMetrics {
    /// Transactions queued in the source shard.
    pub queue_length_a: u64,
    /// Transactions queued in the destination shard.
    pub queue_length_b: u64,
    /// Average wait in the source shard queue, milliseconds.
    pub avg_wait_ms_a: f64,
    /// Average wait in the destination shard queue, milliseconds.
    pub avg_wait_ms_b: f64,
    /// Total subsidy issued in the current epoch.
    pub current_inflation: BigUint,
}

/// PID controller state.
#[derive(Debug)]
struct PidState {
    integral: f64,
    prev_error: f64,
    last_update: Instant,
}

impl PidState {
    fn new(now: Instant) -> Self {
        Self {
            integral: 0.0,
            prev_error: 0.0,
            last_update: now,
        }
    }

    /// One PID step over destination queue utilization.
    ///
    /// The error signal is `utilization - target`; the output shifts the
    /// subsidy multiplier away from 1. The integral term is clamped to
    /// `[-10, 10]` so a long overload cannot wind it up.
    fn calculate(&mut self, params: &PidParams, metrics: &QueueMetrics, e_b: &BigUint) -> BigUint {
        let now = Instant::now();

        let capacity = if params.capacity_b > 0.0 {
            params.capacity_b
        } else {
            1000.0
        };
        let utilization = metrics.queue_length_b as f64 / capacity;
        let error = utilization - params.target_utilization;

        let dt = now.duration_since(self.last_update).as_secs_f64().max(1.0);

        self.integral = (self.integral + error * dt).min(10.0).max(-10.0);
        let derivative = (error - self.prev_error) / dt;

        let output = params.kp * error + params.ki * self.integral + params.kd * derivative;

        self.prev_error = error;
        self.last_update = now;

        let multiplier = (1.0 + output)
            .min(params.max_subsidy)
            .max(params.min_subsidy);
        scale_by_multiplier(e_b, multiplier)
    }
}

/// Lagrangian shadow-price controller state.
#[derive(Debug)]
struct LagrangianState {
    /// Shadow price lambda. Carries over across epochs.
    lambda: f64,
    /// Copy of the last reported epoch subsidy total.
    total_subsidy: BigUint,
    epoch_start: Instant,
    last_update: Instant,
}

impl LagrangianState {
    fn new(now: Instant) -> Self {
        Self {
            lambda: 1.0,
            total_subsidy: BigUint::zero(),
            epoch_start: now,
            last_update: now,
        }
    }

    /// Congestion-weighted subsidy damped by the shadow price.
    ///
    /// `R = E(f_B) * (queue_B / window)^exp / max(lambda, lambda_min)`.
    fn calculate(
        &mut self,
        params: &LagrangianParams,
        metrics: &QueueMetrics,
        e_b: &BigUint,
    ) -> BigUint {
        let window = if params.window_size > 0.0 {
            params.window_size
        } else {
            1000.0
        };
        let utilization = metrics.queue_length_b as f64 / window;
        let congestion = utilization.powf(params.congestion_exp);

        let lambda = self.lambda.max(params.lambda_min);
        scale_by_multiplier(e_b, congestion / lambda)
    }
}

/// Scale an integer amount by a bounded floating multiplier.
///
/// The multiplier is floored into micro-units, then the whole product is
/// computed in integers. Non-positive or non-finite multipliers yield 0,
/// which also covers the "clamp to >= 0" requirement on every subsidy.
fn scale_by_multiplier(base: &BigUint, multiplier: f64) -> BigUint {
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return BigUint::zero();
    }
    let micros = (multiplier * MULTIPLIER_SCALE as f64).floor();
    if micros <= 0.0 {
        return BigUint::zero();
    }
    (base * BigUint::from(micros as u128)) / BigUint::from(MULTIPLIER_SCALE)
}

/// Stateful subsidy engine.
///
/// Holds the immutable configuration and the control-loop state for the
/// PID and Lagrangian policies behind a single mutex. Every operation,
/// reads included, takes the guard: the float state must never be
/// observed half-updated.
///
/// The engine never sees the transfer fee `f_AB`.
#[derive(Debug)]
pub struct SubsidyEngine {
    config: IncentiveConfig,
    state: Mutex<ControllerState>,
}

#[derive(Debug)]
struct ControllerState {
    pid: PidState,
    lagrangian: LagrangianState,
}

impl SubsidyEngine {
    /// Create an engine from a validated configuration.
    pub fn new(config: IncentiveConfig) -> Self {
        let now = Instant::now();
        Self {
            config,
            state: Mutex::new(ControllerState {
                pid: PidState::new(now),
                lagrangian: LagrangianState::new(now),
            }),
        }
    }

    /// The engine's configuration.
    pub fn config(&self) -> &IncentiveConfig {
        &self.config
    }

    /// Tag of the configured policy.
    pub fn mode(&self) -> SubsidyMode {
        self.config.policy.mode()
    }

    /// Per-epoch inflation budget from the configuration.
    pub fn max_inflation(&self) -> &BigUint {
        &self.config.max_inflation
    }

    /// Compute the subsidy `R_AB` for a transfer from shard A to shard B.
    ///
    /// `e_a` and `e_b` are the fee expectations of the two shards;
    /// `metrics` feeds the control-loop policies and may be absent for
    /// the static ones (the control loops yield 0 without it).
    pub fn calculate_subsidy(
        &self,
        e_a: &BigUint,
        e_b: &BigUint,
        metrics: Option<&QueueMetrics>,
    ) -> BigUint {
        let mut state = self.state.lock();
        match &self.config.policy {
            SubsidyPolicy::None => BigUint::zero(),
            SubsidyPolicy::DestAvg => e_b.clone(),
            SubsidyPolicy::SumAvg => e_a + e_b,
            SubsidyPolicy::Custom(f) => f(e_a, e_b),
            SubsidyPolicy::ExtremeFixed => BigUint::from(EXTREME_FIXED_WEI),
            SubsidyPolicy::Pid(params) => match metrics {
                Some(metrics) => state.pid.calculate(params, metrics, e_b),
                None => BigUint::zero(),
            },
            SubsidyPolicy::Lagrangian(params) => match metrics {
                Some(metrics) => state.lagrangian.calculate(params, metrics, e_b),
                None => BigUint::zero(),
            },
        }
    }

    /// Move the shadow price toward the inflation constraint.
    ///
    /// Called after each committed block, before any epoch reset:
    /// `lambda += alpha * (total - limit) / limit`, clamped to the
    /// configured bounds. A zero limit leaves lambda untouched. No-op for
    /// non-Lagrangian policies.
    pub fn update_shadow_price(&self, total_subsidy_issued: &BigUint, inflation_limit: &BigUint) {
        let SubsidyPolicy::Lagrangian(params) = &self.config.policy else {
            return;
        };
        let mut state = self.state.lock();
        let lagrangian = &mut state.lagrangian;

        let normalized = if inflation_limit.is_zero() {
            0.0
        } else {
            let violation = BigInt::from(total_subsidy_issued.clone())
                - BigInt::from(inflation_limit.clone());
            let violation = violation.to_f64().unwrap_or(0.0);
            let limit = inflation_limit.to_f64().unwrap_or(f64::INFINITY);
            violation / limit
        };

        let next = (lagrangian.lambda + params.alpha * normalized)
            .min(params.lambda_max)
            .max(params.lambda_min);

        debug!(
            lambda = next,
            total = %total_subsidy_issued,
            limit = %inflation_limit,
            since_last_ms = lagrangian.last_update.elapsed().as_millis() as u64,
            "Shadow price updated"
        );

        lagrangian.lambda = next;
        lagrangian.total_subsidy = total_subsidy_issued.clone();
        lagrangian.last_update = Instant::now();
    }

    /// Start a new epoch: zero the accumulated subsidy total and reset
    /// the epoch timestamps. Lambda is preserved so the controller keeps
    /// its memory of past over- and under-spending.
    pub fn reset_epoch(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        debug!(
            epoch_ms = state.lagrangian.epoch_start.elapsed().as_millis() as u64,
            lambda = state.lagrangian.lambda,
            "Epoch reset"
        );
        state.lagrangian.total_subsidy = BigUint::zero();
        state.lagrangian.epoch_start = now;
        state.lagrangian.last_update = now;
    }

    /// Current shadow price.
    pub fn shadow_price(&self) -> f64 {
        self.state.lock().lagrangian.lambda
    }

    /// Subsidy total last reported to [`Self::update_shadow_price`].
    pub fn epoch_subsidy_total(&self) -> BigUint {
        self.state.lock().lagrangian.total_subsidy.clone()
    }
}

/// Stateless subsidy computation for legacy call sites.
///
/// The PID and Lagrangian modes cannot run without controller state, so
/// this path degrades them to `DestAvg` and logs a warning. New code uses
/// [`SubsidyEngine::calculate_subsidy`].
pub fn stateless_subsidy(
    mode: SubsidyMode,
    e_a: &BigUint,
    e_b: &BigUint,
    _metrics: Option<&QueueMetrics>,
    custom: Option<&CustomSubsidyFn>,
) -> BigUint {
    match mode {
        SubsidyMode::None => BigUint::zero(),
        SubsidyMode::DestAvg => e_b.clone(),
        SubsidyMode::SumAvg => e_a + e_b,
        SubsidyMode::Custom => match custom {
            Some(f) => f(e_a, e_b),
            None => e_b.clone(),
        },
        SubsidyMode::ExtremeFixed => BigUint::from(EXTREME_FIXED_WEI),
        SubsidyMode::Pid | SubsidyMode::Lagrangian => {
            warn!(%mode, "Stateless subsidy cannot run a control loop; using DestAvg");
            e_b.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn big(v: u64) -> BigUint {
        BigUint::from(v)
    }

    fn make_engine(policy: SubsidyPolicy) -> SubsidyEngine {
        SubsidyEngine::new(IncentiveConfig {
            policy,
            ..IncentiveConfig::default()
        })
    }

    fn metrics_with_queue_b(queue_length_b: u64) -> QueueMetrics {
        QueueMetrics {
            queue_length_b,
            ..QueueMetrics::default()
        }
    }

    #[test]
    fn test_none_mode() {
        let engine = make_engine(SubsidyPolicy::None);
        assert_eq!(
            engine.calculate_subsidy(&big(1000), &big(500), None),
            BigUint::zero()
        );
    }

    #[test]
    fn test_dest_avg_mode() {
        let engine = make_engine(SubsidyPolicy::DestAvg);
        assert_eq!(engine.calculate_subsidy(&big(1000), &big(500), None), big(500));
    }

    #[test]
    fn test_sum_avg_mode() {
        let engine = make_engine(SubsidyPolicy::SumAvg);
        assert_eq!(engine.calculate_subsidy(&big(1000), &big(500), None), big(1500));
    }

    #[test]
    fn test_custom_mode() {
        let double_source: CustomSubsidyFn = Arc::new(|e_a, _| e_a * 2u32);
        let engine = make_engine(SubsidyPolicy::Custom(double_source));
        assert_eq!(engine.calculate_subsidy(&big(1000), &big(500), None), big(2000));
    }

    #[test]
    fn test_extreme_fixed_mode() {
        let engine = make_engine(SubsidyPolicy::ExtremeFixed);
        assert_eq!(
            engine.calculate_subsidy(&big(1), &big(1), None),
            BigUint::from(1_000_000_000_000_000_000u64)
        );
    }

    #[test]
    fn test_pid_first_step() {
        // kp=1, ki=0, kd=0, target 0.5, capacity 1000. Full queue gives
        // utilization 1.0, error 0.5, multiplier 1.5.
        let engine = make_engine(SubsidyPolicy::Pid(PidParams {
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
            target_utilization: 0.5,
            capacity_b: 1000.0,
            min_subsidy: 0.0,
            max_subsidy: 5.0,
        }));
        let r = engine.calculate_subsidy(&big(0), &big(1000), Some(&metrics_with_queue_b(1000)));
        assert_eq!(r, big(1500));
    }

    #[test]
    fn test_pid_multiplier_clamped() {
        let engine = make_engine(SubsidyPolicy::Pid(PidParams {
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
            target_utilization: 0.5,
            capacity_b: 1000.0,
            min_subsidy: 0.0,
            max_subsidy: 5.0,
        }));
        // utilization 10.0 drives the raw multiplier far above the cap.
        let r = engine.calculate_subsidy(&big(0), &big(1000), Some(&metrics_with_queue_b(10_000)));
        assert_eq!(r, big(5000));
    }

    #[test]
    fn test_pid_result_never_negative() {
        // An empty queue with min_subsidy 0 floors the multiplier at 0.
        let engine = make_engine(SubsidyPolicy::Pid(PidParams {
            kp: 10.0,
            ki: 0.0,
            kd: 0.0,
            target_utilization: 0.9,
            capacity_b: 1000.0,
            min_subsidy: 0.0,
            max_subsidy: 5.0,
        }));
        let r = engine.calculate_subsidy(&big(0), &big(1000), Some(&metrics_with_queue_b(0)));
        assert_eq!(r, BigUint::zero());
    }

    #[test]
    fn test_pid_without_metrics_is_zero() {
        let engine = make_engine(SubsidyPolicy::Pid(PidParams::default()));
        assert_eq!(
            engine.calculate_subsidy(&big(0), &big(1000), None),
            BigUint::zero()
        );
    }

    #[test]
    fn test_lagrangian_congestion_factor() {
        // Half-full window, quadratic exponent: multiplier 0.25.
        let engine = make_engine(SubsidyPolicy::Lagrangian(LagrangianParams {
            alpha: 0.01,
            window_size: 1000.0,
            lambda_min: 1.0,
            lambda_max: 10.0,
            congestion_exp: 2.0,
        }));
        let r = engine.calculate_subsidy(&big(0), &big(1000), Some(&metrics_with_queue_b(500)));
        assert_eq!(r, big(250));
    }

    #[test]
    fn test_lagrangian_lambda_damps_subsidy() {
        let params = LagrangianParams {
            alpha: 1.0,
            window_size: 1000.0,
            lambda_min: 1.0,
            lambda_max: 10.0,
            congestion_exp: 1.0,
        };
        let engine = make_engine(SubsidyPolicy::Lagrangian(params));

        let before = engine.calculate_subsidy(&big(0), &big(1000), Some(&metrics_with_queue_b(500)));
        assert_eq!(before, big(500));

        // Overspend by 4x: lambda jumps from 1.0 toward 4.0.
        engine.update_shadow_price(&big(5000), &big(1000));
        let after = engine.calculate_subsidy(&big(0), &big(1000), Some(&metrics_with_queue_b(500)));
        assert_eq!(after, big(100));
    }

    #[test]
    fn test_shadow_price_small_violation() {
        // 20% over budget with alpha 0.01 moves lambda by 0.002.
        let engine = make_engine(SubsidyPolicy::Lagrangian(LagrangianParams::default()));
        let limit = big(5_000_000_000_000_000_000);
        let total = big(6_000_000_000_000_000_000);

        engine.update_shadow_price(&total, &limit);
        assert!((engine.shadow_price() - 1.002).abs() < 1e-9);

        for _ in 0..9 {
            engine.update_shadow_price(&total, &limit);
        }
        assert!((engine.shadow_price() - 1.02).abs() < 1e-9);
    }

    #[test]
    fn test_shadow_price_stays_in_bounds() {
        let engine = make_engine(SubsidyPolicy::Lagrangian(LagrangianParams {
            alpha: 100.0,
            window_size: 1000.0,
            lambda_min: 1.0,
            lambda_max: 10.0,
            congestion_exp: 2.0,
        }));

        // Massive overspend saturates at lambda_max.
        engine.update_shadow_price(&big(1_000_000), &big(1));
        assert_eq!(engine.shadow_price(), 10.0);

        // Massive underspend saturates at lambda_min.
        engine.update_shadow_price(&big(0), &big(1_000_000));
        assert_eq!(engine.shadow_price(), 1.0);
    }

    #[test]
    fn test_shadow_price_zero_limit_is_inert() {
        let engine = make_engine(SubsidyPolicy::Lagrangian(LagrangianParams::default()));
        engine.update_shadow_price(&big(1_000_000), &BigUint::zero());
        assert_eq!(engine.shadow_price(), 1.0);
    }

    #[test]
    fn test_reset_epoch_preserves_lambda() {
        let engine = make_engine(SubsidyPolicy::Lagrangian(LagrangianParams {
            alpha: 1.0,
            ..LagrangianParams::default()
        }));
        engine.update_shadow_price(&big(3000), &big(1000));
        let lambda = engine.shadow_price();
        assert!(lambda > 1.0);

        engine.reset_epoch();
        assert_eq!(engine.shadow_price(), lambda);
        assert_eq!(engine.epoch_subsidy_total(), BigUint::zero());
    }

    #[test]
    fn test_update_shadow_price_ignored_for_static_policy() {
        let engine = make_engine(SubsidyPolicy::DestAvg);
        engine.update_shadow_price(&big(1_000_000), &big(1));
        assert_eq!(engine.shadow_price(), 1.0);
    }

    #[test]
    fn test_stateless_static_modes() {
        let e_a = big(1000);
        let e_b = big(500);
        assert_eq!(
            stateless_subsidy(SubsidyMode::None, &e_a, &e_b, None, None),
            BigUint::zero()
        );
        assert_eq!(
            stateless_subsidy(SubsidyMode::DestAvg, &e_a, &e_b, None, None),
            big(500)
        );
        assert_eq!(
            stateless_subsidy(SubsidyMode::SumAvg, &e_a, &e_b, None, None),
            big(1500)
        );
    }

    #[test]
    fn test_stateless_custom_falls_back_without_fn() {
        assert_eq!(
            stateless_subsidy(SubsidyMode::Custom, &big(1000), &big(500), None, None),
            big(500)
        );
        let custom: CustomSubsidyFn = Arc::new(|e_a, e_b| e_a + e_b);
        assert_eq!(
            stateless_subsidy(SubsidyMode::Custom, &big(1000), &big(500), None, Some(&custom)),
            big(1500)
        );
    }

    #[test]
    fn test_stateless_control_loops_degrade_to_dest_avg() {
        assert_eq!(
            stateless_subsidy(SubsidyMode::Pid, &big(1000), &big(500), None, None),
            big(500)
        );
        assert_eq!(
            stateless_subsidy(SubsidyMode::Lagrangian, &big(1000), &big(500), None, None),
            big(500)
        );
    }

    #[test]
    fn test_scale_by_multiplier_floor_and_clamp() {
        assert_eq!(scale_by_multiplier(&big(1000), 1.5), big(1500));
        assert_eq!(scale_by_multiplier(&big(1000), 0.0), BigUint::zero());
        assert_eq!(scale_by_multiplier(&big(1000), -2.0), BigUint::zero());
        assert_eq!(scale_by_multiplier(&big(1000), f64::NAN), BigUint::zero());
        // floor(1000 * 0.0000005) = 0 in micro-unit fixed point.
        assert_eq!(scale_by_multiplier(&big(1), 0.0000005), BigUint::zero());
    }
}
