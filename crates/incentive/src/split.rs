//! Two-party Shapley split and inclusion classification.

use fairshard_types::InclusionClass;
use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::Zero;

/// Split the total reward of a cross-shard transfer between the source
/// and destination proposers.
///
/// The Shapley allocation over `total = f_AB + R` is
///
/// ```text
/// u_A = (total + (E_A - E_B)) / 2
/// u_B = (total - (E_A - E_B)) / 2
/// ```
///
/// computed in the signed domain with floor division, then clamped so
/// both utilities stay non-negative. Conservation is absolute:
/// `u_A + u_B == total` always holds, so when the numerator is odd the
/// leftover unit stays with the destination side via `u_B = total - u_A`.
pub fn split_reward(
    f_ab: &BigUint,
    r: &BigUint,
    e_a: &BigUint,
    e_b: &BigUint,
) -> (BigUint, BigUint) {
    let total = f_ab + r;
    let total_signed = BigInt::from(total.clone());
    let diff = BigInt::from(e_a.clone()) - BigInt::from(e_b.clone());

    let u_a_star = (&total_signed + &diff).div_floor(&BigInt::from(2));

    if u_a_star < BigInt::zero() {
        return (BigUint::zero(), total);
    }
    if u_a_star > total_signed {
        return (total, BigUint::zero());
    }

    let u_a = u_a_star.to_biguint().unwrap_or_default();
    let u_b = &total - &u_a;
    (u_a, u_b)
}

/// Classify a cross-shard transfer from the source proposer's view.
///
/// - `Include` when `u_A >= E(f_A)`: at least as attractive as the
///   opportunity cost of an average local transaction.
/// - `Defer` when `u_A <= E(f_A) - E(f_B)`: least attractive. The
///   comparison happens before any subtraction, so an unsigned underflow
///   cannot occur; when `E(f_B) >= E(f_A)` the threshold is non-positive
///   and only a zero utility qualifies.
/// - `IfSpace` strictly between the two thresholds.
pub fn classify(u_a: &BigUint, e_a: &BigUint, e_b: &BigUint) -> InclusionClass {
    if u_a >= e_a {
        return InclusionClass::Include;
    }

    if e_b >= e_a {
        if u_a.is_zero() {
            return InclusionClass::Defer;
        }
        return InclusionClass::IfSpace;
    }

    let threshold = e_a - e_b;
    if *u_a <= threshold {
        InclusionClass::Defer
    } else {
        InclusionClass::IfSpace
    }
}
