//! Monte Carlo power estimates.
//!
//! Draws both arms from binomials, runs the same chi-square test `analyze` uses, and counts
//! rejections. Useful as a cross-check on the closed-form [`crate::power`], which ignores the
//! continuity correction.
//!
//! - Seeded, so a run is reproducible.
//! - Enabled by the `stochastic` feature.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Binomial, Distribution};
use tracing::debug;

use crate::design::chi_square_2x2;
use crate::monitor::wilson_bounds;
use crate::{Error, Result};

/// Result of [`simulate_power`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PowerSimulation {
    /// Fraction of trials with `p_value < alpha`.
    pub power: f64,
    /// 95% Wilson bounds on `power`.
    pub lower: f64,
    pub upper: f64,
    pub rejections: u64,
    pub trials: u64,
}

/// Estimate the power of the 2×2 chi-square test with `n` units per arm.
///
/// Errors:
/// - [`Error::Domain`] if `n == 0`, `trials == 0`, or a rate is outside `[0, 1]`
/// - [`Error::Configuration`] if `alpha` is outside `(0, 1)`
pub fn simulate_power(
    n: u64,
    p1: f64,
    p2: f64,
    alpha: f64,
    trials: u64,
    seed: u64,
) -> Result<PowerSimulation> {
    if n == 0 || trials == 0 {
        return Err(Error::domain("simulation needs positive n and trials"));
    }
    if !(alpha.is_finite() && alpha > 0.0 && alpha < 1.0) {
        return Err(Error::config(format!("alpha must be in (0, 1), got {alpha}")));
    }
    let arm = |p: f64| {
        Binomial::new(n, p)
            .map_err(|e| Error::domain(format!("rate {p} is not a probability: {e}")))
    };
    let (control, test) = (arm(p1)?, arm(p2)?);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut rejections = 0u64;
    for _ in 0..trials {
        let a = control.sample(&mut rng);
        let b = test.sample(&mut rng);
        if chi_square_2x2(a, n, b, n)?.p_value < alpha {
            rejections += 1;
        }
    }
    let (lower, upper, _) = wilson_bounds(rejections, trials, 1.96);
    let power = rejections as f64 / trials as f64;
    debug!(n, p1, p2, trials, power, "power simulated");
    Ok(PowerSimulation {
        power,
        lower,
        upper,
        rejections,
        trials,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_result() {
        let a = simulate_power(200, 0.5, 0.6, 0.05, 300, 7).unwrap();
        let b = simulate_power(200, 0.5, 0.6, 0.05, 300, 7).unwrap();
        assert_eq!(a, b);
        assert!(a.lower <= a.power && a.power <= a.upper);
    }

    #[test]
    fn invalid_inputs() {
        assert!(matches!(simulate_power(0, 0.5, 0.6, 0.05, 10, 0), Err(Error::Domain(_))));
        assert!(matches!(simulate_power(10, 1.5, 0.6, 0.05, 10, 0), Err(Error::Domain(_))));
        assert!(matches!(
            simulate_power(10, 0.5, 0.6, 1.0, 10, 0),
            Err(Error::Configuration(_))
        ));
    }
}
