//! Experiment design math for two-proportion comparisons.
//!
//! Closed-form normal approximations:
//!
//! ```text
//!   mde   = sqrt(2 (z_{1-α/2} + z_{1-β})² p1(1-p1) / n)
//!   n     = ceil((z_{1-α/2} + z_{1-β})² (p1(1-p1) + p2(1-p2)) / (p1-p2)²)
//!   power = Φ(|p1-p2| / sqrt(2 p̄(1-p̄)/n) − z_{1-α/2}),   p̄ = (p1+p2)/2
//! ```
//!
//! `n` is always per arm. Sizing uses the unpooled variance sum while `power` uses the pooled
//! rate, so `power(sample_size(..))` lands slightly under `1-β` for large effects; for the
//! small lifts typical of retry tuning the gap is far below a percentage point.
//!
//! The test primitives used by analysis (2×2 chi-square, Wald interval) live here too so the
//! design side and the analysis side share one set of distributions.

use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

use crate::{Error, Result};

/// Two-sided 95% normal critical value used for Wald intervals in reports.
pub const WALD_Z_95: f64 = 1.96;

fn check_error_rate(name: &str, x: f64) -> Result<()> {
    if x.is_finite() && x > 0.0 && x < 1.0 {
        Ok(())
    } else {
        Err(Error::config(format!("{name} must be in (0, 1), got {x}")))
    }
}

fn check_rate(name: &str, p: f64) -> Result<()> {
    if p.is_finite() && (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(Error::domain(format!("{name} must be a rate in [0, 1], got {p}")))
    }
}

/// Standard-normal quantile `Φ⁻¹(p)` for `p` in `(0, 1)`.
pub fn z_quantile(p: f64) -> Result<f64> {
    if !(p.is_finite() && p > 0.0 && p < 1.0) {
        return Err(Error::domain(format!(
            "normal quantile needs p in (0, 1), got {p}"
        )));
    }
    Ok(Normal::new(0.0, 1.0)?.inverse_cdf(p))
}

/// Standard-normal CDF `Φ(x)`.
pub fn normal_cdf(x: f64) -> Result<f64> {
    Ok(Normal::new(0.0, 1.0)?.cdf(x))
}

/// `z_{1-α/2} + z_{1-β}`.
fn z_sum(alpha: f64, beta: f64) -> Result<f64> {
    check_error_rate("alpha", alpha)?;
    check_error_rate("beta", beta)?;
    Ok(z_quantile(1.0 - alpha / 2.0)? + z_quantile(1.0 - beta)?)
}

/// Minimum absolute difference detectable against baseline rate `p1` with `sample_size`
/// units per arm.
///
/// Errors:
/// - [`Error::Domain`] if `sample_size == 0` or `p1` is not strictly inside `(0, 1)`
/// - [`Error::Configuration`] if `alpha` or `beta` is outside `(0, 1)`
pub fn mde(p1: f64, sample_size: u64, alpha: f64, beta: f64) -> Result<f64> {
    if sample_size == 0 {
        return Err(Error::domain("mde needs a positive sample size"));
    }
    if !(p1.is_finite() && p1 > 0.0 && p1 < 1.0) {
        return Err(Error::domain(format!(
            "mde needs a baseline rate strictly inside (0, 1), got {p1}"
        )));
    }
    let z = z_sum(alpha, beta)?;
    let numerator = z * z * p1 * (1.0 - p1);
    Ok((2.0 * numerator / sample_size as f64).sqrt())
}

/// Per-arm sample size needed to detect a true difference `p1 - p2` at the given error rates.
///
/// Errors:
/// - [`Error::Domain`] if `p1 == p2` (no effect to detect) or either rate is outside `[0, 1]`
/// - [`Error::Configuration`] if `alpha` or `beta` is outside `(0, 1)`
pub fn sample_size(p1: f64, p2: f64, alpha: f64, beta: f64) -> Result<u64> {
    check_rate("p1", p1)?;
    check_rate("p2", p2)?;
    let diff = p1 - p2;
    if diff == 0.0 {
        return Err(Error::domain(format!(
            "sample size is undefined for equal proportions ({p1})"
        )));
    }
    let z = z_sum(alpha, beta)?;
    let variance = p1 * (1.0 - p1) + p2 * (1.0 - p2);
    let n = (z * z * variance / (diff * diff)).ceil();
    if !n.is_finite() || n > u64::MAX as f64 {
        return Err(Error::domain(format!(
            "sample size overflows for p1={p1}, p2={p2}"
        )));
    }
    // A 0/1 vs 1/0 comparison has zero variance; one unit per arm already separates them.
    Ok((n as u64).max(1))
}

/// Achieved power of a two-sided test with `n` units per arm, using the pooled standard error.
///
/// The result is clamped to at most 1.0.
///
/// Errors:
/// - [`Error::Domain`] if `n == 0`, a rate is outside `[0, 1]`, or the pooled rate is 0 or 1
///   (zero standard error)
/// - [`Error::Configuration`] if `alpha` is outside `(0, 1)`
pub fn power(n: u64, p1: f64, p2: f64, alpha: f64) -> Result<f64> {
    if n == 0 {
        return Err(Error::domain("power needs a positive sample size"));
    }
    check_rate("p1", p1)?;
    check_rate("p2", p2)?;
    check_error_rate("alpha", alpha)?;
    let p_bar = (p1 + p2) / 2.0;
    let se = (2.0 * p_bar * (1.0 - p_bar) / n as f64).sqrt();
    if se <= 0.0 {
        return Err(Error::domain(format!(
            "power is undefined for a pooled rate of {p_bar}"
        )));
    }
    let z_alpha = z_quantile(1.0 - alpha / 2.0)?;
    let z_beta = (p1 - p2).abs() / se - z_alpha;
    Ok(normal_cdf(z_beta)?.min(1.0))
}

/// Outcome of a chi-square test on a 2×2 success/failure table.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChiSquareTest {
    /// Test statistic (Yates-corrected).
    pub statistic: f64,
    /// Upper-tail probability under chi-square with one degree of freedom.
    pub p_value: f64,
}

/// Chi-square test of independence on the table
///
/// ```text
///   [ a_success  a_total-a_success ]
///   [ b_success  b_total-b_success ]
/// ```
///
/// with Yates' continuity correction (each `|O-E|` shrunk by `min(0.5, |O-E|)`).
///
/// A table whose success column or failure column is entirely zero carries no evidence of a
/// difference: statistic 0, p-value 1.
///
/// Errors with [`Error::Validation`] if a total is 0 or successes exceed the total.
pub fn chi_square_2x2(
    a_success: u64,
    a_total: u64,
    b_success: u64,
    b_total: u64,
) -> Result<ChiSquareTest> {
    if a_total == 0 || b_total == 0 {
        return Err(Error::validation("chi-square needs both arms to be non-empty"));
    }
    if a_success > a_total || b_success > b_total {
        return Err(Error::validation("successes cannot exceed totals"));
    }
    let observed = [
        [a_success as f64, (a_total - a_success) as f64],
        [b_success as f64, (b_total - b_success) as f64],
    ];
    let rows = [a_total as f64, b_total as f64];
    // Saturated counters can sit at u64::MAX; marginals are summed in f64.
    let cols = [
        observed[0][0] + observed[1][0],
        observed[0][1] + observed[1][1],
    ];
    let grand = rows[0] + rows[1];
    if cols[0] == 0.0 || cols[1] == 0.0 {
        return Ok(ChiSquareTest {
            statistic: 0.0,
            p_value: 1.0,
        });
    }

    let mut statistic = 0.0;
    for (i, row) in observed.iter().enumerate() {
        for (j, &o) in row.iter().enumerate() {
            let e = rows[i] * cols[j] / grand;
            let dev = (o - e).abs();
            let corrected = dev - dev.min(0.5);
            statistic += corrected * corrected / e;
        }
    }
    let p_value = chi_square_sf(statistic)?;
    Ok(ChiSquareTest { statistic, p_value })
}

/// Upper-tail probability of chi-square with one degree of freedom.
pub(crate) fn chi_square_sf(statistic: f64) -> Result<f64> {
    let dist = ChiSquared::new(1.0)?;
    Ok((1.0 - dist.cdf(statistic)).clamp(0.0, 1.0))
}

/// Wald interval for the difference `p_t - p_c` of two independent proportions.
///
/// `SE = sqrt(p_c(1-p_c)/n_c + p_t(1-p_t)/n_t)`; returns `(diff - z·SE, diff + z·SE)`.
///
/// Errors with [`Error::Validation`] if either count is 0.
pub fn wald_interval(p_c: f64, n_c: u64, p_t: f64, n_t: u64, z: f64) -> Result<(f64, f64)> {
    if n_c == 0 || n_t == 0 {
        return Err(Error::validation("wald interval needs both arms to be non-empty"));
    }
    let se = (p_c * (1.0 - p_c) / n_c as f64 + p_t * (1.0 - p_t) / n_t as f64).sqrt();
    let diff = p_t - p_c;
    Ok((diff - z * se, diff + z * se))
}
