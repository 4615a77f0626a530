//! Experiment configuration, deterministic assignment, and result analysis.
//!
//! An [`ExperimentManager`] is built once from an [`ExperimentConfig`]. Construction derives the
//! per-arm sample size (the largest one needed by any configured lift) and the resulting MDE;
//! after that the manager is immutable, so `assign` can be called from any number of threads.
//!
//! Analysis takes a [`ResultSet`] snapshot and compares every non-control variant against
//! control with a Yates-corrected 2×2 chi-square test and a 95% Wald interval on the rate
//! difference. [`ExperimentManager::analyze_stratified`] repeats that per risk stratum and pools
//! the strata with a Cochran–Mantel–Haenszel test, which removes the bias a risk mix imbalance
//! between arms would otherwise introduce.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::design::{self, ChiSquareTest, WALD_Z_95};
use crate::{key_bucket, stable_hash64, unit_interval};
use crate::{AllocationTable, Error, Result, ResultSet, Variant, VariantCounts};

/// Experiment design parameters.
///
/// Treated as immutable once handed to [`ExperimentManager::new`]; to change the design, build a
/// new manager.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ExperimentConfig {
    /// Baseline success rate of the control arm, in `[0, 1]`.
    pub control_rate: f64,
    /// Expected absolute lift over `control_rate` per non-control variant.
    ///
    /// Negative lifts are allowed (a schedule expected to do worse still has to be sized for).
    pub expected_lift: BTreeMap<Variant, f64>,
    /// Type I error rate (alpha), in `(0, 1)`.
    pub significance_level: f64,
    /// Target power (1 - beta), in `(0, 1)`.
    pub power: f64,
    /// Per-arm sample size. Derived at construction when absent.
    pub sample_size: Option<u64>,
    /// Minimum detectable effect at `sample_size`. Derived at construction when absent.
    pub mde: Option<f64>,
    /// Traffic fractions per variant.
    pub allocation: AllocationTable,
    /// Seed mixed into every assignment hash.
    pub hash_seed: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        let mut expected_lift = BTreeMap::new();
        expected_lift.insert(Variant::TestA, 0.02);
        expected_lift.insert(Variant::TestB, -0.01);
        Self {
            control_rate: 0.95,
            expected_lift,
            significance_level: 0.05,
            power: 0.80,
            sample_size: None,
            mde: None,
            allocation: AllocationTable::default(),
            hash_seed: 0,
        }
    }
}

impl ExperimentConfig {
    /// Type II error rate (`1 - power`).
    pub fn beta(&self) -> f64 {
        1.0 - self.power
    }

    /// Replace the expected lift for `variant`.
    pub fn with_lift(mut self, variant: Variant, lift: f64) -> Self {
        self.expected_lift.insert(variant, lift);
        self
    }

    /// Replace the allocation table.
    pub fn with_allocation(mut self, allocation: AllocationTable) -> Self {
        self.allocation = allocation;
        self
    }

    /// Replace the assignment hash seed.
    pub fn with_seed(mut self, hash_seed: u64) -> Self {
        self.hash_seed = hash_seed;
        self
    }

    /// Check bounds on every field. Allocation tables are validated when they are built.
    pub fn validate(&self) -> Result<()> {
        let alpha = self.significance_level;
        if !(alpha.is_finite() && alpha > 0.0 && alpha < 1.0) {
            return Err(Error::config(format!(
                "significance_level must be in (0, 1), got {alpha}"
            )));
        }
        if !(self.power.is_finite() && self.power > 0.0 && self.power < 1.0) {
            return Err(Error::config(format!(
                "power must be in (0, 1), got {}",
                self.power
            )));
        }
        if !(self.control_rate.is_finite() && (0.0..=1.0).contains(&self.control_rate)) {
            return Err(Error::config(format!(
                "control_rate must be in [0, 1], got {}",
                self.control_rate
            )));
        }
        for (&v, &lift) in &self.expected_lift {
            if v.is_control() {
                return Err(Error::config("control cannot have an expected lift"));
            }
            let p2 = self.control_rate + lift;
            if !(p2.is_finite() && (0.0..=1.0).contains(&p2)) {
                return Err(Error::config(format!(
                    "lift {lift} for {v} moves the rate outside [0, 1] ({p2})"
                )));
            }
        }
        if self.sample_size == Some(0) {
            return Err(Error::config("sample_size must be positive"));
        }
        if let Some(m) = self.mde {
            if !(m.is_finite() && m > 0.0) {
                return Err(Error::config(format!("mde must be positive, got {m}")));
            }
        }
        Ok(())
    }
}

/// One assignment with the values that produced it (for audit logs).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Assignment {
    pub variant: Variant,
    /// Raw 64-bit key hash.
    pub hash: u64,
    /// Hash mapped to `[0, 1)`; compared against cumulative allocation bounds.
    pub bucket: f64,
}

/// What a comparison says about a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Verdict {
    /// `p_value < alpha`. `improved` is true when the variant's rate is above control.
    Significant { improved: bool },
    /// Not significant and at least one arm is still short of the designed sample size.
    Underpowered { remaining_per_arm: u64 },
    /// Not significant with both arms at or above the designed sample size.
    NoDifference,
}

/// Comparison of one non-control variant against control.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VariantComparison {
    pub control_rate: f64,
    pub test_rate: f64,
    /// `test_rate - control_rate`.
    pub difference: f64,
    /// Yates-corrected chi-square statistic.
    pub chi_square: f64,
    pub p_value: f64,
    /// `p_value < alpha`.
    pub significant: bool,
    /// Lower bound of the 95% Wald interval on `difference`.
    pub ci_lower: f64,
    /// Upper bound of the 95% Wald interval on `difference`.
    pub ci_upper: f64,
    /// `difference / control_rate * 100`; `None` when the control rate is 0.
    pub lift_pct: Option<f64>,
    pub control_n: u64,
    pub test_n: u64,
    pub verdict: Verdict,
}

/// Result of [`ExperimentManager::analyze`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalysisReport {
    pub control: VariantCounts,
    pub control_rate: f64,
    pub alpha: f64,
    /// One entry per non-control variant present in the input.
    pub comparisons: BTreeMap<Variant, VariantComparison>,
}

impl AnalysisReport {
    /// Comparison for `variant`, if it was analyzed.
    pub fn comparison(&self, variant: Variant) -> Option<&VariantComparison> {
        self.comparisons.get(&variant)
    }

    /// Variants whose difference from control is significant, in stable order.
    pub fn significant_variants(&self) -> Vec<Variant> {
        self.comparisons
            .iter()
            .filter(|(_, c)| c.significant)
            .map(|(&v, _)| v)
            .collect()
    }
}

/// Strata-pooled comparison of one variant against control.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PooledComparison {
    /// Mantel–Haenszel weighted rate difference (`variant - control`).
    pub risk_difference: f64,
    /// Continuity-corrected Cochran–Mantel–Haenszel statistic.
    pub cmh_statistic: f64,
    pub p_value: f64,
    pub significant: bool,
    /// Number of strata contributing to the pooled estimate.
    pub strata_used: usize,
}

/// Result of [`ExperimentManager::analyze_stratified`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StratifiedReport {
    /// Per-stratum analysis for strata that passed validation.
    pub strata: BTreeMap<usize, AnalysisReport>,
    /// Strata left out, with the validation message.
    pub skipped: BTreeMap<usize, String>,
    /// Pooled comparison per non-control variant seen in at least one usable stratum.
    pub pooled: BTreeMap<Variant, PooledComparison>,
}

/// Owns an experiment's design and allocation; assigns keys and analyzes results.
#[derive(Debug, Clone)]
pub struct ExperimentManager {
    config: ExperimentConfig,
    sample_size: u64,
    mde: f64,
}

impl ExperimentManager {
    /// Validate `config` and derive the design.
    ///
    /// When `config.sample_size` is `None`, the per-arm size is the maximum over configured
    /// lifts of `sample_size(control_rate, control_rate + lift, alpha, 1 - power)`, i.e. the
    /// experiment is powered for the hardest-to-detect effect. When `config.mde` is `None` it is
    /// computed from the final sample size.
    ///
    /// Errors:
    /// - [`Error::Configuration`] for out-of-range fields, or when no lift is configured and no
    ///   sample size is supplied
    /// - [`Error::Domain`] for a zero lift, or an MDE derivation at a 0/1 control rate
    pub fn new(mut config: ExperimentConfig) -> Result<Self> {
        config.validate()?;
        let alpha = config.significance_level;
        let beta = config.beta();

        for &v in config.expected_lift.keys() {
            if !config.allocation.contains(v) {
                warn!(variant = %v, "expected lift configured for a variant with no allocation");
            }
        }

        let sample_size = match config.sample_size {
            Some(n) => n,
            None => {
                if config.expected_lift.is_empty() {
                    return Err(Error::config(
                        "cannot derive sample_size without an expected lift",
                    ));
                }
                let mut n_max = 0u64;
                for (&v, &lift) in &config.expected_lift {
                    let n = design::sample_size(
                        config.control_rate,
                        config.control_rate + lift,
                        alpha,
                        beta,
                    )
                    .map_err(|e| match e {
                        Error::Domain(msg) => Error::domain(format!("{v}: {msg}")),
                        other => other,
                    })?;
                    debug!(variant = %v, lift, n, "per-variant sample size");
                    n_max = n_max.max(n);
                }
                n_max
            }
        };

        let mde = match config.mde {
            Some(m) => m,
            None => design::mde(config.control_rate, sample_size, alpha, beta)?,
        };

        config.sample_size = Some(sample_size);
        config.mde = Some(mde);
        info!(sample_size, mde, alpha, power = config.power, "experiment design ready");

        Ok(Self {
            config,
            sample_size,
            mde,
        })
    }

    /// The configuration, with `sample_size` and `mde` filled in.
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Required sample size per arm.
    pub fn sample_size(&self) -> u64 {
        self.sample_size
    }

    /// Minimum detectable effect at [`ExperimentManager::sample_size`].
    pub fn mde(&self) -> f64 {
        self.mde
    }

    pub fn allocation(&self) -> &AllocationTable {
        &self.config.allocation
    }

    /// Deterministically assign `key` to a variant.
    ///
    /// Same key + same seed + same allocation table always gives the same variant; no state is
    /// stored. Never fails: `Control` covers any rounding gap at the top of the table.
    pub fn assign(&self, key: &str) -> Variant {
        self.config
            .allocation
            .bucket(key_bucket(self.config.hash_seed, key))
    }

    /// Like [`ExperimentManager::assign`], also returning the hash and bucket value.
    pub fn assign_explain(&self, key: &str) -> Assignment {
        let hash = stable_hash64(self.config.hash_seed, key);
        let bucket = unit_interval(hash);
        Assignment {
            variant: self.config.allocation.bucket(bucket),
            hash,
            bucket,
        }
    }

    /// Compare every non-control variant in `results` against control.
    ///
    /// Errors with [`Error::Validation`] when control is missing, any present variant has
    /// `total_count == 0`, or successes exceed totals.
    pub fn analyze(&self, results: &ResultSet) -> Result<AnalysisReport> {
        let control = *results
            .get(&Variant::Control)
            .ok_or_else(|| Error::validation("results must include control"))?;
        for (&v, c) in results {
            if c.total_count == 0 {
                return Err(Error::validation(format!(
                    "{v} has no observations; its rate is undefined"
                )));
            }
            if c.success_count > c.total_count {
                return Err(Error::validation(format!(
                    "{v}: success_count {} exceeds total_count {}",
                    c.success_count, c.total_count
                )));
            }
        }
        let alpha = self.config.significance_level;
        let control_rate = control.success_count as f64 / control.total_count as f64;

        let mut comparisons = BTreeMap::new();
        for (&v, &counts) in results.iter().filter(|(v, _)| !v.is_control()) {
            let test_rate = counts.success_count as f64 / counts.total_count as f64;
            let difference = test_rate - control_rate;
            let ChiSquareTest { statistic, p_value } = design::chi_square_2x2(
                control.success_count,
                control.total_count,
                counts.success_count,
                counts.total_count,
            )?;
            let (ci_lower, ci_upper) = design::wald_interval(
                control_rate,
                control.total_count,
                test_rate,
                counts.total_count,
                WALD_Z_95,
            )?;
            let significant = p_value < alpha;
            let lift_pct = if control_rate > 0.0 {
                Some(difference / control_rate * 100.0)
            } else {
                None
            };
            let verdict =
                self.verdict(significant, difference, control.total_count, counts.total_count);
            debug!(
                variant = %v,
                control_rate,
                test_rate,
                p_value,
                significant,
                "variant compared"
            );
            comparisons.insert(
                v,
                VariantComparison {
                    control_rate,
                    test_rate,
                    difference,
                    chi_square: statistic,
                    p_value,
                    significant,
                    ci_lower,
                    ci_upper,
                    lift_pct,
                    control_n: control.total_count,
                    test_n: counts.total_count,
                    verdict,
                },
            );
        }

        Ok(AnalysisReport {
            control,
            control_rate,
            alpha,
            comparisons,
        })
    }

    fn verdict(&self, significant: bool, difference: f64, n_c: u64, n_t: u64) -> Verdict {
        if significant {
            return Verdict::Significant {
                improved: difference > 0.0,
            };
        }
        let smallest = n_c.min(n_t);
        if smallest < self.sample_size {
            Verdict::Underpowered {
                remaining_per_arm: self.sample_size - smallest,
            }
        } else {
            Verdict::NoDifference
        }
    }

    /// Analyze each risk stratum separately and pool them per variant.
    ///
    /// Strata that fail [`ExperimentManager::analyze`] validation are reported in `skipped`.
    /// The pooled estimate is the Mantel–Haenszel rate difference with weights
    /// `n_c·n_t / (n_c + n_t)`; the test is the continuity-corrected CMH chi-square on one
    /// degree of freedom.
    ///
    /// Errors with [`Error::Validation`] when no stratum is usable.
    pub fn analyze_stratified(
        &self,
        strata: &BTreeMap<usize, ResultSet>,
    ) -> Result<StratifiedReport> {
        let mut reports = BTreeMap::new();
        let mut skipped = BTreeMap::new();
        for (&k, results) in strata {
            match self.analyze(results) {
                Ok(r) => {
                    reports.insert(k, r);
                }
                Err(e) => {
                    debug!(stratum = k, error = %e, "stratum skipped");
                    skipped.insert(k, e.to_string());
                }
            }
        }
        if reports.is_empty() {
            return Err(Error::validation("no stratum has analyzable results"));
        }

        let alpha = self.config.significance_level;
        let mut pooled = BTreeMap::new();
        for v in Variant::ALL.into_iter().filter(|v| !v.is_control()) {
            let mut weighted_diff = 0.0;
            let mut weight_sum = 0.0;
            let mut deviation = 0.0;
            let mut variance = 0.0;
            let mut used = 0usize;
            for (k, report) in &reports {
                let Some(counts) = strata.get(k).and_then(|r| r.get(&v)) else {
                    continue;
                };
                let c = report.control;
                let n_t = counts.total_count as f64;
                let n_c = c.total_count as f64;
                let n = n_t + n_c;
                let m1 = counts.success_count as f64 + c.success_count as f64;
                let m0 = n - m1;
                let p_t = counts.success_count as f64 / n_t;
                let p_c = c.success_count as f64 / n_c;

                let w = n_t * n_c / n;
                weighted_diff += w * (p_t - p_c);
                weight_sum += w;
                deviation += counts.success_count as f64 - n_t * m1 / n;
                variance += n_t * n_c * m1 * m0 / (n * n * (n - 1.0));
                used += 1;
            }
            if used == 0 {
                continue;
            }
            let (cmh_statistic, p_value) = if variance > 0.0 {
                let corrected = (deviation.abs() - 0.5).max(0.0);
                let stat = corrected * corrected / variance;
                (stat, design::chi_square_sf(stat)?)
            } else {
                (0.0, 1.0)
            };
            let risk_difference = weighted_diff / weight_sum;
            debug!(variant = %v, risk_difference, p_value, strata = used, "pooled across strata");
            pooled.insert(
                v,
                PooledComparison {
                    risk_difference,
                    cmh_statistic,
                    p_value,
                    significant: p_value < alpha,
                    strata_used: used,
                },
            );
        }

        Ok(StratifiedReport {
            strata: reports,
            skipped,
            pooled,
        })
    }
}
