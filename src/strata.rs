//! Risk-score stratification.
//!
//! A [`StratifiedSampler`] cuts a population of risk scores into `k` quantile strata. The
//! boundaries come from the sampler's own population snapshot and never change afterwards,
//! so the same score always lands in the same stratum for the life of the sampler.

use std::collections::BTreeMap;

use tracing::debug;

use crate::{Error, Result};

/// Score used for samples that carry no risk score.
pub const DEFAULT_RISK_SCORE: f64 = 0.5;

/// Samples grouped by stratum index (`0..k`, every index present).
pub type Strata<T> = BTreeMap<usize, Vec<T>>;

/// Anything with an optional risk score in `[0, 1]`.
pub trait RiskScored {
    fn risk_score(&self) -> Option<f64>;
}

impl RiskScored for f64 {
    fn risk_score(&self) -> Option<f64> {
        Some(*self)
    }
}

impl RiskScored for Option<f64> {
    fn risk_score(&self) -> Option<f64> {
        *self
    }
}

/// External risk model: predicts the failure risk of a transaction.
///
/// Implementations should return a value in `[0, 1]`.
pub trait RiskScorer<T> {
    fn predict_risk(&self, item: &T) -> f64;
}

impl<T, F> RiskScorer<T> for F
where
    F: Fn(&T) -> f64,
{
    fn predict_risk(&self, item: &T) -> f64 {
        self(item)
    }
}

/// An item paired with the score it was stratified on.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Scored<T> {
    pub item: T,
    pub score: f64,
}

impl<T> RiskScored for Scored<T> {
    fn risk_score(&self) -> Option<f64> {
        Some(self.score)
    }
}

/// Coarse label for three-way stratification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Label for a stratum index from a `k = 3` sampler.
    pub fn from_stratum(stratum: usize) -> Option<Self> {
        match stratum {
            0 => Some(Self::Low),
            1 => Some(Self::Medium),
            2 => Some(Self::High),
            _ => None,
        }
    }
}

/// Quantile-based stratifier over risk scores.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StratifiedSampler {
    k: usize,
    boundaries: Vec<f64>,
}

impl StratifiedSampler {
    /// Build `k` strata from a population of scores.
    ///
    /// Boundary `i` (for `i in 1..k`) is the `i/k` quantile of the population, linearly
    /// interpolated between order statistics.
    ///
    /// Errors:
    /// - [`Error::Configuration`] if `k == 0`
    /// - [`Error::Validation`] if the population is empty or contains a non-finite score
    pub fn new(population_scores: &[f64], k: usize) -> Result<Self> {
        if k == 0 {
            return Err(Error::config("number of strata must be at least 1"));
        }
        if population_scores.is_empty() {
            return Err(Error::validation(
                "stratum boundaries need at least one population score",
            ));
        }
        if let Some(bad) = population_scores.iter().find(|s| !s.is_finite()) {
            return Err(Error::validation(format!(
                "population scores must be finite, got {bad}"
            )));
        }
        let mut sorted = population_scores.to_vec();
        sorted.sort_by(f64::total_cmp);
        let boundaries = (1..k)
            .map(|i| quantile_sorted(&sorted, i as f64 / k as f64))
            .collect::<Vec<_>>();
        debug!(k, n = sorted.len(), ?boundaries, "stratum boundaries");
        Ok(Self { k, boundaries })
    }

    /// Number of strata.
    pub fn k(&self) -> usize {
        self.k
    }

    /// The `k - 1` non-decreasing cut points.
    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    /// Stratum index of `score`.
    ///
    /// A score equal to a boundary goes to the stratum above it.
    pub fn stratum_of(&self, score: f64) -> usize {
        self.boundaries.partition_point(|&b| b <= score)
    }

    /// [`RiskLevel`] of `score`; `None` unless the sampler has exactly three strata.
    pub fn risk_level(&self, score: f64) -> Option<RiskLevel> {
        if self.k != 3 {
            return None;
        }
        RiskLevel::from_stratum(self.stratum_of(score))
    }

    /// Group `samples` by stratum. Unscored samples use [`DEFAULT_RISK_SCORE`].
    pub fn stratify<T: RiskScored>(&self, samples: impl IntoIterator<Item = T>) -> Strata<T> {
        let mut strata: Strata<T> = (0..self.k).map(|i| (i, Vec::new())).collect();
        for s in samples {
            let score = s.risk_score().unwrap_or(DEFAULT_RISK_SCORE);
            let idx = self.stratum_of(score);
            if let Some(bucket) = strata.get_mut(&idx) {
                bucket.push(s);
            }
        }
        strata
    }
}

/// Score `transactions` with `scorer`, derive boundaries from those scores, and stratify.
///
/// An empty input yields `k` empty strata.
///
/// Errors:
/// - [`Error::Configuration`] if `k == 0`
/// - [`Error::Validation`] if the scorer returns a non-finite score
pub fn stratify_with<T, S>(
    scorer: &S,
    transactions: impl IntoIterator<Item = T>,
    k: usize,
) -> Result<Strata<Scored<T>>>
where
    S: RiskScorer<T> + ?Sized,
{
    if k == 0 {
        return Err(Error::config("number of strata must be at least 1"));
    }
    let scored: Vec<Scored<T>> = transactions
        .into_iter()
        .map(|item| {
            let score = scorer.predict_risk(&item);
            Scored { item, score }
        })
        .collect();
    if scored.is_empty() {
        return Ok((0..k).map(|i| (i, Vec::new())).collect());
    }
    let scores: Vec<f64> = scored.iter().map(|s| s.score).collect();
    let sampler = StratifiedSampler::new(&scores, k)?;
    Ok(sampler.stratify(scored))
}

/// Linear-interpolation quantile of an ascending, non-empty slice.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn boundaries_interpolate() {
        let s = StratifiedSampler::new(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9], 3).unwrap();
        let b = s.boundaries();
        assert_eq!(b.len(), 2);
        // pos = 8/3 and 16/3
        assert!((b[0] - (0.3 + 0.1 * (2.0 / 3.0))).abs() < 1e-12);
        assert!((b[1] - (0.6 + 0.1 * (1.0 / 3.0))).abs() < 1e-12);
    }

    #[test]
    fn ties_go_up() {
        let s = StratifiedSampler::new(&[0.0, 0.5, 1.0], 2).unwrap();
        assert_eq!(s.boundaries(), &[0.5]);
        assert_eq!(s.stratum_of(0.5), 1);
        assert_eq!(s.stratum_of(0.4999), 0);
    }

    #[test]
    fn single_stratum_takes_everything() {
        let s = StratifiedSampler::new(&[0.2, 0.8], 1).unwrap();
        assert!(s.boundaries().is_empty());
        let strata = s.stratify([0.0, 0.5, 1.0]);
        assert_eq!(strata.len(), 1);
        assert_eq!(strata[&0].len(), 3);
    }

    #[test]
    fn invalid_inputs() {
        assert!(matches!(StratifiedSampler::new(&[0.1], 0), Err(Error::Configuration(_))));
        assert!(matches!(StratifiedSampler::new(&[], 3), Err(Error::Validation(_))));
        assert!(matches!(
            StratifiedSampler::new(&[0.1, f64::NAN], 3),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn unscored_samples_default_to_midpoint() {
        let s = StratifiedSampler::new(&[0.0, 0.25, 0.75, 1.0], 2).unwrap();
        let strata = s.stratify([Some(0.1), None, Some(0.9)]);
        assert_eq!(strata[&0], vec![Some(0.1)]);
        assert_eq!(strata[&1], vec![None, Some(0.9)]);
    }

    #[test]
    fn empty_input_gives_all_keys() {
        let s = StratifiedSampler::new(&[0.1, 0.2, 0.3], 4).unwrap();
        let strata = s.stratify(Vec::<f64>::new());
        assert_eq!(strata.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert!(strata.values().all(Vec::is_empty));
    }

    #[test]
    fn risk_levels_only_for_three_strata() {
        let pop: Vec<f64> = (0..=100).map(|i| i as f64 / 100.0).collect();
        let three = StratifiedSampler::new(&pop, 3).unwrap();
        assert_eq!(three.risk_level(0.05), Some(RiskLevel::Low));
        assert_eq!(three.risk_level(0.5), Some(RiskLevel::Medium));
        assert_eq!(three.risk_level(0.95), Some(RiskLevel::High));
        let four = StratifiedSampler::new(&pop, 4).unwrap();
        assert_eq!(four.risk_level(0.5), None);
    }

    #[test]
    fn stratify_with_closure_scorer() {
        let amounts = vec![10u32, 20, 30, 40, 50, 60];
        let scorer = |a: &u32| *a as f64 / 100.0;
        let strata = stratify_with(&scorer, amounts, 2).unwrap();
        let low: Vec<u32> = strata[&0].iter().map(|s| s.item).collect();
        let high: Vec<u32> = strata[&1].iter().map(|s| s.item).collect();
        assert_eq!(low, vec![10, 20, 30]);
        assert_eq!(high, vec![40, 50, 60]);

        let empty = stratify_with(&scorer, Vec::<u32>::new(), 3).unwrap();
        assert_eq!(empty.len(), 3);
    }

    proptest! {
        #[test]
        fn stratify_preserves_samples_and_order(
            pop in proptest::collection::vec(0.0f64..=1.0, 1..200),
            samples in proptest::collection::vec(0.0f64..=1.0, 0..200),
            k in 1usize..8,
        ) {
            let s = StratifiedSampler::new(&pop, k).unwrap();
            prop_assert!(s.boundaries().windows(2).all(|w| w[0] <= w[1]));
            let strata = s.stratify(samples.iter().copied());
            prop_assert_eq!(strata.len(), k);
            let total: usize = strata.values().map(Vec::len).sum();
            prop_assert_eq!(total, samples.len());
            for (&i, members) in &strata {
                for &x in members {
                    prop_assert_eq!(s.stratum_of(x), i);
                }
            }
        }
    }
}
