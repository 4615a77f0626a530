//! Monitoring primitives: risk-score drift against a frozen baseline, and a sliding-window
//! calibration check for the risk model.
//!
//! Both monitors are single-owner (`&mut self`); callers that share one across threads wrap it
//! in their own lock.

use std::collections::VecDeque;

use tracing::{debug, warn};

/// Drift detection configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DriftConfig {
    /// Relative mean shift above which a comparison raises an alert.
    pub mean_shift_threshold: f64,
    /// Number of equal-width bins on `[0, 1]` for the Hellinger distance.
    pub bins: usize,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            mean_shift_threshold: 0.10,
            bins: 10,
        }
    }
}

/// Why an observation produced no comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SkipReason {
    /// No scores in `[0, 1]` in the sample.
    EmptySample,
}

/// Baseline vs recent comparison.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DriftReport {
    pub baseline_mean: f64,
    pub recent_mean: f64,
    /// `|recent - baseline| / baseline`; `None` when the baseline mean is 0.
    pub mean_shift: Option<f64>,
    pub alert: bool,
    /// Hellinger distance between binned baseline and recent scores, in `[0, 1]`.
    pub hellinger: f64,
    pub baseline_n: usize,
    pub recent_n: usize,
}

/// Outcome of [`DriftMonitor::observe`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DriftStatus {
    /// This sample became the baseline.
    BaselineSet,
    Compared(DriftReport),
    Skipped(SkipReason),
}

impl DriftStatus {
    /// Whether this status carries a drift alert.
    pub fn is_alert(&self) -> bool {
        matches!(self, DriftStatus::Compared(r) if r.alert)
    }
}

/// Risk-score drift monitor.
///
/// The first non-empty sample is frozen as the baseline; every later sample is compared
/// against it until [`DriftMonitor::reset`].
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DriftMonitor {
    cfg: DriftConfig,
    baseline: Option<Vec<f64>>,
}

impl DriftMonitor {
    pub fn new(cfg: DriftConfig) -> Self {
        Self {
            cfg,
            baseline: None,
        }
    }

    pub fn config(&self) -> &DriftConfig {
        &self.cfg
    }

    /// Baseline scores, once set.
    pub fn baseline(&self) -> Option<&[f64]> {
        self.baseline.as_deref()
    }

    /// Forget the baseline; the next non-empty sample sets a new one.
    pub fn reset(&mut self) {
        self.baseline = None;
    }

    /// Record or compare a sample of risk scores.
    ///
    /// Scores outside `[0, 1]` (non-finite ones included) are dropped. An empty sample (after
    /// dropping) is skipped and never becomes the baseline.
    pub fn observe(&mut self, scores: &[f64]) -> DriftStatus {
        let recent = valid_scores(scores);
        if recent.is_empty() {
            debug!("empty drift sample skipped");
            return DriftStatus::Skipped(SkipReason::EmptySample);
        }
        let Some(baseline) = self.baseline.as_deref() else {
            debug!(n = recent.len(), "drift baseline set");
            self.baseline = Some(recent);
            return DriftStatus::BaselineSet;
        };

        let baseline_mean = mean(baseline);
        let recent_mean = mean(&recent);
        let (mean_shift, alert) = if baseline_mean == 0.0 {
            (None, recent_mean != 0.0)
        } else {
            let shift = (recent_mean - baseline_mean).abs() / baseline_mean.abs();
            (Some(shift), shift > self.cfg.mean_shift_threshold)
        };
        let bins = self.cfg.bins.max(1);
        let hellinger = hellinger(&histogram(baseline, bins), &histogram(&recent, bins));

        if alert {
            warn!(baseline_mean, recent_mean, ?mean_shift, hellinger, "risk score drift");
        } else {
            debug!(baseline_mean, recent_mean, ?mean_shift, hellinger, "no drift");
        }
        DriftStatus::Compared(DriftReport {
            baseline_mean,
            recent_mean,
            mean_shift,
            alert,
            hellinger,
            baseline_n: baseline.len(),
            recent_n: recent.len(),
        })
    }
}

/// Keep scores inside the `[0, 1]` risk contract; `NaN` fails the range check too.
fn valid_scores(scores: &[f64]) -> Vec<f64> {
    let kept: Vec<f64> = scores
        .iter()
        .copied()
        .filter(|s| (0.0..=1.0).contains(s))
        .collect();
    let dropped = scores.len() - kept.len();
    if dropped > 0 {
        warn!(dropped, "ignoring risk scores outside [0, 1]");
    }
    kept
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Normalized equal-width histogram on `[0, 1]`; out-of-range scores fall in the edge bins.
fn histogram(xs: &[f64], bins: usize) -> Vec<f64> {
    let mut counts = vec![0u64; bins];
    for &x in xs {
        let idx = ((x.clamp(0.0, 1.0) * bins as f64) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    let n = xs.len().max(1) as f64;
    counts.into_iter().map(|c| c as f64 / n).collect()
}

/// Hellinger distance between two distributions on the same support, in `[0, 1]`.
fn hellinger(p: &[f64], q: &[f64]) -> f64 {
    let bc: f64 = p.iter().zip(q).map(|(&a, &b)| (a * b).sqrt()).sum();
    // Rounding can push the coefficient a hair above 1.
    (1.0 - bc.clamp(0.0, 1.0)).sqrt()
}

/// Wilson score interval for a Bernoulli proportion.
///
/// Returns `(lower, upper, half_width)`, with bounds clamped into `[0,1]`.
pub fn wilson_bounds(successes: u64, trials: u64, z: f64) -> (f64, f64, f64) {
    if trials == 0 {
        return (0.0, 1.0, 0.5);
    }
    let n = trials as f64;
    let k = successes.min(trials) as f64;
    let p_hat = k / n;
    let z = if z.is_finite() && z > 0.0 { z } else { 1.96 };
    let z2 = z * z;

    // center = (p + z^2/(2n)) / (1 + z^2/n)
    // radius = z * sqrt(p(1-p)/n + z^2/(4n^2)) / (1 + z^2/n)
    let denom = 1.0 + z2 / n;
    let center = (p_hat + z2 / (2.0 * n)) / denom;
    let rad = (z * ((p_hat * (1.0 - p_hat) / n) + (z2 / (4.0 * n * n))).sqrt()) / denom;
    let lo = (center - rad).clamp(0.0, 1.0);
    let hi = (center + rad).clamp(0.0, 1.0);
    (lo, hi, (hi - lo) / 2.0)
}

/// Score above which a prediction counts as "will fail".
pub const FAILURE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct Prediction {
    score: f64,
    failed: bool,
}

/// Sliding window of risk predictions and their realized outcomes.
///
/// The window is bounded by count, not by wall-clock age: the crate keeps no clock, so a caller
/// that wants "the last 24 hours" sizes `cap` to a day of traffic or rebuilds the monitor on its
/// own schedule.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalibrationMonitor {
    cap: usize,
    buf: VecDeque<Prediction>,
}

impl CalibrationMonitor {
    /// Keep at most `cap` predictions (at least one).
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            cap,
            buf: VecDeque::with_capacity(cap),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Record a prediction; the oldest entry is evicted once the window is full.
    ///
    /// Non-finite scores are ignored.
    pub fn log_prediction(&mut self, score: f64, failed: bool) {
        if !score.is_finite() {
            warn!(score, "ignoring non-finite prediction");
            return;
        }
        if self.buf.len() == self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(Prediction { score, failed });
    }

    /// Fraction of predictions where `score > 0.5` matched the outcome; `None` when empty.
    pub fn accuracy(&self) -> Option<f64> {
        if self.buf.is_empty() {
            return None;
        }
        let correct = self
            .buf
            .iter()
            .filter(|p| (p.score > FAILURE_THRESHOLD) == p.failed)
            .count();
        Some(correct as f64 / self.buf.len() as f64)
    }

    /// `|accuracy - 0.5|`: distance from coin-flip accuracy. 0 when empty.
    pub fn calibration_error(&self) -> f64 {
        self.accuracy().map_or(0.0, |a| (a - 0.5).abs())
    }

    /// `|mean score - observed failure rate|`; `None` when empty.
    pub fn calibration_gap(&self) -> Option<f64> {
        if self.buf.is_empty() {
            return None;
        }
        let n = self.buf.len() as f64;
        let mean_score = self.buf.iter().map(|p| p.score).sum::<f64>() / n;
        let failures = self.buf.iter().filter(|p| p.failed).count() as f64;
        Some((mean_score - failures / n).abs())
    }

    /// Wilson interval on the observed failure rate: `(lower, upper, half_width)`.
    pub fn failure_rate_bounds(&self, z: f64) -> (f64, f64, f64) {
        let failures = self.buf.iter().filter(|p| p.failed).count() as u64;
        wilson_bounds(failures, self.buf.len() as u64, z)
    }
}
