//! `stratab`: deterministic, stratified A/B experiments for payment retry schedules.
//!
//! Built for tuning how failed payments are retried: a small set of retry schedules
//! ([`Variant`]s) competes on live traffic, every transaction or user is assigned to one
//! schedule by a stable hash, and the success rates of the arms are compared once enough
//! outcomes have accumulated.
//!
//! **Goals:**
//! - **Deterministic assignment**: same seed + key + allocation table → same variant, on every
//!   host and every run. No assignment state is stored.
//! - **Designed, not peeked**: the per-arm sample size is derived up front from the expected
//!   lifts, alpha, and power; analysis reports whether an arm is still underpowered.
//! - **Risk aware**: transactions can be cut into risk-score strata, analyzed per stratum, and
//!   pooled with a Cochran–Mantel–Haenszel test. Risk-score drift is monitored against a
//!   frozen baseline.
//! - **Errors, not NaN**: every statistical edge case (equal rates, zero-count arms, 0/1 rates)
//!   is reported as an [`Error`].
//!
//! **Pieces:**
//! - [`design`]: `mde`, `sample_size`, `power`, plus the 2×2 chi-square and Wald interval used
//!   by analysis.
//! - [`ExperimentManager`]: owns an [`ExperimentConfig`]; `assign` / `assign_explain`,
//!   `analyze`, `analyze_stratified`.
//! - [`AllocationTable`]: validated traffic fractions.
//! - [`ResultAccumulator`]: per-variant success/total counters for one analysis window.
//! - [`StratifiedSampler`] / [`stratify_with`]: quantile strata over risk scores.
//! - [`monitor::DriftMonitor`] / [`monitor::CalibrationMonitor`]: risk model health.
//! - [`days_to_sample_size`]: calendar estimate for a designed sample size.
//! - (feature `stochastic`) [`simulate_power`]: Monte Carlo cross-check of analytic power.
//!
//! **Non-goals:**
//! - No persistence of assignments or results, no network surface, no scheduler.
//! - The risk model itself is external; this crate only consumes its scores ([`RiskScorer`]).
//!
//! # Example
//!
//! ```rust
//! use stratab::{ExperimentConfig, ExperimentManager, ResultAccumulator, Variant};
//!
//! let manager = ExperimentManager::new(ExperimentConfig::default()).unwrap();
//! let mut acc = ResultAccumulator::new();
//! for i in 0..1_000 {
//!     let v = manager.assign(&format!("txn-{i}"));
//!     acc.record(v, i % 20 != 0);
//! }
//! let report = manager.analyze(&acc.snapshot()).unwrap();
//! assert!(report.comparison(Variant::TestA).is_some());
//! ```
//!
//! # Logging
//!
//! The crate emits `tracing` events (`info` for the derived design, `warn` for drift alerts and
//! dropped inputs, `debug` for per-call detail) and never installs a subscriber.

#![forbid(unsafe_code)]

mod accumulator;
mod alloc;
pub mod design;
mod error;
mod experiment;
pub mod monitor;
#[cfg(feature = "stochastic")]
mod sim;
mod stable_hash;
mod strata;
mod utils;
mod variant;

pub use accumulator::*;
pub use alloc::*;
pub use design::{mde, power, sample_size, ChiSquareTest};
pub use error::*;
pub use experiment::*;
pub use monitor::{DriftConfig, DriftMonitor, DriftReport, DriftStatus, SkipReason};
#[cfg(feature = "stochastic")]
pub use sim::*;
pub use stable_hash::*;
pub use strata::*;
pub use utils::*;
pub use variant::*;
