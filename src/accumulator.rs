//! Per-variant outcome counters.
//!
//! Counters only grow (saturating) for the life of an analysis window. Analysis reads a
//! [`ResultSet`] snapshot; to start a new window, [`ResultAccumulator::take`] swaps in fresh
//! counters and hands back the finished window.
//!
//! There is no internal locking: a single writer owns each accumulator. Multiple reporters can
//! each fill their own shard and a serial aggregator folds them together with
//! [`ResultAccumulator::merge`].

use std::collections::BTreeMap;

use crate::{Error, Result, Variant};

/// Success/total counts for one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VariantCounts {
    /// Number of successful outcomes (e.g. a retried payment that eventually settled).
    pub success_count: u64,
    /// Number of outcomes observed.
    pub total_count: u64,
}

impl VariantCounts {
    /// Counts from raw numbers, checking `success_count <= total_count`.
    pub fn new(success_count: u64, total_count: u64) -> Result<Self> {
        if success_count > total_count {
            return Err(Error::validation(format!(
                "success_count {success_count} exceeds total_count {total_count}"
            )));
        }
        Ok(Self {
            success_count,
            total_count,
        })
    }

    /// Observed success rate, or `None` with no observations.
    pub fn rate(&self) -> Option<f64> {
        if self.total_count == 0 {
            None
        } else {
            Some(self.success_count as f64 / self.total_count as f64)
        }
    }

    /// Number of failed outcomes.
    pub fn failure_count(&self) -> u64 {
        self.total_count.saturating_sub(self.success_count)
    }
}

/// A snapshot of counts keyed by variant (stable iteration order).
pub type ResultSet = BTreeMap<Variant, VariantCounts>;

/// Mutable per-variant counters for one analysis window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResultAccumulator {
    counts: ResultSet,
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outcome for `variant`.
    pub fn record(&mut self, variant: Variant, success: bool) {
        let c = self.counts.entry(variant).or_default();
        c.total_count = c.total_count.saturating_add(1);
        if success {
            c.success_count = c.success_count.saturating_add(1);
        }
    }

    /// Record `total` outcomes of which `successes` succeeded.
    ///
    /// Rejects `successes > total` without touching the counters.
    pub fn record_batch(&mut self, variant: Variant, successes: u64, total: u64) -> Result<()> {
        let batch = VariantCounts::new(successes, total)?;
        self.add(variant, batch);
        Ok(())
    }

    fn add(&mut self, variant: Variant, batch: VariantCounts) {
        let c = self.counts.entry(variant).or_default();
        c.total_count = c.total_count.saturating_add(batch.total_count);
        // Keep the invariant even when `total_count` saturated first.
        c.success_count = c
            .success_count
            .saturating_add(batch.success_count)
            .min(c.total_count);
    }

    /// Counts for `variant` (zero when nothing was recorded).
    pub fn counts(&self, variant: Variant) -> VariantCounts {
        self.counts.get(&variant).copied().unwrap_or_default()
    }

    /// Total outcomes across all variants.
    pub fn total(&self) -> u64 {
        self.counts
            .values()
            .fold(0u64, |acc, c| acc.saturating_add(c.total_count))
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Copy of the current counts.
    pub fn snapshot(&self) -> ResultSet {
        self.counts.clone()
    }

    /// Close the current window: return its counts and reset to empty.
    pub fn take(&mut self) -> ResultSet {
        std::mem::take(&mut self.counts)
    }

    /// Fold another shard's counts into this one.
    pub fn merge(&mut self, other: &ResultAccumulator) {
        for (&v, &c) in &other.counts {
            self.add(v, c);
        }
    }
}
