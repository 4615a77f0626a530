//! Traffic allocation tables.
//!
//! An [`AllocationTable`] maps each [`Variant`] to the fraction of traffic it receives.
//! Fractions are validated once at construction; after that the table is read-only and
//! bucketing is a pure function of the bucket value.

use std::collections::BTreeMap;

use crate::{Error, Result, Variant};

/// Tolerance on `sum(fractions) == 1`.
pub const ALLOCATION_EPS: f64 = 1e-9;

/// Validated `Variant -> traffic fraction` table.
///
/// Iteration (and therefore bucketing) follows the `Variant` order, independent of the
/// order in which entries were supplied.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "BTreeMap<Variant, f64>"))]
#[cfg_attr(feature = "serde", serde(into = "BTreeMap<Variant, f64>"))]
pub struct AllocationTable {
    fractions: BTreeMap<Variant, f64>,
}

impl AllocationTable {
    /// Build a table from `(variant, fraction)` entries.
    ///
    /// Rejects (with [`Error::Configuration`]):
    /// - duplicate variants
    /// - non-finite fractions or fractions outside `[0, 1]`
    /// - a missing `Control` entry
    /// - fractions whose sum differs from 1 by more than [`ALLOCATION_EPS`]
    pub fn new(entries: impl IntoIterator<Item = (Variant, f64)>) -> Result<Self> {
        let mut fractions = BTreeMap::new();
        for (v, f) in entries {
            if !f.is_finite() || !(0.0..=1.0).contains(&f) {
                return Err(Error::config(format!(
                    "allocation for {v} must be in [0, 1], got {f}"
                )));
            }
            if fractions.insert(v, f).is_some() {
                return Err(Error::config(format!("duplicate allocation for {v}")));
            }
        }
        if !fractions.contains_key(&Variant::Control) {
            return Err(Error::config("allocation table must include control"));
        }
        let total: f64 = fractions.values().sum();
        if (total - 1.0).abs() > ALLOCATION_EPS {
            return Err(Error::config(format!(
                "allocations must sum to 1.0, got {total}"
            )));
        }
        Ok(Self { fractions })
    }

    /// Equal split across `variants` (duplicates are rejected as in [`AllocationTable::new`]).
    pub fn uniform(variants: &[Variant]) -> Result<Self> {
        if variants.is_empty() {
            return Err(Error::config("allocation table must include control"));
        }
        let f = 1.0 / variants.len() as f64;
        Self::new(variants.iter().map(|&v| (v, f)))
    }

    /// Fraction allocated to `variant` (0 when absent).
    pub fn fraction(&self, variant: Variant) -> f64 {
        self.fractions.get(&variant).copied().unwrap_or(0.0)
    }

    /// Whether `variant` has an entry.
    pub fn contains(&self, variant: Variant) -> bool {
        self.fractions.contains_key(&variant)
    }

    /// Iterate `(variant, fraction)` in stable order.
    pub fn iter(&self) -> impl Iterator<Item = (Variant, f64)> + '_ {
        self.fractions.iter().map(|(&v, &f)| (v, f))
    }

    /// Variants with an entry, in stable order.
    pub fn variants(&self) -> impl Iterator<Item = Variant> + '_ {
        self.fractions.keys().copied()
    }

    /// Map a bucket value in `[0, 1)` to a variant.
    ///
    /// Walks the table accumulating fractions and returns the first variant whose cumulative
    /// bound is `>= u`. Zero-fraction entries are never returned. If floating-point rounding
    /// leaves `u` above the final cumulative bound, returns `Control`.
    pub fn bucket(&self, u: f64) -> Variant {
        let mut cumulative = 0.0;
        for (&v, &f) in &self.fractions {
            if f <= 0.0 {
                continue;
            }
            cumulative += f;
            if u <= cumulative {
                return v;
            }
        }
        Variant::Control
    }
}

impl Default for AllocationTable {
    /// Half of traffic on control, the rest split evenly between the two test schedules.
    fn default() -> Self {
        let mut fractions = BTreeMap::new();
        fractions.insert(Variant::Control, 0.5);
        fractions.insert(Variant::TestA, 0.25);
        fractions.insert(Variant::TestB, 0.25);
        Self { fractions }
    }
}

impl TryFrom<BTreeMap<Variant, f64>> for AllocationTable {
    type Error = Error;

    fn try_from(m: BTreeMap<Variant, f64>) -> Result<Self> {
        Self::new(m)
    }
}

impl From<AllocationTable> for BTreeMap<Variant, f64> {
    fn from(t: AllocationTable) -> Self {
        t.fractions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_sum_below_one() {
        let err = AllocationTable::new([
            (Variant::Control, 0.5),
            (Variant::TestA, 0.2),
            (Variant::TestB, 0.2),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)), "{err}");
    }

    #[test]
    fn rejects_duplicates_and_missing_control() {
        let dup = AllocationTable::new([(Variant::Control, 0.5), (Variant::Control, 0.5)]);
        assert!(matches!(dup, Err(Error::Configuration(_))));
        let no_control = AllocationTable::new([(Variant::TestA, 0.5), (Variant::TestB, 0.5)]);
        assert!(matches!(no_control, Err(Error::Configuration(_))));
        let neg = AllocationTable::new([(Variant::Control, 1.5), (Variant::TestA, -0.5)]);
        assert!(matches!(neg, Err(Error::Configuration(_))));
    }

    #[test]
    fn tolerance_is_tight() {
        assert!(AllocationTable::new([(Variant::Control, 0.5), (Variant::TestA, 0.5 + 1e-12)]).is_ok());
        assert!(AllocationTable::new([(Variant::Control, 0.5), (Variant::TestA, 0.5 + 1e-6)]).is_err());
    }

    #[test]
    fn bucket_walks_cumulative_bounds() {
        let t = AllocationTable::default();
        assert_eq!(t.bucket(0.0), Variant::Control);
        assert_eq!(t.bucket(0.5), Variant::Control);
        assert_eq!(t.bucket(0.5000001), Variant::TestA);
        assert_eq!(t.bucket(0.75), Variant::TestA);
        assert_eq!(t.bucket(0.9999), Variant::TestB);
        // Past the last bound (rounding): control is the safety net.
        assert_eq!(t.bucket(1.5), Variant::Control);
    }

    #[test]
    fn zero_fraction_entries_are_never_chosen() {
        let t = AllocationTable::new([
            (Variant::Control, 0.0),
            (Variant::TestA, 1.0),
            (Variant::TestB, 0.0),
        ])
        .unwrap();
        assert_eq!(t.bucket(0.0), Variant::TestA);
        assert_eq!(t.bucket(0.999), Variant::TestA);
    }

    proptest! {
        #[test]
        fn bucket_only_returns_allocated_variants(
            w in proptest::collection::vec(0.0f64..1.0, 3),
            u in 0.0f64..1.0,
        ) {
            let s: f64 = w.iter().sum::<f64>() + 1.0;
            // Control always gets at least 1/s so the table is valid.
            let entries = [
                (Variant::Control, (w[0] + 1.0) / s),
                (Variant::TestA, w[1] / s),
                (Variant::TestB, w[2] / s),
            ];
            let total: f64 = entries.iter().map(|e| e.1).sum();
            prop_assume!((total - 1.0).abs() <= ALLOCATION_EPS);
            let t = AllocationTable::new(entries).unwrap();
            let v = t.bucket(u);
            prop_assert!(t.fraction(v) > 0.0);
        }
    }
}
