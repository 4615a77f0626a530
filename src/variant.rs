//! Experiment arms.
//!
//! The variant set is closed: every `match` over [`Variant`] is exhaustive, and the derived
//! `Ord` (declaration order) is the one stable iteration order used everywhere in the crate
//! (allocation walks, report ordering, `BTreeMap` keys).

use std::fmt;
use std::time::Duration;

/// A retry strategy under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Variant {
    /// Baseline retry schedule. Also the assignment fallback.
    Control,
    /// Aggressive schedule: shorter waits between attempts.
    TestA,
    /// Conservative schedule: longer waits between attempts.
    TestB,
}

const CONTROL_SCHEDULE: [Duration; 4] = [
    Duration::from_secs(1),
    Duration::from_secs(5),
    Duration::from_secs(30),
    Duration::from_secs(300),
];

const TEST_A_SCHEDULE: [Duration; 4] = [
    Duration::from_millis(500),
    Duration::from_secs(2),
    Duration::from_secs(10),
    Duration::from_secs(60),
];

const TEST_B_SCHEDULE: [Duration; 4] = [
    Duration::from_secs(2),
    Duration::from_secs(10),
    Duration::from_secs(60),
    Duration::from_secs(600),
];

impl Variant {
    /// All variants, in the stable iteration order.
    pub const ALL: [Variant; 3] = [Variant::Control, Variant::TestA, Variant::TestB];

    /// Whether this is the control arm.
    pub fn is_control(self) -> bool {
        matches!(self, Variant::Control)
    }

    /// Stable snake_case name (also the serde representation).
    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Control => "control",
            Variant::TestA => "test_a",
            Variant::TestB => "test_b",
        }
    }

    /// Waits between successive retry attempts for this strategy.
    pub fn retry_schedule(self) -> &'static [Duration] {
        match self {
            Variant::Control => &CONTROL_SCHEDULE,
            Variant::TestA => &TEST_A_SCHEDULE,
            Variant::TestB => &TEST_B_SCHEDULE,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_order_is_declaration_order() {
        let mut v = vec![Variant::TestB, Variant::Control, Variant::TestA];
        v.sort();
        assert_eq!(v, Variant::ALL.to_vec());
        assert!(Variant::ALL[0].is_control());
    }

    #[test]
    fn schedules_are_monotone() {
        for v in Variant::ALL {
            let s = v.retry_schedule();
            assert_eq!(s.len(), 4, "{v}");
            assert!(s.windows(2).all(|w| w[0] < w[1]), "{v}: {s:?}");
        }
        // Aggressive waits less than baseline at every step; conservative waits more.
        for i in 0..4 {
            assert!(Variant::TestA.retry_schedule()[i] < Variant::Control.retry_schedule()[i]);
            assert!(Variant::TestB.retry_schedule()[i] > Variant::Control.retry_schedule()[i]);
        }
    }
}
