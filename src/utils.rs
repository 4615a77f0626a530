//! Utility helpers: run-time estimates.

use crate::{AllocationTable, Variant};

/// Days of traffic until `variant`'s arm reaches `per_arm` units.
///
/// `daily_volume` is total traffic per day across all arms; the arm receives
/// `daily_volume * allocation.fraction(variant)` of it. Returns `None` when the arm gets no
/// traffic (zero volume or zero allocation).
///
/// # Example
///
/// ```rust
/// use stratab::{days_to_sample_size, AllocationTable, Variant};
///
/// // 8155 per arm, 10k transactions/day, TestB gets a quarter of traffic.
/// let days = days_to_sample_size(8_155, 10_000, &AllocationTable::default(), Variant::TestB);
/// assert_eq!(days, Some(4));
/// ```
pub fn days_to_sample_size(
    per_arm: u64,
    daily_volume: u64,
    allocation: &AllocationTable,
    variant: Variant,
) -> Option<u64> {
    let per_day = daily_volume as f64 * allocation.fraction(variant);
    if per_day <= 0.0 {
        return None;
    }
    Some((per_arm as f64 / per_day).ceil() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_round_up() {
        let t = AllocationTable::default();
        assert_eq!(days_to_sample_size(1_000, 1_000, &t, Variant::Control), Some(2));
        assert_eq!(days_to_sample_size(1_001, 2_000, &t, Variant::Control), Some(2));
        assert_eq!(days_to_sample_size(0, 2_000, &t, Variant::TestA), Some(0));
    }

    #[test]
    fn no_traffic_means_never() {
        let t = AllocationTable::new([(Variant::Control, 1.0)]).unwrap();
        assert_eq!(days_to_sample_size(10, 1_000, &t, Variant::TestA), None);
        assert_eq!(days_to_sample_size(10, 0, &t, Variant::Control), None);
    }

    #[test]
    fn smaller_share_takes_longer() {
        let t = AllocationTable::default();
        let control = days_to_sample_size(8_000, 3_000, &t, Variant::Control).unwrap();
        let test = days_to_sample_size(8_000, 3_000, &t, Variant::TestA).unwrap();
        assert!(test >= control);
    }
}
