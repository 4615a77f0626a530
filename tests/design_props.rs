//! Property tests for the design formulas, through the public API.

use proptest::prelude::*;
use stratab::design::{chi_square_2x2, z_quantile};
use stratab::{mde, power, sample_size, Error};

proptest! {
    /// Sizing treats the two rates symmetrically.
    #[test]
    fn sample_size_is_symmetric(
        p1 in 0.05f64..0.95,
        d in 0.005f64..0.04,
        alpha in 0.01f64..0.1,
        beta in 0.05f64..0.3,
    ) {
        let p2 = p1 + d;
        prop_assume!(p2 < 1.0);
        prop_assert_eq!(
            sample_size(p1, p2, alpha, beta).unwrap(),
            sample_size(p2, p1, alpha, beta).unwrap()
        );
    }

    /// Bigger effects need fewer units.
    #[test]
    fn sample_size_shrinks_as_effect_grows(
        p1 in 0.3f64..0.7,
        d in 0.005f64..0.1,
        alpha in 0.01f64..0.1,
        beta in 0.05f64..0.3,
    ) {
        let small = sample_size(p1, p1 + d, alpha, beta).unwrap();
        let big = sample_size(p1, p1 + 2.0 * d, alpha, beta).unwrap();
        prop_assert!(big <= small, "d={d}: {big} > {small}");
    }

    /// A looser alpha lowers the MDE.
    #[test]
    fn mde_shrinks_as_alpha_loosens(
        p1 in 0.05f64..0.95,
        n in 10u64..100_000,
        beta in 0.05f64..0.3,
    ) {
        let strict = mde(p1, n, 0.01, beta).unwrap();
        let loose = mde(p1, n, 0.10, beta).unwrap();
        prop_assert!(loose < strict);
    }

    /// More units per arm never lowers power.
    #[test]
    fn power_grows_with_n(
        p_bar in 0.1f64..0.9,
        half in 0.001f64..0.05,
        n in 10u64..50_000,
    ) {
        let (p1, p2) = (p_bar - half, p_bar + half);
        prop_assume!(p1 > 0.0 && p2 < 1.0);
        let a = power(n, p1, p2, 0.05).unwrap();
        let b = power(n * 2, p1, p2, 0.05).unwrap();
        prop_assert!(b >= a);
    }

    /// The chi-square test is symmetric in the arms and its p-value is a probability.
    #[test]
    fn chi_square_is_symmetric(
        a_total in 1u64..5_000,
        b_total in 1u64..5_000,
        fa in 0.0f64..=1.0,
        fb in 0.0f64..=1.0,
    ) {
        let a_s = (a_total as f64 * fa) as u64;
        let b_s = (b_total as f64 * fb) as u64;
        let ab = chi_square_2x2(a_s, a_total, b_s, b_total).unwrap();
        let ba = chi_square_2x2(b_s, b_total, a_s, a_total).unwrap();
        prop_assert!((ab.statistic - ba.statistic).abs() < 1e-9);
        prop_assert!((0.0..=1.0).contains(&ab.p_value));
        prop_assert!(ab.statistic >= 0.0 && ab.statistic.is_finite());
    }
}

#[test]
fn reference_design_for_default_experiment() {
    // 95% -> 97% at alpha 0.05, power 0.8.
    assert_eq!(sample_size(0.95, 0.97, 0.05, 0.2).unwrap(), 1_504);
    let n = sample_size(0.95, 0.94, 0.05, 0.2).unwrap();
    assert!((8_150..=8_160).contains(&n), "n={n}");
}

#[test]
fn error_kinds_follow_the_cause() {
    assert!(matches!(sample_size(0.5, 0.5, 0.05, 0.2), Err(Error::Domain(_))));
    assert!(matches!(sample_size(0.5, 0.6, 0.0, 0.2), Err(Error::Configuration(_))));
    assert!(matches!(mde(0.0, 100, 0.05, 0.2), Err(Error::Domain(_))));
    assert!(matches!(mde(0.5, 0, 0.05, 0.2), Err(Error::Domain(_))));
    assert!(matches!(power(100, 0.0, 0.0, 0.05), Err(Error::Domain(_))));
    assert!(matches!(z_quantile(0.0), Err(Error::Domain(_))));
}
