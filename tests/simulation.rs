//! Monte Carlo power against the closed form (feature `stochastic`).
#![cfg(feature = "stochastic")]

use stratab::{power, sample_size, simulate_power};

#[test]
fn simulated_power_tracks_analytic_power() {
    let analytic = power(385, 0.5, 0.6, 0.05).unwrap();
    let sim = simulate_power(385, 0.5, 0.6, 0.05, 2_000, 11).unwrap();
    // The continuity correction makes the simulated test a little conservative.
    assert!(
        (sim.power - analytic).abs() < 0.05,
        "simulated {} vs analytic {analytic}",
        sim.power
    );
}

#[test]
fn sized_experiment_reaches_designed_power() {
    let n = sample_size(0.95, 0.97, 0.05, 0.2).unwrap();
    let sim = simulate_power(n, 0.95, 0.97, 0.05, 1_000, 3).unwrap();
    assert!(sim.upper > 0.7, "{sim:?}");
}

#[test]
fn null_rejection_rate_stays_near_alpha() {
    let sim = simulate_power(500, 0.9, 0.9, 0.05, 2_000, 5).unwrap();
    assert!(sim.power < 0.08, "{sim:?}");
}
