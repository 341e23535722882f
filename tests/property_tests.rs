use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use risk_engine::analysis::risk::{conditional_value_at_risk, value_at_risk, AdverseTail};
use risk_engine::analysis::statistics::{percentiles_sorted, sorted_copy, summarize};
use risk_engine::core::distribution::{sample, DistributionSpec};
use risk_engine::correlation::copula::{correlated_samples, Copula};
use risk_engine::correlation::matrix::{build_matrix, PairwiseCorrelation};
use risk_engine::scenario::archetype::{growth_multiplier, Archetype};
use risk_engine::scenario::builder::ScenarioBuilder;
use risk_engine::simulation::engine::{EngineConfig, Execution, SimulationEngine};

/// Generate a valid distribution spec across several families.
fn arb_spec() -> impl Strategy<Value = DistributionSpec> {
    prop_oneof![
        (-1e3..1e3f64, 0.01..100.0f64).prop_map(|(m, s)| DistributionSpec::normal(m, s).unwrap()),
        (-2.0..2.0f64, 0.05..1.5f64).prop_map(|(m, s)| DistributionSpec::log_normal(m, s).unwrap()),
        (-50.0..50.0f64, 0.1..50.0f64)
            .prop_map(|(lo, w)| DistributionSpec::uniform(lo, lo + w).unwrap()),
        (0.01..10.0f64).prop_map(|r| DistributionSpec::exponential(r).unwrap()),
        (0.2..10.0f64, 0.1..5.0f64).prop_map(|(a, b)| DistributionSpec::gamma(a, b).unwrap()),
        (0.2..10.0f64, 0.2..10.0f64).prop_map(|(a, b)| DistributionSpec::beta(a, b).unwrap()),
        (0.3..5.0f64, 0.1..10.0f64).prop_map(|(k, l)| DistributionSpec::weibull(k, l).unwrap()),
        (0.1..200.0f64).prop_map(|l| DistributionSpec::poisson(l).unwrap()),
    ]
}

/// Generate a finite, non-empty sample.
fn arb_sample() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-1e6..1e6f64, 1..300)
}

proptest! {
    // ===================================================================
    // INVARIANT 1: Sampling is a pure function of (spec, count, seed).
    // ===================================================================
    #[test]
    fn sampling_is_deterministic(spec in arb_spec(), count in 0usize..64, seed in any::<u64>()) {
        let a = sample(&spec, count, &mut StdRng::seed_from_u64(seed)).unwrap();
        let b = sample(&spec, count, &mut StdRng::seed_from_u64(seed)).unwrap();
        prop_assert_eq!(a.len(), count);
        prop_assert_eq!(a, b);
    }

    // ===================================================================
    // INVARIANT 2: Quantile functions are finite and non-decreasing.
    // ===================================================================
    #[test]
    fn quantile_is_monotone(spec in arb_spec(), u in 0.001..0.999f64, v in 0.001..0.999f64) {
        let (lo, hi) = if u <= v { (u, v) } else { (v, u) };
        let q_lo = spec.quantile(lo).unwrap();
        let q_hi = spec.quantile(hi).unwrap();
        prop_assert!(q_lo.is_finite() && q_hi.is_finite());
        prop_assert!(q_lo <= q_hi + 1e-6 * q_hi.abs().max(1.0), "{} > {}", q_lo, q_hi);
    }

    // ===================================================================
    // INVARIANT 3: Any accepted correlation matrix is symmetric, has a
    // unit diagonal, stays within [-1, 1] and is PSD within tolerance.
    // ===================================================================
    #[test]
    fn accepted_matrices_are_valid(
        ab in -0.99..0.99f64,
        ac in -0.99..0.99f64,
        bc in -0.99..0.99f64,
    ) {
        let pairs = [
            PairwiseCorrelation::new("a", "b", ab),
            PairwiseCorrelation::new("a", "c", ac),
            PairwiseCorrelation::new("b", "c", bc),
        ];
        if let Ok(m) = build_matrix(&["a", "b", "c"], &pairs) {
            for i in 0..3 {
                prop_assert!((m.get(i, i) - 1.0).abs() < 1e-9);
                for j in 0..3 {
                    prop_assert!((m.get(i, j) - m.get(j, i)).abs() < 1e-12);
                    prop_assert!(m.get(i, j).abs() <= 1.0 + 1e-9);
                }
            }
            prop_assert!(m.min_eigenvalue() >= -1e-6);
            if !m.was_repaired() {
                prop_assert_eq!(m.correlation("a", "b"), Some(ab));
            }
        }
    }

    // ===================================================================
    // INVARIANT 4: Copula output is a valid row of uniforms.
    // ===================================================================
    #[test]
    fn copula_output_stays_in_unit_interval(
        rho in -0.95..0.95f64,
        dof in 1.0..30.0f64,
        seed in any::<u64>(),
    ) {
        let m = build_matrix(&["x", "y"], &[PairwiseCorrelation::new("x", "y", rho)]).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let uniforms = vec![
            sample(&DistributionSpec::uniform(0.0, 1.0).unwrap(), 50, &mut rng).unwrap(),
            sample(&DistributionSpec::uniform(0.0, 1.0).unwrap(), 50, &mut rng).unwrap(),
        ];
        for copula in [Copula::Gaussian, Copula::student_t(dof).unwrap()] {
            let out = correlated_samples(&m, &uniforms, copula, &mut rng).unwrap();
            prop_assert_eq!(out.len(), 2);
            prop_assert!(out.iter().flatten().all(|u| (0.0..=1.0).contains(u)));
        }
    }

    // ===================================================================
    // INVARIANT 5: Percentiles are non-decreasing in their level and lie
    // within [min, max].
    // ===================================================================
    #[test]
    fn percentiles_are_monotone(values in arb_sample()) {
        let sorted = sorted_copy(&values);
        let levels = [0.0, 0.01, 0.05, 0.25, 0.5, 0.75, 0.95, 0.99, 1.0];
        let pct = percentiles_sorted(&sorted, &levels);
        let tol = 1e-9 * sorted.iter().fold(1.0f64, |m, x| m.max(x.abs()));
        prop_assert!(pct.windows(2).all(|w| w[0].value <= w[1].value + tol));
        prop_assert_eq!(pct[0].value, sorted[0]);
        prop_assert_eq!(pct[pct.len() - 1].value, sorted[sorted.len() - 1]);
    }

    // ===================================================================
    // INVARIANT 6: CVaR is never less adverse than VaR, and the 99% figures
    // are never less adverse than the 95% ones.
    // ===================================================================
    #[test]
    fn tail_metrics_are_ordered(values in arb_sample()) {
        let sorted = sorted_copy(&values);
        let tol = 1e-9 * sorted.iter().fold(1.0f64, |m, x| m.max(x.abs()));

        let var95 = value_at_risk(&sorted, 0.95, AdverseTail::Lower);
        let var99 = value_at_risk(&sorted, 0.99, AdverseTail::Lower);
        let cvar95 = conditional_value_at_risk(&sorted, 0.95, AdverseTail::Lower);
        let cvar99 = conditional_value_at_risk(&sorted, 0.99, AdverseTail::Lower);
        prop_assert!(cvar95 <= var95 + tol);
        prop_assert!(cvar99 <= var99 + tol);
        prop_assert!(var99 <= var95 + tol);
        prop_assert!(cvar99 <= cvar95 + tol);

        let up95 = value_at_risk(&sorted, 0.95, AdverseTail::Upper);
        let up99 = value_at_risk(&sorted, 0.99, AdverseTail::Upper);
        let upc95 = conditional_value_at_risk(&sorted, 0.95, AdverseTail::Upper);
        prop_assert!(upc95 + tol >= up95);
        prop_assert!(up99 + tol >= up95);
    }

    // ===================================================================
    // INVARIANT 7: Summary statistics never emit NaN.
    // ===================================================================
    #[test]
    fn summary_is_finite(values in arb_sample()) {
        let s = summarize(&values, &[0.05, 0.95]).unwrap();
        prop_assert!(s.mean.is_finite() && s.std_dev.is_finite() && s.median.is_finite());
        prop_assert!(s.min <= s.median && s.median <= s.max);
        if s.std_dev == 0.0 {
            prop_assert!(!s.skewness.is_defined());
        }
        for metric in [s.skewness, s.kurtosis, s.coefficient_of_variation, s.signal_to_noise] {
            if let Some(v) = metric.value() {
                prop_assert!(v.is_finite());
            }
        }
    }

    // ===================================================================
    // INVARIANT 8: Growth passes through 1.0 at period zero and the
    // terminal multiplier at the horizon.
    // ===================================================================
    #[test]
    fn growth_endpoints(base in -1e3..1e3f64, horizon in 1usize..120, terminal in 0.1..5.0f64) {
        prop_assert_eq!(growth_multiplier(base, 0, horizon, terminal), base);
        let end = growth_multiplier(base, horizon, horizon, terminal);
        prop_assert!((end - base * terminal).abs() <= 1e-9 * base.abs().max(1.0));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    // ===================================================================
    // INVARIANT 9: A seeded run yields identical records regardless of
    // scheduling (sequential vs parallel) and batch size.
    // ===================================================================
    #[test]
    fn seeded_runs_ignore_scheduling(
        seed in any::<u64>(),
        rho in -0.9..0.9f64,
        batch in 1usize..700,
    ) {
        let scenario = ScenarioBuilder::new(Archetype::InvestmentComparison)
            .variable("return_a", DistributionSpec::normal(0.06, 0.12).unwrap())
            .variable("return_b", DistributionSpec::log_normal(-3.0, 0.3).unwrap())
            .correlation("return_a", "return_b", rho)
            .build()
            .unwrap();
        let sequential = SimulationEngine::new(EngineConfig {
            execution: Execution::Sequential,
            ..Default::default()
        })
        .unwrap()
        .run(&scenario, 1_500, 0.95, Some(seed))
        .unwrap();
        let parallel = SimulationEngine::new(EngineConfig {
            execution: Execution::Parallel,
            batch_size: batch,
            ..Default::default()
        })
        .unwrap()
        .run(&scenario, 1_500, 0.95, Some(seed))
        .unwrap();
        prop_assert_eq!(sequential.raw_results(), parallel.raw_results());
    }
}
