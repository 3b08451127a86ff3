//! Property-based tests for dataset construction and the per-state solver.

use fdmc_core::chain::{
    ChainMarginalizer, DatasetBuilder, Observation, TrainingSet, WeightedLogisticSolver,
};
use fdmc_config::SolverConfig;
use fdmc_math::{is_simplex, SIMPLEX_TOL};
use ndarray::{Array1, Array2};
use proptest::prelude::*;

/// Row-stochastic matrix from strictly positive raw entries.
fn stochastic(n: usize, raw: &[f64]) -> Array2<f64> {
    let mut m = Array2::from_shape_vec((n, n), raw[..n * n].to_vec()).unwrap();
    for mut row in m.rows_mut() {
        let total = row.sum();
        row.mapv_inplace(|v| v / total);
    }
    m
}

/// A chain of `len` steps with one distinct feature per step.
fn chain_strategy() -> impl Strategy<Value = (usize, Vec<Observation>, Vec<Array2<f64>>)> {
    (2usize..5, 2usize..12).prop_flat_map(|(n, len)| {
        let states = prop::collection::vec(prop::option::weighted(0.6, 0..n), len);
        let raw = prop::collection::vec(prop::collection::vec(0.01f64..1.0, n * n), len - 1);
        (Just(n), states, raw).prop_map(|(n, states, raw)| {
            let states = states.into_iter().map(Observation::from).collect();
            let transitions = raw.iter().map(|r| stochastic(n, r)).collect();
            (n, states, transitions)
        })
    })
}

fn step_features(len: usize) -> Array2<f64> {
    Array2::from_shape_fn((len, 1), |(t, _)| t as f64)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Refined targets are simplices and weights lie in [0, 1].
    #[test]
    fn refined_examples_are_well_formed((n, states, transitions) in chain_strategy()) {
        let features = step_features(states.len());
        let examples = ChainMarginalizer.build_refined(&transitions, &states, features.view());
        for example in &examples {
            prop_assert!(example.origin < n);
            prop_assert!(is_simplex(example.target.as_slice().unwrap(), 1e-8));
            prop_assert!(example.weight >= 0.0 && example.weight <= 1.0);
        }
    }

    /// One step never contributes more than unit weight in total.
    #[test]
    fn refined_weight_per_step_is_at_most_one((_n, states, transitions) in chain_strategy()) {
        let features = step_features(states.len());
        let examples = ChainMarginalizer.build_refined(&transitions, &states, features.view());
        let mut per_step = vec![0.0; states.len()];
        for example in &examples {
            per_step[example.features[0] as usize] += example.weight;
        }
        for total in per_step {
            prop_assert!(total <= 1.0 + 1e-9, "step weight {}", total);
        }
    }

    /// With nothing hidden the refined pass reproduces the cold-start examples.
    #[test]
    fn refined_equals_initial_when_fully_observed(
        (n, states, transitions) in chain_strategy(),
        fill in 0usize..4,
    ) {
        let states: Vec<Observation> = states
            .into_iter()
            .map(|s| Observation::Observed(s.state().unwrap_or(fill % n)))
            .collect();
        let features = step_features(states.len());
        let initial = ChainMarginalizer.build_initial(&states, features.view(), n);
        let refined = ChainMarginalizer.build_refined(&transitions, &states, features.view());
        prop_assert_eq!(initial.len(), states.len() - 1);
        prop_assert_eq!(initial, refined);
    }

    /// Cold start only ever emits weight-one, one-hot examples.
    #[test]
    fn initial_examples_are_hard((n, states, _transitions) in chain_strategy()) {
        let features = step_features(states.len());
        let examples = ChainMarginalizer.build_initial(&states, features.view(), n);
        let observed_pairs = states
            .windows(2)
            .filter(|w| !w[0].is_missing() && !w[1].is_missing())
            .count();
        prop_assert_eq!(examples.len(), observed_pairs);
        for example in &examples {
            prop_assert_eq!(example.weight, 1.0);
            prop_assert!(is_simplex(example.target.as_slice().unwrap(), SIMPLEX_TOL));
            prop_assert_eq!(example.target.iter().filter(|v| **v == 1.0).count(), 1);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Appending zero-weight rows leaves the fitted loss unchanged.
    #[test]
    fn zero_weight_rows_do_not_move_the_fit(
        xs in prop::collection::vec(-2.0f64..2.0, 4..10),
        junk in prop::collection::vec(-50.0f64..50.0, 3),
    ) {
        let rows = xs.len();
        let targets = Array2::from_shape_fn((rows, 2), |(i, j)| {
            if (xs[i] > 0.0) == (j == 1) { 0.8 } else { 0.2 }
        });
        let features = Array2::from_shape_vec((rows, 1), xs.clone()).unwrap();
        let base = TrainingSet::new(Array1::ones(rows), features.clone(), targets.clone()).unwrap();

        let mut padded_features = features.into_raw_vec();
        padded_features.extend(&junk);
        let mut padded_targets = targets.into_raw_vec();
        for _ in &junk {
            padded_targets.extend([1.0, 0.0]);
        }
        let mut weights = vec![1.0; rows];
        weights.extend(vec![0.0; junk.len()]);
        let padded = TrainingSet::new(
            Array1::from(weights),
            Array2::from_shape_vec((rows + junk.len(), 1), padded_features).unwrap(),
            Array2::from_shape_vec((rows + junk.len(), 2), padded_targets).unwrap(),
        )
        .unwrap();

        let solver = WeightedLogisticSolver::new(SolverConfig::default());
        let a = solver.fit(&base, 0.1);
        let b = solver.fit(&padded, 0.1);
        prop_assert!((a.loss - b.loss).abs() <= 1e-6 * a.loss.max(1.0), "{} vs {}", a.loss, b.loss);
    }
}
