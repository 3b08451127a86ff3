//! Synthetic trajectories for demos and tests.
//!
//! Draws a random ground-truth model, simulates the chain from state 0 with
//! standard-normal features and then hides a random subset of the states.

use fdmc_config::ValidationError;
use ndarray::Array2;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, StandardNormal};

use crate::chain::{ChainModel, Observation, StateModel, Trajectory};
use crate::error::{ChainError, Result};
use crate::logging::event_names;

/// What to generate.
#[derive(Debug, Clone)]
pub struct SyntheticSpec {
    pub num_states: usize,
    /// Length T of each trajectory.
    pub steps: usize,
    pub feature_dim: usize,
    pub sequences: usize,
    /// Probability that any single state is hidden.
    pub missing_fraction: f64,
    /// Standard deviation of the ground-truth weights.
    pub weight_scale: f64,
    pub seed: u64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            num_states: 2,
            steps: 40,
            feature_dim: 3,
            sequences: 1,
            missing_fraction: 0.2,
            weight_scale: 1.5,
            seed: 2,
        }
    }
}

/// Generated data plus what produced it.
#[derive(Debug, Clone)]
pub struct SyntheticData {
    pub truth: ChainModel,
    pub trajectories: Vec<Trajectory>,
    /// The full state paths before hiding.
    pub complete: Vec<Vec<usize>>,
}

fn invalid(field: &str, message: String) -> ChainError {
    ChainError::InvalidConfig(ValidationError::InvalidValue {
        field: field.to_string(),
        message,
    })
}

fn check_spec(spec: &SyntheticSpec) -> Result<()> {
    if spec.num_states == 0 {
        return Err(invalid("num_states", "Must be positive, got 0".to_string()));
    }
    if !(0.0..=1.0).contains(&spec.missing_fraction) {
        return Err(invalid(
            "missing_fraction",
            format!("Must be in [0, 1], got {}", spec.missing_fraction),
        ));
    }
    if !spec.weight_scale.is_finite() || spec.weight_scale < 0.0 {
        return Err(invalid(
            "weight_scale",
            format!("Must be finite and >= 0, got {}", spec.weight_scale),
        ));
    }
    Ok(())
}

fn random_model(spec: &SyntheticSpec, rng: &mut StdRng) -> Result<ChainModel> {
    let (p, n) = (spec.feature_dim, spec.num_states);
    let weight_dist =
        Normal::new(0.0, spec.weight_scale).map_err(|e| invalid("weight_scale", e.to_string()))?;
    let states = (0..n)
        .map(|_| {
            let mut model = StateModel::zeros(p, n);
            model.weights.mapv_inplace(|_| weight_dist.sample(&mut *rng));
            model.bias.mapv_inplace(|_| 0.5 * rng.sample::<f64, _>(StandardNormal));
            model
        })
        .collect();
    Ok(ChainModel::new(states))
}

/// Draw the next state from `probs`; degenerate rows fall back to uniform.
fn draw(probs: &[f64], rng: &mut StdRng) -> usize {
    match WeightedIndex::new(probs) {
        Ok(dist) => dist.sample(rng),
        Err(_) => rng.random_range(0..probs.len()),
    }
}

/// Generate trajectories according to `spec`.
pub fn generate(spec: &SyntheticSpec) -> Result<SyntheticData> {
    check_spec(spec)?;
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let truth = random_model(spec, &mut rng)?;

    let mut trajectories = Vec::with_capacity(spec.sequences);
    let mut complete = Vec::with_capacity(spec.sequences);
    for _ in 0..spec.sequences {
        let features = Array2::from_shape_fn((spec.steps, spec.feature_dim), |_| {
            rng.sample::<f64, _>(StandardNormal)
        });

        let mut path = Vec::with_capacity(spec.steps);
        if spec.steps > 0 {
            path.push(0usize);
        }
        for t in 1..spec.steps {
            let from = path[t - 1];
            let probs = truth
                .state(from)
                .map(|m| m.predict(features.row(t - 1)).to_vec())
                .unwrap_or_default();
            path.push(draw(&probs, &mut rng));
        }

        let states: Vec<Observation> = path
            .iter()
            .map(|&s| {
                if rng.random::<f64>() < spec.missing_fraction {
                    Observation::Missing
                } else {
                    Observation::Observed(s)
                }
            })
            .collect();

        trajectories.push(Trajectory::new(states, features)?);
        complete.push(path);
    }

    let hidden: usize = trajectories.iter().map(Trajectory::missing_count).sum();
    tracing::debug!(
        event = event_names::DATA_GENERATED,
        sequences = spec.sequences,
        steps = spec.steps,
        hidden,
        "synthetic data generated"
    );

    Ok(SyntheticData {
        truth,
        trajectories,
        complete,
    })
}
