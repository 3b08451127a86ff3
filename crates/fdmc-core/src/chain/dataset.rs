//! Turning trajectories into per-origin-state training examples.
//!
//! Two modes:
//! - **Cold start** ([`DatasetBuilder::build_initial`]): only steps where both
//!   endpoints are observed produce an example (one-hot target, weight 1).
//! - **Refinement** ([`DatasetBuilder::build_refined`]): the current model's
//!   transition matrices are used to spread the mass of missing states over
//!   the plausible values, producing soft targets and fractional weights.
//!
//! Whatever the mode, an example's target lies on the simplex and its weight
//! is in `[0, 1]`; the weights emitted for one step never exceed 1 in any
//! origin bucket.

use fdmc_math::{normalize_or_uniform, one_hot};
use ndarray::{Array1, Array2, ArrayView2};

use super::observation::Observation;
use super::solver::TrainingSet;
use crate::error::Result;

/// One weighted training example for the regression of `origin`.
#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    /// State at time t.
    pub origin: usize,
    /// Feature vector at time t.
    pub features: Array1<f64>,
    /// Distribution of the state at t + 1.
    pub target: Array1<f64>,
    /// Probability mass that the chain really was in `origin` at t.
    pub weight: f64,
}

/// Builds training examples from one trajectory.
///
/// Implementations must be deterministic in their inputs.
pub trait DatasetBuilder: Sync {
    /// Examples for the first iteration, before any model exists.
    fn build_initial(
        &self,
        states: &[Observation],
        features: ArrayView2<'_, f64>,
        num_states: usize,
    ) -> Vec<Example>;

    /// Examples using the current model.
    ///
    /// `transitions[t]` is the n × n matrix predicted from feature row t;
    /// row `i` is the next-state distribution given origin `i`.
    fn build_refined(
        &self,
        transitions: &[Array2<f64>],
        states: &[Observation],
        features: ArrayView2<'_, f64>,
    ) -> Vec<Example>;
}

/// Default builder: exact posterior marginalization over missing states.
///
/// Missing positions are treated as latent states of the chain itself; the
/// observed positions act as hard evidence. A forward/backward pass over the
/// step-specific transition matrices gives, for every step, the joint
/// posterior of (origin, destination), which is then split into one example
/// per origin with positive mass. A missing first state gets a uniform prior.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainMarginalizer;

impl ChainMarginalizer {
    pub fn new() -> Self {
        Self
    }
}

/// Which states are compatible with an observation.
fn support(obs: Observation, n: usize) -> Vec<bool> {
    match obs {
        Observation::Observed(s) => (0..n).map(|i| i == s).collect(),
        Observation::Missing => vec![true; n],
    }
}

fn hard_example(origin: usize, next: usize, x: ndarray::ArrayView1<'_, f64>, n: usize) -> Example {
    Example {
        origin,
        features: x.to_owned(),
        target: Array1::from(one_hot(n, next)),
        weight: 1.0,
    }
}

impl DatasetBuilder for ChainMarginalizer {
    fn build_initial(
        &self,
        states: &[Observation],
        features: ArrayView2<'_, f64>,
        num_states: usize,
    ) -> Vec<Example> {
        let steps = states.len().min(features.nrows()).saturating_sub(1);
        let mut out = Vec::with_capacity(steps);
        for t in 0..steps {
            if let (Observation::Observed(from), Observation::Observed(to)) =
                (states[t], states[t + 1])
            {
                out.push(hard_example(from, to, features.row(t), num_states));
            }
        }
        out
    }

    fn build_refined(
        &self,
        transitions: &[Array2<f64>],
        states: &[Observation],
        features: ArrayView2<'_, f64>,
    ) -> Vec<Example> {
        let steps = transitions
            .len()
            .min(states.len().saturating_sub(1))
            .min(features.nrows().saturating_sub(1));
        if steps == 0 {
            return Vec::new();
        }
        let n = transitions[0].nrows();
        let evidence: Vec<Vec<bool>> = states[..=steps].iter().map(|s| support(*s, n)).collect();

        // Forward: alpha[t](i) ∝ P(s_t = i, evidence up to t).
        let mut alpha = vec![vec![0.0; n]; steps + 1];
        for (i, a) in alpha[0].iter_mut().enumerate() {
            *a = if evidence[0][i] { 1.0 } else { 0.0 };
        }
        normalize_or_uniform(&mut alpha[0], &evidence[0]);
        for t in 0..steps {
            let p = &transitions[t];
            let mut next = vec![0.0; n];
            for (j, slot) in next.iter_mut().enumerate() {
                if !evidence[t + 1][j] {
                    continue;
                }
                *slot = (0..n).map(|i| alpha[t][i] * p[[i, j]]).sum();
            }
            normalize_or_uniform(&mut next, &evidence[t + 1]);
            alpha[t + 1] = next;
        }

        // Backward: beta[t](i) ∝ P(evidence after t | s_t = i).
        let all = vec![true; n];
        let mut beta = vec![vec![1.0; n]; steps + 1];
        for t in (0..steps).rev() {
            let p = &transitions[t];
            let mut prev = vec![0.0; n];
            for (i, slot) in prev.iter_mut().enumerate() {
                *slot = (0..n)
                    .filter(|j| evidence[t + 1][*j])
                    .map(|j| p[[i, j]] * beta[t + 1][j])
                    .sum();
            }
            normalize_or_uniform(&mut prev, &all);
            beta[t] = prev;
        }

        let mut out = Vec::new();
        for t in 0..steps {
            let x = features.row(t);
            if let (Observation::Observed(from), Observation::Observed(to)) =
                (states[t], states[t + 1])
            {
                out.push(hard_example(from, to, x, n));
                continue;
            }

            let p = &transitions[t];
            let mut joint = vec![0.0; n * n];
            let mut allowed = vec![false; n * n];
            for i in 0..n {
                for j in 0..n {
                    let ok = evidence[t][i] && evidence[t + 1][j];
                    allowed[i * n + j] = ok;
                    if ok {
                        joint[i * n + j] = alpha[t][i] * p[[i, j]] * beta[t + 1][j];
                    }
                }
            }
            normalize_or_uniform(&mut joint, &allowed);

            for i in 0..n {
                let row = &joint[i * n..(i + 1) * n];
                let mass: f64 = row.iter().sum();
                if mass <= 0.0 {
                    continue;
                }
                out.push(Example {
                    origin: i,
                    features: x.to_owned(),
                    target: row.iter().map(|v| v / mass).collect(),
                    weight: mass.min(1.0),
                });
            }
        }
        out
    }
}

/// Examples routed to one origin state.
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    examples: Vec<Example>,
}

impl Bucket {
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    /// Stack into the solver's parallel arrays (N, N × p, N × n).
    ///
    /// An empty bucket yields 0 × p and 0 × n matrices.
    pub fn to_training_set(&self, feature_dim: usize, num_states: usize) -> Result<TrainingSet> {
        let rows = self.examples.len();
        let mut weights = Vec::with_capacity(rows);
        let mut features = Vec::with_capacity(rows * feature_dim);
        let mut targets = Vec::with_capacity(rows * num_states);
        for ex in &self.examples {
            weights.push(ex.weight);
            features.extend(ex.features.iter().copied());
            targets.extend(ex.target.iter().copied());
        }
        Ok(TrainingSet {
            weights: Array1::from(weights),
            features: Array2::from_shape_vec((rows, feature_dim), features)?,
            targets: Array2::from_shape_vec((rows, num_states), targets)?,
        })
    }
}

/// One bucket per origin state, indexed `0..n`.
#[derive(Debug, Clone)]
pub struct StateBuckets {
    buckets: Vec<Bucket>,
}

impl StateBuckets {
    pub fn new(num_states: usize) -> Self {
        Self {
            buckets: vec![Bucket::default(); num_states],
        }
    }

    /// Route an example to its origin bucket.
    ///
    /// Returns false (and drops the example) when the origin is out of range.
    pub fn push(&mut self, example: Example) -> bool {
        match self.buckets.get_mut(example.origin) {
            Some(bucket) => {
                bucket.examples.push(example);
                true
            }
            None => false,
        }
    }

    pub fn bucket(&self, origin: usize) -> Option<&Bucket> {
        self.buckets.get(origin)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bucket> {
        self.buckets.iter()
    }

    /// Total number of examples across all buckets.
    pub fn total_examples(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }
}
