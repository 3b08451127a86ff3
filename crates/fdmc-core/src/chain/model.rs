//! Per-origin-state multinomial logistic models and their collection.

use fdmc_math::softmax;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Multinomial logistic regression for transitions out of one state.
///
/// The predicted distribution over destinations for features `x` is
/// `softmax(x·A + b)`.
#[derive(Debug, Clone, PartialEq)]
pub struct StateModel {
    /// A, shape p × n.
    pub weights: Array2<f64>,
    /// b, length n.
    pub bias: Array1<f64>,
}

impl StateModel {
    /// The all-zero model (uniform predictions).
    pub fn zeros(feature_dim: usize, num_states: usize) -> Self {
        Self {
            weights: Array2::zeros((feature_dim, num_states)),
            bias: Array1::zeros(num_states),
        }
    }

    pub fn feature_dim(&self) -> usize {
        self.weights.nrows()
    }

    pub fn num_states(&self) -> usize {
        self.bias.len()
    }

    /// Logits `x·A + b`.
    pub fn logits(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        x.dot(&self.weights) + &self.bias
    }

    /// Transition distribution over destination states.
    pub fn predict(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let z = self.logits(x);
        Array1::from(softmax(&z.to_vec()))
    }
}

/// Fitted models for every origin state, indexed `0..n`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainModel {
    states: Vec<StateModel>,
}

impl ChainModel {
    pub fn new(states: Vec<StateModel>) -> Self {
        Self { states }
    }

    /// Number of states n.
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// Model for origin state `i`.
    pub fn state(&self, origin: usize) -> Option<&StateModel> {
        self.states.get(origin)
    }

    pub fn states(&self) -> &[StateModel] {
        &self.states
    }

    /// n × n matrix for one feature vector; row `i` is the distribution of
    /// the next state given the chain is in state `i`.
    pub fn transition_matrix(&self, x: ArrayView1<'_, f64>) -> Array2<f64> {
        let n = self.num_states();
        let mut matrix = Array2::zeros((n, n));
        for (model, mut row) in self.states.iter().zip(matrix.outer_iter_mut()) {
            row.assign(&model.predict(x));
        }
        matrix
    }

    /// One transition matrix per consumed feature row (the first T − 1).
    pub fn transition_matrices(&self, features: ArrayView2<'_, f64>) -> Vec<Array2<f64>> {
        let steps = features.nrows().saturating_sub(1);
        features
            .outer_iter()
            .take(steps)
            .map(|x| self.transition_matrix(x))
            .collect()
    }
}
