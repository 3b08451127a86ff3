//! Observed trajectories: state labels with gaps plus aligned features.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{ChainError, Result};

/// One entry of a state sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Observation {
    /// The chain was seen in this state.
    Observed(usize),
    /// The state at this position is unknown.
    Missing,
}

impl Observation {
    /// The observed state index, if any.
    pub fn state(&self) -> Option<usize> {
        match self {
            Observation::Observed(s) => Some(*s),
            Observation::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Observation::Missing)
    }
}

impl From<usize> for Observation {
    fn from(state: usize) -> Self {
        Observation::Observed(state)
    }
}

impl From<Option<usize>> for Observation {
    fn from(state: Option<usize>) -> Self {
        state.map_or(Observation::Missing, Observation::Observed)
    }
}

impl From<Observation> for Option<usize> {
    fn from(obs: Observation) -> Self {
        obs.state()
    }
}

/// A state sequence with its feature matrix (T × p).
///
/// Row `t` of the features predicts the transition from `states[t]` to
/// `states[t + 1]`, so the last row is never consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    states: Vec<Observation>,
    features: Array2<f64>,
}

impl Trajectory {
    /// Pair a state sequence with its features.
    ///
    /// Fails when the sequence length and the number of feature rows differ.
    pub fn new(states: Vec<Observation>, features: Array2<f64>) -> Result<Self> {
        if states.len() != features.nrows() {
            return Err(ChainError::LengthMismatch {
                trajectory: 0,
                states: states.len(),
                features: features.nrows(),
            });
        }
        Ok(Self { states, features })
    }

    /// Build from optional state labels and row-major feature vectors.
    pub fn from_rows(states: Vec<Option<usize>>, rows: Vec<Vec<f64>>) -> Result<Self> {
        let dim = rows.first().map_or(0, Vec::len);
        let t = rows.len();
        let mut flat = Vec::with_capacity(t * dim);
        for row in &rows {
            if row.len() != dim {
                return Err(ChainError::FeatureDimensionMismatch {
                    trajectory: 0,
                    expected: dim,
                    got: row.len(),
                });
            }
            flat.extend_from_slice(row);
        }
        let features = Array2::from_shape_vec((t, dim), flat)?;
        Self::new(states.into_iter().map(Observation::from).collect(), features)
    }

    pub fn states(&self) -> &[Observation] {
        &self.states
    }

    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    /// Number of time steps T.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Feature dimensionality p.
    pub fn feature_dim(&self) -> usize {
        self.features.ncols()
    }

    /// Number of missing positions.
    pub fn missing_count(&self) -> usize {
        self.states.iter().filter(|s| s.is_missing()).count()
    }

    /// Check this trajectory against the run's state space.
    ///
    /// `index` is only used to label errors.
    pub(crate) fn check(&self, index: usize, num_states: usize, feature_dim: usize) -> Result<()> {
        if self.states.len() != self.features.nrows() {
            return Err(ChainError::LengthMismatch {
                trajectory: index,
                states: self.states.len(),
                features: self.features.nrows(),
            });
        }
        if self.feature_dim() != feature_dim {
            return Err(ChainError::FeatureDimensionMismatch {
                trajectory: index,
                expected: feature_dim,
                got: self.feature_dim(),
            });
        }
        for (step, obs) in self.states.iter().enumerate() {
            if let Observation::Observed(state) = *obs {
                if state >= num_states {
                    return Err(ChainError::StateOutOfRange {
                        trajectory: index,
                        step,
                        state,
                        num_states,
                    });
                }
            }
        }
        for (step, row) in self.features.outer_iter().enumerate() {
            if row.iter().any(|v| !v.is_finite()) {
                return Err(ChainError::NonFiniteFeature {
                    trajectory: index,
                    step,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_conversions() {
        assert_eq!(Observation::from(Some(2)), Observation::Observed(2));
        assert_eq!(Observation::from(None), Observation::Missing);
        assert_eq!(Option::<usize>::from(Observation::Observed(1)), Some(1));
        assert!(Observation::Missing.is_missing());
        assert_eq!(Observation::Missing.state(), None);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let err = Trajectory::new(vec![Observation::Observed(0)], Array2::zeros((2, 1))).unwrap_err();
        assert!(matches!(err, ChainError::LengthMismatch { states: 1, features: 2, .. }));
    }

    #[test]
    fn test_from_rows() {
        let traj = Trajectory::from_rows(
            vec![Some(0), None, Some(1)],
            vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]],
        )
        .unwrap();
        assert_eq!(traj.len(), 3);
        assert_eq!(traj.feature_dim(), 2);
        assert_eq!(traj.missing_count(), 1);
        assert_eq!(traj.features()[[1, 1]], 4.0);
    }

    #[test]
    fn test_from_rows_ragged() {
        let err = Trajectory::from_rows(vec![Some(0), Some(1)], vec![vec![1.0], vec![1.0, 2.0]])
            .unwrap_err();
        assert!(matches!(err, ChainError::FeatureDimensionMismatch { .. }));
    }

    #[test]
    fn test_check_state_range() {
        let traj = Trajectory::from_rows(vec![Some(0), Some(3)], vec![vec![0.0], vec![0.0]]).unwrap();
        let err = traj.check(4, 3, 1).unwrap_err();
        assert!(matches!(
            err,
            ChainError::StateOutOfRange { trajectory: 4, step: 1, state: 3, num_states: 3 }
        ));
        assert!(traj.check(0, 4, 1).is_ok());
    }

    #[test]
    fn test_check_non_finite() {
        let traj =
            Trajectory::from_rows(vec![Some(0), Some(1)], vec![vec![0.0], vec![f64::NAN]]).unwrap();
        assert!(matches!(
            traj.check(0, 2, 1).unwrap_err(),
            ChainError::NonFiniteFeature { step: 1, .. }
        ));
    }

    #[test]
    fn test_check_dimension() {
        let traj = Trajectory::from_rows(vec![Some(0)], vec![vec![0.0, 1.0]]).unwrap();
        assert!(matches!(
            traj.check(1, 2, 3).unwrap_err(),
            ChainError::FeatureDimensionMismatch { trajectory: 1, expected: 3, got: 2 }
        ));
    }
}
