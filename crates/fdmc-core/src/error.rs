//! Error types for the estimation engine.
//!
//! Only precondition violations surface as errors. Numerical trouble inside
//! the solver is absorbed into the loss signal and never reaches the caller.

use fdmc_config::ValidationError;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ChainError>;

/// Precondition violations detected before any solver work begins.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ValidationError),

    #[error("no trajectories supplied")]
    NoTrajectories,

    #[error("trajectory {trajectory}: {states} states but {features} feature rows")]
    LengthMismatch {
        trajectory: usize,
        states: usize,
        features: usize,
    },

    #[error("trajectory {trajectory}: feature dimension {got}, expected {expected}")]
    FeatureDimensionMismatch {
        trajectory: usize,
        expected: usize,
        got: usize,
    },

    #[error("trajectory {trajectory}, step {step}: state {state} outside 0..{num_states}")]
    StateOutOfRange {
        trajectory: usize,
        step: usize,
        state: usize,
        num_states: usize,
    },

    #[error("trajectory {trajectory}, step {step}: non-finite feature value")]
    NonFiniteFeature { trajectory: usize, step: usize },

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl ChainError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ChainError::InvalidConfig(inner) => inner.code(),
            ChainError::NoTrajectories => 70,
            ChainError::LengthMismatch { .. } => 71,
            ChainError::FeatureDimensionMismatch { .. } => 72,
            ChainError::StateOutOfRange { .. } => 73,
            ChainError::NonFiniteFeature { .. } => 74,
            ChainError::Shape(_) => 75,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            ChainError::NoTrajectories,
            ChainError::LengthMismatch {
                trajectory: 0,
                states: 3,
                features: 2,
            },
            ChainError::FeatureDimensionMismatch {
                trajectory: 1,
                expected: 2,
                got: 3,
            },
            ChainError::StateOutOfRange {
                trajectory: 0,
                step: 4,
                state: 9,
                num_states: 2,
            },
            ChainError::NonFiniteFeature {
                trajectory: 0,
                step: 1,
            },
        ];
        let mut codes: Vec<u32> = errors.iter().map(ChainError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_config_error_keeps_code() {
        let err: ChainError = ValidationError::ParseError("bad".into()).into();
        assert_eq!(err.code(), 61);
        assert!(err.to_string().contains("invalid configuration"));
    }

    #[test]
    fn test_display_mentions_location() {
        let err = ChainError::StateOutOfRange {
            trajectory: 2,
            step: 7,
            state: 5,
            num_states: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("trajectory 2"));
        assert!(msg.contains("step 7"));
    }
}
