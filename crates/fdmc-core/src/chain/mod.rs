//! Feature-dependent Markov chain estimation.
//!
//! # Model
//!
//! - States: `s_t ∈ {0, …, n−1}`, possibly unobserved at any t
//! - Features: `x_t ∈ ℝ^p`, always observed
//! - Transitions: `P(s_{t+1} = j | s_t = i, x_t) = softmax(x_t·A_i + b_i)_j`
//!
//! The [`ChainTrainer`] alternates between building soft-labelled examples
//! from the current model ([`DatasetBuilder`]) and refitting one
//! [`WeightedLogisticSolver`] per origin state.
//!
//! # Example
//!
//! ```ignore
//! use fdmc_config::EstimatorConfig;
//! use fdmc_core::chain::{ChainTrainer, Trajectory};
//!
//! let trajectory = Trajectory::from_rows(
//!     vec![Some(0), None, Some(1), Some(0)],
//!     vec![vec![0.1], vec![0.9], vec![-0.4], vec![0.0]],
//! )?;
//! let trainer = ChainTrainer::new(EstimatorConfig::new(2))?;
//! let report = trainer.fit_one(&trajectory, false)?;
//! println!("{} iterations, phase {}", report.iterations, report.phase);
//! ```

pub mod dataset;
pub mod model;
pub mod observation;
pub mod solver;
pub mod trainer;

pub use dataset::{Bucket, ChainMarginalizer, DatasetBuilder, Example, StateBuckets};
pub use model::{ChainModel, StateModel};
pub use observation::{Observation, Trajectory};
pub use solver::{ObjectiveValue, SolverOutput, TrainingSet, WeightedLogisticSolver};
pub use trainer::{ChainTrainer, FitReport, TrainerPhase};
