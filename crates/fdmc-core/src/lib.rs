//! fdmc core library.
//!
//! Estimates a discrete-state Markov chain whose transition probabilities
//! depend on time-varying features, from trajectories with missing states:
//! - Observations, trajectories and per-state models
//! - Dataset construction with marginalization of missing states
//! - Weighted multinomial logistic regression (L-BFGS)
//! - The outer refitting loop
//! - Structured logging and a synthetic data generator
//!
//! The binary entry point is in `main.rs`.

pub mod chain;
pub mod error;
pub mod logging;
pub mod synthetic;

pub use chain::{ChainModel, ChainTrainer, FitReport, Observation, StateModel, TrainerPhase, Trajectory};
pub use error::{ChainError, Result};
