//! Outer refitting loop.
//!
//! Each iteration builds per-state example buckets from every trajectory
//! (hard labels only on the first pass, marginalized soft labels afterwards),
//! fits one independent regression per origin state and swaps in the new
//! model collection as a whole. The loop stops when the relative loss
//! improvement drops below `eps` or the iteration budget runs out.

use fdmc_config::EstimatorConfig;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::dataset::{ChainMarginalizer, DatasetBuilder, Example, StateBuckets};
use super::model::{ChainModel, StateModel};
use super::observation::Trajectory;
use super::solver::{SolverOutput, TrainingSet, WeightedLogisticSolver};
use crate::error::{ChainError, Result};
use crate::logging::event_names;

/// Where the outer loop is (or ended).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainerPhase {
    /// No model yet; only fully observed transitions are used.
    ColdStart,
    /// Missing states are filled in from the previous model.
    Refining,
    /// The relative improvement fell below the tolerance.
    Converged,
    /// The iteration budget ran out first.
    Exhausted,
}

impl std::fmt::Display for TrainerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrainerPhase::ColdStart => "cold_start",
            TrainerPhase::Refining => "refining",
            TrainerPhase::Converged => "converged",
            TrainerPhase::Exhausted => "exhausted",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of [`ChainTrainer::fit`].
#[derive(Debug, Clone)]
pub struct FitReport {
    /// Fitted model for every origin state.
    pub model: ChainModel,
    /// Outer iterations executed.
    pub iterations: usize,
    /// Total loss of every iteration, in order.
    pub loss_history: Vec<f64>,
    /// `Converged` or `Exhausted`.
    pub phase: TrainerPhase,
}

impl FitReport {
    pub fn converged(&self) -> bool {
        self.phase == TrainerPhase::Converged
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.loss_history.last().copied()
    }
}

/// `1 − loss / prev`, with `0/0` read as no change.
fn relative_decrease(loss: f64, prev: f64) -> f64 {
    if prev == 0.0 {
        return if loss == 0.0 { 0.0 } else { f64::INFINITY };
    }
    1.0 - loss / prev
}

/// Estimates a feature-dependent Markov chain from partially observed trajectories.
#[derive(Debug, Clone)]
pub struct ChainTrainer<B = ChainMarginalizer> {
    config: EstimatorConfig,
    solver: WeightedLogisticSolver,
    builder: B,
}

impl ChainTrainer<ChainMarginalizer> {
    /// Trainer with the default marginalizing dataset builder.
    pub fn new(config: EstimatorConfig) -> Result<Self> {
        Self::with_builder(config, ChainMarginalizer::new())
    }
}

impl<B: DatasetBuilder> ChainTrainer<B> {
    /// Trainer with a custom dataset builder.
    pub fn with_builder(config: EstimatorConfig, builder: B) -> Result<Self> {
        config.validate()?;
        let solver = WeightedLogisticSolver::new(config.solver.clone());
        Ok(Self {
            config,
            solver,
            builder,
        })
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Fit a single trajectory.
    pub fn fit_one(&self, trajectory: &Trajectory, verbose: bool) -> Result<FitReport> {
        self.fit(std::slice::from_ref(trajectory), verbose)
    }

    /// Fit on every trajectory jointly.
    ///
    /// `verbose` raises per-iteration progress from `debug` to `info`; it
    /// has no effect on the result.
    pub fn fit(&self, trajectories: &[Trajectory], verbose: bool) -> Result<FitReport> {
        let feature_dim = self.check_inputs(trajectories)?;
        let n = self.config.num_states;

        tracing::debug!(
            event = event_names::FIT_STARTED,
            trajectories = trajectories.len(),
            num_states = n,
            feature_dim,
            n_iter = self.config.n_iter,
            "fit started"
        );

        let mut model: Option<ChainModel> = None;
        let mut phase = TrainerPhase::ColdStart;
        let mut prev_loss = f64::INFINITY;
        let mut loss_history = Vec::with_capacity(self.config.n_iter);

        for k in 0..self.config.n_iter {
            let buckets = self.build_buckets(trajectories, model.as_ref());
            let outputs = self.fit_states(&buckets, feature_dim)?;

            let loss: f64 = outputs.iter().map(|o| o.loss).sum();
            model = Some(ChainModel::new(outputs.into_iter().map(|o| o.model).collect()));
            loss_history.push(loss);

            macro_rules! iteration_record {
                ($emit:ident) => {
                    tracing::$emit!(
                        event = event_names::FIT_ITERATION,
                        iteration = k,
                        loss,
                        examples = buckets.total_examples(),
                        phase = %phase,
                        "iteration finished"
                    )
                };
            }
            if verbose {
                iteration_record!(info);
            } else {
                iteration_record!(debug);
            }

            // The cold-start loss covers a different example set, so
            // comparisons start from the first refined iteration.
            if k > 0 && loss <= prev_loss && relative_decrease(loss, prev_loss) <= self.config.eps {
                phase = TrainerPhase::Converged;
                break;
            }
            if k > 0 {
                prev_loss = loss;
            }
            phase = TrainerPhase::Refining;
        }

        if phase != TrainerPhase::Converged {
            phase = TrainerPhase::Exhausted;
        }
        let iterations = loss_history.len();
        tracing::info!(
            event = event_names::FIT_FINISHED,
            iterations,
            loss = loss_history.last().copied().unwrap_or(0.0),
            phase = %phase,
            "fit finished"
        );

        let model = model.unwrap_or_else(|| {
            ChainModel::new(vec![StateModel::zeros(feature_dim, n); n])
        });
        Ok(FitReport {
            model,
            iterations,
            loss_history,
            phase,
        })
    }

    /// Validate every trajectory before any work; returns the feature dimension.
    fn check_inputs(&self, trajectories: &[Trajectory]) -> Result<usize> {
        let first = trajectories.first().ok_or(ChainError::NoTrajectories)?;
        let feature_dim = first.feature_dim();
        for (index, trajectory) in trajectories.iter().enumerate() {
            trajectory.check(index, self.config.num_states, feature_dim)?;
        }
        Ok(feature_dim)
    }

    /// Build examples for every trajectory and group them by origin state.
    ///
    /// Trajectories are processed in parallel; merging happens in input
    /// order so bucket contents do not depend on scheduling.
    fn build_buckets(&self, trajectories: &[Trajectory], model: Option<&ChainModel>) -> StateBuckets {
        let n = self.config.num_states;
        let per_trajectory: Vec<Vec<Example>> = trajectories
            .par_iter()
            .map(|trajectory| match model {
                None => self
                    .builder
                    .build_initial(trajectory.states(), trajectory.features(), n),
                Some(model) => {
                    let transitions = model.transition_matrices(trajectory.features());
                    self.builder
                        .build_refined(&transitions, trajectory.states(), trajectory.features())
                }
            })
            .collect();

        let mut buckets = StateBuckets::new(n);
        let mut dropped = 0usize;
        for example in per_trajectory.into_iter().flatten() {
            if !buckets.push(example) {
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::warn!(dropped, num_states = n, "dataset builder emitted out-of-range origins");
        }
        buckets
    }

    /// One independent fit per origin state, in state order.
    fn fit_states(&self, buckets: &StateBuckets, feature_dim: usize) -> Result<Vec<SolverOutput>> {
        let n = self.config.num_states;
        let sets = buckets
            .iter()
            .map(|bucket| bucket.to_training_set(feature_dim, n))
            .collect::<Result<Vec<TrainingSet>>>()?;

        let lambda = self.config.lambda;
        let fit = |(origin, set): (usize, &TrainingSet)| {
            let out = self.solver.fit(set, lambda);
            tracing::trace!(
                event = event_names::STATE_FITTED,
                origin,
                examples = set.len(),
                loss = out.loss,
                iterations = out.iterations,
                evaluations = out.evaluations,
                converged = out.converged,
                "state fitted"
            );
            out
        };

        let outputs = if self.config.parallel {
            sets.par_iter().enumerate().map(fit).collect()
        } else {
            sets.iter().enumerate().map(fit).collect()
        };
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::observation::Observation;
    use ndarray::{array, Array2, ArrayView2};

    fn alternating(len: usize) -> Trajectory {
        let states: Vec<Option<usize>> = (0..len).map(|t| Some(t % 2)).collect();
        let rows: Vec<Vec<f64>> = (0..len)
            .map(|t| vec![if (t + 1) % 2 == 1 { 1.0 } else { -1.0 }])
            .collect();
        Trajectory::from_rows(states, rows).unwrap()
    }

    #[test]
    fn test_relative_decrease() {
        assert_eq!(relative_decrease(1.0, f64::INFINITY), 1.0);
        assert_eq!(relative_decrease(0.0, 0.0), 0.0);
        assert!((relative_decrease(0.5, 1.0) - 0.5).abs() < 1e-15);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = ChainTrainer::new(EstimatorConfig::new(0)).unwrap_err();
        assert!(matches!(err, ChainError::InvalidConfig(_)));
    }

    #[test]
    fn test_no_trajectories() {
        let trainer = ChainTrainer::new(EstimatorConfig::new(2)).unwrap();
        assert!(matches!(trainer.fit(&[], false), Err(ChainError::NoTrajectories)));
    }

    #[test]
    fn test_inconsistent_feature_dims_fail_fast() {
        let trainer = ChainTrainer::new(EstimatorConfig::new(2)).unwrap();
        let a = Trajectory::from_rows(vec![Some(0), Some(1)], vec![vec![0.0], vec![1.0]]).unwrap();
        let b = Trajectory::from_rows(vec![Some(0), Some(1)], vec![vec![0.0, 1.0], vec![1.0, 0.0]])
            .unwrap();
        let err = trainer.fit(&[a, b], false).unwrap_err();
        assert!(matches!(err, ChainError::FeatureDimensionMismatch { trajectory: 1, .. }));
    }

    #[test]
    fn test_state_out_of_range_fails_fast() {
        let trainer = ChainTrainer::new(EstimatorConfig::new(2)).unwrap();
        let t = Trajectory::from_rows(vec![Some(0), Some(2)], vec![vec![0.0], vec![1.0]]).unwrap();
        assert!(matches!(
            trainer.fit_one(&t, false),
            Err(ChainError::StateOutOfRange { state: 2, .. })
        ));
    }

    #[test]
    fn test_unvisited_state_gets_zero_model() {
        // State 2 never appears as an origin.
        let config = EstimatorConfig::new(3).with_n_iter(3);
        let trainer = ChainTrainer::new(config).unwrap();
        let t = Trajectory::from_rows(
            vec![Some(0), Some(1), Some(0), Some(1)],
            vec![vec![0.5], vec![-0.5], vec![0.5], vec![-0.5]],
        )
        .unwrap();
        let report = trainer.fit_one(&t, false).unwrap();
        let unvisited = report.model.state(2).unwrap();
        assert_eq!(*unvisited, StateModel::zeros(1, 3));
        assert!(report.loss_history.iter().all(|l| l.is_finite()));
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let t = alternating(12);
        let seq = ChainTrainer::new(EstimatorConfig::new(2).with_parallel(false))
            .unwrap()
            .fit_one(&t, false)
            .unwrap();
        let par = ChainTrainer::new(EstimatorConfig::new(2).with_parallel(true))
            .unwrap()
            .fit_one(&t, false)
            .unwrap();
        assert_eq!(seq.loss_history, par.loss_history);
        assert_eq!(seq.model, par.model);
    }

    #[test]
    fn test_budget_of_one_is_exhausted() {
        let trainer = ChainTrainer::new(EstimatorConfig::new(2).with_n_iter(1)).unwrap();
        let report = trainer.fit_one(&alternating(6), false).unwrap();
        assert_eq!(report.iterations, 1);
        assert_eq!(report.phase, TrainerPhase::Exhausted);
    }

    #[test]
    fn test_fully_observed_converges_on_third_iteration() {
        // Identical datasets every pass: iteration 1 records the loss,
        // iteration 2 sees no change.
        let trainer = ChainTrainer::new(EstimatorConfig::new(2)).unwrap();
        let report = trainer.fit_one(&alternating(10), false).unwrap();
        assert_eq!(report.phase, TrainerPhase::Converged);
        assert_eq!(report.iterations, 3);
    }

    /// Builder that emits nothing: every state stays at the zero model.
    struct EmptyBuilder;

    impl DatasetBuilder for EmptyBuilder {
        fn build_initial(&self, _: &[Observation], _: ArrayView2<'_, f64>, _: usize) -> Vec<Example> {
            Vec::new()
        }

        fn build_refined(
            &self,
            _: &[Array2<f64>],
            _: &[Observation],
            _: ArrayView2<'_, f64>,
        ) -> Vec<Example> {
            Vec::new()
        }
    }

    #[test]
    fn test_custom_builder_with_no_examples() {
        let trainer = ChainTrainer::with_builder(EstimatorConfig::new(2), EmptyBuilder).unwrap();
        let report = trainer.fit_one(&alternating(4), false).unwrap();
        assert_eq!(report.phase, TrainerPhase::Converged);
        assert!(report.loss_history.iter().all(|l| *l == 0.0));
        for model in report.model.states() {
            assert_eq!(*model, StateModel::zeros(1, 2));
        }
        let p = report.model.transition_matrix(array![3.0].view());
        assert!((p[[0, 0]] - 0.5).abs() < 1e-12);
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Info-level output of one fit on the calling thread.
    fn info_output(verbose: bool) -> String {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let trainer = ChainTrainer::new(EstimatorConfig::new(2)).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            trainer.fit_one(&alternating(8), verbose).unwrap();
        });
        let bytes = out.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_verbose_raises_iteration_records_to_info() {
        let loud = info_output(true);
        assert_eq!(loud.matches("iteration finished").count(), 3);
        assert!(loud.contains("phase=cold_start"));

        let quiet = info_output(false);
        assert!(!quiet.contains("iteration finished"));
        assert!(quiet.contains("fit finished"));
    }
}
