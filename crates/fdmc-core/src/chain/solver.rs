//! Weighted multinomial logistic regression for one origin state.
//!
//! Minimizes
//!
//! ```text
//! L(A, b) = Σ_k w_k · KL(y_k ‖ softmax(x_k·A + b)) + (λ/2)·‖A‖²_F
//! ```
//!
//! with L-BFGS and a More-Thuente line search (strong Wolfe conditions). The
//! bias is never penalized. Everything is `f64`; the solver settings arrive
//! explicitly through [`SolverConfig`].

use std::cell::{Cell, RefCell};

use argmin::core::{
    CostFunction, Error as ArgminError, Executor, Gradient, State, TerminationReason,
    TerminationStatus,
};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use fdmc_config::SolverConfig;
use fdmc_math::{kl_divergence_log, log_softmax_into};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};

use super::model::StateModel;
use crate::error::{ChainError, Result};

/// Parallel arrays for one origin state's regression.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    /// Example weights, length N.
    pub weights: Array1<f64>,
    /// Features, N × p.
    pub features: Array2<f64>,
    /// Target distributions, N × n.
    pub targets: Array2<f64>,
}

impl TrainingSet {
    /// Checked constructor: all three arrays must agree on N.
    pub fn new(weights: Array1<f64>, features: Array2<f64>, targets: Array2<f64>) -> Result<Self> {
        if features.nrows() != weights.len() || targets.nrows() != weights.len() {
            return Err(ChainError::Shape(ndarray::ShapeError::from_kind(
                ndarray::ErrorKind::IncompatibleShape,
            )));
        }
        Ok(Self {
            weights,
            features,
            targets,
        })
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn feature_dim(&self) -> usize {
        self.features.ncols()
    }

    pub fn num_states(&self) -> usize {
        self.targets.ncols()
    }
}

/// Result of one solver call.
#[derive(Debug, Clone)]
pub struct SolverOutput {
    pub model: StateModel,
    /// Objective value at `model`.
    pub loss: f64,
    /// L-BFGS iterations performed. Zero when the optimizer errored, since
    /// its state is lost with the error.
    pub iterations: u64,
    /// Cost and gradient calls made by the optimizer, including any made
    /// before an error.
    pub evaluations: u64,
    /// The optimizer stopped on its own tolerance rather than a budget or error.
    pub converged: bool,
}

/// Objective value and gradient norm at a given model.
#[derive(Debug, Clone, Copy)]
pub struct ObjectiveValue {
    pub loss: f64,
    pub grad_norm: f64,
}

/// Fits one origin state's model.
#[derive(Debug, Clone, Default)]
pub struct WeightedLogisticSolver {
    config: SolverConfig,
}

impl WeightedLogisticSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Fit (A, b) on `data` with penalty `lambda`.
    ///
    /// An empty set returns the zero model with zero loss without touching
    /// the optimizer. Optimizer failures are not propagated: the best point
    /// seen so far (or the starting point) is returned with its loss.
    pub fn fit(&self, data: &TrainingSet, lambda: f64) -> SolverOutput {
        let p = data.feature_dim();
        let n = data.num_states();
        if data.is_empty() {
            return SolverOutput {
                model: StateModel::zeros(p, n),
                loss: 0.0,
                iterations: 0,
                evaluations: 0,
                converged: true,
            };
        }

        let problem = KlObjective::new(data, lambda);
        let init = Array1::zeros(p * n + n);
        let (theta, iterations, converged) = match self.run(&problem, init.clone()) {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(error = %err, examples = data.len(), "solver failed; using best point seen");
                let theta = problem.best.borrow().as_ref().map(|(_, t)| t.clone());
                (theta.unwrap_or(init), 0, false)
            }
        };

        let model = problem.unpack_owned(&theta);
        let loss = problem
            .evaluate(&theta)
            .map(|(cost, _)| cost)
            .unwrap_or(f64::NAN);
        let evaluations = problem.evaluations.get();
        tracing::trace!(loss, iterations, evaluations, converged, examples = data.len(), "solver finished");

        SolverOutput {
            model,
            loss,
            iterations,
            evaluations,
            converged,
        }
    }

    fn run(
        &self,
        problem: &KlObjective<'_>,
        init: Array1<f64>,
    ) -> std::result::Result<(Array1<f64>, u64, bool), ArgminError> {
        let linesearch = MoreThuenteLineSearch::new();
        let solver = LBFGS::new(linesearch, self.config.history)
            .with_tolerance_grad(self.config.tol_grad)?
            .with_tolerance_cost(self.config.tol_cost)?;

        let res = Executor::new(problem, solver)
            .configure(|state| state.param(init).max_iters(self.config.max_iters))
            .run()?;

        let state = res.state();
        let converged = matches!(
            state.get_termination_status(),
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
        );
        let theta = match state.get_best_param() {
            Some(best) => best.clone(),
            None => problem
                .best
                .borrow()
                .as_ref()
                .map(|(_, t)| t.clone())
                .ok_or_else(|| ArgminError::msg("no parameters evaluated"))?,
        };
        Ok((theta, state.get_iter(), converged))
    }

    /// Objective and gradient norm of `model` on `data`.
    pub fn objective(data: &TrainingSet, lambda: f64, model: &StateModel) -> ObjectiveValue {
        if data.is_empty() {
            return ObjectiveValue {
                loss: 0.0,
                grad_norm: 0.0,
            };
        }
        let problem = KlObjective::new(data, lambda);
        let theta: Array1<f64> = model.weights.iter().chain(model.bias.iter()).copied().collect();
        match problem.evaluate(&theta) {
            Ok((loss, grad)) => ObjectiveValue {
                loss,
                grad_norm: grad.dot(&grad).sqrt(),
            },
            Err(_) => ObjectiveValue {
                loss: f64::NAN,
                grad_norm: f64::NAN,
            },
        }
    }
}

/// θ = [A row-major (p·n), b (n)].
struct KlObjective<'a> {
    data: &'a TrainingSet,
    lambda: f64,
    p: usize,
    n: usize,
    best: RefCell<Option<(f64, Array1<f64>)>>,
    evaluations: Cell<u64>,
}

impl<'a> KlObjective<'a> {
    fn new(data: &'a TrainingSet, lambda: f64) -> Self {
        Self {
            data,
            lambda,
            p: data.feature_dim(),
            n: data.num_states(),
            best: RefCell::new(None),
            evaluations: Cell::new(0),
        }
    }

    fn unpack<'t>(
        &self,
        theta: &'t Array1<f64>,
    ) -> std::result::Result<(ArrayView2<'t, f64>, ArrayView1<'t, f64>), ndarray::ShapeError> {
        let split = self.p * self.n;
        let a = theta.slice(s![..split]).into_shape((self.p, self.n))?;
        let b = theta.slice(s![split..]);
        Ok((a, b))
    }

    fn unpack_owned(&self, theta: &Array1<f64>) -> StateModel {
        match self.unpack(theta) {
            Ok((a, b)) => StateModel {
                weights: a.to_owned(),
                bias: b.to_owned(),
            },
            Err(_) => StateModel::zeros(self.p, self.n),
        }
    }

    fn record(&self, cost: f64, theta: &Array1<f64>) {
        self.evaluations.set(self.evaluations.get() + 1);
        if !cost.is_finite() {
            return;
        }
        let mut best = self.best.borrow_mut();
        let better = best.as_ref().map_or(true, |(c, _)| cost < *c);
        if better {
            *best = Some((cost, theta.clone()));
        }
    }

    /// Cost and gradient at θ.
    fn evaluate(
        &self,
        theta: &Array1<f64>,
    ) -> std::result::Result<(f64, Array1<f64>), ndarray::ShapeError> {
        let (a, b) = self.unpack(theta)?;
        let data = self.data;

        let logits = data.features.dot(&a) + &b;
        let mut g_logits = Array2::<f64>::zeros(logits.raw_dim());
        let mut lq = vec![0.0; self.n];
        let mut cost = 0.5 * self.lambda * a.iter().map(|v| v * v).sum::<f64>();

        for (k, z) in logits.outer_iter().enumerate() {
            let w = data.weights[k];
            if w == 0.0 {
                continue;
            }
            let y = data.targets.row(k).to_vec();
            log_softmax_into(&z.to_vec(), &mut lq);
            cost += w * kl_divergence_log(&y, &lq);

            let mass: f64 = y.iter().sum();
            for (j, g) in g_logits.row_mut(k).iter_mut().enumerate() {
                *g = w * (mass * lq[j].exp() - y[j]);
            }
        }

        let grad_a = data.features.t().dot(&g_logits) + &(&a * self.lambda);
        let grad_b = g_logits.sum_axis(Axis(0));
        let grad = grad_a.iter().chain(grad_b.iter()).copied().collect();
        Ok((cost, grad))
    }
}

impl CostFunction for &KlObjective<'_> {
    type Param = Array1<f64>;
    type Output = f64;

    fn cost(&self, theta: &Self::Param) -> std::result::Result<Self::Output, ArgminError> {
        let (cost, _) = self.evaluate(theta)?;
        self.record(cost, theta);
        Ok(cost)
    }
}

impl Gradient for &KlObjective<'_> {
    type Param = Array1<f64>;
    type Gradient = Array1<f64>;

    fn gradient(&self, theta: &Self::Param) -> std::result::Result<Self::Gradient, ArgminError> {
        let (cost, grad) = self.evaluate(theta)?;
        self.record(cost, theta);
        Ok(grad)
    }
}
