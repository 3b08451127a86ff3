//! Estimator configuration.

use serde::{Deserialize, Serialize};

use crate::validate::ValidationError;

fn default_schema_version() -> String {
    crate::CONFIG_SCHEMA_VERSION.to_string()
}

fn default_n_iter() -> usize {
    50
}

fn default_lambda() -> f64 {
    0.1
}

fn default_eps() -> f64 {
    1e-6
}

fn default_parallel() -> bool {
    true
}

/// Settings for the per-state quasi-Newton solver.
///
/// Passed explicitly into every solver call; nothing here is process-global.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Maximum L-BFGS iterations per fit.
    pub max_iters: u64,
    /// Number of correction pairs kept by L-BFGS.
    pub history: usize,
    /// Stop when the gradient norm falls below this.
    pub tol_grad: f64,
    /// Stop when the cost changes by less than this between iterations.
    pub tol_cost: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iters: 100,
            history: 20,
            tol_grad: 1e-7,
            tol_cost: 1e-9,
        }
    }
}

/// Configuration of one estimation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Number of discrete states `n`.
    pub num_states: usize,

    /// Outer iteration budget.
    #[serde(default = "default_n_iter")]
    pub n_iter: usize,

    /// Frobenius penalty on the weight matrices (never the bias).
    #[serde(default = "default_lambda")]
    pub lambda: f64,

    /// Relative loss-improvement tolerance for the outer loop.
    #[serde(default = "default_eps")]
    pub eps: f64,

    /// Fit the per-state regressions of one iteration in parallel.
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    #[serde(default)]
    pub solver: SolverConfig,
}

impl EstimatorConfig {
    /// Defaults for everything except the number of states.
    pub fn new(num_states: usize) -> Self {
        Self {
            schema_version: default_schema_version(),
            num_states,
            n_iter: default_n_iter(),
            lambda: default_lambda(),
            eps: default_eps(),
            parallel: default_parallel(),
            solver: SolverConfig::default(),
        }
    }

    pub fn with_n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter;
        self
    }

    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Load a configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::from_str(&content)
    }

    /// Parse a configuration from a JSON string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json)
            .map_err(|e| ValidationError::ParseError(format!("Invalid JSON: {}", e)))
    }

    /// Semantic validation; see [`crate::validate::validate_estimator`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        crate::validate::validate_estimator(self)
    }
}
