//! Configuration validation errors and semantic validation.

use thiserror::Error;

use crate::estimator::{EstimatorConfig, SolverConfig};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }
}

fn invalid(field: &str, message: String) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        message,
    }
}

/// Validate an estimator configuration semantically.
pub fn validate_estimator(config: &EstimatorConfig) -> ValidationResult<()> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    if config.num_states == 0 {
        return Err(invalid("num_states", "Must be positive, got 0".to_string()));
    }

    if config.n_iter == 0 {
        return Err(invalid("n_iter", "Must be positive, got 0".to_string()));
    }

    if !config.lambda.is_finite() || config.lambda < 0.0 {
        return Err(invalid(
            "lambda",
            format!("Must be finite and >= 0, got {}", config.lambda),
        ));
    }

    if !config.eps.is_finite() || config.eps <= 0.0 {
        return Err(invalid(
            "eps",
            format!("Must be finite and > 0, got {}", config.eps),
        ));
    }

    validate_solver(&config.solver)
}

/// Validate the inner solver settings.
fn validate_solver(solver: &SolverConfig) -> ValidationResult<()> {
    if solver.max_iters == 0 {
        return Err(invalid("solver.max_iters", "Must be positive, got 0".to_string()));
    }

    if solver.history == 0 {
        return Err(invalid("solver.history", "Must be positive, got 0".to_string()));
    }

    for (field, value) in [
        ("solver.tol_grad", solver.tol_grad),
        ("solver.tol_cost", solver.tol_cost),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(invalid(field, format!("Must be finite and >= 0, got {}", value)));
        }
    }

    Ok(())
}
