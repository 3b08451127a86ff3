//! fdmc configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for the estimator and its inner solver
//! - Config resolution (CLI → env → XDG → defaults)
//! - Semantic validation

pub mod estimator;
pub mod resolve;
pub mod validate;

pub use estimator::{EstimatorConfig, SolverConfig};
pub use resolve::{resolve_config, ConfigPath, ConfigSource};
pub use validate::{ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
