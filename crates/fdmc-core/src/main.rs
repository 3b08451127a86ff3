//! fdmc - feature-dependent Markov chain estimation
//!
//! Command-line entry point. Currently exposes a `demo` command that
//! simulates partially observed trajectories from a random ground-truth
//! model, fits the chain and prints a JSON summary on stdout.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use fdmc_config::{resolve_config, EstimatorConfig};
use fdmc_core::chain::{ChainModel, ChainTrainer, TrainerPhase, Trajectory};
use fdmc_core::logging::{event_names, init_logging, LogConfig, LogFormat, LogLevel};
use fdmc_core::synthetic::{generate, SyntheticSpec};
use fdmc_core::ChainError;
use fdmc_math::kl_divergence;
use serde::Serialize;

/// Feature-dependent Markov chain estimation with missing states
#[derive(Parser)]
#[command(name = "fdmc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to an estimator config (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Report per-iteration progress
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate trajectories with hidden states and fit them
    Demo(DemoArgs),
}

#[derive(Args, Debug)]
struct DemoArgs {
    /// Number of states
    #[arg(long, default_value_t = 2)]
    states: usize,

    /// Length of each trajectory
    #[arg(long, default_value_t = 40)]
    steps: usize,

    /// Feature dimension
    #[arg(long, default_value_t = 3)]
    features: usize,

    /// Number of trajectories
    #[arg(long, default_value_t = 100)]
    sequences: usize,

    /// Probability that a state is hidden
    #[arg(long, default_value_t = 0.2)]
    missing: f64,

    /// Random seed
    #[arg(long, default_value_t = 2)]
    seed: u64,

    /// Override the outer iteration budget
    #[arg(long)]
    n_iter: Option<usize>,

    /// Override the regularization strength
    #[arg(long)]
    lambda: Option<f64>,
}

#[derive(Serialize)]
struct DemoSummary {
    num_states: usize,
    sequences: usize,
    hidden_states: usize,
    iterations: usize,
    phase: TrainerPhase,
    final_loss: Option<f64>,
    loss_history: Vec<f64>,
    /// Mean |P_fitted − P_true| over all consumed feature rows.
    mean_abs_transition_error: f64,
    /// Mean KL(P_true row ‖ P_fitted row) over the same rows.
    mean_transition_kl: f64,
}

/// How far the fitted transition matrices are from the generating ones.
struct TransitionErrors {
    mean_abs: f64,
    mean_kl: f64,
}

/// Load the estimator config; the state count always comes from the command line.
fn load_estimator_config(
    cli_path: Option<&Path>,
    num_states: usize,
) -> Result<EstimatorConfig, ChainError> {
    let resolved = resolve_config(cli_path);
    match resolved.path {
        Some(path) => {
            let mut config = EstimatorConfig::from_file(&path)?;
            tracing::info!(
                event = event_names::CONFIG_LOADED,
                path = %path.display(),
                source = %resolved.source,
                "estimator config loaded"
            );
            config.num_states = num_states;
            Ok(config)
        }
        None => {
            tracing::debug!(event = event_names::CONFIG_DEFAULT_USED, "using builtin estimator config");
            Ok(EstimatorConfig::new(num_states))
        }
    }
}

fn transition_errors(fitted: &ChainModel, truth: &ChainModel, data: &[Trajectory]) -> TransitionErrors {
    let mut abs_total = 0.0;
    let mut entries = 0usize;
    let mut kl_total = 0.0;
    let mut rows = 0usize;
    for trajectory in data {
        let fitted_ps = fitted.transition_matrices(trajectory.features());
        let true_ps = truth.transition_matrices(trajectory.features());
        for (f, t) in fitted_ps.iter().zip(&true_ps) {
            abs_total += (f - t).mapv(f64::abs).sum();
            entries += f.len();
            for (f_row, t_row) in f.outer_iter().zip(t.outer_iter()) {
                kl_total += kl_divergence(&t_row.to_vec(), &f_row.to_vec());
                rows += 1;
            }
        }
    }
    TransitionErrors {
        mean_abs: if entries == 0 { 0.0 } else { abs_total / entries as f64 },
        mean_kl: if rows == 0 { 0.0 } else { kl_total / rows as f64 },
    }
}

fn run_demo(global: &GlobalOpts, args: &DemoArgs) -> Result<DemoSummary, ChainError> {
    let mut config = load_estimator_config(global.config.as_deref(), args.states)?;
    if let Some(n_iter) = args.n_iter {
        config.n_iter = n_iter;
    }
    if let Some(lambda) = args.lambda {
        config.lambda = lambda;
    }

    let spec = SyntheticSpec {
        num_states: args.states,
        steps: args.steps,
        feature_dim: args.features,
        sequences: args.sequences,
        missing_fraction: args.missing,
        seed: args.seed,
        ..SyntheticSpec::default()
    };
    let data = generate(&spec)?;
    let hidden_states = data.trajectories.iter().map(Trajectory::missing_count).sum();

    let trainer = ChainTrainer::new(config)?;
    let report = trainer.fit(&data.trajectories, global.verbose)?;
    let errors = transition_errors(&report.model, &data.truth, &data.trajectories);

    Ok(DemoSummary {
        num_states: args.states,
        sequences: args.sequences,
        hidden_states,
        iterations: report.iterations,
        phase: report.phase,
        final_loss: report.final_loss(),
        mean_abs_transition_error: errors.mean_abs,
        mean_transition_kl: errors.mean_kl,
        loss_history: report.loss_history,
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let log_config = LogConfig::from_env(cli.global.log_level, cli.global.log_format);
    init_logging(&log_config);

    let result = match &cli.command {
        Commands::Demo(args) => run_demo(&cli.global, args),
    };

    match result {
        Ok(summary) => match serde_json::to_string_pretty(&summary) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize summary");
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            tracing::error!(code = err.code(), error = %err, "demo failed");
            ExitCode::from(2)
        }
    }
}
