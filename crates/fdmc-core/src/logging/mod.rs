//! Structured logging for fdmc.
//!
//! Two output modes on stderr:
//! - Human-readable lines for interactive use
//! - JSON lines for scripted runs
//!
//! stdout is reserved for command payloads.
//!
//! ```ignore
//! use fdmc_core::logging::{init_logging, LogConfig};
//!
//! let config = LogConfig::from_env(None, None);
//! init_logging(&config);
//! ```

pub mod config;
pub mod events;

pub use config::{LogConfig, LogFormat, LogLevel};
pub use events::event_names;

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Targets that emit fdmc records: the `fdmc` binary and the library.
const TARGETS: [&str; 2] = ["fdmc", "fdmc_core"];

/// Filter directives for `level` on every fdmc target.
fn directives(level: LogLevel) -> String {
    TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level.directive()))
        .collect::<Vec<_>>()
        .join(",")
}

/// `RUST_LOG` wins; otherwise the configured level for fdmc's targets.
fn build_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(config.level)))
}

/// Initialize the logging subsystem.
///
/// Must be called once at startup before any logging occurs. Returns false
/// when a global subscriber was already installed.
pub fn init_logging(config: &LogConfig) -> bool {
    let filter = build_filter(config);

    let installed = match config.format {
        LogFormat::Human => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(std::io::stderr().is_terminal());
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
                .is_ok()
        }
        LogFormat::Jsonl => {
            let json_layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false);
            tracing_subscriber::registry()
                .with(filter)
                .with(json_layer)
                .try_init()
                .is_ok()
        }
    };

    for (variable, value) in &config.rejected_env {
        tracing::warn!(variable = *variable, value = %value, "ignoring unrecognized logging setting");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_cover_binary_and_library() {
        assert_eq!(directives(LogLevel::Info), "fdmc=info,fdmc_core=info");
        assert_eq!(directives(LogLevel::Off), "fdmc=off,fdmc_core=off");
    }

    #[test]
    fn test_second_init_is_reported() {
        let config = LogConfig {
            level: LogLevel::Off,
            ..LogConfig::default()
        };
        let _ = init_logging(&config);
        assert!(!init_logging(&config));
    }
}
