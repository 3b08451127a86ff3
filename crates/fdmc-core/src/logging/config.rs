//! Where the `fdmc` log level and format come from.
//!
//! Precedence: `--log-level`/`--log-format`, then `FDMC_LOG`/`FDMC_LOG_FORMAT`,
//! then info-level human output. `RUST_LOG` bypasses all of this and is
//! handed straight to the filter (see [`super::init_logging`]).

use clap::ValueEnum;

/// Environment variable holding the log level.
pub const ENV_LOG_LEVEL: &str = "FDMC_LOG";
/// Environment variable holding the log format.
pub const ENV_LOG_FORMAT: &str = "FDMC_LOG_FORMAT";

/// Shape of the records written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Human,
    /// One JSON object per line.
    #[value(alias = "json")]
    Jsonl,
}

/// Minimum level for fdmc's own records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogLevel {
    /// Adds one record per state fit.
    Trace,
    /// Adds per-iteration progress.
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    /// The directive understood by `EnvFilter`.
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

/// Resolved logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Environment values that did not parse, as `(variable, value)`.
    /// Reported once logging is up.
    pub rejected_env: Vec<(&'static str, String)>,
}

impl LogConfig {
    /// Resolve from the process environment and CLI flags.
    pub fn from_env(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        Self::from_sources(|name| std::env::var(name).ok(), cli_level, cli_format)
    }

    /// Resolve with `lookup` standing in for the environment.
    pub fn from_sources(
        lookup: impl Fn(&str) -> Option<String>,
        cli_level: Option<LogLevel>,
        cli_format: Option<LogFormat>,
    ) -> Self {
        let mut config = LogConfig::default();

        let env_level = env_value::<LogLevel>(&lookup, ENV_LOG_LEVEL, &mut config.rejected_env);
        let env_format = env_value::<LogFormat>(&lookup, ENV_LOG_FORMAT, &mut config.rejected_env);

        config.level = cli_level.or(env_level).unwrap_or_default();
        config.format = cli_format.or(env_format).unwrap_or_default();
        config
    }
}

fn env_value<T: ValueEnum>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    rejected: &mut Vec<(&'static str, String)>,
) -> Option<T> {
    let raw = lookup(name)?;
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    match T::from_str(value, true) {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            rejected.push((name, raw));
            None
        }
    }
}
