//! Log settings for the `stash` binary.
//!
//! The filter comes from the first source that names one:
//! 1. `-q` / `-v` / `-vv`
//! 2. `STASH_LOG` (a bare level)
//! 3. `RUST_LOG` (a full `EnvFilter` directive)
//! 4. `info` for our crates
//!
//! The format comes from `--log-format`, then `STASH_LOG_FORMAT`.

use std::fmt;
use std::str::FromStr;

const CRATE_TARGETS: [&str; 3] = ["stash_core", "stash_store", "stash_redact"];

/// Log output format on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    /// One JSON object per line.
    Jsonl,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "human" => Ok(LogFormat::Human),
            "jsonl" | "json" => Ok(LogFormat::Jsonl),
            _ => Err(format!("unknown log format '{}' (expected human or jsonl)", s)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Human => "human",
            LogFormat::Jsonl => "jsonl",
        })
    }
}

/// Verbosity applied to all of our crates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "off" => Ok(LogLevel::Off),
            _ => Err(format!("unknown log level '{}'", s)),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        })
    }
}

/// Filter directive setting every one of our crates to `level`.
pub fn default_directive(level: LogLevel) -> String {
    CRATE_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Resolved logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Explicit level from the CLI or `STASH_LOG`; `None` defers to `RUST_LOG`.
    pub level: Option<LogLevel>,
}

impl LogConfig {
    /// Combine CLI flags with `STASH_LOG` and `STASH_LOG_FORMAT`.
    pub fn from_env(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        Self::resolve(
            cli_level,
            cli_format,
            std::env::var("STASH_LOG").ok().as_deref(),
            std::env::var("STASH_LOG_FORMAT").ok().as_deref(),
        )
    }

    /// Unparseable environment values are ignored.
    pub fn resolve(
        cli_level: Option<LogLevel>,
        cli_format: Option<LogFormat>,
        stash_log: Option<&str>,
        stash_log_format: Option<&str>,
    ) -> Self {
        let level = cli_level.or_else(|| stash_log.and_then(|v| v.parse().ok()));
        let format = cli_format
            .or_else(|| stash_log_format.and_then(|v| v.parse().ok()))
            .unwrap_or_default();
        LogConfig { format, level }
    }

    /// The `EnvFilter` directive to install, given the value of `RUST_LOG`.
    pub fn filter_directive(&self, rust_log: Option<&str>) -> String {
        match (self.level, rust_log) {
            (Some(level), _) => default_directive(level),
            (None, Some(directive)) if !directive.trim().is_empty() => directive.to_string(),
            (None, _) => default_directive(LogLevel::Info),
        }
    }
}
