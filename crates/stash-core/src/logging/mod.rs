//! Structured logging for the `stash` binary.
//!
//! - stdout is reserved for command payloads (identifiers, summaries)
//! - stderr receives all log output, human-readable or JSONL
//! - secret values are never logged; identifiers appear truncated

pub mod config;

pub use config::{default_directive, LogConfig, LogFormat, LogLevel};

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. Call once, before anything logs.
///
/// An invalid `RUST_LOG` directive falls back to `info` for our crates.
pub fn init_logging(config: &LogConfig) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = EnvFilter::try_new(config.filter_directive(rust_log.as_deref()))
        .unwrap_or_else(|_| EnvFilter::new(default_directive(LogLevel::Info)));

    match config.format {
        LogFormat::Human => {
            let layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(std::io::stderr().is_terminal());
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
        LogFormat::Jsonl => {
            let layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
    }
}
