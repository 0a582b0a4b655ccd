//! secret-stash core library
//!
//! This library provides the pieces behind the `stash` binary:
//! - The run controller exposing the capture lifecycle hooks
//! - Configuration loading and validation
//! - Structured logging setup
//! - Exit codes for CLI operations
//!
//! The binary entry point is in `main.rs`.

pub mod config;
pub mod controller;
pub mod error;
pub mod exit_codes;
pub mod logging;

pub use config::{load_config, ConfigOverrides, ConfigResolution, LoadedConfig, StashConfig};
pub use controller::RunController;
pub use error::{Hook, Result, Severity, StashError};
pub use exit_codes::ExitCode;
