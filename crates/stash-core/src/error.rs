//! Error types for the run controller and CLI.

use stash_redact::IdentError;
use stash_store::{ErrorKind, StoreError};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, StashError>;

/// Unified error type for secret-stash.
#[derive(Error, Debug)]
pub enum StashError {
    /// Configuration is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// Config file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema.
    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Identifier key could not be loaded.
    #[error("identifier key {path}: {source}")]
    Key {
        path: PathBuf,
        #[source]
        source: IdentError,
    },

    /// Staging, capture, or merge failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// `on_save`/`on_session_end` without a current session.
    #[error("no capture session is open")]
    NoSession,

    /// `on_session_start` while another session is current.
    #[error("a capture session is already open")]
    SessionAlreadyOpen,
}

/// The lifecycle hook an error was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    RunStart,
    SessionStart,
    Save,
    SessionEnd,
    RunEnd,
}

impl std::fmt::Display for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Hook::RunStart => write!(f, "run_start"),
            Hook::SessionStart => write!(f, "session_start"),
            Hook::Save => write!(f, "save"),
            Hook::SessionEnd => write!(f, "session_end"),
            Hook::RunEnd => write!(f, "run_end"),
        }
    }
}

/// How far a failure reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Rejected input; the session carries on.
    Local,
    /// The current device pass must be abandoned.
    Session,
    /// The whole archiving run must abort.
    Run,
    /// Secrets were committed; only staging cleanup failed.
    Cleanup,
}

impl StashError {
    /// Classify this error as raised from `hook`.
    pub fn severity(&self, hook: Hook) -> Severity {
        if let StashError::Store(err) = self {
            match err.kind() {
                ErrorKind::Validation => return Severity::Local,
                ErrorKind::Cleanup => return Severity::Cleanup,
                ErrorKind::Storage => {}
            }
        }
        match hook {
            Hook::RunStart | Hook::RunEnd => Severity::Run,
            Hook::SessionStart | Hook::Save | Hook::SessionEnd => Severity::Session,
        }
    }
}
