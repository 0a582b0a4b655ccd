//! Error types for store operations.

use crate::merge::MergeReport;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during staging, capture, or merge.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Secret value was empty.
    #[error("empty value")]
    EmptyValue,

    /// Secret value contains a line break and cannot be stored as one record.
    #[error("value contains a line break")]
    LineBreakInValue,

    /// A filesystem operation failed.
    #[error("cannot {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Session method called in the wrong state.
    #[error("capture session is {state}, expected {expected}")]
    SessionState {
        state: &'static str,
        expected: &'static str,
    },

    /// A staging line had no tab separator and the merge policy is strict.
    #[error("malformed record at {path}:{line}")]
    MalformedRecord { path: PathBuf, line: usize },

    /// The store was written but removing the staging area failed.
    #[error("store written ({} entries) but staging cleanup failed for {path}: {source}", .report.entries_written)]
    CleanupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
        report: MergeReport,
    },
}

/// Coarse classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; never aborts a run.
    Validation,
    /// A filesystem or lifecycle failure.
    Storage,
    /// Data was committed, only cleanup failed.
    Cleanup,
}

impl StoreError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::EmptyValue | StoreError::LineBreakInValue => ErrorKind::Validation,
            StoreError::CleanupFailed { .. } => ErrorKind::Cleanup,
            StoreError::Io { .. }
            | StoreError::SessionState { .. }
            | StoreError::MalformedRecord { .. } => ErrorKind::Storage,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
