//! Exit codes for the `stash` CLI.
//!
//! Exit codes communicate the outcome to the orchestrating script without
//! requiring output parsing.
//!
//! Exit code ranges:
//! - 0-9: Operational outcomes
//! - 10-19: Failures, graded by how much of the run they take down
//! - 20-29: I/O outside the capture lifecycle

use crate::error::{Hook, Severity, StashError};

/// Exit codes for `stash` operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Clean = 0,

    /// Session completed but one or more values were rejected
    Rejected = 3,

    /// Invalid arguments or configuration
    ArgsError = 10,

    /// The current device pass must be abandoned
    SessionError = 15,

    /// The whole run must abort
    RunError = 16,

    /// Store committed, staging cleanup failed
    CleanupError = 17,

    /// I/O error
    IoError = 21,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Exit code for an error raised from a lifecycle hook.
    ///
    /// A rejected value never aborts anything, so it maps to `Rejected`.
    pub fn for_hook_error(err: &StashError, hook: Hook) -> Self {
        match err {
            StashError::Config(_)
            | StashError::ConfigIo { .. }
            | StashError::ConfigParse { .. }
            | StashError::Key { .. } => return ExitCode::ArgsError,
            _ => {}
        }
        match err.severity(hook) {
            Severity::Local => ExitCode::Rejected,
            Severity::Session => ExitCode::SessionError,
            Severity::Run => ExitCode::RunError,
            Severity::Cleanup => ExitCode::CleanupError,
        }
    }

    /// Exit code for an error outside the capture lifecycle.
    pub fn for_error(err: &StashError) -> Self {
        match err {
            StashError::Store(_) => ExitCode::IoError,
            _ => ExitCode::for_hook_error(err, Hook::RunStart),
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.as_i32() as u8)
    }
}
