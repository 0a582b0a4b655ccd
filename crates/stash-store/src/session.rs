//! Capture sessions.
//!
//! A session wraps one staging file for one device pass:
//! `Idle -> Open -> Closed`. Every accepted value becomes one
//! `identifier<TAB>value` record, appended and flushed immediately so a crash
//! loses at most the record being written.

use crate::record::{format_record, validate_value};
use crate::staging::StagingArea;
use crate::{Result, StoreError};
use stash_redact::{Identifier, IdentifierScheme};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Lifecycle state of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Open,
    Closed,
}

impl SessionState {
    fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Open => "open",
            SessionState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One device pass writing to its own staging file.
pub struct CaptureSession {
    area: StagingArea,
    scheme: IdentifierScheme,
    state: SessionState,
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    records_written: u64,
}

impl CaptureSession {
    /// Create an idle session bound to a staging area.
    pub fn new(area: StagingArea, scheme: IdentifierScheme) -> Self {
        Self {
            area,
            scheme,
            state: SessionState::Idle,
            path: None,
            writer: None,
            records_written: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Staging file of this session, once started.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Allocate the staging file and open the session.
    ///
    /// On failure the session stays idle.
    pub fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(wrong_state(self.state, "idle"));
        }

        let (path, file) = self.area.new_staging_file()?;
        info!(path = %path.display(), "Capture session opened");

        self.path = Some(path);
        self.writer = Some(BufWriter::new(file));
        self.state = SessionState::Open;
        Ok(())
    }

    /// Record a secret and return its identifier.
    ///
    /// Values are raw bytes; text and non-UTF-8 secrets are stored as given.
    /// Invalid values are rejected without touching the staging file or the
    /// session state. A failed write leaves the session open.
    pub fn save(&mut self, value: impl AsRef<[u8]>) -> Result<Identifier> {
        let value = value.as_ref();
        validate_value(value)?;

        let (Some(writer), Some(path)) = (self.writer.as_mut(), self.path.as_ref()) else {
            return Err(wrong_state(self.state, "open"));
        };

        let id = self.scheme.identify(value);
        writer
            .write_all(&format_record(id.as_str(), value))
            .and_then(|()| writer.flush())
            .map_err(|e| StoreError::io("write staging file", path, e))?;

        self.records_written += 1;
        debug!(id = %id.short(), records = self.records_written, "Captured secret");
        Ok(id)
    }

    /// Close the staging file and finish the session.
    ///
    /// Returns the path of the finished staging file.
    pub fn end(&mut self) -> Result<PathBuf> {
        let Some(writer) = self.writer.take() else {
            return Err(wrong_state(self.state, "open"));
        };
        self.state = SessionState::Closed;

        let path = self.path.clone().unwrap_or_default();
        let file = writer
            .into_inner()
            .map_err(|e| StoreError::io("flush staging file", &path, e.into_error()))?;
        file.sync_all()
            .map_err(|e| StoreError::io("sync staging file", &path, e))?;

        info!(
            path = %path.display(),
            records = self.records_written,
            "Capture session closed"
        );
        Ok(path)
    }
}

fn wrong_state(state: SessionState, expected: &'static str) -> StoreError {
    StoreError::SessionState {
        state: state.as_str(),
        expected,
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        // Best-effort flush; the file stays for the merger or the next wipe.
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}
