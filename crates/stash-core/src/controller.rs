//! Run controller: the lifecycle surface the archiver calls into.
//!
//! The orchestrator drives five hooks in order:
//!
//! ```text
//! on_run_start ─┬─> on_session_start ─> on_save* ─> on_session_end ─┐
//!               └──────────────────── (per device) <─────────────────┘
//!               ─> on_run_end
//! ```
//!
//! Every hook returns a typed `Result`. The controller also keeps the text of
//! the last failure for callers that poll for it; [`RunController::take_last_error`]
//! hands it out once.

use crate::config::StashConfig;
use crate::error::{Hook, Result, Severity, StashError};
use stash_redact::{Identifier, IdentifierScheme, KeyFile};
use stash_store::{
    CaptureSession, DurableStore, MergeOptions, MergeReport, StagingArea, StoreMerger,
};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Drives one archiving run's capture lifecycle.
pub struct RunController {
    area: StagingArea,
    store: DurableStore,
    scheme: IdentifierScheme,
    merge_options: MergeOptions,
    current: Option<CaptureSession>,
    last_error: Option<String>,
}

impl RunController {
    /// Build a controller from configuration, loading the identifier key if
    /// one is configured.
    pub fn new(config: &StashConfig) -> Result<Self> {
        let scheme = match config.identifier_key_file {
            Some(ref path) => load_keyed_scheme(path)?,
            None => IdentifierScheme::Sha256,
        };
        Ok(Self::from_parts(
            StagingArea::attach(&config.staging_dir),
            DurableStore::new(&config.store_path),
            scheme,
            config.merge_options(),
        ))
    }

    pub fn from_parts(
        area: StagingArea,
        store: DurableStore,
        scheme: IdentifierScheme,
        merge_options: MergeOptions,
    ) -> Self {
        Self {
            area,
            store,
            scheme,
            merge_options,
            current: None,
            last_error: None,
        }
    }

    pub fn staging_area(&self) -> &StagingArea {
        &self.area
    }

    pub fn store(&self) -> &DurableStore {
        &self.store
    }

    pub fn scheme(&self) -> &IdentifierScheme {
        &self.scheme
    }

    pub fn has_open_session(&self) -> bool {
        self.current.is_some()
    }

    /// Wipe leftovers from an unfinished run and create the staging area.
    pub fn on_run_start(&mut self) -> Result<()> {
        let result = self.area.initialize().map_err(StashError::from);
        self.record(Hook::RunStart, result)
    }

    /// Open a capture session and make it current.
    pub fn on_session_start(&mut self) -> Result<()> {
        let result = self.start_session();
        self.record(Hook::SessionStart, result)
    }

    /// Capture a secret in the current session and return its identifier.
    pub fn on_save(&mut self, value: impl AsRef<[u8]>) -> Result<Identifier> {
        let result = match self.current.as_mut() {
            Some(session) => session.save(value).map_err(StashError::from),
            None => Err(StashError::NoSession),
        };
        self.record(Hook::Save, result)
    }

    /// Finish the current session. The session is released even if closing
    /// its file fails.
    pub fn on_session_end(&mut self) -> Result<PathBuf> {
        let result = match self.current.take() {
            Some(mut session) => session.end().map_err(StashError::from),
            None => Err(StashError::NoSession),
        };
        self.record(Hook::SessionEnd, result)
    }

    /// Merge every staged capture into the durable store.
    pub fn on_run_end(&mut self) -> Result<MergeReport> {
        if let Some(mut session) = self.current.take() {
            warn!("Closing capture session left open at run end");
            if let Err(err) = session.end() {
                let result = Err(StashError::from(err));
                return self.record(Hook::RunEnd, result);
            }
        }

        let result = StoreMerger::new(&self.area, &self.store)
            .with_options(self.merge_options)
            .merge()
            .map_err(StashError::from);
        self.record(Hook::RunEnd, result)
    }

    /// Text of the most recent failure, cleared on read.
    pub fn take_last_error(&mut self) -> Option<String> {
        self.last_error.take()
    }

    fn start_session(&mut self) -> Result<()> {
        if self.current.is_some() {
            return Err(StashError::SessionAlreadyOpen);
        }
        let mut session = CaptureSession::new(self.area.clone(), self.scheme.clone());
        session.start()?;
        self.current = Some(session);
        Ok(())
    }

    fn record<T>(&mut self, hook: Hook, result: Result<T>) -> Result<T> {
        if let Err(ref err) = result {
            match err.severity(hook) {
                Severity::Local => debug!(%hook, error = %err, "Value rejected"),
                Severity::Session => error!(%hook, error = %err, "Capture session failed"),
                Severity::Run => error!(%hook, error = %err, "Run failed"),
                Severity::Cleanup => warn!(%hook, error = %err, "Run cleanup failed"),
            }
            self.last_error = Some(err.to_string());
        }
        result
    }
}

fn load_keyed_scheme(path: &Path) -> Result<IdentifierScheme> {
    let key = KeyFile::load(path)
        .and_then(|file| file.material())
        .map_err(|source| StashError::Key {
            path: path.to_path_buf(),
            source,
        })?;
    info!(path = %path.display(), "Using keyed identifiers");
    Ok(IdentifierScheme::Keyed(key))
}
