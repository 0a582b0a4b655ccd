//! Staged, deduplicating secret store.
//!
//! Secrets captured while archiving device configurations flow through three
//! stages:
//!
//! - [`StagingArea`]: a per-run scratch directory, wiped at run start.
//! - [`CaptureSession`]: one staging file per device pass, one
//!   `identifier<TAB>value` record per captured secret.
//! - [`StoreMerger`]: at run end, folds the committed [`DurableStore`] and
//!   every staging file into one mapping keyed by identifier, replaces the
//!   store atomically, and removes the staging area.
//!
//! Nothing captured is visible in the durable store until the merge commits.
//!
//! # Example
//!
//! ```no_run
//! use stash_redact::IdentifierScheme;
//! use stash_store::{CaptureSession, DurableStore, StagingArea, StoreMerger};
//!
//! let area = StagingArea::attach("/var/lib/stash/staging");
//! let store = DurableStore::new("/var/lib/stash/secrets.tsv");
//! area.initialize().unwrap();
//!
//! let mut session = CaptureSession::new(area.clone(), IdentifierScheme::Sha256);
//! session.start().unwrap();
//! let id = session.save("hunter2").unwrap();
//! session.end().unwrap();
//!
//! StoreMerger::new(&area, &store).merge().unwrap();
//! assert_eq!(store.lookup(id.as_str()).unwrap(), Some(b"hunter2".to_vec()));
//! ```

pub mod error;
pub mod merge;
pub mod record;
pub mod session;
pub mod staging;
pub mod store;

pub use error::{ErrorKind, Result, StoreError};
pub use merge::{MalformedLinePolicy, MergeOptions, MergeReport, StoreMerger};
pub use record::{
    format_record, parse_record, validate_value, ReadStats, RecordSet, FIELD_SEPARATOR,
};
pub use session::{CaptureSession, SessionState};
pub use staging::{StagingArea, STAGING_FILE_EXT};
pub use store::DurableStore;
