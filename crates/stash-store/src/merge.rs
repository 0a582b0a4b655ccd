//! End-of-run merge of staged captures into the durable store.
//!
//! The merged mapping starts from the committed store, then every staging
//! file is replayed in enumeration order with later records winning. The
//! result replaces the store atomically and only then is the staging area
//! removed. If writing the store fails the staging area is left untouched.
//!
//! Unsorted output keeps first-seen order: committed entries first, then new
//! identifiers in the order the staging files introduced them.

use crate::record::{read_records, RecordSet};
use crate::staging::StagingArea;
use crate::store::DurableStore;
use crate::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// What to do with a staging line that has no tab separator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedLinePolicy {
    /// Drop the line and keep going.
    #[default]
    Skip,
    /// Abort the merge.
    Fail,
}

impl std::str::FromStr for MalformedLinePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "skip" | "ignore" => Ok(MalformedLinePolicy::Skip),
            "fail" | "error" | "strict" => Ok(MalformedLinePolicy::Fail),
            _ => Err(format!("unknown malformed-line policy: {}", s)),
        }
    }
}

impl std::fmt::Display for MalformedLinePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedLinePolicy::Skip => write!(f, "skip"),
            MalformedLinePolicy::Fail => write!(f, "fail"),
        }
    }
}

/// Merge behaviour knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    pub malformed_lines: MalformedLinePolicy,
    /// Write entries sorted by identifier so the store diffs cleanly.
    pub sort_output: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        MergeOptions {
            malformed_lines: MalformedLinePolicy::Skip,
            sort_output: true,
        }
    }
}

/// Outcome of a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub store_path: PathBuf,
    /// Entries already committed before this merge.
    pub previous_entries: usize,
    pub files_scanned: usize,
    pub records_read: usize,
    pub malformed_skipped: usize,
    pub entries_written: usize,
}

/// Collapses a staging area into a durable store.
pub struct StoreMerger<'a> {
    area: &'a StagingArea,
    store: &'a DurableStore,
    options: MergeOptions,
}

impl<'a> StoreMerger<'a> {
    pub fn new(area: &'a StagingArea, store: &'a DurableStore) -> Self {
        Self {
            area,
            store,
            options: MergeOptions::default(),
        }
    }

    pub fn with_options(mut self, options: MergeOptions) -> Self {
        self.options = options;
        self
    }

    /// Merge every staging file into the store, then tear down the area.
    ///
    /// Returns [`StoreError::CleanupFailed`] when the store was written but
    /// the staging area could not be removed.
    pub fn merge(&self) -> Result<MergeReport> {
        let policy = self.options.malformed_lines;
        let (mut mapping, store_stats) = self.store.load(policy)?;

        let mut report = MergeReport {
            store_path: self.store.path().to_path_buf(),
            previous_entries: mapping.len(),
            malformed_skipped: store_stats.malformed,
            ..MergeReport::default()
        };

        for path in self.area.staging_files()? {
            let stats = read_records(&path, policy, false, &mut mapping)?;
            report.files_scanned += 1;
            report.records_read += stats.records;
            report.malformed_skipped += stats.malformed;
        }

        report.entries_written = self.write(&mapping)?;

        info!(
            store = %report.store_path.display(),
            files = report.files_scanned,
            records = report.records_read,
            previous = report.previous_entries,
            entries = report.entries_written,
            skipped = report.malformed_skipped,
            "Secret store merged"
        );

        if let Err(source) = self.area.remove_all() {
            let path = self.area.path().to_path_buf();
            warn!(path = %path.display(), error = %source, "Staging cleanup failed");
            return Err(StoreError::CleanupFailed {
                path,
                source,
                report,
            });
        }
        Ok(report)
    }

    fn write(&self, mapping: &RecordSet) -> Result<usize> {
        let mut entries: Vec<(&str, &[u8])> = mapping.iter().collect();
        if self.options.sort_output {
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        }
        self.store.replace(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CaptureSession;
    use stash_redact::IdentifierScheme;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        area: StagingArea,
        store: DurableStore,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let area = StagingArea::attach(tmp.path().join("staging"));
        let store = DurableStore::new(tmp.path().join("store.tsv"));
        area.initialize().unwrap();
        Fixture {
            _tmp: tmp,
            area,
            store,
        }
    }

    fn capture(area: &StagingArea, values: &[&str]) {
        let mut session = CaptureSession::new(area.clone(), IdentifierScheme::Sha256);
        session.start().unwrap();
        for v in values {
            session.save(v).unwrap();
        }
        session.end().unwrap();
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("skip".parse::<MalformedLinePolicy>().unwrap(), MalformedLinePolicy::Skip);
        assert_eq!("STRICT".parse::<MalformedLinePolicy>().unwrap(), MalformedLinePolicy::Fail);
        assert!("maybe".parse::<MalformedLinePolicy>().is_err());
        assert_eq!(MalformedLinePolicy::Fail.to_string(), "fail");
    }

    #[test]
    fn test_merge_dedups_across_sessions() {
        let fx = fixture();
        capture(&fx.area, &["secretA", "other"]);
        capture(&fx.area, &["secretA"]);

        let report = StoreMerger::new(&fx.area, &fx.store).merge().unwrap();

        assert_eq!(report.files_scanned, 2);
        assert_eq!(report.records_read, 3);
        assert_eq!(report.entries_written, 2);
        let content = fs::read_to_string(fx.store.path()).unwrap();
        assert_eq!(content.lines().filter(|l| l.ends_with("\tsecretA")).count(), 1);
        assert!(!fx.area.exists());
    }

    #[test]
    fn test_merge_output_sorted() {
        let fx = fixture();
        capture(&fx.area, &["one", "two", "three", "four"]);

        StoreMerger::new(&fx.area, &fx.store).merge().unwrap();

        let content = fs::read_to_string(fx.store.path()).unwrap();
        let ids: Vec<&str> = content.lines().map(|l| l.split('\t').next().unwrap()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_merge_keeps_previous_entries() {
        let fx = fixture();
        capture(&fx.area, &["first-run"]);
        StoreMerger::new(&fx.area, &fx.store).merge().unwrap();

        fx.area.initialize().unwrap();
        capture(&fx.area, &["second-run"]);
        let report = StoreMerger::new(&fx.area, &fx.store).merge().unwrap();

        assert_eq!(report.previous_entries, 1);
        assert_eq!(report.entries_written, 2);
    }

    #[test]
    fn test_merge_skips_malformed_lines() {
        let fx = fixture();
        fs::write(fx.area.path().join("x.stage"), "no-tab-here\nabc\tvalue\n").unwrap();

        let report = StoreMerger::new(&fx.area, &fx.store).merge().unwrap();

        assert_eq!(report.malformed_skipped, 1);
        assert_eq!(fs::read_to_string(fx.store.path()).unwrap(), "abc\tvalue\n");
    }

    #[test]
    fn test_merge_strict_policy_keeps_staging() {
        let fx = fixture();
        fs::write(fx.area.path().join("x.stage"), "abc\tvalue\nno-tab-here\n").unwrap();

        let err = StoreMerger::new(&fx.area, &fx.store)
            .with_options(MergeOptions {
                malformed_lines: MalformedLinePolicy::Fail,
                sort_output: true,
            })
            .merge()
            .unwrap_err();

        assert!(matches!(err, StoreError::MalformedRecord { line: 2, .. }));
        assert!(fx.area.path().join("x.stage").exists());
        assert!(!fx.store.exists());
    }

    #[test]
    fn test_merge_failure_leaves_staging_intact() {
        let tmp = TempDir::new().unwrap();
        let area = StagingArea::attach(tmp.path().join("staging"));
        let store = DurableStore::new(tmp.path().join("no-such-dir/store.tsv"));
        area.initialize().unwrap();
        capture(&area, &["hunter2"]);

        let err = StoreMerger::new(&area, &store).merge().unwrap_err();

        assert!(matches!(err, StoreError::Io { .. }));
        assert_eq!(area.staging_files().unwrap().len(), 1);
    }

    #[test]
    fn test_unsorted_output_keeps_first_seen_order() {
        let fx = fixture();
        fs::write(fx.store.path(), "zz\tcommitted\n").unwrap();
        fs::write(fx.area.path().join("a.stage"), "mm\tone\naa\ttwo\nzz\tnewer\n").unwrap();

        StoreMerger::new(&fx.area, &fx.store)
            .with_options(MergeOptions {
                malformed_lines: MalformedLinePolicy::Skip,
                sort_output: false,
            })
            .merge()
            .unwrap();

        assert_eq!(
            fs::read_to_string(fx.store.path()).unwrap(),
            "zz\tnewer\nmm\tone\naa\ttwo\n"
        );
    }

    #[test]
    fn test_merge_round_trips_non_utf8_values() {
        let fx = fixture();
        let mut session = CaptureSession::new(fx.area.clone(), IdentifierScheme::Sha256);
        session.start().unwrap();
        let id = session.save(b"caf\xe9-pass").unwrap();
        session.end().unwrap();

        StoreMerger::new(&fx.area, &fx.store).merge().unwrap();

        assert_eq!(
            fx.store.lookup(id.as_str()).unwrap(),
            Some(b"caf\xe9-pass".to_vec())
        );
    }

    /// Make the staging area impossible to remove: a read-only subdirectory
    /// holding a file. Returns `None` when the process can write there anyway
    /// (running as root), since the failure cannot be provoked.
    #[cfg(unix)]
    fn lock_staging(area: &StagingArea) -> Option<std::path::PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        let locked = area.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("pinned"), "").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o500)).unwrap();

        if fs::write(locked.join("write-check"), "").is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o700)).unwrap();
            return None;
        }
        Some(locked)
    }

    #[cfg(unix)]
    #[test]
    fn test_cleanup_failure_after_commit() {
        use std::os::unix::fs::PermissionsExt;

        let fx = fixture();
        capture(&fx.area, &["hunter2"]);
        let Some(locked) = lock_staging(&fx.area) else {
            return;
        };

        let err = StoreMerger::new(&fx.area, &fx.store).merge().unwrap_err();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o700)).unwrap();

        assert_eq!(err.kind(), crate::ErrorKind::Cleanup);
        match err {
            StoreError::CleanupFailed { path, report, .. } => {
                assert_eq!(path, fx.area.path());
                assert_eq!(report.entries_written, 1);
            }
            other => panic!("expected CleanupFailed, got {other:?}"),
        }
        let id = stash_redact::identify(b"hunter2");
        assert_eq!(
            fx.store.lookup(id.as_str()).unwrap(),
            Some(b"hunter2".to_vec())
        );
    }

    #[test]
    fn test_merge_with_missing_area_rewrites_store() {
        let fx = fixture();
        capture(&fx.area, &["a", "b"]);
        StoreMerger::new(&fx.area, &fx.store).merge().unwrap();
        let before = fs::read(fx.store.path()).unwrap();

        let report = StoreMerger::new(&fx.area, &fx.store).merge().unwrap();

        assert_eq!(report.files_scanned, 0);
        assert_eq!(fs::read(fx.store.path()).unwrap(), before);
    }
}
