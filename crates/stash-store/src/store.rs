//! The durable secret store.
//!
//! A single file of `identifier<TAB>value` lines. It is only ever replaced
//! whole: entries are written to a temp file next to the store, synced, and
//! renamed over it, so readers see either the previous or the new contents.

use crate::merge::MalformedLinePolicy;
use crate::record::{format_record, read_records, ReadStats, RecordSet};
use crate::{Result, StoreError};
use std::ffi::{OsStr, OsString};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Handle to the durable store file.
#[derive(Debug, Clone)]
pub struct DurableStore {
    path: PathBuf,
}

impl DurableStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read all committed entries. A missing store reads as empty.
    pub fn load(&self, policy: MalformedLinePolicy) -> Result<(RecordSet, ReadStats)> {
        let mut entries = RecordSet::new();
        let stats = read_records(&self.path, policy, true, &mut entries)?;
        if stats.malformed > 0 {
            warn!(
                path = %self.path.display(),
                malformed = stats.malformed,
                "Durable store contains malformed lines"
            );
        }
        Ok((entries, stats))
    }

    /// Look up the value stored for an identifier.
    pub fn lookup(&self, id: &str) -> Result<Option<Vec<u8>>> {
        let (entries, _) = self.load(MalformedLinePolicy::Skip)?;
        Ok(entries.take(id))
    }

    /// Atomically replace the store with `entries`, written in the given order.
    pub fn replace<'a, I>(&self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let temp_path = self.temp_path();

        let written = match write_entries(&temp_path, entries) {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::io("replace store", &self.path, e));
        }

        debug!(path = %self.path.display(), entries = written, "Durable store replaced");
        Ok(written)
    }

    /// Temp file in the store's directory, so the final rename stays on one
    /// filesystem.
    fn temp_path(&self) -> PathBuf {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut name = OsString::from(".");
        name.push(self.path.file_name().unwrap_or_else(|| OsStr::new("store")));
        name.push(format!(".tmp-{}", std::process::id()));
        dir.join(name)
    }
}

fn write_entries<'a, I>(path: &Path, entries: I) -> Result<usize>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let file = create_private_file(path).map_err(|e| StoreError::io("create", path, e))?;
    let mut writer = BufWriter::new(file);

    let mut written = 0;
    for (id, value) in entries {
        writer
            .write_all(&format_record(id, value))
            .map_err(|e| StoreError::io("write", path, e))?;
        written += 1;
    }

    let file = writer
        .into_inner()
        .map_err(|e| StoreError::io("flush", path, e.into_error()))?;
    file.sync_all().map_err(|e| StoreError::io("sync", path, e))?;
    Ok(written)
}

#[cfg(unix)]
fn create_private_file(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_private_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_store_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let store = DurableStore::new(tmp.path().join("store.tsv"));

        let (entries, stats) = store.load(MalformedLinePolicy::Skip).unwrap();
        assert!(entries.is_empty());
        assert_eq!(stats.records, 0);
        assert!(!store.exists());
    }

    #[test]
    fn test_replace_and_lookup() {
        let tmp = TempDir::new().unwrap();
        let store = DurableStore::new(tmp.path().join("store.tsv"));

        let n = store.replace([("aa", &b"one"[..]), ("bb", &b"two"[..])]).unwrap();
        assert_eq!(n, 2);
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "aa\tone\nbb\ttwo\n"
        );
        assert_eq!(store.lookup("bb").unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.lookup("cc").unwrap(), None);
    }

    #[test]
    fn test_replace_overwrites_previous_contents() {
        let tmp = TempDir::new().unwrap();
        let store = DurableStore::new(tmp.path().join("store.tsv"));
        store.replace([("aa", &b"one"[..]), ("bb", &b"two"[..])]).unwrap();

        store.replace([("cc", &b"three"[..])]).unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "cc\tthree\n");
    }

    #[test]
    fn test_replace_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let store = DurableStore::new(tmp.path().join("store.tsv"));
        store.replace([("aa", &b"one"[..])]).unwrap();

        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![OsString::from("store.tsv")]);
    }

    #[test]
    fn test_replace_into_missing_dir_fails_and_keeps_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = DurableStore::new(tmp.path().join("missing/store.tsv"));

        let err = store.replace([("aa", &b"one"[..])]).unwrap_err();
        assert!(matches!(err, StoreError::Io { action: "create", .. }));
        assert!(!store.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_store_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let store = DurableStore::new(tmp.path().join("store.tsv"));
        store.replace([("aa", &b"one"[..])]).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_relative_store_temp_path() {
        let store = DurableStore::new("store.tsv");
        let temp = store.temp_path();
        assert_eq!(temp.parent(), Some(Path::new(".")));
        assert!(temp
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(".store.tsv.tmp-"));
    }
}
