//! Per-run staging area.
//!
//! The staging area is a directory owned by the current run. Each capture
//! session writes to its own file inside it; the merger reads them all at run
//! end and the directory is then removed. Worker processes may share one
//! staging area, so file names combine the process id with a random UUID and
//! are created exclusively.

use crate::{Result, StoreError};
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Extension of staging files.
pub const STAGING_FILE_EXT: &str = "stage";

/// Handle to a staging directory.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Attach to a staging directory without touching the filesystem.
    ///
    /// Worker processes use this to share an area that another process
    /// initialized.
    pub fn attach(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Wipe any leftover area from a crashed run and create an empty one.
    pub fn initialize(&self) -> Result<()> {
        match fs::symlink_metadata(&self.root) {
            Ok(_) => {
                let orphans = self.staging_files().map(|f| f.len()).unwrap_or(0);
                if orphans > 0 {
                    warn!(
                        path = %self.root.display(),
                        orphans,
                        "Discarding staging files from an unfinished run"
                    );
                }
                fs::remove_dir_all(&self.root)
                    .map_err(|e| StoreError::io("remove staging area", &self.root, e))?;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io("inspect staging area", &self.root, e)),
        }

        create_private_dir(&self.root)
            .map_err(|e| StoreError::io("create staging area", &self.root, e))?;

        info!(path = %self.root.display(), "Staging area initialized");
        Ok(())
    }

    /// Allocate a new, never-shared staging file.
    pub fn new_staging_file(&self) -> Result<(PathBuf, File)> {
        let name = format!(
            "{}-{}.{}",
            std::process::id(),
            Uuid::new_v4().simple(),
            STAGING_FILE_EXT
        );
        let path = self.root.join(name);

        let file = open_exclusive(&path)
            .map_err(|e| StoreError::io("create staging file", &path, e))?;

        debug!(path = %path.display(), "Allocated staging file");
        Ok((path, file))
    }

    /// List regular files directly under the area, sorted by name.
    ///
    /// A missing area lists as empty.
    pub fn staging_files(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io("list staging area", &self.root, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io("list staging area", &self.root, e))?;
            let file_type = entry
                .file_type()
                .map_err(|e| StoreError::io("inspect", entry.path(), e))?;
            if file_type.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Remove the staging area and everything in it.
    pub fn teardown(&self) -> Result<()> {
        self.remove_all()
            .map_err(|e| StoreError::io("remove staging area", &self.root, e))
    }

    /// A missing area counts as removed.
    pub(crate) fn remove_all(&self) -> std::io::Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {
                info!(path = %self.root.display(), "Staging area removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    fs::create_dir_all(path)
}

#[cfg(unix)]
pub(crate) fn open_exclusive(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .append(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
pub(crate) fn open_exclusive(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().append(true).create_new(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[test]
    fn test_initialize_creates_empty_dir() {
        let tmp = TempDir::new().unwrap();
        let area = StagingArea::attach(tmp.path().join("nested/staging"));

        area.initialize().unwrap();

        assert!(area.exists());
        assert!(area.staging_files().unwrap().is_empty());
    }

    #[test]
    fn test_initialize_wipes_leftovers() {
        let tmp = TempDir::new().unwrap();
        let area = StagingArea::attach(tmp.path().join("staging"));
        fs::create_dir_all(area.path().join("subdir")).unwrap();
        fs::write(area.path().join("123-old.stage"), "id\tvalue\n").unwrap();

        area.initialize().unwrap();

        assert!(area.exists());
        assert_eq!(fs::read_dir(area.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_initialize_fails_when_parent_is_a_file() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let area = StagingArea::attach(blocker.join("staging"));

        let err = area.initialize().unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(err.to_string().contains("staging area"));
    }

    #[test]
    fn test_staging_file_names_are_unique() {
        let tmp = TempDir::new().unwrap();
        let area = StagingArea::attach(tmp.path().join("staging"));
        area.initialize().unwrap();

        let mut seen = HashSet::new();
        for _ in 0..64 {
            let (path, _file) = area.new_staging_file().unwrap();
            assert!(seen.insert(path));
        }
        assert_eq!(area.staging_files().unwrap().len(), 64);
    }

    #[test]
    fn test_staging_file_name_carries_pid() {
        let tmp = TempDir::new().unwrap();
        let area = StagingArea::attach(tmp.path().join("staging"));
        area.initialize().unwrap();

        let (path, _file) = area.new_staging_file().unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(&format!("{}-", std::process::id())));
        assert!(name.ends_with(".stage"));
    }

    #[test]
    fn test_new_staging_file_requires_area() {
        let tmp = TempDir::new().unwrap();
        let area = StagingArea::attach(tmp.path().join("missing"));

        assert!(matches!(
            area.new_staging_file(),
            Err(StoreError::Io { action: "create staging file", .. })
        ));
    }

    #[test]
    fn test_staging_files_skips_directories() {
        let tmp = TempDir::new().unwrap();
        let area = StagingArea::attach(tmp.path().join("staging"));
        area.initialize().unwrap();
        fs::create_dir(area.path().join("nested")).unwrap();
        fs::write(area.path().join("nested/inner.stage"), "x\ty\n").unwrap();
        fs::write(area.path().join("b.stage"), "").unwrap();
        fs::write(area.path().join("a.stage"), "").unwrap();

        let files = area.staging_files().unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.stage", "b.stage"]);
    }

    #[test]
    fn test_missing_area_lists_empty_and_tears_down() {
        let tmp = TempDir::new().unwrap();
        let area = StagingArea::attach(tmp.path().join("missing"));

        assert!(area.staging_files().unwrap().is_empty());
        assert!(area.teardown().is_ok());
    }

    #[test]
    fn test_teardown_removes_area() {
        let tmp = TempDir::new().unwrap();
        let area = StagingArea::attach(tmp.path().join("staging"));
        area.initialize().unwrap();
        area.new_staging_file().unwrap();

        area.teardown().unwrap();
        assert!(!area.path().exists());
    }
}
