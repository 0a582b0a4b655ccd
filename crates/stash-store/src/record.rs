//! Line format shared by staging files and the durable store.
//!
//! One record per line: `IDENTIFIER<TAB>VALUE<NEWLINE>`. No header, no
//! trailer. Values are raw bytes; parsing splits at the first tab, so values
//! may contain tabs but never line breaks.

use crate::merge::MalformedLinePolicy;
use crate::{Result, StoreError};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;
use tracing::debug;

/// Separator between identifier and value.
pub const FIELD_SEPARATOR: u8 = b'\t';

const LINE_END: u8 = b'\n';

/// Check that a value can be stored as a single record.
pub fn validate_value(value: &[u8]) -> Result<()> {
    if value.is_empty() {
        return Err(StoreError::EmptyValue);
    }
    if value.iter().any(|&b| b == b'\n' || b == b'\r') {
        return Err(StoreError::LineBreakInValue);
    }
    Ok(())
}

/// Render a record line, including the trailing newline.
pub fn format_record(id: &str, value: &[u8]) -> Vec<u8> {
    let mut line = Vec::with_capacity(id.len() + value.len() + 2);
    line.extend_from_slice(id.as_bytes());
    line.push(FIELD_SEPARATOR);
    line.extend_from_slice(value);
    line.push(LINE_END);
    line
}

/// Split a line (without its newline) into `(identifier, value)` at the first
/// tab. The identifier field must be text.
pub fn parse_record(line: &[u8]) -> Option<(&str, &[u8])> {
    let split = line.iter().position(|&b| b == FIELD_SEPARATOR)?;
    let id = std::str::from_utf8(&line[..split]).ok()?;
    Some((id, &line[split + 1..]))
}

/// Records keyed by identifier, remembering first-seen order.
///
/// Re-inserting an identifier replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    index: HashMap<String, usize>,
    entries: Vec<(String, Vec<u8>)>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: &str, value: &[u8]) {
        match self.index.get(id) {
            Some(&slot) => self.entries[slot].1 = value.to_vec(),
            None => {
                self.index.insert(id.to_string(), self.entries.len());
                self.entries.push((id.to_string(), value.to_vec()));
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&[u8]> {
        self.index.get(id).map(|&slot| self.entries[slot].1.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(id, v)| (id.as_str(), v.as_slice()))
    }

    /// Consume the set, returning the value for `id`.
    pub fn take(mut self, id: &str) -> Option<Vec<u8>> {
        let slot = self.index.remove(id)?;
        Some(self.entries.swap_remove(slot).1)
    }
}

/// Counters from reading one record file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub records: usize,
    pub malformed: usize,
}

/// Read every record of `path` into `into`, later records overwriting
/// earlier ones with the same identifier.
///
/// A missing file reads as empty only when `missing_ok` is set.
pub(crate) fn read_records(
    path: &Path,
    policy: MalformedLinePolicy,
    missing_ok: bool,
    into: &mut RecordSet,
) -> Result<ReadStats> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if missing_ok && e.kind() == ErrorKind::NotFound => {
            return Ok(ReadStats::default());
        }
        Err(e) => return Err(StoreError::io("open", path, e)),
    };

    let mut reader = BufReader::new(file);
    let mut stats = ReadStats::default();
    let mut line = Vec::new();
    let mut line_no = 0;

    loop {
        line.clear();
        let n = reader
            .read_until(LINE_END, &mut line)
            .map_err(|e| StoreError::io("read", path, e))?;
        if n == 0 {
            break;
        }
        line_no += 1;
        if line.last() == Some(&LINE_END) {
            line.pop();
        }

        match parse_record(&line) {
            Some((id, value)) => {
                into.insert(id, value);
                stats.records += 1;
            }
            None => match policy {
                MalformedLinePolicy::Skip => {
                    debug!(path = %path.display(), line = line_no, "Skipping malformed record");
                    stats.malformed += 1;
                }
                MalformedLinePolicy::Fail => {
                    return Err(StoreError::MalformedRecord {
                        path: path.to_path_buf(),
                        line: line_no,
                    });
                }
            },
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_value() {
        assert!(validate_value(b"hunter2").is_ok());
        assert!(validate_value(b"with\ttab").is_ok());
        assert!(validate_value(b"caf\xe9").is_ok());
        assert!(matches!(validate_value(b""), Err(StoreError::EmptyValue)));
        assert!(matches!(
            validate_value(b"two\nlines"),
            Err(StoreError::LineBreakInValue)
        ));
        assert!(matches!(
            validate_value(b"cr\r"),
            Err(StoreError::LineBreakInValue)
        ));
    }

    #[test]
    fn test_parse_splits_at_first_tab() {
        assert_eq!(parse_record(b"abc\tx\ty"), Some(("abc", &b"x\ty"[..])));
        assert_eq!(parse_record(b"abc\t"), Some(("abc", &b""[..])));
        assert_eq!(parse_record(b"no separator"), None);
        assert_eq!(parse_record(b"\xff\xfe\tvalue"), None);
    }

    #[test]
    fn test_format_record() {
        assert_eq!(format_record("id", b"v"), b"id\tv\n");
        assert_eq!(format_record("id", b"\xe9"), b"id\t\xe9\n");
    }

    #[test]
    fn test_record_set_keeps_first_seen_order() {
        let mut set = RecordSet::new();
        set.insert("zz", b"1");
        set.insert("aa", b"2");
        set.insert("zz", b"3");

        let order: Vec<_> = set.iter().collect();
        assert_eq!(order, vec![("zz", &b"3"[..]), ("aa", &b"2"[..])]);
        assert_eq!(set.get("aa"), Some(&b"2"[..]));
        assert_eq!(set.take("zz"), Some(b"3".to_vec()));
    }

    #[test]
    fn test_read_records_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.stage");
        std::fs::write(&path, "k1\tfirst\nbogus\nk2\tother\nk1\tsecond\n").unwrap();

        let mut set = RecordSet::new();
        let stats = read_records(&path, MalformedLinePolicy::Skip, false, &mut set).unwrap();

        assert_eq!(stats, ReadStats { records: 3, malformed: 1 });
        assert_eq!(set.get("k1"), Some(&b"second"[..]));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_read_records_keeps_raw_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.stage");
        std::fs::write(&path, b"k1\tcaf\xe9-pass\nk2\tlast-without-newline").unwrap();

        let mut set = RecordSet::new();
        let stats = read_records(&path, MalformedLinePolicy::Fail, false, &mut set).unwrap();

        assert_eq!(stats.records, 2);
        assert_eq!(set.get("k1"), Some(&b"caf\xe9-pass"[..]));
        assert_eq!(set.get("k2"), Some(&b"last-without-newline"[..]));
    }

    #[test]
    fn test_read_records_strict_policy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.stage");
        std::fs::write(&path, "k1\tv\nbogus\n").unwrap();

        let mut set = RecordSet::new();
        let err = read_records(&path, MalformedLinePolicy::Fail, false, &mut set).unwrap_err();
        assert!(matches!(err, StoreError::MalformedRecord { line: 2, .. }));
    }

    #[test]
    fn test_read_records_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent");
        let mut set = RecordSet::new();

        assert!(read_records(&path, MalformedLinePolicy::Skip, true, &mut set).is_ok());
        assert!(matches!(
            read_records(&path, MalformedLinePolicy::Skip, false, &mut set),
            Err(StoreError::Io { action: "open", .. })
        ));
    }
}
