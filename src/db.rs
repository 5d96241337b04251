//! Merged database snapshot — the top of the LevelDB layer.
//!
//! [`Database::open`] reads a database directory into three disjoint maps:
//! live entries, deleted entries (tombstones, with the prior value when one
//! is recoverable), and meta entries from table meta-index blocks.  The
//! merge follows the manifest: every live table file is decoded in
//! ascending number order, the active log file (if any) is overlaid on top,
//! and tombstones are purged last.
//!
//! Directory files that were never consumed (other than `LOCK`, `LOG` and
//! `LOG.old`, which are intentionally untouched) are surfaced in
//! `unused_files` as a warning; a non-empty residue usually means the
//! directory is stale or corrupt, not that decoding failed.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::log::{self, LogContents};
use crate::manifest::{self, Manifest};
use crate::table::{self, ReadOptions};

/// Immutable merged view of one LevelDB directory.
#[derive(Debug)]
pub struct Database {
    pub path: PathBuf,
    pub manifest: Manifest,
    /// Live user entries.
    pub entries: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Meta-index entries from table files.
    pub meta_entries: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Tombstoned keys.  `Some` carries the last recoverable value
    /// (possibly empty); `None` means the key was never seen live.
    pub deleted_entries: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    /// Directory entries found but not consumed.  A warning, not an error.
    pub unused_files: BTreeSet<String>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, &ReadOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, opts: &ReadOptions) -> Result<Self> {
        let dir = path.as_ref();

        // Everything in the directory, so we can report the unconsumed
        // residue at the end.  LOCK and the info logs are never read.
        let mut files: BTreeSet<String> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        for skipped in ["LOCK", "LOG", "LOG.old"] {
            files.remove(skipped);
        }

        let manifest_name = read_current(&consume(dir, &mut files, "CURRENT"))?;
        let manifest_bytes = fs::read(consume(dir, &mut files, &manifest_name))?;
        let manifest = manifest::decode_manifest(&manifest_bytes)?;

        let mut entries = BTreeMap::new();
        let mut meta_entries = BTreeMap::new();
        let mut table_tombstones: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

        // Live tables, ascending file number, last write wins.
        for &number in &manifest.live_files {
            let name = format!("{number:06}.ldb");
            let bytes = fs::read(consume(dir, &mut files, &name))?;
            let contents = table::decode_table(&bytes, opts)?;
            entries.extend(contents.entries);
            meta_entries.extend(contents.meta_entries);
            table_tombstones.extend(contents.deleted_entries);
        }

        // Active write-ahead log, overlaid on the table state.
        let log_contents = match manifest.log_number {
            Some(number) => {
                let name = format!("{number:06}.log");
                let bytes = fs::read(consume(dir, &mut files, &name))?;
                log::decode_log(&bytes)?
            }
            None => LogContents::default(),
        };
        entries.extend(log_contents.live);

        // Tombstone purge.  Table tombstones retain their stored value;
        // log tombstones capture whatever value was live at this point, or
        // an absent-value marker when the key never was.
        let mut deleted_entries: BTreeMap<Vec<u8>, Option<Vec<u8>>> = table_tombstones
            .into_iter()
            .map(|(key, value)| (key, Some(value)))
            .collect();
        for key in deleted_entries.keys() {
            entries.remove(key);
        }
        for key in log_contents.tombstones {
            match entries.remove(&key) {
                Some(value) => {
                    deleted_entries.insert(key, Some(value));
                }
                None => {
                    deleted_entries.entry(key).or_insert(None);
                }
            }
        }

        let db = Self {
            path: dir.to_owned(),
            manifest,
            entries,
            meta_entries,
            deleted_entries,
            unused_files: files,
        };
        db.check_partition()?;
        Ok(db)
    }

    /// Post-condition: every user key lives in at most one of the three maps.
    fn check_partition(&self) -> Result<()> {
        for key in self.deleted_entries.keys() {
            if self.entries.contains_key(key) {
                return Err(Error::InvariantViolation("key both live and deleted"));
            }
        }
        for key in self.meta_entries.keys() {
            if self.entries.contains_key(key) || self.deleted_entries.contains_key(key) {
                return Err(Error::InvariantViolation("meta key collides with user data"));
            }
        }
        Ok(())
    }
}

/// Join `name` onto the directory and mark it consumed.
fn consume(dir: &Path, files: &mut BTreeSet<String>, name: &str) -> PathBuf {
    files.remove(name);
    dir.join(name)
}

/// Validate `CURRENT` and return the manifest file name it points to.
/// The contents must be exactly `MANIFEST-<digits>\n`, at most 20 bytes.
fn read_current(path: &Path) -> Result<String> {
    let raw = fs::read(path)?;
    if raw.len() > 20 || raw.last() != Some(&b'\n') {
        return Err(Error::InvalidCurrentFile);
    }
    let name = &raw[..raw.len() - 1];
    let digits = match name.strip_prefix(b"MANIFEST-") {
        Some(digits) => digits,
        None => return Err(Error::InvalidCurrentFile),
    };
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(Error::InvalidCurrentFile);
    }
    // Validated ASCII above.
    Ok(String::from_utf8_lossy(name).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_file_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CURRENT");

        fs::write(&path, b"MANIFEST-000001\n").unwrap();
        assert_eq!(read_current(&path).unwrap(), "MANIFEST-000001");

        for bad in [
            &b"MANIFEST-000001"[..],      // missing newline
            b"MANIFEST-\n",               // no digits
            b"MANIFEST-00a001\n",         // non-digit
            b"CURRENT-000001\n",          // wrong prefix
            b"MANIFEST-000000000001\n",   // over 20 bytes
        ] {
            fs::write(&path, bad).unwrap();
            assert!(
                matches!(read_current(&path), Err(Error::InvalidCurrentFile)),
                "accepted {bad:?}"
            );
        }
    }
}
