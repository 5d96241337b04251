//! Manifest (VersionEdit) decoding.
//!
//! The manifest file reuses the record-log framing; every logical record is
//! a VersionEdit — a sequence of `tag(1) | payload` fields:
//!
//! ```text
//! 1 Comparator      varint32(len), bytes
//! 2 LogNumber       varint64
//! 3 NextFileNumber  varint64
//! 4 LastSequence    varint64
//! 5 CompactPointer  varint32(level), internal_key
//! 6 DeletedFile     varint32(level), varint64(number)
//! 7 NewFile         varint32(level), varint64(number), varint64(size),
//!                   internal_key(smallest), internal_key(largest)
//! 9 PrevLogNumber   varint64
//! ```
//!
//! Tag 8 is the historical large-value-ref field; no current writer emits it
//! and it is rejected like any other unknown tag.  An `internal_key` is a
//! varint32-length-prefixed key whose trailing 8 trailer bytes are stripped.

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::record_log;
use crate::wire::SliceReader;

const TAG_COMPARATOR: u8 = 1;
const TAG_LOG_NUMBER: u8 = 2;
const TAG_NEXT_FILE_NUMBER: u8 = 3;
const TAG_LAST_SEQUENCE: u8 = 4;
const TAG_COMPACT_POINTER: u8 = 5;
const TAG_DELETED_FILE: u8 = 6;
const TAG_NEW_FILE: u8 = 7;
const TAG_PREV_LOG_NUMBER: u8 = 9;

/// A table file added by a VersionEdit.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub level: u32,
    pub number: u64,
    pub size: u64,
    /// Smallest user key in the file (trailer stripped).
    pub smallest: Vec<u8>,
    /// Largest user key in the file (trailer stripped).
    pub largest: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
pub struct DeletedFile {
    pub level: u32,
    pub number: u64,
}

/// Accumulated state of every VersionEdit in a manifest file.
///
/// Numeric fields that never appeared are `None`; the comparator name
/// defaults to `"<none>"`.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub comparator_name: String,
    pub log_number: Option<u64>,
    pub prev_log_number: Option<u64>,
    pub next_file_number: Option<u64>,
    pub last_sequence: Option<u64>,
    pub compact_pointers: Vec<(u32, Vec<u8>)>,
    pub new_files: Vec<NewFile>,
    pub deleted_files: Vec<DeletedFile>,
    /// Table file numbers added and not later deleted.
    pub live_files: BTreeSet<u64>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            comparator_name: "<none>".to_owned(),
            log_number: None,
            prev_log_number: None,
            next_file_number: None,
            last_sequence: None,
            compact_pointers: Vec::new(),
            new_files: Vec::new(),
            deleted_files: Vec::new(),
            live_files: BTreeSet::new(),
        }
    }
}

/// Decode a manifest file (record-log framed VersionEdits).
pub fn decode_manifest(data: &[u8]) -> Result<Manifest> {
    let mut m = Manifest::default();

    for record in record_log::read_records(data)? {
        let mut r = SliceReader::new(&record);
        while !r.is_empty() {
            let tag = r.read_u8()?;
            match tag {
                TAG_COMPARATOR => {
                    let len = r.read_varint32()? as usize;
                    let name = r.read_exact(len)?;
                    m.comparator_name = String::from_utf8_lossy(name).into_owned();
                }
                TAG_LOG_NUMBER => m.log_number = Some(r.read_varint64()?),
                TAG_NEXT_FILE_NUMBER => m.next_file_number = Some(r.read_varint64()?),
                TAG_LAST_SEQUENCE => m.last_sequence = Some(r.read_varint64()?),
                TAG_COMPACT_POINTER => {
                    let level = r.read_varint32()?;
                    let key = read_internal_key(&mut r)?;
                    m.compact_pointers.push((level, key));
                }
                TAG_DELETED_FILE => {
                    let level = r.read_varint32()?;
                    let number = r.read_varint64()?;
                    m.deleted_files.push(DeletedFile { level, number });
                }
                TAG_NEW_FILE => {
                    let level = r.read_varint32()?;
                    let number = r.read_varint64()?;
                    let size = r.read_varint64()?;
                    let smallest = read_internal_key(&mut r)?;
                    let largest = read_internal_key(&mut r)?;
                    m.new_files.push(NewFile { level, number, size, smallest, largest });
                }
                TAG_PREV_LOG_NUMBER => m.prev_log_number = Some(r.read_varint64()?),
                other => return Err(Error::UnknownTag(other)),
            }
        }
    }

    m.live_files = m.new_files.iter().map(|f| f.number).collect();
    for f in &m.deleted_files {
        m.live_files.remove(&f.number);
    }
    Ok(m)
}

/// Length-prefixed internal key; returns the user-key portion with the
/// 8-byte trailer stripped.
fn read_internal_key(r: &mut SliceReader) -> Result<Vec<u8>> {
    let len = r.read_varint32()? as usize;
    let key = r.read_exact(len)?;
    if len < 8 {
        return Err(Error::UnexpectedEof { needed: 8, remaining: len });
    }
    Ok(key[..len - 8].to_vec())
}
