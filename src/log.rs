//! Write-ahead-log entry decoding.
//!
//! Each logical record reassembled by `record_log` is one write batch:
//!
//! ```text
//! batch := sequence(8 LE) | count(4 LE) | op{count}
//! op    := kind(1) | varint32(key_len) | key | [varint32(val_len) | value]
//! ```
//!
//! The value field is present iff `kind` is VALUE.  Within one file the last
//! writer wins; the decoder keeps a live map and a tombstone set, and
//! validates each batch's declared op count against what it decoded.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::record_log;
use crate::wire::SliceReader;

/// Internal-key operation kind: tombstone.
pub const KIND_DELETION: u8 = 0;
/// Internal-key operation kind: live value.
pub const KIND_VALUE: u8 = 1;

/// Everything a `.log` file says: keys written (last value wins) and keys
/// tombstoned.  A key may appear in both when the file writes then deletes
/// it (or the reverse); the snapshot merge resolves that.
#[derive(Debug, Default)]
pub struct LogContents {
    pub live: BTreeMap<Vec<u8>, Vec<u8>>,
    pub tombstones: BTreeSet<Vec<u8>>,
}

/// Decode a whole `.log` file.
pub fn decode_log(data: &[u8]) -> Result<LogContents> {
    let mut out = LogContents::default();
    for record in record_log::read_records(data)? {
        decode_batch(&record, &mut out)?;
    }
    Ok(out)
}

fn decode_batch(record: &[u8], out: &mut LogContents) -> Result<()> {
    let mut r = SliceReader::new(record);
    let _sequence = r.read_u64_le()?;
    let count = r.read_u32_le()?;

    let mut decoded = 0u64;
    while !r.is_empty() {
        let kind = r.read_u8()?;
        match kind {
            KIND_VALUE => {
                let key_len = r.read_varint32()? as usize;
                let key = r.read_exact(key_len)?;
                let val_len = r.read_varint32()? as usize;
                let value = r.read_exact(val_len)?;
                out.live.insert(key.to_vec(), value.to_vec());
            }
            KIND_DELETION => {
                let key_len = r.read_varint32()? as usize;
                let key = r.read_exact(key_len)?;
                out.tombstones.insert(key.to_vec());
            }
            other => return Err(Error::UnknownOpKind(other)),
        }
        decoded += 1;
    }

    if decoded != u64::from(count) {
        return Err(Error::CountMismatch { declared: u64::from(count), observed: decoded });
    }
    Ok(())
}
