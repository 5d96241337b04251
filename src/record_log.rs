//! Record-log framing — the 32 KiB-block chunked format shared by `.log`
//! files and the manifest.
//!
//! # On-disk layout
//!
//! ```text
//! file     := block*
//! block    := physical_record* padding            (32768 bytes, last may be short)
//! physical := masked_crc32c(4 LE) | length(2 LE) | type(1) | payload(length)
//! ```
//!
//! `type` is FULL(1), FIRST(2), MIDDLE(3) or LAST(4).  A logical record is
//! either one FULL physical record or the payload concatenation of
//! FIRST MIDDLE* LAST, which may span block boundaries.  A block with fewer
//! than 7 bytes left holds no further records; the remainder is zero padding.
//!
//! The CRC covers the payload and then the type byte, and is stored masked
//! (see `checksum`).

use crate::checksum;
use crate::error::{Error, Result};

/// Physical block size of the record-log format.
pub const BLOCK_SIZE: usize = 32 * 1024;

/// `crc(4) + length(2) + type(1)`.
pub const RECORD_HEADER_SIZE: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    Full = 1,
    First = 2,
    Middle = 3,
    Last = 4,
}

impl RecordType {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(RecordType::Full),
            2 => Some(RecordType::First),
            3 => Some(RecordType::Middle),
            4 => Some(RecordType::Last),
            _ => None,
        }
    }
}

/// Read all logical records from a record-log file, reassembling fragmented
/// records across block boundaries.
pub fn read_records(data: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut records = Vec::new();
    // Payload accumulator for an open FIRST .. LAST sequence.
    let mut pending: Option<Vec<u8>> = None;

    for block in data.chunks(BLOCK_SIZE) {
        let mut pos = 0usize;
        while block.len() - pos >= RECORD_HEADER_SIZE {
            let (payload, kind) = read_physical(block, &mut pos)?;
            match kind {
                RecordType::Full => {
                    if pending.is_some() {
                        return Err(Error::InvalidRecordFraming(
                            "FULL inside a fragmented record",
                        ));
                    }
                    records.push(payload.to_vec());
                }
                RecordType::First => {
                    if pending.is_some() {
                        return Err(Error::InvalidRecordFraming(
                            "FIRST inside a fragmented record",
                        ));
                    }
                    pending = Some(payload.to_vec());
                }
                RecordType::Middle => match pending.as_mut() {
                    Some(acc) => acc.extend_from_slice(payload),
                    None => {
                        return Err(Error::InvalidRecordFraming(
                            "MIDDLE without a preceding FIRST",
                        ))
                    }
                },
                RecordType::Last => match pending.take() {
                    Some(mut acc) => {
                        acc.extend_from_slice(payload);
                        records.push(acc);
                    }
                    None => {
                        return Err(Error::InvalidRecordFraming(
                            "LAST without a preceding FIRST",
                        ))
                    }
                },
            }
        }
        // Fewer than 7 bytes left: zero padding, skip to the next block.
    }

    if pending.is_some() {
        return Err(Error::TruncatedRecord);
    }
    Ok(records)
}

/// Parse one physical record at `*pos`, verify its checksum, and advance.
fn read_physical<'a>(block: &'a [u8], pos: &mut usize) -> Result<(&'a [u8], RecordType)> {
    let header = &block[*pos..*pos + RECORD_HEADER_SIZE];
    let masked_crc = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let length = u16::from_le_bytes([header[4], header[5]]) as usize;
    let type_byte = header[6];

    let start = *pos + RECORD_HEADER_SIZE;
    if block.len() - start < length {
        return Err(Error::UnexpectedEof { needed: length, remaining: block.len() - start });
    }
    let payload = &block[start..start + length];

    checksum::verify(payload, type_byte, masked_crc)?;

    let kind = RecordType::from_u8(type_byte)
        .ok_or(Error::InvalidRecordFraming("unknown physical record type"))?;

    *pos = start + length;
    Ok((payload, kind))
}
