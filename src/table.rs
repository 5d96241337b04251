//! Sorted-table (`.ldb`) decoding.
//!
//! # File layout
//!
//! ```text
//! file   := block* metaindex_block index_block footer
//! footer := metaindex_handle | index_handle | padding | magic(8 LE)
//!           (48 bytes total, magic = 0xDB4775248B80FB57)
//! handle := varint64(offset) | varint64(size)
//! ```
//!
//! A block is `size` payload bytes followed by a 5-byte trailer:
//! `type(1) | masked_crc32c(4)`.  The CRC covers the payload and then the
//! type byte.  Type 0 stores the payload verbatim; type 1 is Snappy.
//!
//! # Block payload
//!
//! ```text
//! payload := entry* restart_offset(4 LE){num_restarts} num_restarts(4 LE)
//! entry   := varint32(shared) | varint32(non_shared) | varint32(value_len)
//!            | key_delta(non_shared) | value(value_len)
//! ```
//!
//! Keys use shared-prefix compression against the previous entry; at every
//! restart point (and for the first entry) `shared` is zero.  Every key is
//! an internal key: user-key bytes plus an 8-byte trailer whose low byte is
//! the operation kind and whose upper 56 bits are the sequence number.

use std::collections::BTreeMap;

use byteorder::{ByteOrder, LittleEndian};

use crate::checksum;
use crate::error::{Error, Result};
use crate::log::{KIND_DELETION, KIND_VALUE};
use crate::wire::SliceReader;

/// Table footer magic, little-endian at the last 8 bytes of the file.
pub const TABLE_MAGIC: u64 = 0xDB47_7524_8B80_FB57;

/// Fixed footer size: two handles, padding, magic.
pub const FOOTER_SIZE: usize = 48;

/// `type(1) + masked_crc32c(4)` after every block payload.
pub const BLOCK_TRAILER_SIZE: usize = 5;

const COMPRESSION_NONE: u8 = 0;
const COMPRESSION_SNAPPY: u8 = 1;

// ── Options ──────────────────────────────────────────────────────────────────

/// Decoding limits.  The one knob is the per-block allocation ceiling:
/// a handle (or a Snappy header) declaring more than `max_block_size`
/// bytes fails with [`Error::BlockTooLarge`] before any allocation.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub max_block_size: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self { max_block_size: 64 * 1024 * 1024 }
    }
}

// ── Decoded table ────────────────────────────────────────────────────────────

/// Every entry of one table file, classified by operation kind.
#[derive(Debug, Default)]
pub struct TableContents {
    /// Data-block entries with kind VALUE.
    pub entries: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Meta-index block entries (internal LevelDB metadata, not user data).
    pub meta_entries: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Data-block entries with kind DELETION.  The stored value (typically
    /// empty) is retained.
    pub deleted_entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

#[derive(Debug, Clone, Copy)]
struct BlockHandle {
    offset: u64,
    size: u64,
}

fn read_handle(r: &mut SliceReader) -> Result<BlockHandle> {
    let offset = r.read_varint64()?;
    let size = r.read_varint64()?;
    Ok(BlockHandle { offset, size })
}

/// Decode a whole `.ldb` table file.
pub fn decode_table(data: &[u8], opts: &ReadOptions) -> Result<TableContents> {
    if data.len() < FOOTER_SIZE {
        return Err(Error::NotATable);
    }
    let magic = LittleEndian::read_u64(&data[data.len() - 8..]);
    if magic != TABLE_MAGIC {
        return Err(Error::NotATable);
    }

    let mut footer = SliceReader::new(&data[data.len() - FOOTER_SIZE..data.len() - 8]);
    let metaindex_handle = read_handle(&mut footer)?;
    let index_handle = read_handle(&mut footer)?;
    // Remaining footer bytes are zero padding.

    let mut out = TableContents::default();

    // Meta-index block: every entry routes to meta_entries regardless of kind.
    let meta_block = fetch_block(data, metaindex_handle, opts)?;
    for (internal_key, value) in block_entries(&meta_block)? {
        let (user_key, _kind) = split_internal_key(&internal_key)?;
        out.meta_entries.insert(user_key.to_vec(), value);
    }

    // Index block: one (last_key → handle) entry per data block, in order.
    let index_block = fetch_block(data, index_handle, opts)?;
    for (_last_key, handle_bytes) in block_entries(&index_block)? {
        let mut hr = SliceReader::new(&handle_bytes);
        let handle = read_handle(&mut hr)?;

        let data_block = fetch_block(data, handle, opts)?;
        for (internal_key, value) in block_entries(&data_block)? {
            let (user_key, kind) = split_internal_key(&internal_key)?;
            match kind {
                KIND_VALUE => {
                    out.entries.insert(user_key.to_vec(), value);
                }
                KIND_DELETION => {
                    out.deleted_entries.insert(user_key.to_vec(), value);
                }
                other => return Err(Error::UnknownOpKind(other)),
            }
        }
    }

    Ok(out)
}

/// Read a block by handle, verify its trailer CRC, and decompress if needed.
fn fetch_block(data: &[u8], handle: BlockHandle, opts: &ReadOptions) -> Result<Vec<u8>> {
    let declared = handle.size.saturating_add(BLOCK_TRAILER_SIZE as u64);
    if declared > opts.max_block_size as u64 {
        return Err(Error::BlockTooLarge { declared, limit: opts.max_block_size as u64 });
    }

    // Block size has been bounded above; only the offset can still run past
    // the end of the file.
    let size = handle.size as usize;
    if handle.offset.saturating_add(declared) > data.len() as u64 {
        return Err(Error::UnexpectedEof {
            needed: size + BLOCK_TRAILER_SIZE,
            remaining: (data.len() as u64).saturating_sub(handle.offset) as usize,
        });
    }
    let offset = handle.offset as usize;
    let end = offset + size + BLOCK_TRAILER_SIZE;

    let payload = &data[offset..offset + size];
    let type_byte = data[offset + size];
    let masked_crc = LittleEndian::read_u32(&data[offset + size + 1..end]);
    checksum::verify(payload, type_byte, masked_crc)?;

    match type_byte {
        COMPRESSION_NONE => Ok(payload.to_vec()),
        COMPRESSION_SNAPPY => {
            let uncompressed = snap::raw::decompress_len(payload)?;
            if uncompressed > opts.max_block_size {
                return Err(Error::BlockTooLarge {
                    declared: uncompressed as u64,
                    limit: opts.max_block_size as u64,
                });
            }
            Ok(snap::raw::Decoder::new().decompress_vec(payload)?)
        }
        other => Err(Error::UnknownBlockCompression(other)),
    }
}

/// Iterate the shared-prefix-compressed entries of one block payload.
fn block_entries(block: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    if block.len() < 4 {
        return Err(Error::UnexpectedEof { needed: 4, remaining: block.len() });
    }
    let num_restarts = LittleEndian::read_u32(&block[block.len() - 4..]) as usize;
    let max_restarts = (block.len() - 4) / 4;
    if num_restarts > max_restarts {
        return Err(Error::CountMismatch {
            declared: num_restarts as u64,
            observed: max_restarts as u64,
        });
    }
    let entries_end = block.len() - 4 * (num_restarts + 1);

    let mut entries = Vec::new();
    let mut r = SliceReader::new(&block[..entries_end]);
    let mut prev_key: Vec<u8> = Vec::new();

    while !r.is_empty() {
        let shared = r.read_varint32()? as usize;
        let non_shared = r.read_varint32()? as usize;
        let value_len = r.read_varint32()? as usize;

        if entries.is_empty() && shared != 0 {
            return Err(Error::InvalidRecordFraming("first block entry shares a prefix"));
        }
        if shared > prev_key.len() {
            return Err(Error::UnexpectedEof { needed: shared, remaining: prev_key.len() });
        }

        let mut key = prev_key[..shared].to_vec();
        key.extend_from_slice(r.read_exact(non_shared)?);
        let value = r.read_exact(value_len)?.to_vec();

        prev_key = key.clone();
        entries.push((key, value));
    }

    Ok(entries)
}

/// Split an internal key into its user-key prefix and operation kind.
fn split_internal_key(key: &[u8]) -> Result<(&[u8], u8)> {
    if key.len() <= 8 {
        return Err(Error::UnexpectedEof { needed: 9, remaining: key.len() });
    }
    let trailer = LittleEndian::read_u64(&key[key.len() - 8..]);
    Ok((&key[..key.len() - 8], (trailer & 0xFF) as u8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::encode_varint;

    fn block_payload(entries: &[(&[u8], &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (key, value) in entries {
            out.extend(encode_varint(0)); // shared
            out.extend(encode_varint(key.len() as u64));
            out.extend(encode_varint(value.len() as u64));
            out.extend_from_slice(key);
            out.extend_from_slice(value);
        }
        out.extend_from_slice(&0u32.to_le_bytes()); // one restart at offset 0
        out.extend_from_slice(&1u32.to_le_bytes());
        out
    }

    #[test]
    fn shared_prefix_reconstruction() {
        // "apple" then "apply" sharing 4 bytes.
        let mut payload = Vec::new();
        payload.extend(encode_varint(0));
        payload.extend(encode_varint(5));
        payload.extend(encode_varint(1));
        payload.extend_from_slice(b"apple");
        payload.extend_from_slice(b"1");
        payload.extend(encode_varint(4));
        payload.extend(encode_varint(1));
        payload.extend(encode_varint(1));
        payload.extend_from_slice(b"y");
        payload.extend_from_slice(b"2");
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&1u32.to_le_bytes());

        let entries = block_entries(&payload).unwrap();
        assert_eq!(entries[0].0, b"apple");
        assert_eq!(entries[1].0, b"apply");
        assert_eq!(entries[1].1, b"2");
    }

    #[test]
    fn first_entry_must_not_share() {
        let mut payload = Vec::new();
        payload.extend(encode_varint(3));
        payload.extend(encode_varint(1));
        payload.extend(encode_varint(0));
        payload.extend_from_slice(b"x");
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&1u32.to_le_bytes());
        assert!(matches!(block_entries(&payload), Err(Error::InvalidRecordFraming(_))));
    }

    #[test]
    fn restart_count_is_validated() {
        let payload = 999u32.to_le_bytes().to_vec();
        assert!(matches!(block_entries(&payload), Err(Error::CountMismatch { .. })));
    }

    #[test]
    fn empty_block_has_no_entries() {
        // num_restarts = 0, no restart array, no entries.
        let payload = 0u32.to_le_bytes().to_vec();
        assert!(block_entries(&payload).unwrap().is_empty());
    }

    #[test]
    fn internal_key_split() {
        let mut key = b"user".to_vec();
        key.extend_from_slice(&((42u64 << 8) | 1).to_le_bytes());
        let (user, kind) = split_internal_key(&key).unwrap();
        assert_eq!(user, b"user");
        assert_eq!(kind, KIND_VALUE);

        assert!(split_internal_key(b"tiny").is_err());
    }

    #[test]
    fn oversized_handle_is_refused() {
        let opts = ReadOptions { max_block_size: 16 };
        let handle = BlockHandle { offset: 0, size: 1 << 20 };
        assert!(matches!(
            fetch_block(&[0u8; 64], handle, &opts),
            Err(Error::BlockTooLarge { .. })
        ));
    }

    #[test]
    fn not_a_table() {
        assert!(matches!(
            decode_table(&[0u8; 100], &ReadOptions::default()),
            Err(Error::NotATable)
        ));
        assert!(matches!(
            decode_table(b"short", &ReadOptions::default()),
            Err(Error::NotATable)
        ));
    }

    // Keep the helper exercised for kind classification without a full file.
    #[test]
    fn block_payload_helper_roundtrip() {
        let payload = block_payload(&[(b"k1", b"v1"), (b"k2", b"v2")]);
        let entries = block_entries(&payload).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1], (b"k2".to_vec(), b"v2".to_vec()));
    }
}
