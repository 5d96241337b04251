//! IndexedDB key coding.
//!
//! Every LevelDB key used by IndexedDB starts with a prefix naming the
//! database, object store and index it belongs to:
//!
//! ```text
//! first_byte := (len(db)-1) << 5 | (len(store)-1) << 2 | (len(index)-1)
//! prefix     := first_byte | db_id | store_id | index_id
//! ```
//!
//! where each id is a compact little-endian integer of 1..=8 bytes, its
//! width recorded (minus one) in the first byte.  After the prefix comes a
//! typed user-key tail: a recursive tagged encoding of strings, numbers,
//! binary blobs and arrays.  The Null (0) and Date (2) tags are reserved
//! and rejected.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::wire::{self, SliceReader};

const TAG_NULL: u8 = 0;
const TAG_STRING: u8 = 1;
const TAG_DATE: u8 = 2;
const TAG_NUMBER: u8 = 3;
const TAG_ARRAY: u8 = 4;
const TAG_BINARY: u8 = 6;

/// A decoded IndexedDB user key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IdbKey {
    Number(f64),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<IdbKey>),
}

/// The (database, object store, index) triple a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPrefix {
    pub db_id: u64,
    pub store_id: u64,
    pub index_id: u64,
}

/// Encode the key prefix for the given ids.
pub fn encode_key_prefix(db_id: u64, store_id: u64, index_id: u64) -> Vec<u8> {
    let db = wire::int_to_compact_le(db_id);
    let store = wire::int_to_compact_le(store_id);
    let index = wire::int_to_compact_le(index_id);

    let first_byte =
        ((db.len() - 1) << 5 | (store.len() - 1) << 2 | (index.len() - 1)) as u8;

    let mut out = Vec::with_capacity(1 + db.len() + store.len() + index.len());
    out.push(first_byte);
    out.extend_from_slice(&db);
    out.extend_from_slice(&store);
    out.extend_from_slice(&index);
    out
}

/// Decode the key prefix at the reader's position.
pub fn decode_key_prefix(r: &mut SliceReader) -> Result<KeyPrefix> {
    let first_byte = r.read_u8()?;
    let db_len = ((first_byte & 0b1110_0000) >> 5) as usize + 1;
    let store_len = ((first_byte & 0b0001_1100) >> 2) as usize + 1;
    let index_len = (first_byte & 0b0000_0011) as usize + 1;

    Ok(KeyPrefix {
        db_id: wire::compact_le_to_int(r.read_exact(db_len)?),
        store_id: wire::compact_le_to_int(r.read_exact(store_len)?),
        index_id: wire::compact_le_to_int(r.read_exact(index_len)?),
    })
}

/// Decode a full IndexedDB key: prefix, typed tail, nothing left over.
pub fn decode_key(bytes: &[u8]) -> Result<(KeyPrefix, IdbKey)> {
    let mut r = SliceReader::new(bytes);
    let prefix = decode_key_prefix(&mut r)?;
    let key = decode_key_tail(&mut r)?;
    r.expect_end()?;
    Ok((prefix, key))
}

/// Recursive typed key tail.
pub fn decode_key_tail(r: &mut SliceReader) -> Result<IdbKey> {
    let tag = r.read_u8()?;
    match tag {
        TAG_STRING => {
            let chars = r.read_varint64()? as usize;
            let bytes = r.read_exact(chars.saturating_mul(2))?;
            Ok(IdbKey::String(wire::utf16be_to_string(bytes)?))
        }
        TAG_NUMBER => Ok(IdbKey::Number(r.read_f64_le()?)),
        TAG_ARRAY => {
            let count = r.read_varint64()? as usize;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(decode_key_tail(r)?);
            }
            Ok(IdbKey::Array(items))
        }
        TAG_BINARY => {
            let len = r.read_varint64()? as usize;
            Ok(IdbKey::Binary(r.read_exact(len)?.to_vec()))
        }
        // Null and Date are reserved by the coding scheme; no writer emits
        // them as user keys.
        TAG_NULL | TAG_DATE => Err(Error::UnknownKeyTag(tag)),
        other => Err(Error::UnknownKeyTag(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::encode_varint;

    #[test]
    fn prefix_roundtrip_small_ids() {
        // db=1, store=2, index=1 — all ids fit a single byte.
        let prefix = encode_key_prefix(1, 2, 1);
        assert_eq!(prefix, vec![0x00, 0x01, 0x02, 0x01]);

        let mut r = SliceReader::new(&prefix);
        let decoded = decode_key_prefix(&mut r).unwrap();
        assert_eq!(decoded, KeyPrefix { db_id: 1, store_id: 2, index_id: 1 });
        assert!(r.is_empty());
    }

    #[test]
    fn prefix_roundtrip_wide_ids() {
        // The index-id width field is two bits: ids up to four bytes wide.
        let prefix = encode_key_prefix(0x1_0000, 300, 0xFFFF_FFFF);
        assert_eq!(prefix[0], 0x47); // widths 3, 2, 4
        let mut r = SliceReader::new(&prefix);
        let decoded = decode_key_prefix(&mut r).unwrap();
        assert_eq!(decoded.db_id, 0x1_0000);
        assert_eq!(decoded.store_id, 300);
        assert_eq!(decoded.index_id, 0xFFFF_FFFF);
    }

    #[test]
    fn string_key() {
        let mut bytes = encode_key_prefix(1, 1, 1);
        bytes.push(TAG_STRING);
        bytes.extend(encode_varint(2));
        bytes.extend_from_slice(&[0x00, 0x68, 0x00, 0x69]); // "hi" UTF-16BE
        let (_, key) = decode_key(&bytes).unwrap();
        assert_eq!(key, IdbKey::String("hi".to_owned()));
    }

    #[test]
    fn number_key() {
        let mut bytes = encode_key_prefix(1, 1, 1);
        bytes.push(TAG_NUMBER);
        bytes.extend_from_slice(&42.5f64.to_le_bytes());
        let (_, key) = decode_key(&bytes).unwrap();
        assert_eq!(key, IdbKey::Number(42.5));
    }

    #[test]
    fn nested_array_key() {
        let mut bytes = encode_key_prefix(1, 1, 1);
        bytes.push(TAG_ARRAY);
        bytes.extend(encode_varint(2));
        bytes.push(TAG_NUMBER);
        bytes.extend_from_slice(&1.0f64.to_le_bytes());
        bytes.push(TAG_BINARY);
        bytes.extend(encode_varint(3));
        bytes.extend_from_slice(b"\x01\x02\x03");

        let (_, key) = decode_key(&bytes).unwrap();
        assert_eq!(
            key,
            IdbKey::Array(vec![
                IdbKey::Number(1.0),
                IdbKey::Binary(vec![1, 2, 3]),
            ])
        );
    }

    #[test]
    fn reserved_tags_are_rejected() {
        for tag in [TAG_NULL, TAG_DATE, 5u8, 7u8] {
            let mut bytes = encode_key_prefix(1, 1, 1);
            bytes.push(tag);
            assert!(
                matches!(decode_key(&bytes), Err(Error::UnknownKeyTag(t)) if t == tag),
                "tag {tag} not rejected"
            );
        }
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode_key_prefix(1, 1, 1);
        bytes.push(TAG_NUMBER);
        bytes.extend_from_slice(&1.0f64.to_le_bytes());
        bytes.push(0xEE);
        assert!(matches!(decode_key(&bytes), Err(Error::TrailingBytes(1))));
    }
}
