//! V8 structured-clone value decoding.
//!
//! An IndexedDB value is a V8 structured-clone byte stream wrapped by the
//! IDB layer:
//!
//! ```text
//! value := varint64(db_version) | 0xFF | wrap_version(≥ 0x11) | body
//! body  := 0x01                    — external blob reference
//!        | 0xFF format_version tag…— inline serialized value
//! ```
//!
//! The body grammar is one ASCII tag byte per value; `0x00` bytes between
//! tags are padding and skipped.  Containers are bracketed: `o … {count}`,
//! `a … @count`, `A … $count`.  End markers exist only inside the decoder
//! (`Item::End`); they never appear in the produced tree.  Declared counts
//! and array lengths are validated against what was actually decoded.

use indexmap::IndexMap;
use serde::ser::{Serialize, Serializer};

use crate::error::{Error, Result};
use crate::wire::SliceReader;

const TAG_PADDING: u8 = 0x00;
const TAG_UNDEFINED: u8 = b'_';
const TAG_NULL: u8 = b'0';
const TAG_TRUE: u8 = b'T';
const TAG_FALSE: u8 = b'F';
const TAG_INT32: u8 = b'I';
const TAG_DOUBLE: u8 = b'N';
const TAG_ONE_BYTE_STRING: u8 = b'"';
const TAG_TWO_BYTE_STRING: u8 = b'c';
const TAG_OBJECT: u8 = b'o';
const TAG_OBJECT_END: u8 = b'{';
const TAG_SPARSE_ARRAY: u8 = b'a';
const TAG_SPARSE_ARRAY_END: u8 = b'@';
const TAG_DENSE_ARRAY: u8 = b'A';
const TAG_DENSE_ARRAY_END: u8 = b'$';

const WRAP_BLOB: u8 = 0x01;
const WRAP_VERSION_TAG: u8 = 0xFF;
const MIN_WRAP_VERSION: u8 = 0x11;

/// A decoded structured-clone value.
///
/// Object properties keep their insertion order; callers index into the
/// property list positionally.  `Blob` marks a value stored externally
/// (blob directory resolution is out of scope).
#[derive(Debug, Clone, PartialEq)]
pub enum IdbValue {
    Null,
    Bool(bool),
    Int(i32),
    Double(f64),
    String(String),
    Array(Vec<IdbValue>),
    Object(IndexMap<String, IdbValue>),
    Blob,
}

impl Serialize for IdbValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            IdbValue::Null => serializer.serialize_unit(),
            IdbValue::Bool(b) => serializer.serialize_bool(*b),
            IdbValue::Int(n) => serializer.serialize_i32(*n),
            IdbValue::Double(d) => serializer.serialize_f64(*d),
            IdbValue::String(s) => serializer.serialize_str(s),
            IdbValue::Array(items) => items.serialize(serializer),
            IdbValue::Object(map) => map.serialize(serializer),
            IdbValue::Blob => serializer.serialize_str("<blob>"),
        }
    }
}

/// What one tag position decoded to: a plain value, or a container end
/// marker carrying its declared element count.  End markers are consumed
/// by the container loops and never escape this module.
enum Item {
    Value(IdbValue),
    End(u64),
}

fn require_value(item: Item) -> Result<IdbValue> {
    match item {
        Item::Value(v) => Ok(v),
        Item::End(_) => Err(Error::UnexpectedEndMarker),
    }
}

/// Decode a whole IndexedDB value, wrap header included.
pub fn decode_value(bytes: &[u8]) -> Result<IdbValue> {
    let mut r = SliceReader::new(bytes);
    let _db_version = r.read_varint64()?;

    if r.remaining() < 2 {
        return Err(Error::NotAV8Value);
    }
    let header = r.read_exact(2)?;
    if header[0] != 0xFF || header[1] < MIN_WRAP_VERSION {
        return Err(Error::NotAV8Value);
    }

    match r.read_u8()? {
        // Value lives in the blob directory; only the reference is here.
        WRAP_BLOB => Ok(IdbValue::Blob),
        WRAP_VERSION_TAG => {
            let _format_version = r.read_u8()?;
            let value = require_value(decode_item(&mut r)?)?;
            r.expect_end()?;
            Ok(value)
        }
        other => Err(Error::InvalidWrapTag(other)),
    }
}

/// Decode one tagged item, skipping padding bytes.
fn decode_item(r: &mut SliceReader) -> Result<Item> {
    let mut tag = r.read_u8()?;
    while tag == TAG_PADDING {
        tag = r.read_u8()?;
    }

    match tag {
        TAG_UNDEFINED | TAG_NULL => Ok(Item::Value(IdbValue::Null)),
        TAG_TRUE => Ok(Item::Value(IdbValue::Bool(true))),
        TAG_FALSE => Ok(Item::Value(IdbValue::Bool(false))),
        TAG_INT32 => Ok(Item::Value(IdbValue::Int(r.read_sint32()?))),
        TAG_DOUBLE => Ok(Item::Value(IdbValue::Double(r.read_f64_le()?))),
        TAG_ONE_BYTE_STRING => {
            let len = r.read_varint32()? as usize;
            let bytes = r.read_exact(len)?;
            Ok(Item::Value(IdbValue::String(ascii_with_replacement(bytes))))
        }
        TAG_TWO_BYTE_STRING => {
            let len = r.read_varint64()? as usize;
            let bytes = r.read_exact(len)?;
            Ok(Item::Value(IdbValue::String(crate::wire::utf16le_to_string(bytes)?)))
        }
        TAG_OBJECT => decode_object(r),
        TAG_SPARSE_ARRAY => decode_sparse_array(r),
        TAG_DENSE_ARRAY => decode_dense_array(r),
        TAG_OBJECT_END | TAG_SPARSE_ARRAY_END | TAG_DENSE_ARRAY_END => {
            Ok(Item::End(r.read_varint64()?))
        }
        other => Err(Error::UnknownValueTag(other)),
    }
}

/// `o` … `{count}`: alternating string keys and values.
fn decode_object(r: &mut SliceReader) -> Result<Item> {
    let mut map: IndexMap<String, IdbValue> = IndexMap::new();
    loop {
        match decode_item(r)? {
            Item::End(count) => {
                if map.len() as u64 != count {
                    return Err(Error::CountMismatch {
                        declared: count,
                        observed: map.len() as u64,
                    });
                }
                return Ok(Item::Value(IdbValue::Object(map)));
            }
            Item::Value(IdbValue::String(key)) => {
                let value = require_value(decode_item(r)?)?;
                if map.insert(key.clone(), value).is_some() {
                    return Err(Error::DuplicateObjectKey(key));
                }
            }
            Item::Value(_) => return Err(Error::InvalidObjectKey),
        }
    }
}

/// `a len` … `@count len`: explicit (key, value) pairs only.
fn decode_sparse_array(r: &mut SliceReader) -> Result<Item> {
    let declared_len = u64::from(r.read_varint32()?);
    let mut items = Vec::new();
    let mut pairs = 0u64;
    loop {
        match decode_item(r)? {
            Item::End(count) => {
                if pairs != count {
                    return Err(Error::CountMismatch { declared: count, observed: pairs });
                }
                let trailer_len = u64::from(r.read_varint32()?);
                if trailer_len != declared_len {
                    return Err(Error::CountMismatch {
                        declared: declared_len,
                        observed: trailer_len,
                    });
                }
                return Ok(Item::Value(IdbValue::Array(items)));
            }
            Item::Value(key) => {
                if !matches!(key, IdbValue::String(_) | IdbValue::Int(_)) {
                    return Err(Error::InvalidObjectKey);
                }
                let value = require_value(decode_item(r)?)?;
                items.push(IdbValue::Array(vec![key, value]));
                pairs += 1;
            }
        }
    }
}

/// `A len` … `$count len`: `len` plain elements, then (key, value) pairs.
fn decode_dense_array(r: &mut SliceReader) -> Result<Item> {
    let declared_len = u64::from(r.read_varint32()?);
    let mut items = Vec::with_capacity((declared_len as usize).min(1024));
    for _ in 0..declared_len {
        items.push(require_value(decode_item(r)?)?);
    }

    let mut pairs = 0u64;
    loop {
        match decode_item(r)? {
            Item::End(count) => {
                if pairs != count {
                    return Err(Error::CountMismatch { declared: count, observed: pairs });
                }
                let trailer_len = u64::from(r.read_varint32()?);
                if trailer_len != declared_len {
                    return Err(Error::CountMismatch {
                        declared: declared_len,
                        observed: trailer_len,
                    });
                }
                return Ok(Item::Value(IdbValue::Array(items)));
            }
            Item::Value(key) => {
                if !matches!(key, IdbValue::String(_) | IdbValue::Int(_)) {
                    return Err(Error::InvalidObjectKey);
                }
                let value = require_value(decode_item(r)?)?;
                items.push(IdbValue::Array(vec![key, value]));
                pairs += 1;
            }
        }
    }
}

/// One-byte strings are nominally ASCII; bytes outside that range have been
/// observed in the wild and are replaced rather than rejected.
fn ascii_with_replacement(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
        .collect()
}
