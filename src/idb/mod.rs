//! IndexedDB catalog — databases, object stores and entries on top of a
//! merged LevelDB snapshot.
//!
//! The LevelDB keyspace carries several record families distinguished by
//! their key prefix.  This module uses three of them:
//!
//! - database names: global-metadata keys starting `00 00 00 00 C9`, whose
//!   tail is `(origin, name)` as length-prefixed UTF-16BE and whose value
//!   leads with the database id;
//! - object-store metadata: `prefix(db, 0, 0) ++ 50 ++ varint(store_id) ++ 0`,
//!   whose value is the UTF-16BE store name;
//! - store records: `prefix(db, store, 1)` followed by the typed user key,
//!   whose value is a structured-clone stream.

pub mod key;
pub mod value;

use serde::Serialize;

pub use key::{decode_key, decode_key_prefix, encode_key_prefix, IdbKey, KeyPrefix};
pub use value::{decode_value, IdbValue};

use crate::db::Database;
use crate::error::Result;
use crate::wire::{self, SliceReader};

/// Keys carrying IndexedDB database names start with this prefix.
pub const DATABASE_NAME_PREFIX: [u8; 5] = [0x00, 0x00, 0x00, 0x00, 0xC9];

/// Object-store metadata discriminator within a database's prefix space.
const STORE_META_TYPE: u8 = 50;

/// Store records live under this index id.
const ENTRY_INDEX_ID: u64 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct IdbDatabase {
    pub origin: String,
    pub name: String,
    pub id: u64,
    pub stores: Vec<IdbStore>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdbStore {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdbEntry {
    pub key: IdbKey,
    pub value: IdbValue,
}

/// Read-only IndexedDB view over a decoded [`Database`].
pub struct Catalog<'a> {
    db: &'a Database,
}

impl<'a> Catalog<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Every IndexedDB database in the snapshot, with its object stores.
    pub fn databases(&self) -> Result<Vec<IdbDatabase>> {
        let mut out = Vec::new();
        for (key, value) in &self.db.entries {
            if !key.starts_with(&DATABASE_NAME_PREFIX) {
                continue;
            }

            let mut kr = SliceReader::new(&key[DATABASE_NAME_PREFIX.len()..]);
            let origin_chars = kr.read_varint64()? as usize;
            let origin = wire::utf16be_to_string(kr.read_exact(origin_chars.saturating_mul(2))?)?;
            let name_chars = kr.read_varint64()? as usize;
            let name = wire::utf16be_to_string(kr.read_exact(name_chars.saturating_mul(2))?)?;
            kr.expect_end()?;

            let mut vr = SliceReader::new(value);
            let id = vr.read_varint64()?;

            out.push(IdbDatabase { origin, name, id, stores: self.stores(id)? });
        }
        Ok(out)
    }

    /// Object stores of one database.
    pub fn stores(&self, db_id: u64) -> Result<Vec<IdbStore>> {
        let mut prefix = encode_key_prefix(db_id, 0, 0);
        prefix.push(STORE_META_TYPE);

        let mut out = Vec::new();
        for (key, value) in &self.db.entries {
            if !key.starts_with(&prefix) || key.last() != Some(&0) {
                continue;
            }
            let mut kr = SliceReader::new(&key[prefix.len()..]);
            let store_id = kr.read_varint64()?;
            out.push(IdbStore { id: store_id, name: wire::utf16be_to_string(value)? });
        }
        Ok(out)
    }

    /// Live and deleted entries of one object store.
    ///
    /// A deleted entry whose value was not recoverable (or was empty)
    /// decodes to [`IdbValue::Null`]; the tombstone itself is still listed.
    pub fn entries(&self, db_id: u64, store_id: u64) -> Result<(Vec<IdbEntry>, Vec<IdbEntry>)> {
        let prefix = encode_key_prefix(db_id, store_id, ENTRY_INDEX_ID);

        let mut live = Vec::new();
        for (key, value) in &self.db.entries {
            if key.starts_with(&prefix) {
                live.push(decode_entry(key, Some(value))?);
            }
        }

        let mut deleted = Vec::new();
        for (key, value) in &self.db.deleted_entries {
            if key.starts_with(&prefix) {
                deleted.push(decode_entry(key, value.as_deref())?);
            }
        }

        Ok((live, deleted))
    }
}

fn decode_entry(key: &[u8], value: Option<&[u8]>) -> Result<IdbEntry> {
    let (_prefix, idb_key) = decode_key(key)?;
    let idb_value = match value {
        Some(bytes) if !bytes.is_empty() => decode_value(bytes)?,
        _ => IdbValue::Null,
    };
    Ok(IdbEntry { key: idb_key, value: idb_value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::encode_varint;
    use std::collections::BTreeMap;

    fn utf16be(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(|u| u.to_be_bytes()).collect()
    }

    fn database_name_key(origin: &str, name: &str) -> Vec<u8> {
        let mut key = DATABASE_NAME_PREFIX.to_vec();
        key.extend(encode_varint(origin.chars().count() as u64));
        key.extend(utf16be(origin));
        key.extend(encode_varint(name.chars().count() as u64));
        key.extend(utf16be(name));
        key
    }

    fn store_meta_key(db_id: u64, store_id: u64) -> Vec<u8> {
        let mut key = encode_key_prefix(db_id, 0, 0);
        key.push(STORE_META_TYPE);
        key.extend(encode_varint(store_id));
        key.push(0);
        key
    }

    fn entry_key(db_id: u64, store_id: u64, user_key: f64) -> Vec<u8> {
        let mut key = encode_key_prefix(db_id, store_id, ENTRY_INDEX_ID);
        key.push(3); // Number tag
        key.extend_from_slice(&user_key.to_le_bytes());
        key
    }

    fn v8_true() -> Vec<u8> {
        vec![0x01, 0xFF, 0x11, 0xFF, 0x0D, b'T']
    }

    fn fake_database(entries: BTreeMap<Vec<u8>, Vec<u8>>) -> Database {
        Database {
            path: std::path::PathBuf::new(),
            manifest: crate::manifest::Manifest::default(),
            entries,
            meta_entries: BTreeMap::new(),
            deleted_entries: BTreeMap::new(),
            unused_files: std::collections::BTreeSet::new(),
        }
    }

    #[test]
    fn lists_databases_and_stores() {
        let mut entries = BTreeMap::new();
        let mut db_value = encode_varint(3); // database id
        db_value.extend_from_slice(b"extra"); // id is the leading varint only
        entries.insert(database_name_key("https_example.org_0@1", "notes"), db_value);
        entries.insert(store_meta_key(3, 7), utf16be("items"));

        let db = fake_database(entries);
        let catalog = Catalog::new(&db);
        let databases = catalog.databases().unwrap();

        assert_eq!(databases.len(), 1);
        assert_eq!(databases[0].origin, "https_example.org_0@1");
        assert_eq!(databases[0].name, "notes");
        assert_eq!(databases[0].id, 3);
        assert_eq!(databases[0].stores.len(), 1);
        assert_eq!(databases[0].stores[0].id, 7);
        assert_eq!(databases[0].stores[0].name, "items");
    }

    #[test]
    fn lists_store_entries() {
        let mut entries = BTreeMap::new();
        entries.insert(entry_key(3, 7, 1.0), v8_true());
        // A record of another store must not leak in.
        entries.insert(entry_key(3, 8, 2.0), v8_true());

        let mut db = fake_database(entries);
        db.deleted_entries.insert(entry_key(3, 7, 9.0), None);

        let catalog = Catalog::new(&db);
        let (live, deleted) = catalog.entries(3, 7).unwrap();

        assert_eq!(live.len(), 1);
        assert_eq!(live[0].key, IdbKey::Number(1.0));
        assert_eq!(live[0].value, IdbValue::Bool(true));

        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].key, IdbKey::Number(9.0));
        assert_eq!(deleted[0].value, IdbValue::Null);
    }
}
