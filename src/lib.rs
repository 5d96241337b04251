//! # idbscan — forensic reader for Chromium IndexedDB / LevelDB stores
//!
//! Decoding guarantees:
//! - Strictly read-only: no file is written, locked, or held open beyond
//!   the decode call that needs it
//! - Every record-log record and table block is CRC32C-verified (payload
//!   first, then the one-byte type discriminator) before use
//! - A decode either completes or fails fast; partial results are never
//!   observable mid-call
//! - Block allocations are bounded by a configurable ceiling (64 MiB
//!   default); oversized declarations are rejected before allocation
//! - The merged snapshot partitions every user key into exactly one of
//!   live, deleted, or meta
//! - Unconsumed directory files are a surfaced warning, never an error
//!
//! The pipeline: `record_log` reassembles framed records → `manifest` and
//! `log` interpret them → `table` decodes sorted tables → `db` merges
//! everything into a snapshot → `idb` re-parses the snapshot's keys and
//! values as IndexedDB databases, object stores and structured-clone
//! entries.

pub mod checksum;
pub mod db;
pub mod error;
pub mod idb;
pub mod log;
pub mod manifest;
pub mod record_log;
pub mod table;
pub mod wire;

// Flat re-exports for the most common types.
pub use db::Database;
pub use error::{Error, Result};
pub use idb::{Catalog, IdbDatabase, IdbEntry, IdbKey, IdbStore, IdbValue};
pub use log::LogContents;
pub use manifest::Manifest;
pub use table::{ReadOptions, TableContents};
