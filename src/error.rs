//! Crate-wide error taxonomy.
//!
//! Decode errors are unrecoverable at the layer that detects them and bubble
//! to the top of the current decode call.  The only tolerated irregularities
//! are V8 padding bytes (`0x00`) and trailing zero padding inside record-log
//! blocks, both of which are skipped silently.  Unconsumed files in a
//! database directory are a warning on the snapshot, never an error.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Short read against a declared length.
    #[error("unexpected EOF: needed {needed} byte(s), {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    /// A varint kept its continuation bit set through its whole byte budget.
    #[error("varint did not terminate within {max_bytes} bytes")]
    VarintOverflow { max_bytes: usize },

    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    CorruptChecksum { stored: u32, computed: u32 },

    /// Illegal FULL/FIRST/MIDDLE/LAST transition (or an unknown frame type).
    #[error("invalid record framing: {0}")]
    InvalidRecordFraming(&'static str),

    /// A fragmented record ran out of input before its LAST fragment.
    #[error("truncated record: fragment sequence has no terminating LAST")]
    TruncatedRecord,

    #[error("unknown operation kind {0:#04x}")]
    UnknownOpKind(u8),

    #[error("unknown manifest tag {0}")]
    UnknownTag(u8),

    #[error("unknown block compression code {0}")]
    UnknownBlockCompression(u8),

    /// Declared block size exceeds the configured allocation ceiling.
    #[error("block of {declared} bytes exceeds the {limit}-byte ceiling")]
    BlockTooLarge { declared: u64, limit: u64 },

    #[error("footer magic mismatch — not a table file")]
    NotATable,

    #[error("CURRENT file is malformed")]
    InvalidCurrentFile,

    #[error("value does not carry a structured-clone wrap header")]
    NotAV8Value,

    #[error("invalid wrap tag {0:#04x}")]
    InvalidWrapTag(u8),

    #[error("unknown value tag {0:#04x}")]
    UnknownValueTag(u8),

    #[error("unknown key tag {0}")]
    UnknownKeyTag(u8),

    /// A decoder finished while input remained.
    #[error("{0} trailing byte(s) after a complete value")]
    TrailingBytes(usize),

    /// A declared object/array/op count disagrees with what was decoded.
    #[error("declared count {declared} disagrees with observed {observed}")]
    CountMismatch { declared: u64, observed: u64 },

    /// A container end marker appeared where a plain value was required.
    #[error("end marker in a value position")]
    UnexpectedEndMarker,

    #[error("object key must be a string")]
    InvalidObjectKey,

    #[error("duplicate object key {0:?}")]
    DuplicateObjectKey(String),

    /// A post-condition failed after a decode completed; indicates a bug.
    #[error("invariant violated: {0}")]
    InvariantViolation(&'static str),

    #[error("snappy: {0}")]
    Snappy(#[from] snap::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
