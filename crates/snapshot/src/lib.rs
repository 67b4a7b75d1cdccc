//! # Snapshot: key-table checkpoint files
//!
//! Immutable on-disk image of a table's key index. `Table::checkpoint` writes
//! one and truncates the journal; on open the table loads the snapshot and
//! replays the journal records with a sequence number above `last_seq`.
//!
//! ## File layout (v1)
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ DATA SECTION (entries in ascending key order) │
//! │                                               │
//! │ key_len (u32) | key | id (u32)                │
//! │ value_len (u32) | value                       │
//! │                                               │
//! │ ... repeated for each entry ...               │
//! ├───────────────────────────────────────────────┤
//! │ FOOTER (always last 28 bytes)                 │
//! │                                               │
//! │ count (u64) | id_limit (u32) | last_seq (u64) │
//! │ crc32 (u32) | magic (u32) "KTS1"              │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! `crc32` covers the data section. `id_limit` is one past the highest id
//! ever allocated, so ids freed before the checkpoint stay reusable.
//! `last_seq` is the sequence number of the last journal record the snapshot
//! already contains.
//! All integers are little-endian.

mod format;
mod reader;
mod writer;

pub use format::{FOOTER_BYTES, SNAPSHOT_MAGIC};
pub use reader::SnapshotReader;
pub use writer::{SnapshotMeta, SnapshotWriter};

/// One live record as stored in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub id: u32,
    /// Encoded key.
    pub key: Vec<u8>,
    /// Raw value slot; empty for tables without a value type.
    pub value: Vec<u8>,
}
