//! # keytable
//!
//! Key tables indexed by a double-array trie.
//!
//! A [`Table`] maps typed keys to stable record ids. Keys are encoded by the
//! [`codec`] so that byte order equals key order, then indexed by a
//! [`datrie::DoubleArrayTrie`] whose terminal states hold the record ids.
//! Long keys and column values live in a [`varstore::VariableStorage`] heap
//! that [`Table::defrag`] compacts on demand.
//!
//! ```text
//!            add / update / delete
//!                     │
//!          ┌──────────▼──────────┐
//!          │ journal (persistent) │
//!          └──────────┬──────────┘
//!     ┌───────────────┼────────────────┐
//!     ▼               ▼                ▼
//!   trie        record store     variable heap
//!  key → id    id → key, value   long keys, cells
//! ```
//!
//! Tables are created through a [`Namespace`], which also holds the
//! tokenizers and token filters tables refer to by name.

pub mod capability;
pub mod codec;
mod column;
mod config;
mod cursor;
mod engine;
mod error;
mod meta;
mod namespace;
mod records;
mod table;
mod types;

#[cfg(test)]
mod tests;

pub use capability::{TokenFilter, Tokenizer};
pub use column::Column;
pub use config::TableConfig;
pub use cursor::{CursorOptions, PrefixCursor};
pub use datrie::Order;
pub use error::{Result, TableError};
pub use meta::TableFlags;
pub use namespace::Namespace;
pub use table::Table;
pub use types::{Added, DataType, Encoding, Identifier, Key, Record, RecordId, Value};
pub use varstore::StorageStats;
