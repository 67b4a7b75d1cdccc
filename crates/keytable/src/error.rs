use std::io;

use datrie::TrieError;
use journal::JournalError;
use thiserror::Error;
use varstore::StorageError;

use crate::types::{DataType, RecordId};

#[derive(Debug, Error)]
pub enum TableError {
    #[error("name already in use: {0}")]
    DuplicateName(String),
    #[error("invalid name: {0:?}")]
    InvalidName(String),
    #[error("invalid {key_type} key: {reason}")]
    InvalidKeyType { key_type: DataType, reason: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("key {key} already belongs to record {id}")]
    DuplicateKey { key: String, id: RecordId },
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
    #[error("invalid {data_type} value: {reason}")]
    InvalidValue { data_type: DataType, reason: String },
    #[error("value of {0} bytes is too large")]
    ValueTooLarge(usize),
    #[error("corrupt index: {0}")]
    CorruptIndex(String),
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
    #[error("snapshot error: {0:#}")]
    Snapshot(anyhow::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, TableError>;

impl From<TrieError> for TableError {
    fn from(e: TrieError) -> Self {
        TableError::CorruptIndex(e.to_string())
    }
}

impl From<StorageError> for TableError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::UnknownSegment(id) => {
                TableError::CorruptIndex(format!("dangling segment {id}"))
            }
            StorageError::TooLarge(n) => TableError::ValueTooLarge(n),
        }
    }
}

pub(crate) fn corrupt(msg: impl Into<String>) -> TableError {
    TableError::CorruptIndex(msg.into())
}
