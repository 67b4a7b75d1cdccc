//! Per-table metadata kept behind the table's metadata lock.

use std::sync::Arc;

use crate::capability::{TokenFilter, Tokenizer};
use crate::types::{DataType, Encoding};

/// What a table can store besides its keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableFlags {
    pub supports_key: bool,
    pub supports_value: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct TableMeta {
    pub(crate) name: String,
    pub(crate) key_type: DataType,
    pub(crate) value_type: Option<DataType>,
    pub(crate) encoding: Encoding,
    pub(crate) default_tokenizer: Option<Arc<dyn Tokenizer>>,
    pub(crate) token_filters: Vec<Arc<dyn TokenFilter>>,
}

impl TableMeta {
    pub(crate) fn flags(&self) -> TableFlags {
        TableFlags {
            supports_key: true,
            supports_value: self.value_type.is_some(),
        }
    }
}
