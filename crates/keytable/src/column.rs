//! Column handles.
//!
//! Cells live in the owning table's variable heap, so overwriting or
//! deleting them leaves dead segments behind for `Table::defrag`.

use std::fmt;

use crate::error::Result;
use crate::table::Table;
use crate::types::{DataType, RecordId, Value};

#[derive(Clone)]
pub struct Column {
    table: Table,
    index: usize,
    local_name: String,
    data_type: DataType,
}

impl Column {
    pub(crate) fn new(table: Table, index: usize, local_name: String, data_type: DataType) -> Self {
        Self {
            table,
            index,
            local_name,
            data_type,
        }
    }

    /// Full name, `<table>.<column>`, using the table's current name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.table.name(), self.local_name)
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Stores `value` as the cell of record `id`.
    ///
    /// # Errors
    ///
    /// `NotFound` for a dead record, `InvalidValue` when the value does not
    /// match the column type or exceeds its size bound.
    pub fn set(&self, id: RecordId, value: impl Into<Value>) -> Result<()> {
        let mut core = self.table.shared.core.write();
        let bytes = core.encode_cell(self.index, &value.into())?;
        core.write_cell(self.index, id, &bytes)
    }

    pub fn get(&self, id: RecordId) -> Result<Option<Value>> {
        self.table.shared.core.read().read_cell(self.index, id)
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name())
            .field("data_type", &self.data_type)
            .finish()
    }
}
