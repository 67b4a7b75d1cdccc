//! # Table
//!
//! [`Table`] is a cheap, cloneable handle to a key table owned by a
//! [`Namespace`](crate::Namespace).
//!
//! ```text
//! Table ──Arc──▶ Shared
//!                 ├─ meta: RwLock<TableMeta>   name, types, tokenizer, filters
//!                 ├─ core: RwLock<TableCore>   trie, records, heap, columns, journal
//!                 └─ namespace: Weak<..>       registry used by rename and lookups
//! ```
//!
//! Mutations take the core write lock for the whole edit; lookups and cursor
//! steps take the read lock. No lock is ever held across a public call.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::capability::{TokenFilter, Tokenizer};
use crate::codec;
use crate::column::Column;
use crate::engine::TableCore;
use crate::cursor::{CursorOptions, PrefixCursor};
use crate::error::{Result, TableError};
use crate::meta::{TableFlags, TableMeta};
use crate::namespace::{validate_name, NamespaceInner};
use crate::types::{Added, DataType, Encoding, Identifier, Key, Record, RecordId, Value};

pub(crate) struct Shared {
    pub(crate) meta: RwLock<TableMeta>,
    pub(crate) core: RwLock<TableCore>,
    pub(crate) namespace: Weak<NamespaceInner>,
}

#[derive(Clone)]
pub struct Table {
    pub(crate) shared: Arc<Shared>,
}

impl Table {
    pub(crate) fn new(meta: TableMeta, core: TableCore, namespace: Weak<NamespaceInner>) -> Self {
        Self {
            shared: Arc::new(Shared {
                meta: RwLock::new(meta),
                core: RwLock::new(core),
                namespace,
            }),
        }
    }

    // -------------------- Metadata --------------------

    pub fn name(&self) -> String {
        self.shared.meta.read().name.clone()
    }

    pub fn key_type(&self) -> DataType {
        self.shared.meta.read().key_type
    }

    pub fn value_type(&self) -> Option<DataType> {
        self.shared.meta.read().value_type
    }

    pub fn encoding(&self) -> Encoding {
        self.shared.meta.read().encoding
    }

    pub fn flags(&self) -> TableFlags {
        self.shared.meta.read().flags()
    }

    pub fn supports_key(&self) -> bool {
        self.flags().supports_key
    }

    pub fn supports_value(&self) -> bool {
        self.flags().supports_value
    }

    pub fn is_persistent(&self) -> bool {
        self.shared.core.read().is_persistent()
    }

    /// Renames the table in its namespace. Column names follow, and a
    /// persistent table moves its journal and snapshot files.
    ///
    /// # Errors
    ///
    /// `DuplicateName` if another table already uses `new_name`,
    /// `UnsupportedOperation` if the table is no longer registered.
    pub fn rename(&self, new_name: &str) -> Result<()> {
        validate_name(new_name)?;
        let ns = self.namespace()?;
        let mut tables = ns.tables.write();
        let mut meta = self.shared.meta.write();
        if meta.name == new_name {
            return Ok(());
        }
        match tables.get(&meta.name) {
            Some(t) if Arc::ptr_eq(&t.shared, &self.shared) => {}
            _ => {
                return Err(TableError::UnsupportedOperation(
                    "table was removed from its namespace",
                ))
            }
        }
        if tables.contains_key(new_name) {
            return Err(TableError::DuplicateName(new_name.to_owned()));
        }

        self.shared.core.write().rename_files(new_name)?;
        let old = std::mem::replace(&mut meta.name, new_name.to_owned());
        tables.remove(&old);
        tables.insert(new_name.to_owned(), self.clone());
        info!(from = %old, to = new_name, "renamed table");
        Ok(())
    }

    pub fn default_tokenizer(&self) -> Option<Arc<dyn Tokenizer>> {
        self.shared.meta.read().default_tokenizer.clone()
    }

    /// Sets (or clears, with `None`) the default tokenizer by name.
    pub fn set_default_tokenizer(&self, name: Option<&str>) -> Result<()> {
        let tokenizer = match name {
            Some(name) => Some(self.namespace()?.capabilities.read().tokenizer(name)?),
            None => None,
        };
        self.shared.meta.write().default_tokenizer = tokenizer;
        Ok(())
    }

    pub fn token_filters(&self) -> Vec<Arc<dyn TokenFilter>> {
        self.shared.meta.read().token_filters.clone()
    }

    /// Replaces the token filters. Nothing changes if any name is unknown.
    pub fn set_token_filters(&self, names: &[&str]) -> Result<()> {
        let filters = self.namespace()?.capabilities.read().token_filters(names)?;
        self.shared.meta.write().token_filters = filters;
        Ok(())
    }

    /// Runs the default tokenizer, then every token filter in order.
    pub fn tokenize(&self, text: &str) -> Result<Vec<String>> {
        let meta = self.shared.meta.read();
        let tokenizer = meta
            .default_tokenizer
            .as_ref()
            .ok_or(TableError::UnsupportedOperation("table has no default tokenizer"))?;
        let mut tokens = tokenizer.tokenize(text);
        for filter in &meta.token_filters {
            tokens = filter.filter(tokens);
        }
        Ok(tokens)
    }

    // -------------------- Records --------------------

    pub fn len(&self) -> usize {
        self.shared.core.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the record for `key`, creating it if it does not exist.
    /// [`Added::created`] tells which happened.
    pub fn add(&self, key: impl Into<Key>) -> Result<Added> {
        self.add_with(key, &[])
    }

    /// Like [`add`](Self::add), and writes `columns` if the record was
    /// created. An existing record is returned untouched.
    ///
    /// # Errors
    ///
    /// `InvalidKeyType` for a key the key type cannot hold, `NotFound` for an
    /// unknown column, `InvalidValue` for a bad column value. Columns are
    /// validated before the record is created.
    pub fn add_with(&self, key: impl Into<Key>, columns: &[(&str, Value)]) -> Result<Added> {
        let mut core = self.shared.core.write();
        let encoded = codec::encode_key(&key.into(), core.key_type)?;

        let mut cells = Vec::with_capacity(columns.len());
        for (name, value) in columns {
            let index = core
                .column_index(name)
                .ok_or_else(|| TableError::NotFound(format!("column {name}")))?;
            cells.push((index, core.encode_cell(index, value)?));
        }

        let (id, created) = core.add(&encoded)?;
        if created {
            for (index, bytes) in cells {
                core.write_cell(index, id, &bytes)?;
            }
        }
        Ok(Added {
            record: Record {
                id,
                key: core.decode(&encoded)?,
            },
            created,
        })
    }

    pub fn has_key(&self, key: impl Into<Key>) -> Result<bool> {
        let core = self.shared.core.read();
        let encoded = codec::encode_key(&key.into(), core.key_type)?;
        Ok(core.trie.contains_key(&encoded))
    }

    pub fn get(&self, key: impl Into<Key>) -> Result<Option<Record>> {
        let core = self.shared.core.read();
        let encoded = codec::encode_key(&key.into(), core.key_type)?;
        match core.find(&encoded)? {
            Some(id) => core.record(id).map(Some),
            None => Ok(None),
        }
    }

    pub fn record(&self, id: RecordId) -> Result<Option<Record>> {
        let core = self.shared.core.read();
        if !core.contains(id) {
            return Ok(None);
        }
        core.record(id).map(Some)
    }

    /// Gives a record a new key, keeping its id, value slot and columns.
    ///
    /// # Errors
    ///
    /// `NotFound` if `target` does not exist, `DuplicateKey` if `new_key`
    /// already belongs to another record.
    pub fn update(&self, target: impl Into<Identifier>, new_key: impl Into<Key>) -> Result<Record> {
        let mut core = self.shared.core.write();
        let id = resolve(&core, target.into())?;
        let encoded = codec::encode_key(&new_key.into(), core.key_type)?;
        core.rekey(id, &encoded)?;
        core.record(id)
    }

    /// Deletes a record and its column cells. The id becomes reusable.
    pub fn delete(&self, target: impl Into<Identifier>) -> Result<RecordId> {
        let mut core = self.shared.core.write();
        let id = resolve(&core, target.into())?;
        core.delete(id)?;
        Ok(id)
    }

    /// Value slot of `id`; `None` on a table without value type.
    pub fn value(&self, id: RecordId) -> Result<Option<Value>> {
        self.shared.core.read().value(id)
    }

    pub fn set_value(&self, id: RecordId, value: impl Into<Value>) -> Result<()> {
        self.shared.core.write().set_value(id, &value.into())
    }

    // -------------------- Columns --------------------

    pub fn define_column(&self, name: &str, data_type: DataType) -> Result<Column> {
        validate_name(name)?;
        let index = self.shared.core.write().define_column(name, data_type)?;
        debug!(table = %self.name(), column = name, %data_type, "defined column");
        Ok(Column::new(self.clone(), index, name.to_owned(), data_type))
    }

    pub fn column(&self, name: &str) -> Option<Column> {
        let core = self.shared.core.read();
        let index = core.column_index(name)?;
        let data_type = core.column(index).ok()?.data_type;
        Some(Column::new(self.clone(), index, name.to_owned(), data_type))
    }

    pub fn columns(&self) -> Vec<Column> {
        let names = self.shared.core.read().column_names();
        names.iter().filter_map(|n| self.column(n)).collect()
    }

    // -------------------- Cursors --------------------

    /// Opens a cursor over the records whose key starts with `prefix`.
    ///
    /// ```
    /// use keytable::{CursorOptions, Key, Namespace, TableConfig};
    ///
    /// let ns = Namespace::new();
    /// let paths = ns.create_table(TableConfig::new("Paths")).unwrap();
    /// for p in ["/", "/tmp", "/usr/bin", "/usr/local/bin"] {
    ///     paths.add(p).unwrap();
    /// }
    /// let keys = paths
    ///     .open_prefix_cursor("/usr", CursorOptions::new().descending())
    ///     .unwrap()
    ///     .keys()
    ///     .unwrap();
    /// assert_eq!(keys, vec![Key::from("/usr/local/bin"), Key::from("/usr/bin")]);
    /// ```
    pub fn open_prefix_cursor(
        &self,
        prefix: impl Into<Key>,
        options: CursorOptions,
    ) -> Result<PrefixCursor> {
        let prefix = codec::encode_key(&prefix.into(), self.shared.core.read().key_type)?;
        Ok(PrefixCursor::new(self.shared.clone(), &prefix, options))
    }

    /// Cursor over every record.
    pub fn open_cursor(&self, options: CursorOptions) -> PrefixCursor {
        PrefixCursor::new(self.shared.clone(), &[], options)
    }

    /// Every record in ascending key order.
    pub fn each(&self) -> PrefixCursor {
        self.open_cursor(CursorOptions::default())
    }

    pub fn keys(&self) -> Result<Vec<Key>> {
        self.each().keys()
    }

    // -------------------- Maintenance --------------------

    /// Compacts the variable heap and returns how many segments were moved
    /// or reclaimed. `max_segments` bounds the work done in one call.
    pub fn defrag(&self, max_segments: Option<usize>) -> Result<usize> {
        let n = self.shared.core.write().defrag(max_segments);
        debug!(table = %self.name(), segments = n, "defragmented");
        Ok(n)
    }

    /// Dead bytes over heap bytes, in `[0, 1]`.
    pub fn fragmentation(&self) -> f64 {
        self.shared.core.read().fragmentation()
    }

    pub fn storage_stats(&self) -> varstore::StorageStats {
        self.shared.core.read().storage_stats()
    }

    /// Checks the trie and its correspondence with the live records.
    pub fn verify(&self) -> Result<()> {
        self.shared.core.read().verify()
    }

    /// Snapshots the table and truncates its journal.
    pub fn checkpoint(&self) -> Result<()> {
        self.shared.core.write().checkpoint()?;
        Ok(())
    }

    fn namespace(&self) -> Result<Arc<NamespaceInner>> {
        self.shared
            .namespace
            .upgrade()
            .ok_or(TableError::UnsupportedOperation("namespace was dropped"))
    }
}

fn resolve(core: &TableCore, target: Identifier) -> Result<RecordId> {
    match target {
        Identifier::Id(id) if core.contains(id) => Ok(id),
        Identifier::Id(id) => Err(TableError::NotFound(format!("record {id}"))),
        Identifier::Key(key) => {
            let encoded = codec::encode_key(&key, core.key_type)?;
            core.find(&encoded)?
                .ok_or_else(|| TableError::NotFound(format!("key {key}")))
        }
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let meta = self.shared.meta.read();
        f.debug_struct("Table")
            .field("name", &meta.name)
            .field("key_type", &meta.key_type)
            .field("value_type", &meta.value_type)
            .field("encoding", &meta.encoding)
            .finish()
    }
}
