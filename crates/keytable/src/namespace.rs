//! # Namespace
//!
//! Registry of tables and of the tokenizers and token filters they may use.
//! Table names are unique within a namespace; tables keep a weak reference
//! back to it for renames and capability lookups.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::capability::{Capabilities, TokenFilter, Tokenizer};
use crate::config::TableConfig;
use crate::engine::{StorageLocation, TableCore};
use crate::error::{Result, TableError};
use crate::meta::TableMeta;
use crate::table::Table;

#[derive(Default)]
pub(crate) struct NamespaceInner {
    pub(crate) tables: RwLock<BTreeMap<String, Table>>,
    pub(crate) capabilities: RwLock<Capabilities>,
}

#[derive(Clone, Default)]
pub struct Namespace {
    inner: Arc<NamespaceInner>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tokenizer(&self, tokenizer: impl Tokenizer + 'static) {
        self.inner
            .capabilities
            .write()
            .register_tokenizer(Arc::new(tokenizer));
    }

    pub fn register_token_filter(&self, filter: impl TokenFilter + 'static) {
        self.inner
            .capabilities
            .write()
            .register_token_filter(Arc::new(filter));
    }

    pub fn tokenizer(&self, name: &str) -> Result<Arc<dyn Tokenizer>> {
        self.inner.capabilities.read().tokenizer(name)
    }

    pub fn token_filter(&self, name: &str) -> Result<Arc<dyn TokenFilter>> {
        self.inner.capabilities.read().token_filter(name)
    }

    /// Creates a table. A table configured with a `dir` recovers whatever
    /// its journal and snapshot there already hold.
    ///
    /// # Errors
    ///
    /// - `DuplicateName` if a table called `config.name` exists.
    /// - `InvalidKeyType` if `config.key_type` cannot key a table.
    /// - `InvalidValue` if `config.value_type` is not fixed-width.
    /// - `NotFound` for an unknown tokenizer or token filter.
    /// - Journal, snapshot and I/O errors from recovery.
    pub fn create_table(&self, config: TableConfig) -> Result<Table> {
        validate_name(&config.name)?;
        if !config.key_type.is_key_type() {
            return Err(TableError::InvalidKeyType {
                key_type: config.key_type,
                reason: "not a key type".into(),
            });
        }
        if let Some(vt) = config.value_type {
            if vt.fixed_width().is_none() {
                return Err(TableError::InvalidValue {
                    data_type: vt,
                    reason: "value slots need a fixed-width type".into(),
                });
            }
        }

        let mut tables = self.inner.tables.write();
        if tables.contains_key(&config.name) {
            return Err(TableError::DuplicateName(config.name));
        }

        let (default_tokenizer, token_filters) = {
            let caps = self.inner.capabilities.read();
            let tokenizer = config
                .default_tokenizer
                .as_deref()
                .map(|n| caps.tokenizer(n))
                .transpose()?;
            (tokenizer, caps.token_filters(config.token_filters.as_slice())?)
        };

        let persistent = config.dir.is_some();
        let core = match config.dir {
            Some(dir) => TableCore::open(
                config.key_type,
                config.value_type,
                &config.name,
                StorageLocation {
                    dir,
                    sync: config.journal_sync,
                },
            )?,
            None => TableCore::new(config.key_type, config.value_type),
        };
        let meta = TableMeta {
            name: config.name.clone(),
            key_type: config.key_type,
            value_type: config.value_type,
            encoding: config.encoding,
            default_tokenizer,
            token_filters,
        };

        let table = Table::new(meta, core, Arc::downgrade(&self.inner));
        tables.insert(config.name.clone(), table.clone());
        info!(
            table = %config.name,
            key_type = %config.key_type,
            persistent,
            records = table.len(),
            "created table"
        );
        Ok(table)
    }

    pub fn table(&self, name: &str) -> Option<Table> {
        self.inner.tables.read().get(name).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.inner.tables.read().keys().cloned().collect()
    }

    /// Unregisters a table and deletes its files. Outstanding handles keep
    /// working as in-memory tables.
    pub fn remove_table(&self, name: &str) -> Result<()> {
        let table = self
            .inner
            .tables
            .write()
            .remove(name)
            .ok_or_else(|| TableError::NotFound(format!("table {name}")))?;
        table.shared.core.write().remove_files()?;
        info!(table = name, "removed table");
        Ok(())
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("tables", &self.table_names())
            .finish()
    }
}

/// Table and column names: non-empty, made of ASCII alphanumerics and
/// `_ - # @`. The `.` separator is reserved for column names.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '#' | '@'));
    if valid {
        Ok(())
    } else {
        Err(TableError::InvalidName(name.to_owned()))
    }
}
