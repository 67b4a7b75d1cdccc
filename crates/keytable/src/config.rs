use std::path::PathBuf;

use crate::types::{DataType, Encoding};

#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Table name, unique within its namespace
    pub name: String,

    /// Key type (default: ShortText)
    pub key_type: DataType,

    /// Fixed-width value slot type (default: none)
    pub value_type: Option<DataType>,

    /// Encoding tag (default: utf8)
    pub encoding: Encoding,

    /// Default tokenizer name, resolved through the namespace
    pub default_tokenizer: Option<String>,

    /// Token filter names, applied in order
    pub token_filters: Vec<String>,

    /// Parent directory; the table keeps its files in `<dir>/<name>/`.
    /// In-memory when unset
    pub dir: Option<PathBuf>,

    /// fsync every journal append (default: false)
    pub journal_sync: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            key_type: DataType::ShortText,
            value_type: None,
            encoding: Encoding::default(),
            default_tokenizer: None,
            token_filters: Vec::new(),
            dir: None,
            journal_sync: false,
        }
    }
}

impl TableConfig {
    /// Create a new config for a table called `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the key type
    pub fn key_type(mut self, key_type: DataType) -> Self {
        self.key_type = key_type;
        self
    }

    /// Give every record a value slot of `value_type`
    pub fn value_type(mut self, value_type: DataType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    /// Set the encoding tag
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set the default tokenizer
    pub fn default_tokenizer(mut self, name: impl Into<String>) -> Self {
        self.default_tokenizer = Some(name.into());
        self
    }

    /// Set the token filters
    pub fn token_filters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.token_filters = names.into_iter().map(Into::into).collect();
        self
    }

    /// Persist the table under `dir`
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// fsync every journal append
    pub fn journal_sync(mut self, enabled: bool) -> Self {
        self.journal_sync = enabled;
        self
    }
}
