//! Closed type system shared by keys, value slots and columns.

use std::fmt;
use std::str::FromStr;

use crate::error::TableError;

/// Every type a key, value slot or column can be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    ShortText,
    Text,
    LongText,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
}

impl DataType {
    pub fn name(self) -> &'static str {
        match self {
            DataType::ShortText => "ShortText",
            DataType::Text => "Text",
            DataType::LongText => "LongText",
            DataType::Int8 => "Int8",
            DataType::UInt8 => "UInt8",
            DataType::Int16 => "Int16",
            DataType::UInt16 => "UInt16",
            DataType::Int32 => "Int32",
            DataType::UInt32 => "UInt32",
            DataType::Int64 => "Int64",
            DataType::UInt64 => "UInt64",
            DataType::Float => "Float",
        }
    }

    /// Byte width of fixed-size types, `None` for text types.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            DataType::Int8 | DataType::UInt8 => Some(1),
            DataType::Int16 | DataType::UInt16 => Some(2),
            DataType::Int32 | DataType::UInt32 => Some(4),
            DataType::Int64 | DataType::UInt64 | DataType::Float => Some(8),
            DataType::ShortText | DataType::Text | DataType::LongText => None,
        }
    }

    /// Upper bound on the byte length of text values.
    pub fn max_text_bytes(self) -> Option<usize> {
        match self {
            DataType::ShortText => Some(4 * 1024),
            DataType::Text => Some(64 * 1024),
            _ => None,
        }
    }

    pub fn is_text(self) -> bool {
        matches!(
            self,
            DataType::ShortText | DataType::Text | DataType::LongText
        )
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    }

    pub fn is_integer(self) -> bool {
        !self.is_text() && self != DataType::Float
    }

    /// Types a table can be keyed by.
    pub fn is_key_type(self) -> bool {
        self == DataType::ShortText || self.is_integer()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = match s {
            "ShortText" => DataType::ShortText,
            "Text" => DataType::Text,
            "LongText" => DataType::LongText,
            "Int8" => DataType::Int8,
            "UInt8" => DataType::UInt8,
            "Int16" => DataType::Int16,
            "UInt16" => DataType::UInt16,
            "Int32" => DataType::Int32,
            "UInt32" => DataType::UInt32,
            "Int64" => DataType::Int64,
            "UInt64" => DataType::UInt64,
            "Float" => DataType::Float,
            _ => return Err(TableError::NotFound(format!("type {s}"))),
        };
        Ok(ty)
    }
}

/// Character encoding tag carried by a table. Keys are stored as raw bytes;
/// the tag is metadata for display and tokenization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    None,
    #[default]
    Utf8,
    EucJp,
    ShiftJis,
    Latin1,
    Koi8r,
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Encoding::None => "none",
            Encoding::Utf8 => "utf8",
            Encoding::EucJp => "euc_jp",
            Encoding::ShiftJis => "sjis",
            Encoding::Latin1 => "latin1",
            Encoding::Koi8r => "koi8r",
        };
        f.write_str(name)
    }
}

/// Stable record identifier. The first record of a table gets id 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub(crate) u32);

impl RecordId {
    pub fn new(id: u32) -> Self {
        RecordId(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A key as supplied by or returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Bytes(Vec<u8>),
    Int(i64),
    UInt(u64),
}

impl Key {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Key::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Key::UInt(n) => Some(n),
            Key::Int(n) => u64::try_from(n).ok(),
            Key::Bytes(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Key::Int(n) => Some(n),
            Key::UInt(n) => i64::try_from(n).ok(),
            Key::Bytes(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Key::Int(n) => write!(f, "{n}"),
            Key::UInt(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Bytes(s.as_bytes().to_vec())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Bytes(s.into_bytes())
    }
}

impl From<&[u8]> for Key {
    fn from(b: &[u8]) -> Self {
        Key::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for Key {
    fn from(b: Vec<u8>) -> Self {
        Key::Bytes(b)
    }
}

macro_rules! key_from_int {
    ($variant:ident, $wide:ty: $($t:ty),*) => {
        $(
            impl From<$t> for Key {
                fn from(n: $t) -> Self {
                    Key::$variant(n as $wide)
                }
            }
        )*
    };
}

key_from_int!(UInt, u64: u8, u16, u32, u64);
key_from_int!(Int, i64: i8, i16, i32, i64);

/// A value slot or column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(n) => Some(n),
            Value::UInt(n) => i64::try_from(n).ok(),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

macro_rules! value_from_int {
    ($variant:ident, $wide:ty: $($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::$variant(n as $wide)
                }
            }
        )*
    };
}

value_from_int!(UInt, u64: u8, u16, u32, u64);
value_from_int!(Int, i64: i8, i16, i32, i64);

/// Handle to a live record: its id and decoded key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: RecordId,
    pub key: Key,
}

/// Result of an `add`: the record and whether this call created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Added {
    pub record: Record,
    pub created: bool,
}

impl Added {
    pub fn id(&self) -> RecordId {
        self.record.id
    }

    /// `true` only if this `add` created the record.
    pub fn is_added(&self) -> bool {
        self.created
    }
}

/// Addresses a record either by key or by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Key(Key),
    Id(RecordId),
}

impl From<RecordId> for Identifier {
    fn from(id: RecordId) -> Self {
        Identifier::Id(id)
    }
}

impl From<Key> for Identifier {
    fn from(key: Key) -> Self {
        Identifier::Key(key)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Identifier::Key(s.into())
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Identifier::Key(s.into())
    }
}
