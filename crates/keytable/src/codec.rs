//! # Key codec
//!
//! Maps typed keys and values to the byte strings stored in the trie, the
//! record store and the variable heap.
//!
//! Keys are encoded so that byte-lexicographic order equals the natural
//! order of the key type:
//!
//! ```text
//! ShortText  raw bytes (at most 4096)
//! UIntN      big-endian, N/8 bytes
//! IntN       big-endian, N/8 bytes, sign bit flipped
//! ```
//!
//! Values (value slots and column cells) only need to round-trip, so
//! numbers are stored little-endian at the type's width and text as UTF-8.

use crate::error::{corrupt, Result, TableError};
use crate::types::{DataType, Key, Value};

/// Longest `ShortText` key, in bytes.
pub const MAX_KEY_BYTES: usize = 4096;

/// Encodes `key` for a table keyed by `key_type`.
///
/// # Errors
///
/// [`TableError::InvalidKeyType`] when the key cannot be represented in
/// `key_type`.
pub fn encode_key(key: &Key, key_type: DataType) -> Result<Vec<u8>> {
    let invalid = |reason: String| TableError::InvalidKeyType { key_type, reason };

    if key_type == DataType::ShortText {
        return match key {
            Key::Bytes(b) if b.len() > MAX_KEY_BYTES => Err(invalid(format!(
                "{} bytes exceeds the {MAX_KEY_BYTES} byte limit",
                b.len()
            ))),
            Key::Bytes(b) => Ok(b.clone()),
            other => Err(invalid(format!("{other} is not a string"))),
        };
    }
    if !key_type.is_key_type() {
        return Err(invalid("not a key type".into()));
    }

    let n: i128 = match *key {
        Key::Int(n) => n.into(),
        Key::UInt(n) => n.into(),
        Key::Bytes(_) => return Err(invalid(format!("{key:?} is not an integer"))),
    };
    let bits = to_bits(n, key_type).map_err(invalid)?;
    let width = width_of(key_type)?;
    let bits = if key_type.is_signed() {
        bits ^ sign_bit(width)
    } else {
        bits
    };
    Ok(bits.to_be_bytes()[8 - width..].to_vec())
}

/// Decodes bytes produced by [`encode_key`].
///
/// # Errors
///
/// [`TableError::CorruptIndex`] when the width does not match `key_type`.
pub fn decode_key(bytes: &[u8], key_type: DataType) -> Result<Key> {
    if key_type == DataType::ShortText {
        return Ok(Key::Bytes(bytes.to_vec()));
    }
    let width = width_of(key_type)?;
    if bytes.len() != width {
        return Err(corrupt(format!(
            "{key_type} key has {} bytes, expected {width}",
            bytes.len()
        )));
    }
    let mut buf = [0u8; 8];
    buf[8 - width..].copy_from_slice(bytes);
    let bits = u64::from_be_bytes(buf);
    if key_type.is_signed() {
        Ok(Key::Int(sign_extend(bits ^ sign_bit(width), width)))
    } else {
        Ok(Key::UInt(bits))
    }
}

/// Encodes a slot or column value of type `data_type`.
///
/// # Errors
///
/// [`TableError::InvalidValue`] when the value kind does not match the type
/// or the value does not fit.
pub fn encode_value(value: &Value, data_type: DataType) -> Result<Vec<u8>> {
    let invalid = |reason: String| TableError::InvalidValue { data_type, reason };

    if data_type.is_text() {
        let Value::Text(s) = value else {
            return Err(invalid(format!("{value:?} is not text")));
        };
        if let Some(max) = data_type.max_text_bytes() {
            if s.len() > max {
                return Err(invalid(format!(
                    "{} bytes exceeds the {max} byte limit",
                    s.len()
                )));
            }
        }
        return Ok(s.as_bytes().to_vec());
    }

    if data_type == DataType::Float {
        let f = match *value {
            Value::Float(f) => f,
            Value::Int(n) => n as f64,
            Value::UInt(n) => n as f64,
            Value::Text(_) => return Err(invalid(format!("{value:?} is not a number"))),
        };
        return Ok(f.to_le_bytes().to_vec());
    }

    let n: i128 = match *value {
        Value::Int(n) => n.into(),
        Value::UInt(n) => n.into(),
        _ => return Err(invalid(format!("{value:?} is not an integer"))),
    };
    let bits = to_bits(n, data_type).map_err(invalid)?;
    let width = width_of(data_type)?;
    Ok(bits.to_le_bytes()[..width].to_vec())
}

/// Decodes bytes produced by [`encode_value`].
pub fn decode_value(bytes: &[u8], data_type: DataType) -> Result<Value> {
    if data_type.is_text() {
        return String::from_utf8(bytes.to_vec())
            .map(Value::Text)
            .map_err(|e| corrupt(format!("{data_type} value is not UTF-8: {e}")));
    }
    let width = width_of(data_type)?;
    if bytes.len() != width {
        return Err(corrupt(format!(
            "{data_type} value has {} bytes, expected {width}",
            bytes.len()
        )));
    }
    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(bytes);
    let bits = u64::from_le_bytes(buf);
    Ok(match data_type {
        DataType::Float => Value::Float(f64::from_bits(bits)),
        t if t.is_signed() => Value::Int(sign_extend(bits, width)),
        _ => Value::UInt(bits),
    })
}

fn width_of(data_type: DataType) -> Result<usize> {
    data_type
        .fixed_width()
        .ok_or_else(|| corrupt(format!("{data_type} has no fixed width")))
}

fn sign_bit(width: usize) -> u64 {
    1u64 << (width * 8 - 1)
}

fn sign_extend(bits: u64, width: usize) -> i64 {
    let shift = 64 - width as u32 * 8;
    ((bits << shift) as i64) >> shift
}

/// Range-checks `n` against an integer type and returns its two's complement
/// bits truncated to the type's width.
fn to_bits(n: i128, data_type: DataType) -> std::result::Result<u64, String> {
    let (min, max): (i128, i128) = match data_type {
        DataType::Int8 => (i8::MIN.into(), i8::MAX.into()),
        DataType::UInt8 => (0, u8::MAX.into()),
        DataType::Int16 => (i16::MIN.into(), i16::MAX.into()),
        DataType::UInt16 => (0, u16::MAX.into()),
        DataType::Int32 => (i32::MIN.into(), i32::MAX.into()),
        DataType::UInt32 => (0, u32::MAX.into()),
        DataType::Int64 => (i64::MIN.into(), i64::MAX.into()),
        DataType::UInt64 => (0, u64::MAX.into()),
        other => return Err(format!("{other} is not an integer type")),
    };
    if n < min || n > max {
        return Err(format!("{n} is out of range"));
    }
    let width = data_type.fixed_width().unwrap_or(8);
    let mask = if width == 8 {
        u64::MAX
    } else {
        (1u64 << (width * 8)) - 1
    };
    Ok((n as u64) & mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(key: impl Into<Key>, ty: DataType) -> Vec<u8> {
        encode_key(&key.into(), ty).unwrap()
    }

    #[test]
    fn strings_are_identity() {
        assert_eq!(enc("/usr/bin", DataType::ShortText), b"/usr/bin");
        assert_eq!(enc("", DataType::ShortText), b"");
        assert_eq!(
            decode_key(b"/tmp", DataType::ShortText).unwrap(),
            Key::from("/tmp")
        );
    }

    #[test]
    fn short_text_limit() {
        let long = "x".repeat(MAX_KEY_BYTES + 1);
        assert!(matches!(
            encode_key(&Key::from(long), DataType::ShortText),
            Err(TableError::InvalidKeyType { .. })
        ));
        assert!(encode_key(&Key::from("x".repeat(MAX_KEY_BYTES)), DataType::ShortText).is_ok());
    }

    #[test]
    fn unsigned_big_endian() {
        assert_eq!(enc(5u32, DataType::UInt32), vec![0, 0, 0, 5]);
        assert_eq!(enc(258u32, DataType::UInt16), vec![1, 2]);
        assert_eq!(
            decode_key(&[0, 0, 0, 7], DataType::UInt32).unwrap(),
            Key::UInt(7)
        );
    }

    #[test]
    fn signed_order_matches_numeric_order() {
        let nums = [i32::MIN, -100, -1, 0, 1, 100, i32::MAX];
        let encoded: Vec<_> = nums.iter().map(|&n| enc(n, DataType::Int32)).collect();
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);
        for (n, bytes) in nums.iter().zip(&encoded) {
            assert_eq!(
                decode_key(bytes, DataType::Int32).unwrap(),
                Key::Int(i64::from(*n))
            );
        }
        assert_eq!(enc(-1i8, DataType::Int8), vec![0x7F]);
        assert_eq!(enc(0i8, DataType::Int8), vec![0x80]);
    }

    #[test]
    fn rejects_unrepresentable_keys() {
        let cases = [
            (Key::Int(-1), DataType::UInt32),
            (Key::UInt(256), DataType::UInt8),
            (Key::Int(i64::from(i16::MAX) + 1), DataType::Int16),
            (Key::from("abc"), DataType::Int64),
            (Key::UInt(1), DataType::ShortText),
            (Key::from("abc"), DataType::Text),
            (Key::UInt(1), DataType::Float),
        ];
        for (key, ty) in cases {
            assert!(
                matches!(encode_key(&key, ty), Err(TableError::InvalidKeyType { .. })),
                "{key:?} as {ty}"
            );
        }
    }

    #[test]
    fn wrong_width_is_corrupt() {
        assert!(matches!(
            decode_key(&[1, 2, 3], DataType::UInt32),
            Err(TableError::CorruptIndex(_))
        ));
        assert!(matches!(
            decode_value(&[1], DataType::Int16),
            Err(TableError::CorruptIndex(_))
        ));
    }

    #[test]
    fn values_round_trip() {
        let cases = [
            (Value::Int(-42), DataType::Int16),
            (Value::UInt(u64::MAX), DataType::UInt64),
            (Value::Float(1.5), DataType::Float),
            (Value::from("Rroonga"), DataType::Text),
        ];
        for (value, ty) in cases {
            let bytes = encode_value(&value, ty).unwrap();
            assert_eq!(decode_value(&bytes, ty).unwrap(), value);
        }
        assert_eq!(
            decode_value(&[0u8; 4], DataType::Int32).unwrap(),
            Value::Int(0)
        );
    }

    #[test]
    fn value_bounds() {
        let short = Value::Text("x".repeat(4097));
        assert!(matches!(
            encode_value(&short, DataType::ShortText),
            Err(TableError::InvalidValue { .. })
        ));
        assert!(encode_value(&short, DataType::Text).is_ok());
        assert!(encode_value(&short, DataType::LongText).is_ok());
        assert!(matches!(
            encode_value(&Value::from("12"), DataType::Int32),
            Err(TableError::InvalidValue { .. })
        ));
        assert!(matches!(
            encode_value(&Value::Int(-1), DataType::UInt8),
            Err(TableError::InvalidValue { .. })
        ));
    }
}
