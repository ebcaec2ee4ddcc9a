//! Plain, tree-free values.
//!
//! [`Value`] is how callers spell out a value when constructing a view or
//! setting a field, and what [`View::to_value`](crate::View::to_value)
//! returns. The schema decides how it is interpreted.

use serde::{Deserialize, Serialize};

use crate::error::ViewError;
use crate::schema::BasicType;

/// A value, interpreted against some schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    /// Any unsigned integer up to 128 bits; also accepted for `uint256`.
    Uint(u128),
    /// A `uint256` in little-endian byte order.
    Uint256([u8; 32]),
    /// Bitvector or bitlist contents, without sentinel.
    Bits(Vec<bool>),
    /// Vector or list elements.
    Sequence(Vec<Value>),
    /// Container field values in declaration order.
    Container(Vec<Value>),
    Union {
        selector: u32,
        value: Option<Box<Value>>,
    },
}

impl Value {
    /// A sequence of `uint8` values.
    #[must_use]
    pub fn bytes(bytes: &[u8]) -> Self {
        Self::Sequence(bytes.iter().map(|b| Self::Uint(u128::from(*b))).collect())
    }

    /// A sequence of unsigned integers.
    pub fn uints<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<u128>,
    {
        Self::Sequence(values.into_iter().map(|v| Self::Uint(v.into())).collect())
    }

    #[must_use]
    pub fn as_uint(&self) -> Option<u128> {
        match self {
            Self::Uint(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The contents of a byte sequence, if every element is a `u8`.
    #[must_use]
    pub fn as_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Self::Sequence(items) => items
                .iter()
                .map(|item| item.as_uint().and_then(|v| u8::try_from(v).ok()))
                .collect(),
            _ => None,
        }
    }
}

/// Little-endian serialization of a scalar.
pub(crate) fn basic_to_le_bytes(basic: BasicType, value: &Value) -> Result<Vec<u8>, ViewError> {
    let mismatch = || ViewError::TypeMismatch {
        expected: basic.name(),
    };
    match (basic, value) {
        (BasicType::Boolean, Value::Bool(b)) => Ok(vec![u8::from(*b)]),
        (BasicType::Uint256, Value::Uint256(le)) => Ok(le.to_vec()),
        (BasicType::Boolean, _) | (_, Value::Uint256(_)) => Err(mismatch()),
        (_, Value::Uint(v)) => {
            let size = basic.byte_len();
            let le = v.to_le_bytes();
            if size < le.len() && le[size..].iter().any(|b| *b != 0) {
                return Err(mismatch());
            }
            let mut out = vec![0u8; size];
            let copy = size.min(le.len());
            out[..copy].copy_from_slice(&le[..copy]);
            Ok(out)
        }
        _ => Err(mismatch()),
    }
}

/// Reads a scalar from its little-endian serialization.
///
/// Caller must ensure `bytes.len() == basic.byte_len()`.
pub(crate) fn basic_from_le_bytes(basic: BasicType, bytes: &[u8]) -> Value {
    match basic {
        BasicType::Boolean => Value::Bool(bytes[0] != 0),
        BasicType::Uint256 => {
            let mut le = [0u8; 32];
            le.copy_from_slice(bytes);
            Value::Uint256(le)
        }
        _ => {
            let mut le = [0u8; 16];
            le[..bytes.len()].copy_from_slice(bytes);
            Value::Uint(u128::from_le_bytes(le))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_bytes_are_little_endian() {
        assert_eq!(
            basic_to_le_bytes(BasicType::Uint16, &Value::Uint(0x0102)).unwrap(),
            vec![0x02, 0x01]
        );
        assert_eq!(
            basic_to_le_bytes(BasicType::Boolean, &Value::Bool(true)).unwrap(),
            vec![1]
        );
        let wide = basic_to_le_bytes(BasicType::Uint256, &Value::Uint(7)).unwrap();
        assert_eq!(wide.len(), 32);
        assert_eq!(wide[0], 7);
    }

    #[test]
    fn test_out_of_range_is_rejected() {
        assert_eq!(
            basic_to_le_bytes(BasicType::Uint8, &Value::Uint(256)),
            Err(ViewError::TypeMismatch { expected: "uint8" })
        );
        assert!(basic_to_le_bytes(BasicType::Uint64, &Value::Bool(true)).is_err());
        assert!(basic_to_le_bytes(BasicType::Boolean, &Value::Uint(1)).is_err());
        assert!(basic_to_le_bytes(BasicType::Uint128, &Value::Uint256([0; 32])).is_err());
    }

    #[test]
    fn test_round_trip_through_bytes() {
        for (basic, value) in [
            (BasicType::Uint32, Value::Uint(0xdead_beef)),
            (BasicType::Uint128, Value::Uint(u128::MAX)),
            (BasicType::Boolean, Value::Bool(false)),
            (BasicType::Uint256, Value::Uint256([9; 32])),
        ] {
            let bytes = basic_to_le_bytes(basic, &value).unwrap();
            assert_eq!(basic_from_le_bytes(basic, &bytes), value);
        }
    }

    #[test]
    fn test_bytes_helper() {
        let v = Value::bytes(&[1, 2, 3]);
        assert_eq!(v.as_bytes(), Some(vec![1, 2, 3]));
        assert_eq!(Value::uints([300u16]).as_bytes(), None);
    }
}
