use std::convert::TryFrom;
use std::ops::Index;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::{Error, Result};
use crate::marker::TypeTag;

/// The materialized form of a node in a [`ValueTree`][crate::ValueTree], or a value the caller
/// wants to write into one.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    Bin(Vec<u8>),
    /// Ticks of 100 nanoseconds since 0001-01-01T00:00:00.
    DateTime(i64),
    /// A back-reference to an enclosing shared value. Only produced where expanding the
    /// reference would recurse into itself.
    Reference(u32),
    Array(Vec<Value>),
    UniformArray(TypeTag, Vec<Value>),
    SparseArray { len: u32, entries: Vec<(u32, Value)> },
    Collection(Vec<Value>),
    Map(Vec<(Value, Value)>),
    UserType { type_id: u32, fields: Vec<Value> },
}

impl Value {
    /// The type this value encodes as when it is written tagged.
    pub fn tag(&self) -> TypeTag {
        match *self {
            Value::Null => TypeTag::Null,
            Value::Bool(_) => TypeTag::Bool,
            Value::I8(_) => TypeTag::I8,
            Value::I16(_) => TypeTag::I16,
            Value::I32(_) => TypeTag::I32,
            Value::I64(_) => TypeTag::I64,
            Value::U8(_) => TypeTag::U8,
            Value::U16(_) => TypeTag::U16,
            Value::U32(_) => TypeTag::U32,
            Value::U64(_) => TypeTag::U64,
            Value::F32(_) => TypeTag::F32,
            Value::F64(_) => TypeTag::F64,
            Value::Str(_) => TypeTag::Str,
            Value::Bin(_) => TypeTag::Bin,
            Value::DateTime(_) => TypeTag::DateTime,
            Value::Reference(_) => TypeTag::Reference,
            Value::Array(_) => TypeTag::Array,
            Value::UniformArray(..) => TypeTag::UniformArray,
            Value::SparseArray { .. } => TypeTag::SparseArray,
            Value::Collection(_) => TypeTag::Collection,
            Value::Map(_) => TypeTag::Map,
            Value::UserType { type_id, .. } => TypeTag::UserType(type_id),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_int(&self) -> bool {
        self.as_i128().is_some()
    }

    pub fn is_str(&self) -> bool {
        matches!(self, Value::Str(_))
    }

    pub fn is_composite(&self) -> bool {
        self.tag().is_composite()
    }

    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(val) = *self {
            Some(val)
        } else {
            None
        }
    }

    fn as_i128(&self) -> Option<i128> {
        Some(match *self {
            Value::I8(v) => v.into(),
            Value::I16(v) => v.into(),
            Value::I32(v) => v.into(),
            Value::I64(v) => v.into(),
            Value::U8(v) => v.into(),
            Value::U16(v) => v.into(),
            Value::U32(v) => v.into(),
            Value::U64(v) => v.into(),
            _ => return None,
        })
    }

    /// Get any integer value as an `i64`, if it fits.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_i128().and_then(|v| i64::try_from(v).ok())
    }

    /// Get any integer value as a `u64`, if it fits.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_i128().and_then(|v| u64::try_from(v).ok())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::F32(v) => Some(v.into()),
            Value::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Value::Str(ref val) = *self {
            Some(val)
        } else {
            None
        }
    }

    pub fn as_bin(&self) -> Option<&[u8]> {
        if let Value::Bin(ref val) = *self {
            Some(val)
        } else {
            None
        }
    }

    /// Get the items of any sequence-like value: arrays, uniform arrays, collections, and the
    /// fields of a user type.
    pub fn as_array(&self) -> Option<&[Value]> {
        match *self {
            Value::Array(ref v)
            | Value::UniformArray(_, ref v)
            | Value::Collection(ref v)
            | Value::UserType { fields: ref v, .. } => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match *self {
            Value::Map(ref map) => Some(map),
            _ => None,
        }
    }

    /// Convert this value to the requested type. Integers convert between widths when the value
    /// fits, integers and `F32` widen to floating point, and uniform arrays or collections can be
    /// read as plain arrays. Anything else fails with [`Error::TypeMismatch`].
    ///
    /// Small integers have no value form of their own; a value coerced to
    /// [`TypeTag::SmallInt`] comes back as an `I32` that fits in one signed byte.
    pub fn coerce(&self, tag: TypeTag) -> Result<Value> {
        let actual = self.tag();
        if actual == tag {
            return Ok(self.clone());
        }
        let mismatch = || Error::TypeMismatch {
            expected: tag,
            actual,
        };
        if tag.is_integer() {
            let n = self.as_i128().ok_or_else(mismatch)?;
            let converted = match tag {
                TypeTag::I8 => i8::try_from(n).map(Value::I8).ok(),
                TypeTag::I16 => i16::try_from(n).map(Value::I16).ok(),
                TypeTag::I32 => i32::try_from(n).map(Value::I32).ok(),
                TypeTag::I64 => i64::try_from(n).map(Value::I64).ok(),
                TypeTag::U8 => u8::try_from(n).map(Value::U8).ok(),
                TypeTag::U16 => u16::try_from(n).map(Value::U16).ok(),
                TypeTag::U32 => u32::try_from(n).map(Value::U32).ok(),
                TypeTag::U64 => u64::try_from(n).map(Value::U64).ok(),
                TypeTag::SmallInt => i8::try_from(n).map(|v| Value::I32(v.into())).ok(),
                _ => None,
            };
            return converted.ok_or_else(mismatch);
        }
        match (tag, self) {
            (TypeTag::F32, _) => self
                .as_i128()
                .map(|n| Value::F32(n as f32))
                .ok_or_else(mismatch),
            (TypeTag::F64, Value::F32(v)) => Ok(Value::F64((*v).into())),
            (TypeTag::F64, _) => self
                .as_i128()
                .map(|n| Value::F64(n as f64))
                .ok_or_else(mismatch),
            (TypeTag::Array, Value::UniformArray(_, items))
            | (TypeTag::Array, Value::Collection(items)) => Ok(Value::Array(items.clone())),
            _ => Err(mismatch()),
        }
    }
}

static NULL_REF: Value = Value::Null;

/// Support indexing into sequences and user type fields. If the index is out of range or the
/// value isn't sequence-like, this returns a [`Value::Null`].
impl Index<usize> for Value {
    type Output = Value;

    fn index(&self, index: usize) -> &Self::Output {
        self.as_array()
            .and_then(|v| v.get(index))
            .unwrap_or(&NULL_REF)
    }
}

/// Support looking up string keys in maps. If the key is not in the map, this returns a
/// [`Value::Null`].
impl Index<&str> for Value {
    type Output = Value;

    fn index(&self, index: &str) -> &Self::Output {
        self.as_map()
            .and_then(|map| map.iter().find(|(k, _)| k.as_str() == Some(index)))
            .map(|(_, v)| v)
            .unwrap_or(&NULL_REF)
    }
}

macro_rules! impl_value_from {
    ($t: ty, $p: ident) => {
        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$p(v)
            }
        }
    };
}

impl_value_from!(bool, Bool);
impl_value_from!(i8, I8);
impl_value_from!(i16, I16);
impl_value_from!(i32, I32);
impl_value_from!(i64, I64);
impl_value_from!(u8, U8);
impl_value_from!(u16, U16);
impl_value_from!(u32, U32);
impl_value_from!(u64, U64);
impl_value_from!(f32, F32);
impl_value_from!(f64, F64);
impl_value_from!(String, Str);
impl_value_from!(Vec<u8>, Bin);
impl_value_from!(Vec<Value>, Array);
impl_value_from!(Vec<(Value, Value)>, Map);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.into())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bin(v.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(v) => serializer.serialize_bool(v),
            Value::I8(v) => serializer.serialize_i8(v),
            Value::I16(v) => serializer.serialize_i16(v),
            Value::I32(v) => serializer.serialize_i32(v),
            Value::I64(v) => serializer.serialize_i64(v),
            Value::U8(v) => serializer.serialize_u8(v),
            Value::U16(v) => serializer.serialize_u16(v),
            Value::U32(v) => serializer.serialize_u32(v),
            Value::U64(v) => serializer.serialize_u64(v),
            Value::F32(v) => serializer.serialize_f32(v),
            Value::F64(v) => serializer.serialize_f64(v),
            Value::Str(ref v) => serializer.serialize_str(v),
            Value::Bin(ref v) => serde_bytes::Bytes::new(v).serialize(serializer),
            Value::DateTime(v) => serializer.serialize_newtype_struct("DateTime", &v),
            Value::Reference(id) => serializer.serialize_newtype_struct("Reference", &id),
            Value::Array(ref v)
            | Value::UniformArray(_, ref v)
            | Value::Collection(ref v)
            | Value::UserType { fields: ref v, .. } => {
                let mut seq = serializer.serialize_seq(Some(v.len()))?;
                for item in v {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::SparseArray { ref entries, .. } => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (index, item) in entries {
                    map.serialize_entry(index, item)?;
                }
                map.end()
            }
            Value::Map(ref v) => {
                let mut map = serializer.serialize_map(Some(v.len()))?;
                for (key, item) in v {
                    map.serialize_entry(key, item)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tags() {
        assert_eq!(Value::from(5i32).tag(), TypeTag::I32);
        assert_eq!(Value::from("hi").tag(), TypeTag::Str);
        assert_eq!(
            Value::UserType {
                type_id: 9,
                fields: vec![]
            }
            .tag(),
            TypeTag::UserType(9)
        );
        assert_eq!(Value::from(None::<i32>), Value::Null);
    }

    mod coerce {
        use super::*;

        #[test]
        fn integer_widths() {
            let v = Value::I32(99);
            assert_eq!(v.coerce(TypeTag::I64).unwrap(), Value::I64(99));
            assert_eq!(v.coerce(TypeTag::U8).unwrap(), Value::U8(99));
            assert_eq!(v.coerce(TypeTag::SmallInt).unwrap(), Value::I32(99));
            assert_eq!(
                Value::I32(300).coerce(TypeTag::U8),
                Err(Error::TypeMismatch {
                    expected: TypeTag::U8,
                    actual: TypeTag::I32
                })
            );
            assert!(Value::I32(-1).coerce(TypeTag::U64).is_err());
            assert!(Value::I32(200).coerce(TypeTag::SmallInt).is_err());
        }

        #[test]
        fn floats() {
            assert_eq!(Value::I16(3).coerce(TypeTag::F64).unwrap(), Value::F64(3.0));
            assert_eq!(Value::F32(1.5).coerce(TypeTag::F64).unwrap(), Value::F64(1.5));
            assert!(Value::F64(1.5).coerce(TypeTag::F32).is_err());
            assert!(Value::F64(1.0).coerce(TypeTag::I32).is_err());
        }

        #[test]
        fn composites() {
            let uniform = Value::UniformArray(TypeTag::I32, vec![Value::I32(1)]);
            assert_eq!(
                uniform.coerce(TypeTag::Array).unwrap(),
                Value::Array(vec![Value::I32(1)])
            );
            assert!(Value::I32(1).coerce(TypeTag::Array).is_err());
            assert!(Value::Array(vec![]).coerce(TypeTag::Map).is_err());
            assert!(Value::Str("x".into()).coerce(TypeTag::Bin).is_err());
        }
    }

    #[test]
    fn indexing() {
        let v = Value::Map(vec![
            (Value::from("a"), Value::from(1u8)),
            (Value::from("b"), Value::Array(vec![Value::from(true)])),
        ]);
        assert_eq!(v["a"], Value::U8(1));
        assert_eq!(v["b"][0], Value::Bool(true));
        assert_eq!(v["b"][1], Value::Null);
        assert_eq!(v["c"], Value::Null);
        assert_eq!(v.as_map().map(|m| m.len()), Some(2));
    }
}
