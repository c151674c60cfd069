use std::borrow::Cow;
use std::convert::TryFrom;

use crate::codec::{ScalarCodec, WireCodec};
use crate::error::{Error, Result};
use crate::marker::TypeTag;
use crate::value::Value;

/// Encode a value, marker included, using the standard [`WireCodec`].
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_tagged(&WireCodec, value, &mut buf)?;
    Ok(buf)
}

fn count_u32(count: usize, what: &str) -> Result<u32> {
    u32::try_from(count)
        .map_err(|_| Error::BadEncode(format!("Too many {} to encode: {}", what, count)))
}

/// Encode a value with its marker, as it would appear anywhere but inside a uniform array.
pub(crate) fn encode_tagged<C: ScalarCodec>(
    codec: &C,
    value: &Value,
    buf: &mut Vec<u8>,
) -> Result<()> {
    let tag = value.tag();
    tag.encode_header(buf);
    if tag.is_composite() {
        encode_body(codec, value, buf)
    } else {
        codec.encode(tag, value, buf)
    }
}

/// Encode a value as an element of a uniform array of `tag`: no marker, and converted to `tag`
/// first.
pub(crate) fn encode_untagged<C: ScalarCodec>(
    codec: &C,
    tag: TypeTag,
    value: &Value,
    buf: &mut Vec<u8>,
) -> Result<()> {
    let value = if value.tag() == tag {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(value.coerce(tag)?)
    };
    if tag.is_composite() {
        encode_body(codec, &value, buf)
    } else {
        codec.encode(tag, &value, buf)
    }
}

/// Encode everything in a composite value past its marker and user type id.
fn encode_body<C: ScalarCodec>(codec: &C, value: &Value, buf: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Array(items) | Value::Collection(items) => {
            buf.extend_from_slice(&count_u32(items.len(), "elements")?.to_le_bytes());
            for item in items {
                encode_tagged(codec, item, buf)?;
            }
        }
        Value::UniformArray(element, items) => {
            if !element.is_uniform_element() {
                return Err(Error::BadEncode(format!(
                    "{} cannot be the element type of a uniform array",
                    element
                )));
            }
            element.encode_header(buf);
            buf.extend_from_slice(&count_u32(items.len(), "elements")?.to_le_bytes());
            for item in items {
                encode_untagged(codec, *element, item, buf)?;
            }
        }
        Value::SparseArray { len, entries } => {
            buf.extend_from_slice(&len.to_le_bytes());
            buf.extend_from_slice(&count_u32(entries.len(), "sparse entries")?.to_le_bytes());
            for (index, item) in entries {
                if index >= len {
                    return Err(Error::BadEncode(format!(
                        "Sparse index {} is past the array length {}",
                        index, len
                    )));
                }
                buf.extend_from_slice(&index.to_le_bytes());
                encode_tagged(codec, item, buf)?;
            }
        }
        Value::Map(pairs) => {
            buf.extend_from_slice(&count_u32(pairs.len(), "map pairs")?.to_le_bytes());
            for (k, v) in pairs {
                encode_tagged(codec, k, buf)?;
                encode_tagged(codec, v, buf)?;
            }
        }
        Value::UserType { fields, .. } => {
            let count = u16::try_from(fields.len()).map_err(|_| {
                Error::BadEncode(format!("Too many user type fields: {}", fields.len()))
            })?;
            buf.extend_from_slice(&count.to_le_bytes());
            for field in fields {
                encode_tagged(codec, field, buf)?;
            }
        }
        value => {
            return Err(Error::BadEncode(format!(
                "{} is not a composite type",
                value.tag()
            )))
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn uniform_i32() {
        let value = Value::UniformArray(
            TypeTag::I32,
            vec![Value::I32(10), Value::I32(20), Value::I32(30)],
        );
        assert_eq!(
            encode(&value).unwrap(),
            vec![0x21, 0x05, 3, 0, 0, 0, 10, 0, 0, 0, 20, 0, 0, 0, 30, 0, 0, 0]
        );
    }

    #[test]
    fn uniform_elements_are_converted() {
        let value = Value::UniformArray(TypeTag::U16, vec![Value::U8(1), Value::I64(2)]);
        assert_eq!(
            encode(&value).unwrap(),
            vec![0x21, 0x08, 2, 0, 0, 0, 1, 0, 2, 0]
        );
        let value = Value::UniformArray(TypeTag::U8, vec![Value::I32(-1)]);
        assert!(matches!(
            encode(&value),
            Err(Error::TypeMismatch { .. })
        ));
        let value = Value::UniformArray(TypeTag::Null, vec![Value::Null]);
        assert!(matches!(encode(&value), Err(Error::BadEncode(_))));
    }

    #[test]
    fn user_type() {
        let value = Value::UserType {
            type_id: 3,
            fields: vec![Value::Bool(true), Value::from("a")],
        };
        assert_eq!(
            encode(&value).unwrap(),
            vec![0x25, 3, 0, 0, 0, 2, 0, 0x01, 1, 0x0d, 1, 0, 0, 0, b'a']
        );
        // Inside a uniform array, the type id lives in the array header only.
        let array = Value::UniformArray(TypeTag::UserType(3), vec![value]);
        assert_eq!(
            encode(&array).unwrap(),
            vec![0x21, 0x25, 3, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0x01, 1, 0x0d, 1, 0, 0, 0, b'a']
        );
    }

    #[test]
    fn map_and_sparse() {
        let value = Value::Map(vec![(Value::from("k"), Value::Null)]);
        assert_eq!(
            encode(&value).unwrap(),
            vec![0x24, 1, 0, 0, 0, 0x0d, 1, 0, 0, 0, b'k', 0x00]
        );
        let value = Value::SparseArray {
            len: 2,
            entries: vec![(2, Value::Null)],
        };
        assert!(encode(&value).is_err());
    }
}
