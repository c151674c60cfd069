//! Scalar encoding and decoding.
//!
//! The tree only ever hands scalar payloads to a [`ScalarCodec`]: the marker byte has already
//! been read (or was omitted, for uniform array elements), and the codec reports exactly how many
//! payload bytes it consumed. Offsets throughout the tree depend on those counts being exact.

use std::convert::TryFrom;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};
use crate::marker::TypeTag;
use crate::value::Value;

/// Encoder and decoder for the payloads of scalar values.
pub trait ScalarCodec {
    /// Decode the payload of a scalar of type `tag` from the front of `data`, returning the value
    /// and the number of bytes consumed.
    fn decode(&self, tag: TypeTag, data: &[u8]) -> Result<(Value, usize)>;

    /// Find the length of the payload of a scalar of type `tag` at the front of `data`, without
    /// decoding it.
    fn skip(&self, tag: TypeTag, data: &[u8]) -> Result<usize> {
        self.decode(tag, data).map(|(_, len)| len)
    }

    /// Encode `value` as the payload of a scalar of type `tag`. The value must already have been
    /// coerced to `tag`.
    fn encode(&self, tag: TypeTag, value: &Value, buf: &mut Vec<u8>) -> Result<()>;
}

/// The codec for this crate's wire format: little-endian fixed-width numbers, and strings and
/// binary blobs prefixed with a 32-bit length.
#[derive(Clone, Copy, Debug, Default)]
pub struct WireCodec;

fn too_short(step: &'static str, actual: usize, expected: usize) -> Error {
    Error::LengthTooShort {
        step,
        actual,
        expected,
    }
}

fn not_scalar(tag: TypeTag) -> Error {
    Error::BadEncode(format!("{} is not a scalar type", tag))
}

/// Split a length-prefixed byte run off the front of `data`. Returns the bytes and the total
/// payload length, prefix included.
fn read_prefixed<'a>(mut data: &'a [u8], step: &'static str) -> Result<(&'a [u8], usize)> {
    let len = data
        .read_u32::<LittleEndian>()
        .map_err(|_| too_short(step, data.len(), 4))? as usize;
    if len > data.len() {
        return Err(too_short(step, data.len(), len));
    }
    Ok((&data[..len], 4 + len))
}

impl ScalarCodec for WireCodec {
    fn decode(&self, tag: TypeTag, data: &[u8]) -> Result<(Value, usize)> {
        let mut rd = data;
        let avail = data.len();
        let value = match tag {
            TypeTag::Null => Value::Null,
            TypeTag::Bool => match rd.read_u8().map_err(|_| too_short("decode Bool", avail, 1))? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                v => {
                    return Err(Error::BadEncode(format!(
                        "Got Bool with byte value = {}. Only 0 and 1 are allowed.",
                        v
                    )))
                }
            },
            TypeTag::I8 => Value::I8(rd.read_i8().map_err(|_| too_short("decode I8", avail, 1))?),
            TypeTag::I16 => Value::I16(
                rd.read_i16::<LittleEndian>()
                    .map_err(|_| too_short("decode I16", avail, 2))?,
            ),
            TypeTag::I32 => Value::I32(
                rd.read_i32::<LittleEndian>()
                    .map_err(|_| too_short("decode I32", avail, 4))?,
            ),
            TypeTag::I64 => Value::I64(
                rd.read_i64::<LittleEndian>()
                    .map_err(|_| too_short("decode I64", avail, 8))?,
            ),
            TypeTag::U8 => Value::U8(rd.read_u8().map_err(|_| too_short("decode U8", avail, 1))?),
            TypeTag::U16 => Value::U16(
                rd.read_u16::<LittleEndian>()
                    .map_err(|_| too_short("decode U16", avail, 2))?,
            ),
            TypeTag::U32 => Value::U32(
                rd.read_u32::<LittleEndian>()
                    .map_err(|_| too_short("decode U32", avail, 4))?,
            ),
            TypeTag::U64 => Value::U64(
                rd.read_u64::<LittleEndian>()
                    .map_err(|_| too_short("decode U64", avail, 8))?,
            ),
            TypeTag::F32 => Value::F32(
                rd.read_f32::<LittleEndian>()
                    .map_err(|_| too_short("decode F32", avail, 4))?,
            ),
            TypeTag::F64 => Value::F64(
                rd.read_f64::<LittleEndian>()
                    .map_err(|_| too_short("decode F64", avail, 8))?,
            ),
            TypeTag::DateTime => Value::DateTime(
                rd.read_i64::<LittleEndian>()
                    .map_err(|_| too_short("decode DateTime", avail, 8))?,
            ),
            TypeTag::SmallInt => Value::I32(
                rd.read_i8()
                    .map_err(|_| too_short("decode SmallInt", avail, 1))?
                    .into(),
            ),
            TypeTag::Reference => Value::Reference(
                rd.read_u32::<LittleEndian>()
                    .map_err(|_| too_short("decode Reference", avail, 4))?,
            ),
            TypeTag::Str => {
                let (bytes, len) = read_prefixed(data, "get Str content")?;
                let string =
                    std::str::from_utf8(bytes).map_err(|e| Error::BadEncode(format!("{}", e)))?;
                return Ok((Value::Str(string.into()), len));
            }
            TypeTag::Bin => {
                let (bytes, len) = read_prefixed(data, "get Bin content")?;
                return Ok((Value::Bin(bytes.into()), len));
            }
            _ => return Err(not_scalar(tag)),
        };
        Ok((value, avail - rd.len()))
    }

    fn skip(&self, tag: TypeTag, data: &[u8]) -> Result<usize> {
        if let Some(width) = tag.fixed_width() {
            if !tag.is_composite() {
                if width > data.len() {
                    return Err(too_short("skip scalar", data.len(), width));
                }
                return Ok(width);
            }
        }
        match tag {
            TypeTag::Str => read_prefixed(data, "skip Str content").map(|(_, len)| len),
            TypeTag::Bin => read_prefixed(data, "skip Bin content").map(|(_, len)| len),
            _ => Err(not_scalar(tag)),
        }
    }

    fn encode(&self, tag: TypeTag, value: &Value, buf: &mut Vec<u8>) -> Result<()> {
        match (tag, value) {
            (TypeTag::Null, Value::Null) => (),
            (TypeTag::Bool, Value::Bool(v)) => buf.push(*v as u8),
            (TypeTag::I8, Value::I8(v)) => buf.push(*v as u8),
            (TypeTag::I16, Value::I16(v)) => buf.extend_from_slice(&v.to_le_bytes()),
            (TypeTag::I32, Value::I32(v)) => buf.extend_from_slice(&v.to_le_bytes()),
            (TypeTag::I64, Value::I64(v)) => buf.extend_from_slice(&v.to_le_bytes()),
            (TypeTag::U8, Value::U8(v)) => buf.push(*v),
            (TypeTag::U16, Value::U16(v)) => buf.extend_from_slice(&v.to_le_bytes()),
            (TypeTag::U32, Value::U32(v)) => buf.extend_from_slice(&v.to_le_bytes()),
            (TypeTag::U64, Value::U64(v)) => buf.extend_from_slice(&v.to_le_bytes()),
            (TypeTag::F32, Value::F32(v)) => buf.extend_from_slice(&v.to_bits().to_le_bytes()),
            (TypeTag::F64, Value::F64(v)) => buf.extend_from_slice(&v.to_bits().to_le_bytes()),
            (TypeTag::DateTime, Value::DateTime(v)) => buf.extend_from_slice(&v.to_le_bytes()),
            (TypeTag::Reference, Value::Reference(v)) => buf.extend_from_slice(&v.to_le_bytes()),
            (TypeTag::SmallInt, Value::I32(v)) => {
                let v = i8::try_from(*v).map_err(|_| Error::TypeMismatch {
                    expected: TypeTag::SmallInt,
                    actual: TypeTag::I32,
                })?;
                buf.push(v as u8);
            }
            (TypeTag::Str, Value::Str(v)) => {
                let len = u32::try_from(v.len())
                    .map_err(|_| Error::BadEncode(format!("Str of {} bytes is too long", v.len())))?;
                buf.extend_from_slice(&len.to_le_bytes());
                buf.extend_from_slice(v.as_bytes());
            }
            (TypeTag::Bin, Value::Bin(v)) => {
                let len = u32::try_from(v.len())
                    .map_err(|_| Error::BadEncode(format!("Bin of {} bytes is too long", v.len())))?;
                buf.extend_from_slice(&len.to_le_bytes());
                buf.extend_from_slice(v);
            }
            (tag, _) if tag.is_composite() => return Err(not_scalar(tag)),
            (tag, value) => {
                return Err(Error::TypeMismatch {
                    expected: tag,
                    actual: value.tag(),
                })
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn roundtrip(tag: TypeTag, value: Value, expected: &[u8]) {
        let codec = WireCodec;
        let mut enc = Vec::new();
        codec.encode(tag, &value, &mut enc).unwrap();
        assert_eq!(enc, expected, "Encoding {:?} as {}", value, tag);
        let (dec, len) = codec.decode(tag, &enc).unwrap();
        assert_eq!(dec, value);
        assert_eq!(len, enc.len());
        assert_eq!(codec.skip(tag, &enc).unwrap(), enc.len());
    }

    #[test]
    fn fixed_width() {
        roundtrip(TypeTag::Null, Value::Null, &[]);
        roundtrip(TypeTag::Bool, Value::Bool(true), &[0x01]);
        roundtrip(TypeTag::I8, Value::I8(-2), &[0xfe]);
        roundtrip(TypeTag::I16, Value::I16(0x0102), &[0x02, 0x01]);
        roundtrip(TypeTag::I32, Value::I32(10), &[0x0a, 0, 0, 0]);
        roundtrip(TypeTag::U64, Value::U64(1 << 32), &[0, 0, 0, 0, 1, 0, 0, 0]);
        roundtrip(TypeTag::F32, Value::F32(1.0), &1.0f32.to_bits().to_le_bytes());
        roundtrip(TypeTag::DateTime, Value::DateTime(-1), &[0xff; 8]);
        roundtrip(TypeTag::Reference, Value::Reference(3), &[3, 0, 0, 0]);
    }

    #[test]
    fn small_int() {
        roundtrip(TypeTag::SmallInt, Value::I32(-5), &[0xfb]);
        let mut enc = Vec::new();
        let result = WireCodec.encode(TypeTag::SmallInt, &Value::I32(1000), &mut enc);
        assert!(result.is_err());
    }

    #[test]
    fn prefixed() {
        roundtrip(TypeTag::Str, Value::Str("hi".into()), &[2, 0, 0, 0, b'h', b'i']);
        roundtrip(TypeTag::Bin, Value::Bin(vec![9]), &[1, 0, 0, 0, 9]);
    }

    #[test]
    fn not_enough_bytes() {
        let codec = WireCodec;
        let cases: Vec<(TypeTag, Vec<u8>)> = vec![
            (TypeTag::I16, vec![0x01]),
            (TypeTag::I32, vec![0x01, 0x02, 0x03]),
            (TypeTag::F64, vec![0; 7]),
            (TypeTag::Str, vec![5, 0, 0, 0, b'a']),
            (TypeTag::Bin, vec![1, 0]),
        ];
        for (index, (tag, data)) in cases.iter().enumerate() {
            assert!(
                codec.decode(*tag, data).is_err(),
                "Decode test #{} should fail",
                index
            );
            assert!(
                codec.skip(*tag, data).is_err(),
                "Skip test #{} should fail",
                index
            );
        }
    }

    #[test]
    fn bad_values() {
        let codec = WireCodec;
        assert!(codec.decode(TypeTag::Bool, &[2]).is_err());
        assert!(codec.decode(TypeTag::Str, &[2, 0, 0, 0, 0xff, 0xfe]).is_err());
        assert!(codec.decode(TypeTag::Array, &[0, 0, 0, 0]).is_err());
        let mut buf = Vec::new();
        assert_eq!(
            codec.encode(TypeTag::I32, &Value::I64(1), &mut buf),
            Err(Error::TypeMismatch {
                expected: TypeTag::I32,
                actual: TypeTag::I64
            })
        );
    }
}
