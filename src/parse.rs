//! Reading value headers, skipping over encoded values, and decoding them in full.
//!
//! Containers don't record where their children start. Finding child `k` means walking over
//! children `0..k`, so everything here works from a byte position and returns the position just
//! past what it read.

use byteorder::{LittleEndian, ReadBytesExt};
use tracing::trace;

use crate::codec::ScalarCodec;
use crate::depth_tracking::DepthTracker;
use crate::error::{Error, Result};
use crate::marker::{Marker, TypeTag};
use crate::registry::ReferenceRegistry;
use crate::tree::Span;
use crate::value::Value;

/// How the children of a composite value are laid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Layout {
    /// Every child carries its own marker.
    Tagged,
    /// Children omit their marker; all of them have this type.
    Uniform(TypeTag),
    /// Each child is preceded by its 32-bit position in an array of the given length.
    Sparse(u32),
}

/// The decoded header of a composite value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Shape {
    pub count: usize,
    pub layout: Layout,
    /// Position of the first child.
    pub start: usize,
}

impl Shape {
    pub fn element(&self) -> Option<TypeTag> {
        match self.layout {
            Layout::Uniform(tag) => Some(tag),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum Body {
    /// A scalar's payload runs from `payload` up to `end`.
    Scalar { payload: usize, end: usize },
    Composite(Shape),
}

/// Everything known about a value after reading its header, before walking its children.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Head {
    pub offset: usize,
    pub tag: TypeTag,
    pub identity: Option<u32>,
    pub body: Body,
}

pub(crate) fn read_u8(buf: &[u8], pos: usize, step: &'static str) -> Result<u8> {
    let mut data = buf.get(pos..).unwrap_or(&[]);
    data.read_u8().map_err(|_| Error::LengthTooShort {
        step,
        actual: 0,
        expected: 1,
    })
}

pub(crate) fn read_u16(buf: &[u8], pos: usize, step: &'static str) -> Result<u16> {
    let mut data = buf.get(pos..).unwrap_or(&[]);
    let actual = data.len();
    data.read_u16::<LittleEndian>()
        .map_err(|_| Error::LengthTooShort {
            step,
            actual,
            expected: 2,
        })
}

pub(crate) fn read_u32(buf: &[u8], pos: usize, step: &'static str) -> Result<u32> {
    let mut data = buf.get(pos..).unwrap_or(&[]);
    let actual = data.len();
    data.read_u32::<LittleEndian>()
        .map_err(|_| Error::LengthTooShort {
            step,
            actual,
            expected: 4,
        })
}

/// Put decoded children back together into the value of their container.
pub(crate) fn assemble(
    tag: TypeTag,
    layout: Layout,
    items: Vec<Value>,
    indices: Vec<u32>,
) -> Result<Value> {
    Ok(match (tag, layout) {
        (TypeTag::Array, Layout::Tagged) => Value::Array(items),
        (TypeTag::Collection, Layout::Tagged) => Value::Collection(items),
        (TypeTag::UniformArray, Layout::Uniform(element)) => Value::UniformArray(element, items),
        (TypeTag::SparseArray, Layout::Sparse(len)) => Value::SparseArray {
            len,
            entries: indices.into_iter().zip(items).collect(),
        },
        (TypeTag::Map, Layout::Tagged) => {
            let mut pairs = Vec::with_capacity(items.len() / 2);
            let mut iter = items.into_iter();
            while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
                pairs.push((k, v));
            }
            Value::Map(pairs)
        }
        (TypeTag::UserType(type_id), Layout::Tagged) => Value::UserType {
            type_id,
            fields: items,
        },
        (tag, layout) => {
            return Err(Error::BadEncode(format!(
                "{} cannot have children laid out as {:?}",
                tag, layout
            )))
        }
    })
}

/// Walks the original buffer. Holds the tree's identity registry for as long as it runs, so that
/// identities are registered the moment their value's extent is known.
pub(crate) struct Scanner<'a, C> {
    buf: &'a [u8],
    codec: &'a C,
    registry: &'a mut Option<ReferenceRegistry<Span>>,
    depth: DepthTracker,
    /// How many more values `decode_value` may produce.
    budget: usize,
}

impl<'a, C: ScalarCodec> Scanner<'a, C> {
    pub fn new(
        buf: &'a [u8],
        codec: &'a C,
        registry: &'a mut Option<ReferenceRegistry<Span>>,
        max_depth: usize,
    ) -> Self {
        Self {
            buf,
            codec,
            registry,
            depth: DepthTracker::new(max_depth),
            budget: usize::MAX,
        }
    }

    /// Limit the number of values decoding may produce.
    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    /// The number of values decoding may still produce.
    pub fn budget(&self) -> usize {
        self.budget
    }

    fn charge(&mut self) -> Result<()> {
        self.budget = self.budget.checked_sub(1).ok_or_else(|| {
            Error::ParseLimit("Expanding references produced too many values".to_string())
        })?;
        Ok(())
    }

    /// Read the header of the value at `offset`. If `untagged` is set, the value has no marker
    /// and is of that type.
    pub fn read_head(&self, offset: usize, untagged: Option<TypeTag>) -> Result<Head> {
        let (tag, identity, pos) = match untagged {
            Some(tag) => (tag, None, offset),
            None => self.read_tag(offset)?,
        };
        let body = if tag.is_composite() {
            Body::Composite(self.read_shape(tag, pos)?)
        } else {
            let data = self.buf.get(pos..).unwrap_or(&[]);
            let len = self.codec.skip(tag, data)?;
            Body::Scalar {
                payload: pos,
                end: pos + len,
            }
        };
        Ok(Head {
            offset,
            tag,
            identity,
            body,
        })
    }

    fn read_tag(&self, offset: usize) -> Result<(TypeTag, Option<u32>, usize)> {
        let mut pos = offset;
        let mut marker = Marker::from_u8(read_u8(self.buf, pos, "read marker")?);
        pos += 1;
        let mut identity = None;
        if marker == Marker::Identified {
            identity = Some(read_u32(self.buf, pos, "read identity")?);
            pos += 4;
            marker = Marker::from_u8(read_u8(self.buf, pos, "read identified marker")?);
            pos += 1;
        }
        let tag = match marker {
            Marker::UserType => {
                let id = read_u32(self.buf, pos, "read user type id")?;
                pos += 4;
                TypeTag::UserType(id)
            }
            Marker::Identified => {
                return Err(Error::BadEncode(String::from(
                    "Identity prefix applied to another identity prefix",
                )))
            }
            marker => TypeTag::from_marker(marker).ok_or_else(|| {
                Error::BadEncode(format!("Reserved marker 0x{:x} found", marker.into_u8()))
            })?,
        };
        if identity.is_some() && !tag.is_composite() {
            return Err(Error::BadEncode(format!(
                "Identity prefix applied to scalar type {}",
                tag
            )));
        }
        Ok((tag, identity, pos))
    }

    fn read_shape(&self, tag: TypeTag, mut pos: usize) -> Result<Shape> {
        let (count, layout) = match tag {
            TypeTag::Array | TypeTag::Collection => {
                let count = read_u32(self.buf, pos, "read element count")? as usize;
                pos += 4;
                (count, Layout::Tagged)
            }
            TypeTag::Map => {
                let pairs = read_u32(self.buf, pos, "read map pair count")? as usize;
                pos += 4;
                (2 * pairs, Layout::Tagged)
            }
            TypeTag::UniformArray => {
                let marker = Marker::from_u8(read_u8(self.buf, pos, "read element type")?);
                pos += 1;
                let element = match marker {
                    Marker::UserType => {
                        let id = read_u32(self.buf, pos, "read element user type id")?;
                        pos += 4;
                        TypeTag::UserType(id)
                    }
                    marker => TypeTag::from_marker(marker)
                        .filter(|t| t.is_uniform_element())
                        .ok_or_else(|| {
                            Error::BadEncode(format!(
                                "Marker 0x{:x} is not a valid uniform element type",
                                marker.into_u8()
                            ))
                        })?,
                };
                let count = read_u32(self.buf, pos, "read element count")? as usize;
                pos += 4;
                (count, Layout::Uniform(element))
            }
            TypeTag::SparseArray => {
                let len = read_u32(self.buf, pos, "read sparse array length")?;
                let entries = read_u32(self.buf, pos + 4, "read sparse entry count")?;
                pos += 8;
                if entries > len {
                    return Err(Error::BadEncode(format!(
                        "Sparse array of length {} claims {} entries",
                        len, entries
                    )));
                }
                (entries as usize, Layout::Sparse(len))
            }
            TypeTag::UserType(_) => {
                // The type id, if tagged, was read along with the marker.
                let count = read_u16(self.buf, pos, "read field count")? as usize;
                pos += 2;
                (count, Layout::Tagged)
            }
            tag => return Err(Error::BadEncode(format!("{} is not a composite type", tag))),
        };
        // Every child takes up at least one byte.
        let remaining = self.buf.len().saturating_sub(pos);
        if count > remaining {
            return Err(Error::BadEncode(format!(
                "Got {} with {} children, but there are only {} bytes left.",
                tag, count, remaining
            )));
        }
        Ok(Shape {
            count,
            layout,
            start: pos,
        })
    }

    /// Step over any sparse index prefix at `pos`, returning where the child value itself starts.
    pub fn entry_start(&self, pos: usize, shape: &Shape) -> Result<usize> {
        match shape.layout {
            Layout::Sparse(len) => {
                let index = read_u32(self.buf, pos, "read sparse index")?;
                if index >= len {
                    return Err(Error::BadEncode(format!(
                        "Sparse index {} is past the array length {}",
                        index, len
                    )));
                }
                Ok(pos + 4)
            }
            _ => Ok(pos),
        }
    }

    /// Skip one child of a container, starting at `pos`. Returns the position of the next one.
    pub fn skip_entry(&mut self, pos: usize, shape: &Shape) -> Result<usize> {
        let start = self.entry_start(pos, shape)?;
        self.skip_value(start, shape.element())
    }

    /// Skip the whole value at `offset`, returning the position just past it.
    pub fn skip_value(&mut self, offset: usize, untagged: Option<TypeTag>) -> Result<usize> {
        let head = self.read_head(offset, untagged)?;
        self.finish(&head)
    }

    /// Find where a value whose header has already been read ends, registering its identity if
    /// it has one.
    pub fn finish(&mut self, head: &Head) -> Result<usize> {
        let end = match head.body {
            Body::Scalar { end, .. } => end,
            Body::Composite(ref shape) => {
                self.depth.enter()?;
                let mut pos = shape.start;
                for _ in 0..shape.count {
                    pos = self.skip_entry(pos, shape)?;
                }
                self.depth.exit();
                pos
            }
        };
        if let Some(id) = head.identity {
            self.register(
                id,
                Span {
                    offset: head.offset,
                    len: end - head.offset,
                },
            )?;
        }
        Ok(end)
    }

    fn register(&mut self, id: u32, span: Span) -> Result<()> {
        trace!(id, offset = span.offset, len = span.len, "registering identity");
        self.registry
            .get_or_insert_with(ReferenceRegistry::new)
            .register(id, span)
    }

    /// Decode the complete value at `offset`, expanding any references inside it. `expanding`
    /// holds the identities currently being expanded; a reference back to one of them is left as
    /// [`Value::Reference`].
    pub fn decode_value(
        &mut self,
        offset: usize,
        untagged: Option<TypeTag>,
        expanding: &mut Vec<u32>,
    ) -> Result<(Value, usize)> {
        self.charge()?;
        let head = self.read_head(offset, untagged)?;
        match head.body {
            Body::Scalar { payload, end } => {
                let (value, _) = self.codec.decode(head.tag, &self.buf[payload..end])?;
                let value = match value {
                    Value::Reference(id) => self.expand_reference(id, expanding)?,
                    value => value,
                };
                Ok((value, end))
            }
            Body::Composite(shape) => {
                self.depth.enter()?;
                let mut pos = shape.start;
                let mut items = Vec::with_capacity(shape.count);
                let mut indices = Vec::new();
                for _ in 0..shape.count {
                    if let Layout::Sparse(_) = shape.layout {
                        indices.push(read_u32(self.buf, pos, "read sparse index")?);
                    }
                    let start = self.entry_start(pos, &shape)?;
                    let (item, end) = self.decode_value(start, shape.element(), expanding)?;
                    items.push(item);
                    pos = end;
                }
                self.depth.exit();
                if let Some(id) = head.identity {
                    self.register(
                        id,
                        Span {
                            offset: head.offset,
                            len: pos - head.offset,
                        },
                    )?;
                }
                Ok((assemble(head.tag, shape.layout, items, indices)?, pos))
            }
        }
    }

    /// Decode the value an identity names.
    pub fn expand_reference(&mut self, id: u32, expanding: &mut Vec<u32>) -> Result<Value> {
        if expanding.contains(&id) {
            return Ok(Value::Reference(id));
        }
        let span = *self
            .registry
            .as_ref()
            .ok_or(Error::UnknownIdentity(id))?
            .lookup(id)?;
        expanding.push(id);
        self.depth.enter()?;
        let (value, _) = self.decode_value(span.offset, None, expanding)?;
        self.depth.exit();
        expanding.pop();
        Ok(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::WireCodec;
    use crate::MAX_DEPTH;

    fn scan(buf: &[u8]) -> Result<(Value, usize)> {
        let mut registry = None;
        let mut scanner = Scanner::new(buf, &WireCodec, &mut registry, MAX_DEPTH);
        scanner.decode_value(0, None, &mut Vec::new())
    }

    #[test]
    fn scalar_head() {
        let buf = [0x05, 10, 0, 0, 0];
        let mut registry = None;
        let scanner = Scanner::new(&buf, &WireCodec, &mut registry, MAX_DEPTH);
        let head = scanner.read_head(0, None).unwrap();
        assert_eq!(head.tag, TypeTag::I32);
        match head.body {
            Body::Scalar { payload, end } => {
                assert_eq!(payload, 1);
                assert_eq!(end, 5);
            }
            Body::Composite(_) => panic!("I32 should be a scalar"),
        }
    }

    #[test]
    fn uniform_shape() {
        let buf = [0x21, 0x05, 3, 0, 0, 0, 10, 0, 0, 0, 20, 0, 0, 0, 30, 0, 0, 0];
        let mut registry = None;
        let mut scanner = Scanner::new(&buf, &WireCodec, &mut registry, MAX_DEPTH);
        let head = scanner.read_head(0, None).unwrap();
        match head.body {
            Body::Composite(shape) => {
                assert_eq!(shape.count, 3);
                assert_eq!(shape.layout, Layout::Uniform(TypeTag::I32));
                assert_eq!(shape.start, 6);
            }
            Body::Scalar { .. } => panic!("Uniform array should be composite"),
        }
        assert_eq!(scanner.finish(&head).unwrap(), buf.len());
        assert_eq!(
            scan(&buf).unwrap().0,
            Value::UniformArray(
                TypeTag::I32,
                vec![Value::I32(10), Value::I32(20), Value::I32(30)]
            )
        );
    }

    #[test]
    fn sparse() {
        // Length 5, two entries: [1] = true, [4] = 7u8
        let buf = [
            0x22, 5, 0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 0x01, 1, 4, 0, 0, 0, 0x07, 7,
        ];
        assert_eq!(
            scan(&buf).unwrap(),
            (
                Value::SparseArray {
                    len: 5,
                    entries: vec![(1, Value::Bool(true)), (4, Value::U8(7))]
                },
                buf.len()
            )
        );
        let mut bad = buf;
        bad[15] = 5;
        assert!(scan(&bad).is_err());
    }

    #[test]
    fn reserved_marker() {
        for marker in [0x02u8, 0x12, 0x26, 0x31, 0xff] {
            assert!(
                scan(&[marker, 0, 0, 0, 0]).is_err(),
                "0x{:x} should fail because it is a reserved marker byte",
                marker
            );
        }
    }

    #[test]
    fn too_many_children() {
        let buf = [0x20, 0xff, 0xff, 0xff, 0xff, 0x00];
        assert!(matches!(scan(&buf), Err(Error::BadEncode(_))));
    }

    #[test]
    fn depth_limit() {
        let mut buf = Vec::new();
        for _ in 0..4 {
            buf.extend_from_slice(&[0x20, 1, 0, 0, 0]);
        }
        buf.push(0x00);
        let mut registry = None;
        let mut scanner = Scanner::new(&buf, &WireCodec, &mut registry, 3);
        assert!(matches!(
            scanner.skip_value(0, None),
            Err(Error::ParseLimit(_))
        ));
        let mut scanner = Scanner::new(&buf, &WireCodec, &mut registry, 4);
        assert_eq!(scanner.skip_value(0, None).unwrap(), buf.len());
    }

    #[test]
    fn identities() {
        // [ #9 Collection[1u8], Ref(9) ]
        let buf = [
            0x20, 2, 0, 0, 0, 0x30, 9, 0, 0, 0, 0x23, 1, 0, 0, 0, 0x07, 1, 0x11, 9, 0, 0, 0,
        ];
        let mut registry = None;
        let mut scanner = Scanner::new(&buf, &WireCodec, &mut registry, MAX_DEPTH);
        assert_eq!(scanner.skip_value(0, None).unwrap(), buf.len());
        assert_eq!(
            registry.as_ref().unwrap().lookup(9),
            Ok(&Span { offset: 5, len: 12 })
        );
        let shared = Value::Collection(vec![Value::U8(1)]);
        assert_eq!(
            scan(&buf).unwrap().0,
            Value::Array(vec![shared.clone(), shared])
        );
    }

    #[test]
    fn expansion_budget() {
        // [ #9 Collection[1u8], Ref(9) ] decodes six values, counting the reference itself
        let buf = [
            0x20, 2, 0, 0, 0, 0x30, 9, 0, 0, 0, 0x23, 1, 0, 0, 0, 0x07, 1, 0x11, 9, 0, 0, 0,
        ];
        let mut registry = None;
        let mut scanner = Scanner::new(&buf, &WireCodec, &mut registry, MAX_DEPTH).with_budget(6);
        scanner.decode_value(0, None, &mut Vec::new()).unwrap();
        assert_eq!(scanner.budget(), 0);

        let mut registry = None;
        let mut scanner = Scanner::new(&buf, &WireCodec, &mut registry, MAX_DEPTH).with_budget(5);
        assert!(matches!(
            scanner.decode_value(0, None, &mut Vec::new()),
            Err(Error::ParseLimit(_))
        ));
    }

    #[test]
    fn cyclic_identity() {
        // #1 Array[ Ref(1) ]
        let buf = [0x30, 1, 0, 0, 0, 0x20, 1, 0, 0, 0, 0x11, 1, 0, 0, 0];
        let mut registry = None;
        let mut scanner = Scanner::new(&buf, &WireCodec, &mut registry, MAX_DEPTH);
        scanner.skip_value(0, None).unwrap();
        let value = scanner.expand_reference(1, &mut Vec::new()).unwrap();
        assert_eq!(value, Value::Array(vec![Value::Reference(1)]));
    }

    #[test]
    fn unknown_identity() {
        let buf = [0x11, 4, 0, 0, 0];
        assert_eq!(scan(&buf), Err(Error::UnknownIdentity(4)));
    }

    #[test]
    fn bad_identity_prefix() {
        assert!(scan(&[0x30, 1, 0, 0, 0, 0x05, 0, 0, 0, 0]).is_err());
        assert!(scan(&[0x30, 1, 0, 0, 0, 0x30, 1, 0, 0, 0]).is_err());
    }
}
