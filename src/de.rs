//! Deserialization out of materialized values.
//!
//! Enum variants are read back the way [`ser`][crate::ser] writes them:
//! - Unit - Just the variant name as a string
//! - Newtype - Map with one pair. Key is variant name, content is the value
//! - Tuple - Map with one pair. Key is variant name, content is the tuple as an array
//! - Struct - Map with one pair. Key is variant name, content is the struct

use serde::de::value::BorrowedStrDeserializer;
use serde::de::Error as DeError;
use serde::de::*;

use crate::context::TypeContext;
use crate::error::{Error, Result};
use crate::marker::TypeTag;
use crate::value::Value;

/// Deserialize a `T` from a value. Structs whose name is registered in `context` must come from
/// a user type with the matching id.
pub fn from_value<'de, T: Deserialize<'de>>(value: &'de Value, context: &TypeContext) -> Result<T> {
    T::deserialize(ValueDeserializer { value, context })
}

#[derive(Clone, Copy)]
struct ValueDeserializer<'de, 'c> {
    value: &'de Value,
    context: &'c TypeContext,
}

impl<'de, 'c> ValueDeserializer<'de, 'c> {
    fn at(&self, value: &'de Value) -> Self {
        Self {
            value,
            context: self.context,
        }
    }

    fn unexpected(&self) -> Unexpected<'de> {
        match *self.value {
            Value::Null => Unexpected::Unit,
            Value::Bool(v) => Unexpected::Bool(v),
            Value::F32(v) => Unexpected::Float(v.into()),
            Value::F64(v) => Unexpected::Float(v),
            Value::Str(ref v) => Unexpected::Str(v),
            Value::Bin(ref v) => Unexpected::Bytes(v),
            Value::Array(_) | Value::UniformArray(..) | Value::Collection(_) => Unexpected::Seq,
            Value::Map(_) | Value::SparseArray { .. } => Unexpected::Map,
            Value::UserType { .. } => Unexpected::Other("user type"),
            Value::Reference(_) => Unexpected::Other("reference"),
            ref v => match v.as_i64() {
                Some(n) => Unexpected::Signed(n),
                None => Unexpected::Unsigned(v.as_u64().unwrap_or_default()),
            },
        }
    }
}

impl<'de, 'c> serde::Deserializer<'de> for ValueDeserializer<'de, 'c> {
    type Error = Error;

    fn is_human_readable(&self) -> bool {
        false
    }

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match *self.value {
            Value::Null => visitor.visit_unit(),
            Value::Bool(v) => visitor.visit_bool(v),
            Value::I8(v) => visitor.visit_i8(v),
            Value::I16(v) => visitor.visit_i16(v),
            Value::I32(v) => visitor.visit_i32(v),
            Value::I64(v) | Value::DateTime(v) => visitor.visit_i64(v),
            Value::U8(v) => visitor.visit_u8(v),
            Value::U16(v) => visitor.visit_u16(v),
            Value::U32(v) => visitor.visit_u32(v),
            Value::U64(v) => visitor.visit_u64(v),
            Value::F32(v) => visitor.visit_f32(v),
            Value::F64(v) => visitor.visit_f64(v),
            Value::Str(ref v) => visitor.visit_borrowed_str(v),
            Value::Bin(ref v) => visitor.visit_borrowed_bytes(v),
            Value::Reference(id) => Err(Error::SerdeFail(format!(
                "Identity {} refers back to a value containing it",
                id
            ))),
            Value::Array(ref items)
            | Value::UniformArray(_, ref items)
            | Value::Collection(ref items)
            | Value::UserType {
                fields: ref items, ..
            } => visitor.visit_seq(SeqAccess::new(self, items)),
            Value::Map(ref pairs) => visitor.visit_map(MapAccess::new(self, pairs)),
            Value::SparseArray { ref entries, .. } => {
                visitor.visit_map(SparseAccess::new(self, entries))
            }
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        if self.value.is_null() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        if let Value::UserType { type_id, .. } = *self.value {
            let actual = TypeTag::UserType(type_id);
            if let Some(expected) = self.context.tag_of(name) {
                if expected != actual {
                    return Err(Error::TypeMismatch { expected, actual });
                }
            }
        }
        self.deserialize_any(visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match *self.value {
            Value::Str(ref variant) => visitor.visit_enum(EnumAccess {
                de: self,
                variant,
                content: None,
            }),
            Value::Map(ref pairs) if pairs.len() == 1 => {
                let (key, content) = &pairs[0];
                let variant = key.as_str().ok_or_else(|| {
                    Error::invalid_type(self.at(key).unexpected(), &"variant name")
                })?;
                visitor.visit_enum(EnumAccess {
                    de: self,
                    variant,
                    content: Some(content),
                })
            }
            _ => Err(Error::invalid_type(self.unexpected(), &"enum variant")),
        }
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 u8 u16 u32 u64 f32 f64 char str
        string bytes byte_buf unit unit_struct
        seq tuple tuple_struct map identifier ignored_any
    }
}

struct EnumAccess<'de, 'c> {
    de: ValueDeserializer<'de, 'c>,
    variant: &'de str,
    content: Option<&'de Value>,
}

impl<'de, 'c> serde::de::EnumAccess<'de> for EnumAccess<'de, 'c> {
    type Error = Error;
    type Variant = Self;

    fn variant_seed<V>(self, seed: V) -> Result<(V::Value, Self::Variant)>
    where
        V: DeserializeSeed<'de>,
    {
        let variant = seed.deserialize(BorrowedStrDeserializer::<Error>::new(self.variant))?;
        Ok((variant, self))
    }
}

impl<'de, 'c> EnumAccess<'de, 'c> {
    fn content(&self) -> Result<ValueDeserializer<'de, 'c>> {
        self.content.map(|v| self.de.at(v)).ok_or_else(|| {
            Error::invalid_type(Unexpected::UnitVariant, &"variant with content")
        })
    }
}

impl<'de, 'c> serde::de::VariantAccess<'de> for EnumAccess<'de, 'c> {
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        match self.content {
            None | Some(Value::Null) => Ok(()),
            Some(v) => Err(Error::invalid_type(self.de.at(v).unexpected(), &"unit variant")),
        }
    }

    fn newtype_variant_seed<T>(self, seed: T) -> Result<T::Value>
    where
        T: DeserializeSeed<'de>,
    {
        seed.deserialize(self.content()?)
    }

    fn tuple_variant<V>(self, _len: usize, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        serde::Deserializer::deserialize_seq(self.content()?, visitor)
    }

    fn struct_variant<V>(self, _fields: &'static [&'static str], visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        serde::Deserializer::deserialize_map(self.content()?, visitor)
    }
}

struct SeqAccess<'de, 'c> {
    de: ValueDeserializer<'de, 'c>,
    iter: std::slice::Iter<'de, Value>,
}

impl<'de, 'c> SeqAccess<'de, 'c> {
    fn new(de: ValueDeserializer<'de, 'c>, items: &'de [Value]) -> Self {
        Self {
            de,
            iter: items.iter(),
        }
    }
}

impl<'de, 'c> serde::de::SeqAccess<'de> for SeqAccess<'de, 'c> {
    type Error = Error;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>>
    where
        T: DeserializeSeed<'de>,
    {
        match self.iter.next() {
            Some(item) => seed.deserialize(self.de.at(item)).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct MapAccess<'de, 'c> {
    de: ValueDeserializer<'de, 'c>,
    iter: std::slice::Iter<'de, (Value, Value)>,
    value: Option<&'de Value>,
}

impl<'de, 'c> MapAccess<'de, 'c> {
    fn new(de: ValueDeserializer<'de, 'c>, pairs: &'de [(Value, Value)]) -> Self {
        Self {
            de,
            iter: pairs.iter(),
            value: None,
        }
    }
}

impl<'de, 'c> serde::de::MapAccess<'de> for MapAccess<'de, 'c> {
    type Error = Error;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>>
    where
        K: DeserializeSeed<'de>,
    {
        match self.iter.next() {
            Some((k, v)) => {
                self.value = Some(v);
                seed.deserialize(self.de.at(k)).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value>
    where
        V: DeserializeSeed<'de>,
    {
        let value = self
            .value
            .take()
            .ok_or_else(|| Error::SerdeFail(String::from("map value requested before its key")))?;
        seed.deserialize(self.de.at(value))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

/// Sparse arrays read as maps from index to entry.
struct SparseAccess<'de, 'c> {
    de: ValueDeserializer<'de, 'c>,
    iter: std::slice::Iter<'de, (u32, Value)>,
    value: Option<&'de Value>,
}

impl<'de, 'c> SparseAccess<'de, 'c> {
    fn new(de: ValueDeserializer<'de, 'c>, entries: &'de [(u32, Value)]) -> Self {
        Self {
            de,
            iter: entries.iter(),
            value: None,
        }
    }
}

impl<'de, 'c> serde::de::MapAccess<'de> for SparseAccess<'de, 'c> {
    type Error = Error;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>>
    where
        K: DeserializeSeed<'de>,
    {
        match self.iter.next() {
            Some((index, v)) => {
                self.value = Some(v);
                seed.deserialize(IntoDeserializer::<Error>::into_deserializer(*index))
                    .map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value>
    where
        V: DeserializeSeed<'de>,
    {
        let value = self
            .value
            .take()
            .ok_or_else(|| Error::SerdeFail(String::from("entry requested before its index")))?;
        seed.deserialize(self.de.at(value))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    fn ctx() -> TypeContext {
        TypeContext::new().with_type("Point", 4)
    }

    #[derive(Debug, PartialEq, Deserialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn scalars() {
        let ctx = ctx();
        assert_eq!(from_value::<bool>(&Value::Bool(true), &ctx), Ok(true));
        assert_eq!(from_value::<u8>(&Value::I32(200), &ctx), Ok(200));
        assert!(from_value::<u8>(&Value::I32(-1), &ctx).is_err());
        assert_eq!(from_value::<f64>(&Value::F32(1.5), &ctx), Ok(1.5));
        assert_eq!(from_value::<&str>(&Value::from("hi"), &ctx), Ok("hi"));
        assert_eq!(from_value::<Option<u16>>(&Value::Null, &ctx), Ok(None));
        assert_eq!(from_value::<Option<u16>>(&Value::U16(3), &ctx), Ok(Some(3)));
    }

    #[test]
    fn user_type() {
        let value = Value::UserType {
            type_id: 4,
            fields: vec![Value::I32(1), Value::I32(-2)],
        };
        assert_eq!(from_value::<Point>(&value, &ctx()), Ok(Point { x: 1, y: -2 }));
        assert_eq!(
            from_value::<Point>(&value, &TypeContext::new().with_type("Point", 5)),
            Err(Error::TypeMismatch {
                expected: TypeTag::UserType(5),
                actual: TypeTag::UserType(4)
            })
        );
    }

    #[test]
    fn struct_from_map() {
        let value = Value::Map(vec![
            (Value::from("y"), Value::I64(7)),
            (Value::from("x"), Value::U8(3)),
        ]);
        assert_eq!(from_value::<Point>(&value, &ctx()), Ok(Point { x: 3, y: 7 }));
    }

    #[test]
    fn sequences() {
        let value = Value::UniformArray(TypeTag::U16, vec![Value::U16(1), Value::U16(2)]);
        assert_eq!(from_value::<Vec<u32>>(&value, &ctx()), Ok(vec![1, 2]));
        let value = Value::SparseArray {
            len: 9,
            entries: vec![(2, Value::from("b")), (8, Value::from("h"))],
        };
        let map: BTreeMap<u32, String> = from_value(&value, &ctx()).unwrap();
        assert_eq!(map.get(&8).map(String::as_str), Some("h"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn enums() {
        #[derive(Debug, PartialEq, Deserialize)]
        enum Shape {
            Empty,
            Circle(f64),
            Pair(u8, u8),
            Rect { w: u32, h: u32 },
        }
        let ctx = ctx();
        assert_eq!(from_value(&Value::from("Empty"), &ctx), Ok(Shape::Empty));
        let circle = Value::Map(vec![(Value::from("Circle"), Value::F64(2.0))]);
        assert_eq!(from_value(&circle, &ctx), Ok(Shape::Circle(2.0)));
        let pair = Value::Map(vec![(
            Value::from("Pair"),
            Value::Array(vec![Value::U8(1), Value::U8(2)]),
        )]);
        assert_eq!(from_value(&pair, &ctx), Ok(Shape::Pair(1, 2)));
        let rect = Value::Map(vec![(
            Value::from("Rect"),
            Value::Map(vec![
                (Value::from("w"), Value::U32(3)),
                (Value::from("h"), Value::U32(4)),
            ]),
        )]);
        assert_eq!(from_value(&rect, &ctx), Ok(Shape::Rect { w: 3, h: 4 }));
        assert!(from_value::<Shape>(&Value::I32(0), &ctx).is_err());
    }

    #[test]
    fn cyclic_reference() {
        assert!(matches!(
            from_value::<u32>(&Value::Reference(1), &ctx()),
            Err(Error::SerdeFail(_))
        ));
    }
}
