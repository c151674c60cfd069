//! Serialization into values.
//!
//! Structs whose name is registered in the [`TypeContext`] become user types, with their fields in
//! declaration order. Any other struct becomes a map keyed by field name.
//!
//! Enum variants, when mapped, are:
//! - Unit - Just the variant name as a string
//! - Newtype - Map with one pair. Key is variant name, content is the value
//! - Tuple - Map with one pair. Key is variant name, content is the tuple as an array
//! - Struct - Map with one pair. Key is variant name, content is the struct

use serde::ser::*;

use crate::context::TypeContext;
use crate::error::{Error, Result};
use crate::marker::TypeTag;
use crate::value::Value;

/// Convert any serializable type into a [`Value`].
pub fn to_value<T: Serialize + ?Sized>(value: &T, context: &TypeContext) -> Result<Value> {
    value.serialize(ValueSerializer { context })
}

fn variant(name: &'static str, content: Value) -> Value {
    Value::Map(vec![(Value::from(name), content)])
}

#[derive(Clone, Copy)]
struct ValueSerializer<'c> {
    context: &'c TypeContext,
}

impl<'c> Serializer for ValueSerializer<'c> {
    type Ok = Value;
    type Error = Error;
    type SerializeSeq = SeqSerializer<'c>;
    type SerializeTuple = SeqSerializer<'c>;
    type SerializeTupleStruct = SeqSerializer<'c>;
    type SerializeTupleVariant = SeqSerializer<'c>;
    type SerializeMap = MapSerializer<'c>;
    type SerializeStruct = StructSerializer<'c>;
    type SerializeStructVariant = StructSerializer<'c>;

    fn is_human_readable(&self) -> bool {
        false
    }

    fn serialize_bool(self, v: bool) -> Result<Value> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value> {
        Ok(Value::I8(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Value> {
        Ok(Value::I16(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Value> {
        Ok(Value::I32(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Value> {
        Ok(Value::I64(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Value> {
        Ok(Value::U8(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Value> {
        Ok(Value::U16(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Value> {
        Ok(Value::U32(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Value> {
        Ok(Value::U64(v))
    }

    fn serialize_f32(self, v: f32) -> Result<Value> {
        Ok(Value::F32(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Value> {
        Ok(Value::F64(v))
    }

    fn serialize_char(self, v: char) -> Result<Value> {
        Ok(Value::Str(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_none(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value> {
        Ok(Value::from(variant))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        name: &'static str,
        value: &T,
    ) -> Result<Value> {
        Ok(variant(name, value.serialize(self)?))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqSerializer<'c>> {
        Ok(SeqSerializer::new(self.context, len, None))
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqSerializer<'c>> {
        Ok(SeqSerializer::new(self.context, Some(len), None))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqSerializer<'c>> {
        Ok(SeqSerializer::new(self.context, Some(len), None))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        name: &'static str,
        len: usize,
    ) -> Result<SeqSerializer<'c>> {
        Ok(SeqSerializer::new(self.context, Some(len), Some(name)))
    }

    fn serialize_map(self, len: Option<usize>) -> Result<MapSerializer<'c>> {
        Ok(MapSerializer {
            context: self.context,
            pairs: Vec::with_capacity(len.unwrap_or(0)),
            key: None,
        })
    }

    fn serialize_struct(self, name: &'static str, len: usize) -> Result<StructSerializer<'c>> {
        let type_id = match self.context.tag_of(name) {
            Some(TypeTag::UserType(id)) => Some(id),
            _ => None,
        };
        Ok(StructSerializer::new(self.context, type_id, len, None))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        name: &'static str,
        len: usize,
    ) -> Result<StructSerializer<'c>> {
        Ok(StructSerializer::new(self.context, None, len, Some(name)))
    }
}

struct SeqSerializer<'c> {
    context: &'c TypeContext,
    items: Vec<Value>,
    variant: Option<&'static str>,
}

impl<'c> SeqSerializer<'c> {
    fn new(context: &'c TypeContext, len: Option<usize>, variant: Option<&'static str>) -> Self {
        Self {
            context,
            items: Vec::with_capacity(len.unwrap_or(0)),
            variant,
        }
    }

    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let value = to_value(value, self.context)?;
        self.items.push(value);
        Ok(())
    }

    fn finish(self) -> Result<Value> {
        let array = Value::Array(self.items);
        Ok(match self.variant {
            Some(name) => variant(name, array),
            None => array,
        })
    }
}

impl<'c> SerializeSeq for SeqSerializer<'c> {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        self.finish()
    }
}

impl<'c> SerializeTuple for SeqSerializer<'c> {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        self.finish()
    }
}

impl<'c> SerializeTupleStruct for SeqSerializer<'c> {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        self.finish()
    }
}

impl<'c> SerializeTupleVariant for SeqSerializer<'c> {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        self.finish()
    }
}

struct MapSerializer<'c> {
    context: &'c TypeContext,
    pairs: Vec<(Value, Value)>,
    key: Option<Value>,
}

impl<'c> SerializeMap for MapSerializer<'c> {
    type Ok = Value;
    type Error = Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<()> {
        self.key = Some(to_value(key, self.context)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let key = self
            .key
            .take()
            .ok_or_else(|| Error::SerdeFail(String::from("map value written before its key")))?;
        self.pairs.push((key, to_value(value, self.context)?));
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Map(self.pairs))
    }
}

struct StructSerializer<'c> {
    context: &'c TypeContext,
    type_id: Option<u32>,
    fields: Vec<(&'static str, Value)>,
    variant: Option<&'static str>,
}

impl<'c> StructSerializer<'c> {
    fn new(
        context: &'c TypeContext,
        type_id: Option<u32>,
        len: usize,
        variant: Option<&'static str>,
    ) -> Self {
        Self {
            context,
            type_id,
            fields: Vec::with_capacity(len),
            variant,
        }
    }

    fn push<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()> {
        let value = to_value(value, self.context)?;
        self.fields.push((key, value));
        Ok(())
    }

    fn finish(self) -> Result<Value> {
        let content = match self.type_id {
            Some(type_id) => Value::UserType {
                type_id,
                fields: self.fields.into_iter().map(|(_, v)| v).collect(),
            },
            None => Value::Map(
                self.fields
                    .into_iter()
                    .map(|(k, v)| (Value::from(k), v))
                    .collect(),
            ),
        };
        Ok(match self.variant {
            Some(name) => variant(name, content),
            None => content,
        })
    }
}

impl<'c> SerializeStruct for StructSerializer<'c> {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.push(key, value)
    }

    fn end(self) -> Result<Value> {
        self.finish()
    }
}

impl<'c> SerializeStructVariant for StructSerializer<'c> {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.push(key, value)
    }

    fn end(self) -> Result<Value> {
        self.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::de::from_value;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    enum Shape {
        Empty,
        Circle(f64),
        Pair(u8, u8),
        Rect { w: u32, h: u32 },
    }

    #[test]
    fn registered_struct() {
        let ctx = TypeContext::new().with_type("Point", 4);
        let value = to_value(&Point { x: 1, y: 2 }, &ctx).unwrap();
        assert_eq!(
            value,
            Value::UserType {
                type_id: 4,
                fields: vec![Value::I32(1), Value::I32(2)]
            }
        );
        assert_eq!(from_value::<Point>(&value, &ctx), Ok(Point { x: 1, y: 2 }));
    }

    #[test]
    fn unregistered_struct() {
        let ctx = TypeContext::new();
        let value = to_value(&Point { x: 1, y: 2 }, &ctx).unwrap();
        assert_eq!(value["x"], Value::I32(1));
        assert_eq!(value["y"], Value::I32(2));
        assert_eq!(from_value::<Point>(&value, &ctx), Ok(Point { x: 1, y: 2 }));
    }

    #[test]
    fn enums() {
        let ctx = TypeContext::new();
        let shapes = vec![
            Shape::Empty,
            Shape::Circle(0.5),
            Shape::Pair(3, 4),
            Shape::Rect { w: 10, h: 20 },
        ];
        let value = to_value(&shapes, &ctx).unwrap();
        assert_eq!(value[0], Value::from("Empty"));
        assert_eq!(value[1]["Circle"], Value::F64(0.5));
        assert_eq!(value[2]["Pair"][1], Value::U8(4));
        assert_eq!(value[3]["Rect"]["h"], Value::U32(20));
        assert_eq!(from_value::<Vec<Shape>>(&value, &ctx), Ok(shapes));
    }

    #[test]
    fn options_and_bytes() {
        let ctx = TypeContext::new();
        assert_eq!(to_value(&None::<u8>, &ctx), Ok(Value::Null));
        assert_eq!(to_value(&Some(5u8), &ctx), Ok(Value::U8(5)));
        assert_eq!(
            to_value(serde_bytes::Bytes::new(&[1, 2]), &ctx),
            Ok(Value::Bin(vec![1, 2]))
        );
        assert_eq!(to_value(&'c', &ctx), Ok(Value::from("c")));
    }
}
