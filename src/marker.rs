use std::fmt;

/// Wire format markers. Every tagged value begins with one of these bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    Null,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Str,
    Bin,
    DateTime,
    SmallInt,
    Reference,
    Array,
    UniformArray,
    SparseArray,
    Collection,
    Map,
    UserType,
    Identified,
    Reserved(u8),
}

impl Marker {
    /// Construct a marker from a single byte.
    pub fn from_u8(n: u8) -> Marker {
        match n {
            0x00 => Marker::Null,
            0x01 => Marker::Bool,
            0x03 => Marker::I8,
            0x04 => Marker::I16,
            0x05 => Marker::I32,
            0x06 => Marker::I64,
            0x07 => Marker::U8,
            0x08 => Marker::U16,
            0x09 => Marker::U32,
            0x0a => Marker::U64,
            0x0b => Marker::F32,
            0x0c => Marker::F64,
            0x0d => Marker::Str,
            0x0e => Marker::Bin,
            0x0f => Marker::DateTime,
            0x10 => Marker::SmallInt,
            0x11 => Marker::Reference,
            0x20 => Marker::Array,
            0x21 => Marker::UniformArray,
            0x22 => Marker::SparseArray,
            0x23 => Marker::Collection,
            0x24 => Marker::Map,
            0x25 => Marker::UserType,
            0x30 => Marker::Identified,
            n => Marker::Reserved(n),
        }
    }

    /// Converts a marker object into a single-byte representation.
    pub fn into_u8(self) -> u8 {
        match self {
            Marker::Null => 0x00,
            Marker::Bool => 0x01,
            Marker::I8 => 0x03,
            Marker::I16 => 0x04,
            Marker::I32 => 0x05,
            Marker::I64 => 0x06,
            Marker::U8 => 0x07,
            Marker::U16 => 0x08,
            Marker::U32 => 0x09,
            Marker::U64 => 0x0a,
            Marker::F32 => 0x0b,
            Marker::F64 => 0x0c,
            Marker::Str => 0x0d,
            Marker::Bin => 0x0e,
            Marker::DateTime => 0x0f,
            Marker::SmallInt => 0x10,
            Marker::Reference => 0x11,
            Marker::Array => 0x20,
            Marker::UniformArray => 0x21,
            Marker::SparseArray => 0x22,
            Marker::Collection => 0x23,
            Marker::Map => 0x24,
            Marker::UserType => 0x25,
            Marker::Identified => 0x30,
            Marker::Reserved(n) => n,
        }
    }
}

impl From<u8> for Marker {
    fn from(val: u8) -> Marker {
        Marker::from_u8(val)
    }
}

impl From<Marker> for u8 {
    fn from(val: Marker) -> u8 {
        val.into_u8()
    }
}

/// The type of a value in the tree: a scalar kind, or one of the composite kinds.
///
/// User types carry the numeric type id found in their header. A [`TypeContext`] maps those ids
/// to and from type names.
///
/// [`TypeContext`]: crate::TypeContext
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Null,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Str,
    Bin,
    DateTime,
    /// A small integer whose width was left off the wire. Its real width can only be recovered
    /// from whoever reads it.
    SmallInt,
    Reference,
    Array,
    UniformArray,
    SparseArray,
    Collection,
    Map,
    UserType(u32),
}

impl TypeTag {
    /// Get the type tag for a scalar or composite marker. Returns `None` for the identity prefix,
    /// reserved markers, and user types (whose tag needs the type id that follows the marker).
    pub fn from_marker(marker: Marker) -> Option<TypeTag> {
        Some(match marker {
            Marker::Null => TypeTag::Null,
            Marker::Bool => TypeTag::Bool,
            Marker::I8 => TypeTag::I8,
            Marker::I16 => TypeTag::I16,
            Marker::I32 => TypeTag::I32,
            Marker::I64 => TypeTag::I64,
            Marker::U8 => TypeTag::U8,
            Marker::U16 => TypeTag::U16,
            Marker::U32 => TypeTag::U32,
            Marker::U64 => TypeTag::U64,
            Marker::F32 => TypeTag::F32,
            Marker::F64 => TypeTag::F64,
            Marker::Str => TypeTag::Str,
            Marker::Bin => TypeTag::Bin,
            Marker::DateTime => TypeTag::DateTime,
            Marker::SmallInt => TypeTag::SmallInt,
            Marker::Reference => TypeTag::Reference,
            Marker::Array => TypeTag::Array,
            Marker::UniformArray => TypeTag::UniformArray,
            Marker::SparseArray => TypeTag::SparseArray,
            Marker::Collection => TypeTag::Collection,
            Marker::Map => TypeTag::Map,
            Marker::UserType | Marker::Identified | Marker::Reserved(_) => return None,
        })
    }

    pub fn marker(self) -> Marker {
        match self {
            TypeTag::Null => Marker::Null,
            TypeTag::Bool => Marker::Bool,
            TypeTag::I8 => Marker::I8,
            TypeTag::I16 => Marker::I16,
            TypeTag::I32 => Marker::I32,
            TypeTag::I64 => Marker::I64,
            TypeTag::U8 => Marker::U8,
            TypeTag::U16 => Marker::U16,
            TypeTag::U32 => Marker::U32,
            TypeTag::U64 => Marker::U64,
            TypeTag::F32 => Marker::F32,
            TypeTag::F64 => Marker::F64,
            TypeTag::Str => Marker::Str,
            TypeTag::Bin => Marker::Bin,
            TypeTag::DateTime => Marker::DateTime,
            TypeTag::SmallInt => Marker::SmallInt,
            TypeTag::Reference => Marker::Reference,
            TypeTag::Array => Marker::Array,
            TypeTag::UniformArray => Marker::UniformArray,
            TypeTag::SparseArray => Marker::SparseArray,
            TypeTag::Collection => Marker::Collection,
            TypeTag::Map => Marker::Map,
            TypeTag::UserType(_) => Marker::UserType,
        }
    }

    /// True for the kinds that have children.
    pub fn is_composite(self) -> bool {
        matches!(
            self,
            TypeTag::Array
                | TypeTag::UniformArray
                | TypeTag::SparseArray
                | TypeTag::Collection
                | TypeTag::Map
                | TypeTag::UserType(_)
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            TypeTag::I8
                | TypeTag::I16
                | TypeTag::I32
                | TypeTag::I64
                | TypeTag::U8
                | TypeTag::U16
                | TypeTag::U32
                | TypeTag::U64
                | TypeTag::SmallInt
        )
    }

    /// Whether values of this type may appear as the untagged elements of a uniform array.
    pub fn is_uniform_element(self) -> bool {
        !matches!(self, TypeTag::Null | TypeTag::Reference)
    }

    /// Payload width in bytes for scalars whose encoding has a fixed size.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            TypeTag::Null => Some(0),
            TypeTag::Bool | TypeTag::I8 | TypeTag::U8 | TypeTag::SmallInt => Some(1),
            TypeTag::I16 | TypeTag::U16 => Some(2),
            TypeTag::I32 | TypeTag::U32 | TypeTag::F32 | TypeTag::Reference => Some(4),
            TypeTag::I64 | TypeTag::U64 | TypeTag::F64 | TypeTag::DateTime => Some(8),
            _ => None,
        }
    }

    /// Write this tag the way a uniform array header records its element type: the marker byte,
    /// followed by the type id for user types.
    pub fn encode_header(self, buf: &mut Vec<u8>) {
        buf.push(self.marker().into());
        if let TypeTag::UserType(id) = self {
            buf.extend_from_slice(&id.to_le_bytes());
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TypeTag::Null => "Null",
            TypeTag::Bool => "Bool",
            TypeTag::I8 => "I8",
            TypeTag::I16 => "I16",
            TypeTag::I32 => "I32",
            TypeTag::I64 => "I64",
            TypeTag::U8 => "U8",
            TypeTag::U16 => "U16",
            TypeTag::U32 => "U32",
            TypeTag::U64 => "U64",
            TypeTag::F32 => "F32",
            TypeTag::F64 => "F64",
            TypeTag::Str => "Str",
            TypeTag::Bin => "Bin",
            TypeTag::DateTime => "DateTime",
            TypeTag::SmallInt => "SmallInt",
            TypeTag::Reference => "Reference",
            TypeTag::Array => "Array",
            TypeTag::UniformArray => "UniformArray",
            TypeTag::SparseArray => "SparseArray",
            TypeTag::Collection => "Collection",
            TypeTag::Map => "Map",
            TypeTag::UserType(_) => "UserType",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TypeTag::UserType(id) => write!(f, "UserType({})", id),
            _ => f.write_str(self.name()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn marker_bytes() {
        for n in 0..=u8::MAX {
            let marker = Marker::from_u8(n);
            assert_eq!(marker.into_u8(), n, "Marker 0x{:x} should round trip", n);
        }
        assert_eq!(Marker::from_u8(0x02), Marker::Reserved(0x02));
        assert_eq!(Marker::from_u8(0xff), Marker::Reserved(0xff));
    }

    #[test]
    fn tags_from_markers() {
        assert_eq!(TypeTag::from_marker(Marker::I32), Some(TypeTag::I32));
        assert_eq!(TypeTag::from_marker(Marker::UniformArray), Some(TypeTag::UniformArray));
        assert_eq!(TypeTag::from_marker(Marker::UserType), None);
        assert_eq!(TypeTag::from_marker(Marker::Identified), None);
        assert_eq!(TypeTag::UserType(7).marker(), Marker::UserType);
    }

    #[test]
    fn uniform_header() {
        let mut buf = Vec::new();
        TypeTag::I32.encode_header(&mut buf);
        assert_eq!(buf, &[0x05]);
        let mut buf = Vec::new();
        TypeTag::UserType(0x0102).encode_header(&mut buf);
        assert_eq!(buf, &[0x25, 0x02, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn display() {
        assert_eq!(TypeTag::Map.to_string(), "Map");
        assert_eq!(TypeTag::UserType(3).to_string(), "UserType(3)");
    }
}
