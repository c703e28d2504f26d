//! Wire element kinds and the Rust scalars that carry them.
//!
//! Each [`ElementType`] has a stable one-byte tag and a fixed width. The
//! [`WireElement`] trait ties a concrete Rust type to its tag and its
//! big-endian put/get, so `Packet<T>` stays 1:1 with the wire representation.

use bytes::{Buf, BufMut};

use crate::error::DecodeError;

/// Tag naming the wire representation of one data element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ElementType {
    Int8 = 0,
    Uint8 = 1,
    Int16 = 2,
    Uint16 = 3,
    Int32 = 4,
    Uint32 = 5,
    Int64 = 6,
    Uint64 = 7,
    Float = 8,
    Double = 9,
    Char = 10,
}

impl ElementType {
    /// Every supported element type, in tag order.
    pub const ALL: [ElementType; 11] = [
        ElementType::Int8,
        ElementType::Uint8,
        ElementType::Int16,
        ElementType::Uint16,
        ElementType::Int32,
        ElementType::Uint32,
        ElementType::Int64,
        ElementType::Uint64,
        ElementType::Float,
        ElementType::Double,
        ElementType::Char,
    ];

    /// Width of one element of this type, in bytes.
    pub const fn width(self) -> usize {
        match self {
            ElementType::Int8 | ElementType::Uint8 | ElementType::Char => 1,
            ElementType::Int16 | ElementType::Uint16 => 2,
            ElementType::Int32 | ElementType::Uint32 | ElementType::Float => 4,
            ElementType::Int64 | ElementType::Uint64 | ElementType::Double => 8,
        }
    }

    /// The one-byte wire tag for this type.
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Resolve a wire tag back to an element type.
    pub fn from_tag(tag: u8) -> Result<Self, DecodeError> {
        match tag {
            0 => Ok(ElementType::Int8),
            1 => Ok(ElementType::Uint8),
            2 => Ok(ElementType::Int16),
            3 => Ok(ElementType::Uint16),
            4 => Ok(ElementType::Int32),
            5 => Ok(ElementType::Uint32),
            6 => Ok(ElementType::Int64),
            7 => Ok(ElementType::Uint64),
            8 => Ok(ElementType::Float),
            9 => Ok(ElementType::Double),
            10 => Ok(ElementType::Char),
            other => Err(DecodeError::UnknownElementType(other)),
        }
    }

    /// Lowercase name used in manifests and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            ElementType::Int8 => "int8",
            ElementType::Uint8 => "uint8",
            ElementType::Int16 => "int16",
            ElementType::Uint16 => "uint16",
            ElementType::Int32 => "int32",
            ElementType::Uint32 => "uint32",
            ElementType::Int64 => "int64",
            ElementType::Uint64 => "uint64",
            ElementType::Float => "float",
            ElementType::Double => "double",
            ElementType::Char => "char",
        }
    }

    /// Resolve a manifest type name back to an element type.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A Rust scalar that corresponds 1:1 to an [`ElementType`].
///
/// Sealed: the set of wire element kinds is closed, so the set of carrier
/// types is too.
pub trait WireElement:
    sealed::Sealed + Copy + PartialEq + std::fmt::Debug + Send + Sync + 'static
{
    /// The wire tag this type encodes as.
    const ELEMENT_TYPE: ElementType;

    /// Append this element in wire (big-endian) order.
    fn put<B: BufMut>(self, dst: &mut B);

    /// Read one element from the buffer. The caller guarantees at least
    /// `ELEMENT_TYPE.width()` bytes remain.
    fn get<B: Buf>(src: &mut B) -> Self;
}

macro_rules! wire_scalar {
    ($ty:ty, $kind:expr, $put:ident, $get:ident) => {
        impl sealed::Sealed for $ty {}

        impl WireElement for $ty {
            const ELEMENT_TYPE: ElementType = $kind;

            fn put<B: BufMut>(self, dst: &mut B) {
                dst.$put(self);
            }

            fn get<B: Buf>(src: &mut B) -> Self {
                src.$get()
            }
        }
    };
}

wire_scalar!(i8, ElementType::Int8, put_i8, get_i8);
wire_scalar!(u8, ElementType::Uint8, put_u8, get_u8);
wire_scalar!(i16, ElementType::Int16, put_i16, get_i16);
wire_scalar!(u16, ElementType::Uint16, put_u16, get_u16);
wire_scalar!(i32, ElementType::Int32, put_i32, get_i32);
wire_scalar!(u32, ElementType::Uint32, put_u32, get_u32);
wire_scalar!(i64, ElementType::Int64, put_i64, get_i64);
wire_scalar!(u64, ElementType::Uint64, put_u64, get_u64);
wire_scalar!(f32, ElementType::Float, put_f32, get_f32);
wire_scalar!(f64, ElementType::Double, put_f64, get_f64);

/// Carrier for the wire `char` kind.
///
/// A newtype rather than plain `u8`, which already maps to `Uint8` — the
/// tag-to-type mapping must stay unambiguous in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AsciiChar(pub u8);

impl sealed::Sealed for AsciiChar {}

impl WireElement for AsciiChar {
    const ELEMENT_TYPE: ElementType = ElementType::Char;

    fn put<B: BufMut>(self, dst: &mut B) {
        dst.put_u8(self.0);
    }

    fn get<B: Buf>(src: &mut B) -> Self {
        AsciiChar(src.get_u8())
    }
}

impl From<u8> for AsciiChar {
    fn from(byte: u8) -> Self {
        AsciiChar(byte)
    }
}

impl std::fmt::Display for AsciiChar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0 as char)
    }
}
