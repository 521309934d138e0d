//! Primary values held by registers, array elements and fields.

use crate::location::HeapId;
use serde::{Deserialize, Serialize};
use std::fmt;
use taintflow_tag::Tag;

/// A primitive type of the managed runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    /// `boolean`
    Boolean,
    /// `byte` (signed 8-bit)
    Byte,
    /// `char` (UTF-16 code unit)
    Char,
    /// `short` (signed 16-bit)
    Short,
    /// `int` (signed 32-bit)
    Int,
    /// `long` (signed 64-bit)
    Long,
    /// `float`
    Float,
    /// `double`
    Double,
}

impl PrimitiveKind {
    /// Every primitive kind.
    pub const ALL: [PrimitiveKind; 8] = [
        Self::Boolean,
        Self::Byte,
        Self::Char,
        Self::Short,
        Self::Int,
        Self::Long,
        Self::Float,
        Self::Double,
    ];

    /// Width of the kind in bytes when stored off-heap.
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Self::Boolean | Self::Byte => 1,
            Self::Char | Self::Short => 2,
            Self::Int | Self::Float => 4,
            Self::Long | Self::Double => 8,
        }
    }
}

/// The element type of an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    /// Array of a primitive type.
    Primitive(PrimitiveKind),
    /// Array of references.
    Reference,
}

impl ElementKind {
    /// Convenience for `byte[]`.
    pub const BYTES: ElementKind = ElementKind::Primitive(PrimitiveKind::Byte);

    /// Returns the zero value for elements of this kind.
    #[must_use]
    pub const fn zero(self) -> Value {
        match self {
            Self::Primitive(kind) => Value::zero(kind),
            Self::Reference => Value::NULL,
        }
    }

    /// Returns `true` if `value` may be stored in an array of this kind.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Self::Reference, Value::Ref(_)) => true,
            (Self::Primitive(kind), v) => v.kind() == Some(kind),
            _ => false,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(kind) => write!(f, "{kind:?}[]"),
            Self::Reference => write!(f, "Object[]"),
        }
    }
}

/// A runtime value.
///
/// Values carry no taint of their own; the tag lives in the slot next to
/// them (see [`Slot`]) or in a side table keyed by the value's identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// `boolean`
    Boolean(bool),
    /// `byte`
    Byte(i8),
    /// `char`
    Char(u16),
    /// `short`
    Short(i16),
    /// `int`
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// Reference to a heap object, or null.
    Ref(Option<HeapId>),
}

impl Value {
    /// The null reference.
    pub const NULL: Value = Value::Ref(None);

    /// Returns the zero value of a primitive kind.
    #[must_use]
    pub const fn zero(kind: PrimitiveKind) -> Value {
        match kind {
            PrimitiveKind::Boolean => Value::Boolean(false),
            PrimitiveKind::Byte => Value::Byte(0),
            PrimitiveKind::Char => Value::Char(0),
            PrimitiveKind::Short => Value::Short(0),
            PrimitiveKind::Int => Value::Int(0),
            PrimitiveKind::Long => Value::Long(0),
            PrimitiveKind::Float => Value::Float(0.0),
            PrimitiveKind::Double => Value::Double(0.0),
        }
    }

    /// Returns the primitive kind, or `None` for references.
    #[must_use]
    pub const fn kind(&self) -> Option<PrimitiveKind> {
        match self {
            Value::Boolean(_) => Some(PrimitiveKind::Boolean),
            Value::Byte(_) => Some(PrimitiveKind::Byte),
            Value::Char(_) => Some(PrimitiveKind::Char),
            Value::Short(_) => Some(PrimitiveKind::Short),
            Value::Int(_) => Some(PrimitiveKind::Int),
            Value::Long(_) => Some(PrimitiveKind::Long),
            Value::Float(_) => Some(PrimitiveKind::Float),
            Value::Double(_) => Some(PrimitiveKind::Double),
            Value::Ref(_) => None,
        }
    }

    /// Returns the referenced identity, if this is a non-null reference.
    #[must_use]
    pub const fn as_ref_id(&self) -> Option<HeapId> {
        match self {
            Value::Ref(id) => *id,
            _ => None,
        }
    }

    /// Returns the value as a 32-bit integer for the int-like kinds.
    #[must_use]
    pub const fn as_int(&self) -> Option<i32> {
        match *self {
            Value::Boolean(b) => Some(b as i32),
            Value::Byte(v) => Some(v as i32),
            Value::Char(v) => Some(v as i32),
            Value::Short(v) => Some(v as i32),
            Value::Int(v) => Some(v),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Int(0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Char(v) => match char::from_u32(u32::from(*v)) {
                Some(c) => write!(f, "{c}"),
                None => write!(f, "\\u{v:04x}"),
            },
            Value::Short(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Ref(None) => write!(f, "null"),
            Value::Ref(Some(id)) => write!(f, "{id}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Byte(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Char(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Short(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<HeapId> for Value {
    fn from(id: HeapId) -> Self {
        Value::Ref(Some(id))
    }
}

/// A value paired with its shadow tag.
///
/// This is the parallel-slot layout: every register and every instance
/// field stores its tag immediately next to its value, so a data write and
/// its tag write touch the same cell.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Slot {
    /// Primary value.
    pub value: Value,
    /// Shadow tag.
    pub tag: Tag,
}

impl Slot {
    /// Creates a slot.
    #[must_use]
    pub const fn new(value: Value, tag: Tag) -> Self {
        Self { value, tag }
    }

    /// Creates an untainted slot.
    #[must_use]
    pub const fn clean(value: Value) -> Self {
        Self {
            value,
            tag: Tag::CLEAR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values_match_kind() {
        for kind in PrimitiveKind::ALL {
            assert_eq!(Value::zero(kind).kind(), Some(kind));
        }
    }

    #[test]
    fn test_element_kind_accepts() {
        let ints = ElementKind::Primitive(PrimitiveKind::Int);
        assert!(ints.accepts(&Value::Int(7)));
        assert!(!ints.accepts(&Value::Long(7)));
        assert!(!ints.accepts(&Value::NULL));
        assert!(ElementKind::Reference.accepts(&Value::NULL));
        assert!(!ElementKind::Reference.accepts(&Value::Int(0)));
    }

    #[test]
    fn test_as_int_widens_small_kinds() {
        assert_eq!(Value::Byte(-2).as_int(), Some(-2));
        assert_eq!(Value::Char(65).as_int(), Some(65));
        assert_eq!(Value::Boolean(true).as_int(), Some(1));
        assert_eq!(Value::Long(1).as_int(), None);
    }

    #[test]
    fn test_display_char() {
        assert_eq!(Value::Char(u16::from(b'x')).to_string(), "x");
        assert_eq!(Value::Char(0xd800).to_string(), "\\ud800");
    }

    #[test]
    fn test_from_primitives() {
        assert_eq!(Value::from(true), Value::Boolean(true));
        assert_eq!(Value::from(3i64), Value::Long(3));
        assert_eq!(Value::from(1.5f64), Value::Double(1.5));
    }

    #[test]
    fn test_primitive_widths() {
        assert_eq!(PrimitiveKind::Byte.width(), 1);
        assert_eq!(PrimitiveKind::Char.width(), 2);
        assert_eq!(PrimitiveKind::Float.width(), 4);
        assert_eq!(PrimitiveKind::Long.width(), 8);
    }
}
