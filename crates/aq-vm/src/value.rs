//! Runtime value types
//!
//! A heap slot is an [`Object`]: a sequence of type tags, a flag telling
//! whether that type was fixed by a declaration, and one [`Value`].
//! Wrapper tags (array, reference, const reference) are followed by the tags
//! of what they wrap, so a reference to a const reference to a byte is
//! `[0x07, 0x08, 0x01]`.

use std::fmt;

/// Type tags
pub mod tag {
    pub const NONE: u8 = 0x00;
    pub const BYTE: u8 = 0x01;
    pub const LONG: u8 = 0x02;
    pub const DOUBLE: u8 = 0x03;
    pub const U64: u8 = 0x04;
    pub const STRING: u8 = 0x05;
    pub const ARRAY: u8 = 0x06;
    pub const REF: u8 = 0x07;
    pub const CONST: u8 = 0x08;
    pub const OBJECT: u8 = 0x09;
    pub const ORIGIN: u8 = 0x0A;

    /// Tags that are followed by the tags of what they wrap
    #[inline]
    pub fn is_wrapper(t: u8) -> bool {
        matches!(t, ARRAY | REF | CONST)
    }

    #[inline]
    pub fn is_known(t: u8) -> bool {
        t <= ORIGIN
    }

    #[inline]
    pub fn is_numeric(t: u8) -> bool {
        matches!(t, BYTE | LONG | DOUBLE | U64)
    }

    #[inline]
    pub fn is_reference(t: u8) -> bool {
        matches!(t, REF | CONST)
    }

    /// Promotion rank of a numeric tag: byte < long < double < u64
    #[inline]
    pub fn rank(t: u8) -> Option<u8> {
        match t {
            BYTE => Some(0),
            LONG => Some(1),
            DOUBLE => Some(2),
            U64 => Some(3),
            _ => None,
        }
    }

    pub fn name(t: u8) -> &'static str {
        match t {
            NONE => "untyped",
            BYTE => "byte",
            LONG => "long",
            DOUBLE => "double",
            U64 => "uint64",
            STRING => "string",
            ARRAY => "array",
            REF => "reference",
            CONST => "const",
            OBJECT => "object",
            ORIGIN => "origin",
            _ => "unknown",
        }
    }
}

/// Identity of one heap in the [`Store`](crate::heap::Store)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapId(pub usize);

/// Handle to one slot: `(heap, index)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub heap: HeapId,
    pub index: usize,
}

impl Slot {
    #[inline]
    pub fn new(heap: HeapId, index: usize) -> Self {
        Self { heap, index }
    }
}

/// Array handle. Element `i` lives at slot `1 + offset + i` of `storage`;
/// slot 0 of the storage heap holds the element count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayRef {
    pub storage: HeapId,
    pub offset: i64,
}

/// Payload of a slot
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    None,
    Byte(i8),
    Long(i64),
    Double(f64),
    U64(u64),
    Str(String),
    Array(ArrayRef),
    /// Reference or const reference to another slot
    Ref(Slot),
    /// Class instance; the heap holds `[class name, members...]`
    Instance(HeapId),
    /// Raw host handle
    Opaque(u64),
}

impl Value {
    /// Outer tag of this payload
    pub fn tag(&self) -> u8 {
        match self {
            Value::None => tag::NONE,
            Value::Byte(_) => tag::BYTE,
            Value::Long(_) => tag::LONG,
            Value::Double(_) => tag::DOUBLE,
            Value::U64(_) => tag::U64,
            Value::Str(_) => tag::STRING,
            Value::Array(_) => tag::ARRAY,
            Value::Ref(_) => tag::REF,
            Value::Instance(_) => tag::OBJECT,
            Value::Opaque(_) => tag::ORIGIN,
        }
    }

    /// Tag sequence a free slot takes on when it receives this value
    pub fn tags(&self) -> Vec<u8> {
        match self {
            Value::Array(_) => vec![tag::ARRAY, tag::NONE],
            Value::Ref(_) => vec![tag::REF, tag::NONE],
            other => vec![other.tag()],
        }
    }

    /// Zero value of a declared tag
    pub fn zero(t: u8) -> Value {
        match t {
            tag::BYTE => Value::Byte(0),
            tag::LONG => Value::Long(0),
            tag::DOUBLE => Value::Double(0.0),
            tag::U64 => Value::U64(0),
            tag::STRING => Value::Str(String::new()),
            _ => Value::None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        tag::is_numeric(self.tag())
    }

    /// Nonzero numeric values are true
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Byte(v) => *v != 0,
            Value::Long(v) => *v != 0,
            Value::Double(v) => *v != 0.0,
            Value::U64(v) => *v != 0,
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        tag::name(self.tag())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "none"),
            Value::Byte(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{:.15}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{}", s),
            Value::Array(a) => write!(f, "<array {}+{}>", a.storage.0, a.offset),
            Value::Ref(s) => write!(f, "<ref {}:{}>", s.heap.0, s.index),
            Value::Instance(h) => write!(f, "<object {}>", h.0),
            Value::Opaque(h) => write!(f, "<origin 0x{:x}>", h),
        }
    }
}

/// One heap slot
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Object {
    /// Type tags; empty for an array element that has not been touched yet
    pub tags: Vec<u8>,
    /// Type fixed by a declaration
    pub fixed: bool,
    pub value: Value,
}

impl Object {
    /// Untyped slot that accepts anything
    pub fn free() -> Self {
        Self {
            tags: vec![tag::NONE],
            fixed: false,
            value: Value::None,
        }
    }

    /// Slot created from a declared tag sequence. Scalars start at zero.
    pub fn declared(tags: Vec<u8>) -> Self {
        let first = tags.first().copied().unwrap_or(tag::NONE);
        Self {
            fixed: first != tag::NONE,
            value: Value::zero(first),
            tags,
        }
    }

    /// Slot holding a value whose type may still change
    pub fn with_value(value: Value) -> Self {
        Self {
            tags: value.tags(),
            fixed: false,
            value,
        }
    }

    /// Outer tag; untouched slots read as untyped
    #[inline]
    pub fn tag(&self) -> u8 {
        self.tags.first().copied().unwrap_or(tag::NONE)
    }

    #[inline]
    pub fn is_established(&self) -> bool {
        !self.tags.is_empty()
    }

    #[inline]
    pub fn is_reference(&self) -> bool {
        tag::is_reference(self.tag())
    }

    /// Tags after the outer wrapper tag
    pub fn inner_tags(&self) -> &[u8] {
        self.tags.get(1..).unwrap_or(&[])
    }
}

/// Numeric conversion between scalar tags.
///
/// Returns the converted value and whether information was lost.
/// `None` when either side is not numeric.
pub fn convert_numeric(value: &Value, to: u8) -> Option<(Value, bool)> {
    enum Num {
        Int(i128),
        Float(f64),
    }

    let num = match value {
        Value::Byte(v) => Num::Int(*v as i128),
        Value::Long(v) => Num::Int(*v as i128),
        Value::U64(v) => Num::Int(*v as i128),
        Value::Double(v) => Num::Float(*v),
        _ => return None,
    };

    let converted = match (num, to) {
        (Num::Int(i), tag::BYTE) => match i8::try_from(i) {
            Ok(v) => (Value::Byte(v), false),
            Err(_) => (Value::Byte(i as i8), true),
        },
        (Num::Int(i), tag::LONG) => match i64::try_from(i) {
            Ok(v) => (Value::Long(v), false),
            Err(_) => (Value::Long(i as i64), true),
        },
        (Num::Int(i), tag::U64) => match u64::try_from(i) {
            Ok(v) => (Value::U64(v), false),
            Err(_) => (Value::U64(i as u64), true),
        },
        (Num::Int(i), tag::DOUBLE) => {
            let d = i as f64;
            (Value::Double(d), d as i128 != i)
        }
        (Num::Float(d), tag::BYTE) => {
            let v = d as i8;
            (Value::Byte(v), v as f64 != d)
        }
        (Num::Float(d), tag::LONG) => {
            let v = d as i64;
            (Value::Long(v), v as f64 != d)
        }
        (Num::Float(d), tag::U64) => {
            let v = d as u64;
            (Value::U64(v), v as f64 != d)
        }
        (Num::Float(d), tag::DOUBLE) => (Value::Double(d), false),
        _ => return None,
    };
    Some(converted)
}
