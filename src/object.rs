//! PDF object types.
//!
//! The subset of the PDF object model (ISO 32000-1:2008, Section 7.3) that a
//! structure tree is made of: names, numbers, strings, arrays, dictionaries and
//! indirect references.

use crate::error::{Error, Result};
use std::collections::HashMap;

/// Dictionary payload used by [`Object::Dictionary`].
pub type Dict = HashMap<String, Object>;

/// PDF object representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// String (byte array)
    String(Vec<u8>),
    /// Name (starting with /)
    Name(String),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary (key-value pairs)
    Dictionary(Dict),
    /// Indirect object reference
    Reference(ObjectRef),
}

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }

    /// Object number 0 is reserved for the head of the free list and never
    /// names a real object.
    pub fn is_valid(&self) -> bool {
        self.id != 0
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

impl serde::Serialize for ObjectRef {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl Object {
    /// Get the type name of this object (without data).
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Reference(_) => "Reference",
        }
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to read a non-negative integer that fits a parent tree key.
    pub fn as_key(&self) -> Option<u32> {
        self.as_integer()
            .filter(|i| (0..=i32::MAX as i64).contains(i))
            .map(|i| i as u32)
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to dictionary.
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Object::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Try to cast to a mutable dictionary.
    pub fn as_dict_mut(&mut self) -> Option<&mut Dict> {
        match self {
            Object::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Cast to dictionary or fail with [`Error::InvalidObjectType`].
    pub fn expect_dict(&self) -> Result<&Dict> {
        self.as_dict().ok_or_else(|| self.type_error("Dictionary"))
    }

    /// Cast to a mutable dictionary or fail with [`Error::InvalidObjectType`].
    pub fn expect_dict_mut(&mut self) -> Result<&mut Dict> {
        let found = self.type_name();
        self.as_dict_mut().ok_or_else(|| Error::InvalidObjectType {
            expected: "Dictionary".to_string(),
            found: found.to_string(),
        })
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to cast to string (bytes).
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Text content of a string object, decoding UTF-16BE when the BOM is present.
    ///
    /// PDF Spec: ISO 32000-1:2008, Section 7.9.2.2 - Text String Type
    pub fn as_text(&self) -> Option<String> {
        let bytes = self.as_string()?;
        if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
            let units: Vec<u16> = utf16
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            Some(String::from_utf16_lossy(&units))
        } else {
            Some(bytes.iter().map(|&b| b as char).collect())
        }
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    fn type_error(&self, expected: &str) -> Error {
        Error::InvalidObjectType {
            expected: expected.to_string(),
            found: self.type_name().to_string(),
        }
    }
}

impl From<ObjectRef> for Object {
    fn from(r: ObjectRef) -> Self {
        Object::Reference(r)
    }
}
