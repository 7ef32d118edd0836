//! AMF value types
//!
//! The typed-value model used by RTMP command objects: strings, numbers,
//! null, objects with named properties, and typed objects.

use std::collections::HashMap;

/// A single AMF0 value
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    /// Null value (marker 0x05)
    Null,

    /// Undefined value (marker 0x06)
    Undefined,

    /// Boolean (marker 0x01)
    Boolean(bool),

    /// IEEE 754 double (marker 0x00)
    Number(f64),

    /// UTF-8 string (marker 0x02, or 0x0C for long strings)
    String(String),

    /// Key-value object (marker 0x03)
    Object(HashMap<String, AmfValue>),

    /// Associative array with a declared length (marker 0x08)
    EcmaArray(HashMap<String, AmfValue>),

    /// Typed object carrying a class name (marker 0x10)
    TypedObject {
        class_name: String,
        properties: HashMap<String, AmfValue>,
    },
}

impl AmfValue {
    /// Build an object from an iterator of properties
    pub fn object<I, K>(props: I) -> Self
    where
        I: IntoIterator<Item = (K, AmfValue)>,
        K: Into<String>,
    {
        AmfValue::Object(props.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn string(s: impl Into<String>) -> Self {
        AmfValue::String(s.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AmfValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HashMap<String, AmfValue>> {
        match self {
            AmfValue::Object(m) => Some(m),
            AmfValue::EcmaArray(m) => Some(m),
            AmfValue::TypedObject { properties, .. } => Some(properties),
            _ => None,
        }
    }

    /// Property lookup on object-like values
    pub fn property(&self, name: &str) -> Option<&AmfValue> {
        self.as_object().and_then(|m| m.get(name))
    }

    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, AmfValue::Null | AmfValue::Undefined)
    }
}
