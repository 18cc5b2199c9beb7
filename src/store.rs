// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The value capability backing every leaf.
//!
//! A [`Store`] wraps a single [`serde_json::Value`] and exposes the small
//! surface the rest of the crate needs: keyed reads and writes, type and
//! family introspection, key enumeration, and deep value equality. Scalars,
//! arrays, and objects are handled uniformly; dispatch is on the
//! [`ValueType`]/[`Family`] tag, never on ad-hoc runtime inspection.

use serde_json::Value;
use std::fmt;

/// The scalar type tag of a stored value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// JSON `null`.
    Null,
    /// A boolean.
    Bool,
    /// Any JSON number.
    Number,
    /// A string.
    String,
    /// An array; container family.
    Array,
    /// An object; container family.
    Object,
}

impl ValueType {
    /// The tag of a raw value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    /// A short human-readable name, used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Whether values of this type can hold fields.
    pub fn family(self) -> Family {
        match self {
            Self::Array | Self::Object => Family::Container,
            _ => Family::Scalar,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a value is addressable by key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Family {
    /// Null, booleans, numbers, strings.
    Scalar,
    /// Arrays and objects.
    Container,
}

/// A slot in a container value: an object field or an array index.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    /// An object field.
    Field(String),
    /// An array element.
    Index(usize),
}

impl Key {
    /// The field name, if this is a [`Key::Field`].
    pub fn as_field(&self) -> Option<&str> {
        match self {
            Self::Field(name) => Some(name),
            Self::Index(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.write_str(name),
            Self::Index(i) => write!(f, "[{i}]"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::Field(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::Field(name)
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

/// A key-level store failure.
#[derive(Debug)]
pub enum StoreError {
    /// A keyed write was attempted on a scalar value.
    NotAContainer {
        /// The type of the scalar.
        type_name: &'static str,
    },
    /// The key kind does not address the container kind, for example an
    /// object field on an array.
    KeyMismatch {
        /// The offending key.
        key: Key,
        /// The container's type.
        type_name: &'static str,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAContainer { type_name } => {
                write!(f, "cannot set a field on a {type_name} value")
            }
            Self::KeyMismatch { key, type_name } => {
                write!(f, "key {key} does not address a {type_name} value")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// A cloneable wrapper around one raw value.
///
/// Equality is deep value equality, which is what the change-deduplication
/// and child-synchronization paths rely on.
#[derive(Clone, Debug, PartialEq)]
pub struct Store {
    value: Value,
}

impl Store {
    /// Wraps a raw value.
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// The raw underlying value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consumes the store, returning the raw value.
    pub fn into_value(self) -> Value {
        self.value
    }

    /// The type tag of the held value.
    pub fn value_type(&self) -> ValueType {
        ValueType::of(&self.value)
    }

    /// The family of the held value.
    pub fn family(&self) -> Family {
        self.value_type().family()
    }

    /// Reads the value at `key`, if the store is a container and the key is
    /// present.
    pub fn get(&self, key: &Key) -> Option<&Value> {
        match (&self.value, key) {
            (Value::Object(map), Key::Field(name)) => map.get(name),
            (Value::Array(items), Key::Index(i)) => items.get(*i),
            _ => None,
        }
    }

    /// Whether `key` addresses an existing slot.
    pub fn has_key(&self, key: &Key) -> bool {
        self.get(key).is_some()
    }

    /// Writes `value` at `key`.
    ///
    /// Writing past the end of an array pads the gap with nulls, so a bound
    /// child key always stays addressable.
    pub fn set(&mut self, key: &Key, value: Value) -> Result<(), StoreError> {
        let type_name = self.value_type().name();
        match (&mut self.value, key) {
            (Value::Object(map), Key::Field(name)) => {
                map.insert(name.clone(), value);
                Ok(())
            }
            (Value::Array(items), Key::Index(i)) => {
                if *i >= items.len() {
                    items.resize(*i + 1, Value::Null);
                }
                items[*i] = value;
                Ok(())
            }
            (Value::Object(_), key @ Key::Index(_)) => Err(StoreError::KeyMismatch {
                key: key.clone(),
                type_name: ValueType::Object.name(),
            }),
            (Value::Array(_), key @ Key::Field(_)) => Err(StoreError::KeyMismatch {
                key: key.clone(),
                type_name: ValueType::Array.name(),
            }),
            _ => Err(StoreError::NotAContainer { type_name }),
        }
    }

    /// Enumerates the keys of a container, in place order. Scalars have no
    /// keys.
    pub fn keys(&self) -> Vec<Key> {
        match &self.value {
            Value::Object(map) => map.keys().map(|k| Key::Field(k.clone())).collect(),
            Value::Array(items) => (0..items.len()).map(Key::Index).collect(),
            _ => Vec::new(),
        }
    }

    /// Deep value equality, independent of any store.
    pub fn same_values(a: &Value, b: &Value) -> bool {
        a == b
    }
}
