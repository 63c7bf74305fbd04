// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Field types, samples and instance keys.
//!
//! A [`Schema`] is an ordered list of typed fields. A [`Sample`] holds one
//! [`FieldValue`] per schema field, in schema order. Key fields of a topic are
//! projected into an [`InstanceKey`], which identifies the instance in the
//! instance store.

use std::fmt;
use std::sync::Arc;

/// Type of a single schema field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Signed 64-bit integer.
    Int64,
    /// Double precision float.
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    String,
    /// Enumeration; values are carried as their label.
    Enum(Arc<[&'static str]>),
}

impl FieldType {
    /// Build an enum type from its labels (declaration order).
    pub fn enumeration(labels: &[&'static str]) -> Self {
        FieldType::Enum(Arc::from(labels))
    }

    fn accepts(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (FieldType::Int32, FieldValue::Integer(v)) => i32::try_from(*v).is_ok(),
            (FieldType::UInt32, FieldValue::Unsigned(v)) => u32::try_from(*v).is_ok(),
            (FieldType::Int64, FieldValue::Integer(_)) => true,
            (FieldType::Float64, FieldValue::Float(_)) => true,
            (FieldType::Bool, FieldValue::Boolean(_)) => true,
            (FieldType::String, FieldValue::String(_)) => true,
            (FieldType::Enum(labels), FieldValue::String(label)) => {
                labels.iter().any(|l| *l == label.as_str())
            }
            _ => false,
        }
    }
}

/// Runtime field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Signed integer value
    Integer(i64),
    /// Unsigned integer value
    Unsigned(u64),
    /// Floating point value
    Float(f64),
    /// String or enum label
    String(String),
    /// Boolean value
    Boolean(bool),
}

impl FieldValue {
    /// Create from i32
    pub fn from_i32(v: i32) -> Self {
        FieldValue::Integer(v as i64)
    }

    /// Create from u32
    pub fn from_u32(v: u32) -> Self {
        FieldValue::Unsigned(v as u64)
    }

    /// Create from string or enum label
    pub fn from_string(v: impl Into<String>) -> Self {
        FieldValue::String(v.into())
    }

    /// Borrow the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Signed view of integer payloads.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            FieldValue::Unsigned(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Unsigned view of integer payloads.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::Unsigned(v) => Some(*v),
            FieldValue::Integer(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    fn key_part(&self) -> Option<KeyPart> {
        match self {
            FieldValue::Integer(v) => Some(KeyPart::Integer(*v)),
            FieldValue::Unsigned(v) => Some(KeyPart::Unsigned(*v)),
            FieldValue::String(s) => Some(KeyPart::String(s.clone())),
            FieldValue::Boolean(b) => Some(KeyPart::Boolean(*b)),
            FieldValue::Float(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Unsigned(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::String(s) => f.write_str(s),
            FieldValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// Named, typed field of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name as referenced by filters.
    pub name: String,
    /// Field type.
    pub ty: FieldType,
}

/// Ordered list of typed fields.
///
/// ```ignore
/// let schema = Schema::new("Temperature")
///     .field("sensor_id", FieldType::String)
///     .field("degrees", FieldType::Int32);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    type_name: String,
    fields: Vec<FieldDescriptor>,
}

impl Schema {
    /// Start an empty schema for `type_name`.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            ty,
        });
        self
    }

    /// Type name this schema describes.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Position of `name` in the schema.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Check a sample against this schema.
    ///
    /// Returns a human readable reason on mismatch.
    pub fn check(&self, sample: &Sample) -> Result<(), String> {
        if sample.values.len() != self.fields.len() {
            return Err(format!(
                "expected {} fields, got {}",
                self.fields.len(),
                sample.values.len()
            ));
        }
        for (field, value) in self.fields.iter().zip(sample.values.iter()) {
            if !field.ty.accepts(value) {
                return Err(format!(
                    "field '{}' does not accept {:?} (type {:?})",
                    field.name, value, field.ty
                ));
            }
        }
        Ok(())
    }
}

/// One published record: a value per schema field, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    values: Vec<FieldValue>,
}

impl Sample {
    /// Wrap values given in schema order.
    pub fn new(values: Vec<FieldValue>) -> Self {
        Self { values }
    }

    /// Value at schema position `index`.
    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.values.get(index)
    }

    /// All values in schema order.
    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }
}

/// Hashable projection of one key field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    /// Signed integer key
    Integer(i64),
    /// Unsigned integer key
    Unsigned(u64),
    /// String or enum key
    String(String),
    /// Boolean key
    Boolean(bool),
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Integer(v) => write!(f, "{}", v),
            KeyPart::Unsigned(v) => write!(f, "{}", v),
            KeyPart::String(s) => write!(f, "'{}'", s),
            KeyPart::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// Identity of an instance within its topic.
///
/// Unkeyed topics use the empty key, so all of their samples share a single
/// instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct InstanceKey(Vec<KeyPart>);

impl InstanceKey {
    /// Key of every sample on an unkeyed topic.
    pub fn unkeyed() -> Self {
        Self(Vec::new())
    }

    /// Build a key from its parts (in key-field order).
    pub fn from_parts(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    /// Key of a single unsigned key field, the common `lot_id` shape.
    pub fn from_u64(v: u64) -> Self {
        Self(vec![KeyPart::Unsigned(v)])
    }

    /// Key parts in key-field order.
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    /// `true` for the unkeyed-topic key.
    pub fn is_unkeyed(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn project(sample: &Sample, key_indices: &[usize]) -> Option<Self> {
        key_indices
            .iter()
            .map(|&idx| sample.get(idx).and_then(FieldValue::key_part))
            .collect::<Option<Vec<_>>>()
            .map(Self)
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<unkeyed>");
        }
        f.write_str("[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", part)?;
        }
        f.write_str("]")
    }
}
