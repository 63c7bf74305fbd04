// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Topics
//!
//! A [`Topic`] binds a unique name to a [`Schema`] and an optional set of key
//! fields. Topics are immutable once declared and cheap to clone.
//!
//! The [`TopicRegistry`] is the single source of truth for topic declarations
//! within a [`Domain`](crate::Domain).
//!
//! ## Example
//!
//! ```rust
//! use lotbus::{FieldType, Schema, TopicRegistry};
//!
//! let registry = TopicRegistry::new();
//! let schema = Schema::new("Temperature")
//!     .field("sensor_id", FieldType::String)
//!     .field("degrees", FieldType::Int32);
//! let topic = registry.declare_topic("ChocolateTemperature", schema, &[])?;
//! assert!(topic.is_unkeyed());
//! # Ok::<(), lotbus::Error>(())
//! ```

use crate::error::{Error, Result};
use crate::schema::{FieldType, InstanceKey, Sample, Schema};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

struct TopicInner {
    name: Arc<str>,
    schema: Arc<Schema>,
    key_fields: Vec<String>,
    key_indices: Vec<usize>,
}

/// Named data channel with a schema and key fields.
#[derive(Clone)]
pub struct Topic {
    inner: Arc<TopicInner>,
}

impl Topic {
    fn new(name: &str, schema: Schema, key_fields: &[&str]) -> Result<Self> {
        let mut seen = HashSet::new();
        for field in schema.fields() {
            if !seen.insert(field.name.as_str()) {
                return Err(Error::InvalidSchema(format!(
                    "field '{}' declared twice in {}",
                    field.name,
                    schema.type_name()
                )));
            }
        }

        let mut key_indices = Vec::with_capacity(key_fields.len());
        for key in key_fields {
            let idx = schema.field_index(key).ok_or_else(|| {
                Error::InvalidSchema(format!("key field '{}' is not in the schema", key))
            })?;
            if key_indices.contains(&idx) {
                return Err(Error::InvalidSchema(format!(
                    "key field '{}' listed twice",
                    key
                )));
            }
            if schema.fields()[idx].ty == FieldType::Float64 {
                return Err(Error::InvalidSchema(format!(
                    "key field '{}' cannot be floating point",
                    key
                )));
            }
            key_indices.push(idx);
        }

        Ok(Self {
            inner: Arc::new(TopicInner {
                name: Arc::from(name),
                schema: Arc::new(schema),
                key_fields: key_fields.iter().map(|k| (*k).to_string()).collect(),
                key_indices,
            }),
        })
    }

    /// Topic name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.inner.name)
    }

    /// Schema of the samples carried by this topic.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.inner.schema
    }

    /// Key field names in declaration order.
    pub fn key_fields(&self) -> &[String] {
        &self.inner.key_fields
    }

    /// `true` when the topic has no key fields (one implicit instance).
    pub fn is_unkeyed(&self) -> bool {
        self.inner.key_indices.is_empty()
    }

    /// Check `sample` against the schema.
    pub fn validate(&self, sample: &Sample) -> Result<()> {
        self.inner
            .schema
            .check(sample)
            .map_err(|reason| Error::TypeMismatch {
                topic: self.name().to_string(),
                reason,
            })
    }

    /// Project the key fields of a (validated) sample.
    pub fn key_of(&self, sample: &Sample) -> Result<InstanceKey> {
        InstanceKey::project(sample, &self.inner.key_indices).ok_or_else(|| Error::TypeMismatch {
            topic: self.name().to_string(),
            reason: "sample is missing key fields".to_string(),
        })
    }

    fn same_declaration(&self, schema: &Schema, key_fields: &[&str]) -> bool {
        *self.inner.schema == *schema
            && self.inner.key_fields.len() == key_fields.len()
            && self
                .inner
                .key_fields
                .iter()
                .zip(key_fields.iter())
                .all(|(a, b)| a == b)
    }
}

impl PartialEq for Topic {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.inner.name)
            .field("type_name", &self.inner.schema.type_name())
            .field("key_fields", &self.inner.key_fields)
            .finish()
    }
}

/// Topic name to declaration table.
#[derive(Default)]
pub struct TopicRegistry {
    topics: RwLock<HashMap<String, Topic>>,
}

impl TopicRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a topic, or return the existing one if the declaration is identical.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateTopic`] if `name` exists with another schema or key set.
    /// - [`Error::InvalidSchema`] on unknown, repeated or float key fields, or
    ///   repeated field names.
    pub fn declare_topic(&self, name: &str, schema: Schema, key_fields: &[&str]) -> Result<Topic> {
        let mut topics = self.topics.write();
        if let Some(existing) = topics.get(name) {
            if existing.same_declaration(&schema, key_fields) {
                return Ok(existing.clone());
            }
            return Err(Error::DuplicateTopic(name.to_string()));
        }

        let topic = Topic::new(name, schema, key_fields)?;
        log::debug!(
            "[registry] declared topic '{}' type={} keys={:?}",
            name,
            topic.schema().type_name(),
            key_fields
        );
        topics.insert(name.to_string(), topic.clone());
        Ok(topic)
    }

    /// Look up a declared topic.
    pub fn resolve_topic(&self, name: &str) -> Result<Topic> {
        self.topics
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownTopic(name.to_string()))
    }

    /// Declared topic names, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldValue;

    fn lot_schema() -> Schema {
        Schema::new("Lot")
            .field("lot_id", FieldType::UInt32)
            .field("status", FieldType::String)
    }

    #[test]
    fn test_declare_and_resolve() {
        let registry = TopicRegistry::new();
        let topic = registry
            .declare_topic("Lots", lot_schema(), &["lot_id"])
            .unwrap();
        assert_eq!(registry.resolve_topic("Lots").unwrap(), topic);
        assert_eq!(registry.topics(), vec!["Lots".to_string()]);
    }

    #[test]
    fn test_declare_is_idempotent() {
        let registry = TopicRegistry::new();
        let a = registry.declare_topic("Lots", lot_schema(), &["lot_id"]).unwrap();
        let b = registry.declare_topic("Lots", lot_schema(), &["lot_id"]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicate_topic_with_other_keys() {
        let registry = TopicRegistry::new();
        registry.declare_topic("Lots", lot_schema(), &["lot_id"]).unwrap();
        let err = registry.declare_topic("Lots", lot_schema(), &[]).unwrap_err();
        assert!(matches!(err, Error::DuplicateTopic(name) if name == "Lots"));
    }

    #[test]
    fn test_unknown_topic() {
        let registry = TopicRegistry::new();
        assert!(matches!(
            registry.resolve_topic("Nope"),
            Err(Error::UnknownTopic(_))
        ));
    }

    #[test]
    fn test_invalid_key_fields() {
        let registry = TopicRegistry::new();
        assert!(matches!(
            registry.declare_topic("A", lot_schema(), &["missing"]),
            Err(Error::InvalidSchema(_))
        ));
        assert!(matches!(
            registry.declare_topic("B", lot_schema(), &["lot_id", "lot_id"]),
            Err(Error::InvalidSchema(_))
        ));
        let float_schema = Schema::new("F").field("x", FieldType::Float64);
        assert!(matches!(
            registry.declare_topic("C", float_schema, &["x"]),
            Err(Error::InvalidSchema(_))
        ));
        let dup_fields = Schema::new("D")
            .field("x", FieldType::Int32)
            .field("x", FieldType::Int32);
        assert!(matches!(
            registry.declare_topic("D", dup_fields, &[]),
            Err(Error::InvalidSchema(_))
        ));
        assert!(registry.topics().is_empty());
    }

    #[test]
    fn test_validate_and_key_of() {
        let registry = TopicRegistry::new();
        let topic = registry.declare_topic("Lots", lot_schema(), &["lot_id"]).unwrap();
        let sample = Sample::new(vec![FieldValue::from_u32(4), FieldValue::from_string("x")]);
        topic.validate(&sample).unwrap();
        assert_eq!(topic.key_of(&sample).unwrap(), InstanceKey::from_u64(4));

        let bad = Sample::new(vec![FieldValue::from_string("x"), FieldValue::from_u32(4)]);
        assert!(matches!(topic.validate(&bad), Err(Error::TypeMismatch { .. })));
    }
}
