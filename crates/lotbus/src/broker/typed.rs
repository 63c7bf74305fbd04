// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed endpoints over the dynamic [`Sample`] representation.
//!
//! Implement [`TopicType`] for a plain struct to describe its schema and key
//! fields, then wrap untyped endpoints in [`DataWriter`] / [`DataReader`].

use super::{NoticeKind, Reader, Writer};
use crate::condition::{ReadCondition, StatusCondition};
use crate::error::{Error, Result};
use crate::instance::Instance;
use crate::schema::{InstanceKey, Sample, Schema};
use std::marker::PhantomData;

/// A Rust type carried on a topic.
pub trait TopicType: Sized {
    /// Type name registered with the schema.
    const TYPE_NAME: &'static str;

    /// Field layout.
    fn schema() -> Schema;

    /// Key field names; empty for unkeyed topics.
    fn key_fields() -> &'static [&'static str];

    /// Encode into schema order.
    fn to_sample(&self) -> Sample;

    /// Decode from schema order; the reason string becomes a
    /// [`Error::TypeMismatch`].
    fn from_sample(sample: &Sample) -> core::result::Result<Self, String>;
}

/// Typed notice returned by [`DataReader::take`].
#[derive(Debug, Clone, PartialEq)]
pub struct TakenSample<T> {
    /// ALIVE or DISPOSED.
    pub kind: NoticeKind,
    /// Instance key.
    pub key: InstanceKey,
    /// Decoded value; the retained last value for disposals.
    pub data: Option<T>,
    /// Store sequence number.
    pub sequence: u64,
}

impl<T> TakenSample<T> {
    /// `true` for ALIVE notices.
    pub fn is_alive(&self) -> bool {
        self.kind == NoticeKind::Alive
    }
}

/// Typed wrapper over a [`Writer`].
pub struct DataWriter<T> {
    writer: Writer,
    _type: PhantomData<fn(&T)>,
}

impl<T: TopicType> DataWriter<T> {
    /// Wrap an untyped writer.
    pub fn new(writer: Writer) -> Self {
        Self {
            writer,
            _type: PhantomData,
        }
    }

    /// Publish `value`.
    pub fn write(&self, value: &T) -> Result<Instance> {
        self.writer.publish(value.to_sample())
    }

    /// Dispose the instance keyed like `value`.
    pub fn dispose(&self, value: &T) -> Result<Instance> {
        self.writer.dispose(&value.to_sample())
    }

    /// Dispose by key.
    pub fn dispose_instance(&self, key: &InstanceKey) -> Result<Instance> {
        self.writer.dispose_instance(key)
    }

    /// Underlying writer.
    pub fn writer(&self) -> &Writer {
        &self.writer
    }
}

/// Typed wrapper over a [`Reader`].
pub struct DataReader<T> {
    reader: Reader,
    _type: PhantomData<fn() -> T>,
}

impl<T: TopicType> DataReader<T> {
    /// Wrap an untyped reader.
    pub fn new(reader: Reader) -> Self {
        Self {
            reader,
            _type: PhantomData,
        }
    }

    /// Drain and decode every queued notice.
    ///
    /// A notice whose value cannot be decoded is logged and skipped; the
    /// other notices of the batch are still returned.
    pub fn take(&self) -> Vec<TakenSample<T>> {
        let mut taken = Vec::new();
        for notice in self.reader.take() {
            let data = match &notice.value {
                Some(value) => match T::from_sample(value) {
                    Ok(data) => Some(data),
                    Err(reason) => {
                        let err = Error::TypeMismatch {
                            topic: self.reader.topic().name().to_string(),
                            reason,
                        };
                        log::warn!(
                            "[broker] reader {} dropped {} seq {}: {}",
                            self.reader.id(),
                            notice.key,
                            notice.sequence,
                            err
                        );
                        continue;
                    }
                },
                None => None,
            };
            taken.push(TakenSample {
                kind: notice.kind,
                key: notice.key,
                data,
                sequence: notice.sequence,
            });
        }
        taken
    }

    /// See [`Reader::read_condition`].
    pub fn read_condition(&self) -> ReadCondition {
        self.reader.read_condition()
    }

    /// See [`Reader::status_condition`].
    pub fn status_condition(&self) -> StatusCondition {
        self.reader.status_condition()
    }

    /// Underlying reader.
    pub fn reader(&self) -> &Reader {
        &self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::Broker;
    use crate::instance::InstanceStore;
    use crate::qos::QoS;
    use crate::schema::{FieldType, FieldValue};
    use crate::topic::TopicRegistry;
    use std::sync::Arc;

    /// Level gauge that refuses negative readings on decode.
    #[derive(Debug, PartialEq)]
    struct Level(i32);

    impl TopicType for Level {
        const TYPE_NAME: &'static str = "Level";

        fn schema() -> Schema {
            Schema::new("Level").field("value", FieldType::Int32)
        }

        fn key_fields() -> &'static [&'static str] {
            &[]
        }

        fn to_sample(&self) -> Sample {
            Sample::new(vec![FieldValue::from_i32(self.0)])
        }

        fn from_sample(sample: &Sample) -> core::result::Result<Self, String> {
            match sample.get(0).and_then(FieldValue::as_i64) {
                Some(v) if v >= 0 => Ok(Level(v as i32)),
                other => Err(format!("bad level {:?}", other)),
            }
        }
    }

    #[test]
    fn test_undecodable_notice_does_not_lose_batch() {
        let registry = TopicRegistry::new();
        let topic = registry
            .declare_topic("Levels", Level::schema(), Level::key_fields())
            .unwrap();
        let broker = Broker::new(Arc::new(InstanceStore::new()));
        let reader = DataReader::<Level>::new(
            broker.create_reader(&topic, None, QoS::reliable()).unwrap(),
        );
        let writer = broker.create_writer(&topic, QoS::reliable()).unwrap();

        for v in [1, -1, 2] {
            writer.publish(Sample::new(vec![FieldValue::from_i32(v)])).unwrap();
        }

        let data: Vec<Option<Level>> = reader.take().into_iter().map(|s| s.data).collect();
        assert_eq!(data, vec![Some(Level(1)), Some(Level(2))]);
        assert!(reader.take().is_empty());
    }
}
