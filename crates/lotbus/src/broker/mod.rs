// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pub/Sub Broker - writer to reader fan-out with content filtering
//!
//! ```text
//! Writer::publish(sample)
//!   ├─ validate against schema, derive key
//!   ├─ InstanceStore::upsert
//!   └─ for each reader of the topic:
//!        compatible QoS? ─ filter matches? ─► enqueue ALIVE, signal
//!
//! Writer::dispose_instance(key)
//!   ├─ InstanceStore::dispose
//!   └─ for each compatible reader that saw the key (or is unfiltered):
//!        enqueue DISPOSED, signal
//! ```
//!
//! Publish never blocks on readers: the endpoint table lock is released
//! before any reader queue is touched, so a waitset handler may publish on
//! the topic it is reading without deadlocking.

mod reader;
mod status;
mod typed;
mod writer;

pub(crate) use reader::ReaderShared;
pub use reader::Reader;
pub use status::{
    RequestedIncompatibleQosStatus, SampleLostStatus, SampleRejectedReason, SampleRejectedStatus,
    SubscriptionMatchedStatus,
};
pub use typed::{DataReader, DataWriter, TakenSample, TopicType};
pub use writer::Writer;

use crate::error::{Error, Result};
use crate::filter::ContentFilter;
use crate::instance::{Instance, InstanceStore};
use crate::qos::{incompatible_policy, Durability, QoS};
use crate::schema::{InstanceKey, Sample};
use crate::topic::Topic;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Kind of a queued notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Instance created or updated.
    Alive,
    /// Instance disposed.
    Disposed,
}

/// Entry of a reader queue.
#[derive(Debug, Clone)]
pub struct Notice {
    /// ALIVE or DISPOSED.
    pub kind: NoticeKind,
    /// Instance key.
    pub key: InstanceKey,
    /// Published value; for disposals, the retained last value.
    pub value: Option<Arc<Sample>>,
    /// Store sequence number of the update or disposal.
    pub sequence: u64,
    /// Originating writer; `None` for late-joiner replay.
    pub writer_id: Option<u64>,
}

#[derive(Clone, Copy)]
struct WriterEntry {
    id: u64,
    qos: QoS,
}

#[derive(Default)]
struct TopicEndpoints {
    readers: Vec<Arc<ReaderShared>>,
    writers: Vec<WriterEntry>,
}

/// Routes samples from writers to readers and owns the instance store.
pub struct Broker {
    store: Arc<InstanceStore>,
    endpoints: RwLock<HashMap<Arc<str>, TopicEndpoints>>,
    next_endpoint_id: AtomicU64,
}

impl Broker {
    /// Create a broker over `store`.
    pub fn new(store: Arc<InstanceStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            endpoints: RwLock::new(HashMap::new()),
            next_endpoint_id: AtomicU64::new(1),
        })
    }

    /// Instance store updated by every publish and dispose.
    pub fn store(&self) -> &Arc<InstanceStore> {
        &self.store
    }

    /// Number of live readers on `topic`.
    pub fn reader_count(&self, topic: &str) -> usize {
        self.endpoints
            .read()
            .get(topic)
            .map_or(0, |e| e.readers.len())
    }

    /// Number of live writers on `topic`.
    pub fn writer_count(&self, topic: &str) -> usize {
        self.endpoints
            .read()
            .get(topic)
            .map_or(0, |e| e.writers.len())
    }

    /// Register a writer and match it against existing readers.
    pub fn create_writer(self: &Arc<Self>, topic: &Topic, qos: QoS) -> Result<Writer> {
        qos.validate()?;
        let id = self.next_endpoint_id.fetch_add(1, Ordering::Relaxed);

        let readers = {
            let mut endpoints = self.endpoints.write();
            let entry = endpoints.entry(topic.name_arc()).or_default();
            entry.writers.push(WriterEntry { id, qos });
            entry.readers.clone()
        };

        for reader in &readers {
            match incompatible_policy(&qos, reader.qos()) {
                None => reader.on_writer_matched(),
                Some(policy) => reader.on_writer_incompatible(id, policy),
            }
        }

        log::debug!(
            "[broker] writer {} on '{}' ({:?}, {} reader(s))",
            id,
            topic.name(),
            qos.reliability,
            readers.len()
        );
        Ok(Writer::new(id, topic.clone(), qos, Arc::clone(self)))
    }

    /// Register a reader, optionally filtered, and match it against existing writers.
    ///
    /// A TRANSIENT_LOCAL reader joining while a compatible TRANSIENT_LOCAL
    /// writer exists receives the alive instances of the topic right away.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidQos`] for unusable QoS.
    /// - [`Error::InvalidArgument`] if `filter` was compiled for another topic.
    pub fn create_reader(
        self: &Arc<Self>,
        topic: &Topic,
        filter: Option<ContentFilter>,
        qos: QoS,
    ) -> Result<Reader> {
        qos.validate()?;
        if let Some(f) = &filter {
            if f.topic_name() != topic.name() {
                return Err(Error::InvalidArgument(format!(
                    "filter compiled for '{}' cannot be used on '{}'",
                    f.topic_name(),
                    topic.name()
                )));
            }
        }

        let id = self.next_endpoint_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(ReaderShared::new(id, topic.clone(), qos, filter));

        // Refused writers are recorded before the reader becomes visible to
        // publishers, which only see it through `readers_of`.
        let mut replay = false;
        let writer_count = {
            let mut endpoints = self.endpoints.write();
            let entry = endpoints.entry(topic.name_arc()).or_default();
            for writer in &entry.writers {
                match incompatible_policy(&writer.qos, &qos) {
                    None => {
                        shared.on_writer_matched();
                        replay |= writer.qos.durability == Durability::TransientLocal;
                    }
                    Some(policy) => shared.on_writer_incompatible(writer.id, policy),
                }
            }
            entry.readers.push(Arc::clone(&shared));
            entry.writers.len()
        };

        if replay && qos.durability == Durability::TransientLocal {
            self.replay_alive(&shared);
        }

        log::debug!(
            "[broker] reader {} on '{}' (filter={:?}, {} writer(s))",
            id,
            topic.name(),
            shared.filter().map(ContentFilter::expression),
            writer_count
        );
        Ok(Reader::new(shared, Arc::clone(self)))
    }

    fn replay_alive(&self, reader: &ReaderShared) {
        let topic = reader.topic();
        let mut delivered = 0usize;
        self.store.for_each_alive(topic.name(), |instance| {
            let value = Arc::clone(instance.last_value());
            if reader.filter().is_some_and(|f| !f.matches(&value)) {
                return;
            }
            let replayed = reader.enqueue_replay(Notice {
                kind: NoticeKind::Alive,
                key: instance.key().clone(),
                value: Some(value),
                sequence: instance.sequence(),
                writer_id: None,
            });
            delivered += usize::from(replayed);
        });
        if delivered > 0 {
            log::debug!(
                "[broker] replayed {} instance(s) of '{}' to reader {}",
                delivered,
                topic.name(),
                reader.id()
            );
        }
    }

    fn readers_of(&self, topic: &Topic) -> Vec<Arc<ReaderShared>> {
        self.endpoints
            .read()
            .get(topic.name())
            .map(|e| e.readers.clone())
            .unwrap_or_default()
    }

    pub(crate) fn publish(&self, writer: &Writer, sample: Sample) -> Result<Instance> {
        let topic = writer.topic();
        topic.validate(&sample)?;
        let key = topic.key_of(&sample)?;
        let value = Arc::new(sample);

        // Fan-out runs under the record lock: per key, readers see updates
        // and disposals in store sequence order.
        let readers = self.readers_of(topic);
        let (instance, is_new_key) =
            self.store
                .upsert_with(&topic.name_arc(), key, Arc::clone(&value), |instance| {
                    for reader in &readers {
                        if !reader.accepts_writer(writer.id()) {
                            continue;
                        }
                        if reader.filter().is_some_and(|f| !f.matches(&value)) {
                            continue;
                        }
                        reader.enqueue(Notice {
                            kind: NoticeKind::Alive,
                            key: instance.key().clone(),
                            value: Some(Arc::clone(&value)),
                            sequence: instance.sequence(),
                            writer_id: Some(writer.id()),
                        });
                    }
                });
        if is_new_key {
            log::trace!("[broker] new instance {} on '{}'", instance.key(), topic.name());
        }
        Ok(instance)
    }

    pub(crate) fn dispose(&self, writer: &Writer, key: &InstanceKey) -> Result<Instance> {
        let topic = writer.topic();
        let readers = self.readers_of(topic);
        let instance = self.store.dispose_with(&topic.name_arc(), key, |instance| {
            for reader in &readers {
                if !reader.accepts_writer(writer.id()) || !reader.wants_dispose(key) {
                    continue;
                }
                reader.enqueue(Notice {
                    kind: NoticeKind::Disposed,
                    key: key.clone(),
                    value: Some(Arc::clone(instance.last_value())),
                    sequence: instance.sequence(),
                    writer_id: Some(writer.id()),
                });
            }
        })?;
        log::debug!("[broker] disposed {} on '{}'", key, topic.name());
        Ok(instance)
    }

    pub(crate) fn unregister_reader(&self, reader: &Arc<ReaderShared>) {
        let mut endpoints = self.endpoints.write();
        if let Some(entry) = endpoints.get_mut(reader.topic().name()) {
            entry.readers.retain(|r| !Arc::ptr_eq(r, reader));
        }
    }

    pub(crate) fn unregister_writer(&self, topic: &Topic, writer_id: u64) {
        let readers = {
            let mut endpoints = self.endpoints.write();
            match endpoints.get_mut(topic.name()) {
                Some(entry) => {
                    entry.writers.retain(|w| w.id != writer_id);
                    entry.readers.clone()
                }
                None => Vec::new(),
            }
        };
        for reader in readers {
            reader.on_writer_gone(writer_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::StatusMask;
    use crate::schema::{FieldType, FieldValue, Schema};
    use crate::topic::TopicRegistry;

    fn setup() -> (Arc<Broker>, Topic) {
        let registry = TopicRegistry::new();
        let schema = Schema::new("Lot")
            .field("lot_id", FieldType::UInt32)
            .field("next", FieldType::String);
        let topic = registry.declare_topic("Lots", schema, &["lot_id"]).unwrap();
        (Broker::new(Arc::new(InstanceStore::new())), topic)
    }

    fn lot(id: u32, next: &str) -> Sample {
        Sample::new(vec![FieldValue::from_u32(id), FieldValue::from_string(next)])
    }

    #[test]
    fn test_publish_reaches_unfiltered_reader() {
        let (broker, topic) = setup();
        let reader = broker.create_reader(&topic, None, QoS::reliable()).unwrap();
        let writer = broker.create_writer(&topic, QoS::reliable()).unwrap();

        writer.publish(lot(1, "A")).unwrap();
        writer.publish(lot(1, "B")).unwrap();

        assert!(reader.status_changes().contains(StatusMask::DATA_AVAILABLE));
        let notices = reader.take();
        assert_eq!(notices.len(), 2);
        assert!(notices[0].sequence < notices[1].sequence);
        assert_eq!(notices[1].writer_id, Some(writer.id()));
        assert!(reader.take().is_empty());
        assert!(!reader.status_changes().contains(StatusMask::DATA_AVAILABLE));
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let (broker, topic) = setup();
        let writer = broker.create_writer(&topic, QoS::reliable()).unwrap();
        let bad = Sample::new(vec![FieldValue::from_string("x")]);
        assert!(matches!(writer.publish(bad), Err(Error::TypeMismatch { .. })));
        assert!(broker.store().is_empty());
    }

    #[test]
    fn test_filter_from_other_topic_is_refused() {
        let (broker, topic) = setup();
        let registry = TopicRegistry::new();
        let other = registry
            .declare_topic("Other", Schema::new("O").field("next", FieldType::String), &[])
            .unwrap();
        let filter = ContentFilter::compile(&other, "next = 'A'", vec![]).unwrap();
        assert!(matches!(
            broker.create_reader(&topic, Some(filter), QoS::reliable()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_dropped_endpoints_unregister() {
        let (broker, topic) = setup();
        let reader = broker.create_reader(&topic, None, QoS::reliable()).unwrap();
        let writer = broker.create_writer(&topic, QoS::reliable()).unwrap();
        assert_eq!(broker.reader_count("Lots"), 1);
        assert_eq!(broker.writer_count("Lots"), 1);

        let matched = reader.subscription_matched_status();
        assert_eq!(matched.current_count, 1);

        drop(writer);
        assert_eq!(broker.writer_count("Lots"), 0);
        assert_eq!(reader.subscription_matched_status().current_count, 0);

        drop(reader);
        assert_eq!(broker.reader_count("Lots"), 0);
    }

    #[test]
    fn test_transient_local_replay_respects_filter() {
        let (broker, topic) = setup();
        let qos = QoS::reliable().transient_local();
        let writer = broker.create_writer(&topic, qos).unwrap();
        writer.publish(lot(1, "A")).unwrap();
        writer.publish(lot(2, "B")).unwrap();
        writer.publish(lot(3, "A")).unwrap();
        writer.dispose_instance(&InstanceKey::from_u64(3)).unwrap();

        let filter = ContentFilter::compile(&topic, "next = %0", vec!["'A'".into()]).unwrap();
        let late = broker.create_reader(&topic, Some(filter), qos).unwrap();
        let notices = late.take();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].key, InstanceKey::from_u64(1));
        assert_eq!(notices[0].writer_id, None);

        let volatile = broker.create_reader(&topic, None, QoS::reliable()).unwrap();
        assert!(volatile.take().is_empty());
    }

    #[test]
    fn test_replay_does_not_duplicate_live_delivery() {
        let (broker, topic) = setup();
        let qos = QoS::reliable().transient_local();
        let writer = broker.create_writer(&topic, qos).unwrap();
        let reader = broker.create_reader(&topic, None, qos).unwrap();
        writer.publish(lot(4, "A")).unwrap();

        // A replay racing the live publish carries the same sequence.
        let instance = broker.store().lookup("Lots", &InstanceKey::from_u64(4)).unwrap();
        let replay = Notice {
            kind: NoticeKind::Alive,
            key: instance.key().clone(),
            value: Some(Arc::clone(instance.last_value())),
            sequence: instance.sequence(),
            writer_id: None,
        };
        assert!(!reader.shared.enqueue_replay(replay.clone()));
        assert_eq!(reader.take().len(), 1);

        // Live copy arriving after the replay copy is dropped as well.
        let fresh = broker.create_reader(&topic, None, qos).unwrap();
        assert_eq!(fresh.take().len(), 1);
        assert!(!fresh.shared.enqueue(replay));
        assert!(fresh.take().is_empty());
    }

    #[test]
    fn test_publish_from_reader_thread_while_holding_notices() {
        let (broker, topic) = setup();
        let reader = broker.create_reader(&topic, None, QoS::reliable()).unwrap();
        let writer = broker.create_writer(&topic, QoS::reliable()).unwrap();
        writer.publish(lot(1, "A")).unwrap();
        for notice in reader.take() {
            // Republishing while processing must not deadlock.
            let next = lot(1, "B");
            assert_eq!(notice.kind, NoticeKind::Alive);
            writer.publish(next).unwrap();
        }
        assert_eq!(reader.take().len(), 1);
    }
}
