// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Writer side of the broker.

use super::Broker;
use crate::error::Result;
use crate::instance::Instance;
use crate::qos::QoS;
use crate::schema::{InstanceKey, Sample};
use crate::topic::Topic;
use std::sync::Arc;

/// Publisher endpoint for one topic.
///
/// `Writer` is `Send + Sync`: background publishers can share it by reference
/// or through an `Arc` without extra locking. Dropping the writer unmatches it
/// from every reader.
pub struct Writer {
    id: u64,
    topic: Topic,
    qos: QoS,
    broker: Arc<Broker>,
}

impl Writer {
    pub(crate) fn new(id: u64, topic: Topic, qos: QoS, broker: Arc<Broker>) -> Self {
        Self {
            id,
            topic,
            qos,
            broker,
        }
    }

    /// Writer identifier, unique within the broker.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Topic written to.
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Offered QoS.
    pub fn qos(&self) -> &QoS {
        &self.qos
    }

    /// Publish a sample: update its instance, then notify matching readers.
    ///
    /// # Errors
    ///
    /// [`Error::TypeMismatch`](crate::Error::TypeMismatch) if the sample does
    /// not conform to the topic schema.
    pub fn publish(&self, sample: Sample) -> Result<Instance> {
        self.broker.publish(self, sample)
    }

    /// Dispose the instance identified by `key`.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownInstance`](crate::Error::UnknownInstance) if the key has
    /// no alive instance.
    pub fn dispose_instance(&self, key: &InstanceKey) -> Result<Instance> {
        self.broker.dispose(self, key)
    }

    /// Dispose the instance whose key fields are those of `sample`.
    pub fn dispose(&self, sample: &Sample) -> Result<Instance> {
        self.topic.validate(sample)?;
        let key = self.topic.key_of(sample)?;
        self.dispose_instance(&key)
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        self.broker.unregister_writer(&self.topic, self.id);
    }
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("id", &self.id)
            .field("topic", &self.topic.name())
            .field("qos", &self.qos)
            .finish()
    }
}
