// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Domain context and shutdown signal.
//!
//! A [`Domain`] bundles everything the entities of one factory share: the
//! topic registry, the instance store, the broker and the QoS provider. It is
//! constructed explicitly and passed by `Arc` to every station; there is no
//! process-wide registry.

use crate::broker::{Broker, DataReader, DataWriter, Reader, TopicType, Writer};
use crate::condition::GuardCondition;
use crate::error::{Error, Result};
use crate::filter::ContentFilter;
use crate::instance::InstanceStore;
use crate::qos::{QoS, QosProvider};
use crate::schema::Schema;
use crate::topic::{Topic, TopicRegistry};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Highest valid domain id.
pub const MAX_DOMAIN_ID: u32 = 232;

/// Shared context of one pipeline.
pub struct Domain {
    domain_id: u32,
    registry: TopicRegistry,
    store: Arc<InstanceStore>,
    broker: Arc<Broker>,
    provider: QosProvider,
}

impl Domain {
    /// Create a domain.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDomainId`] if `domain_id` is above [`MAX_DOMAIN_ID`].
    pub fn new(domain_id: u32, provider: QosProvider) -> Result<Arc<Self>> {
        if domain_id > MAX_DOMAIN_ID {
            return Err(Error::InvalidDomainId(domain_id));
        }
        let store = Arc::new(InstanceStore::new());
        let broker = Broker::new(Arc::clone(&store));
        log::info!(
            "[domain] domain {} up ({} QoS profile(s))",
            domain_id,
            provider.profile_names().len()
        );
        Ok(Arc::new(Self {
            domain_id,
            registry: TopicRegistry::new(),
            store,
            broker,
            provider,
        }))
    }

    /// Domain id.
    pub fn domain_id(&self) -> u32 {
        self.domain_id
    }

    /// Topic registry.
    pub fn registry(&self) -> &TopicRegistry {
        &self.registry
    }

    /// Instance store.
    pub fn store(&self) -> &Arc<InstanceStore> {
        &self.store
    }

    /// Broker.
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// QoS profiles and named filters.
    pub fn qos_provider(&self) -> &QosProvider {
        &self.provider
    }

    /// Resolve a QoS profile by name.
    pub fn profile(&self, name: &str) -> Result<QoS> {
        self.provider.profile(name)
    }

    /// See [`TopicRegistry::declare_topic`].
    pub fn declare_topic(&self, name: &str, schema: Schema, key_fields: &[&str]) -> Result<Topic> {
        self.registry.declare_topic(name, schema, key_fields)
    }

    /// See [`TopicRegistry::resolve_topic`].
    pub fn resolve_topic(&self, name: &str) -> Result<Topic> {
        self.registry.resolve_topic(name)
    }

    /// Declare `name` with the schema and key fields of `T`.
    pub fn register_type<T: TopicType>(&self, name: &str) -> Result<Topic> {
        self.registry.declare_topic(name, T::schema(), T::key_fields())
    }

    /// Compile a content filter for a declared topic.
    pub fn create_filter(
        &self,
        topic: &str,
        expression: &str,
        parameters: Vec<String>,
    ) -> Result<ContentFilter> {
        let topic = self.resolve_topic(topic)?;
        ContentFilter::compile(&topic, expression, parameters)
    }

    /// Compile a filter profile of the QoS provider.
    pub fn named_filter(&self, name: &str) -> Result<ContentFilter> {
        let profile = self.provider.filter(name)?;
        Ok(self
            .create_filter(&profile.topic, &profile.expression, profile.parameters.clone())?
            .with_name(name))
    }

    /// Create a writer on a declared topic.
    pub fn create_writer(&self, topic: &str, qos: QoS) -> Result<Writer> {
        let topic = self.resolve_topic(topic)?;
        self.broker.create_writer(&topic, qos)
    }

    /// Create a reader on a declared topic, optionally filtered.
    pub fn create_reader(
        &self,
        topic: &str,
        filter: Option<ContentFilter>,
        qos: QoS,
    ) -> Result<Reader> {
        let topic = self.resolve_topic(topic)?;
        self.broker.create_reader(&topic, filter, qos)
    }

    /// Typed variant of [`Domain::create_writer`].
    pub fn create_data_writer<T: TopicType>(&self, topic: &str, qos: QoS) -> Result<DataWriter<T>> {
        let topic = self.typed_topic::<T>(topic)?;
        Ok(DataWriter::new(self.broker.create_writer(&topic, qos)?))
    }

    /// Typed variant of [`Domain::create_reader`].
    pub fn create_data_reader<T: TopicType>(
        &self,
        topic: &str,
        filter: Option<ContentFilter>,
        qos: QoS,
    ) -> Result<DataReader<T>> {
        let topic = self.typed_topic::<T>(topic)?;
        Ok(DataReader::new(
            self.broker.create_reader(&topic, filter, qos)?,
        ))
    }

    fn typed_topic<T: TopicType>(&self, name: &str) -> Result<Topic> {
        let topic = self.resolve_topic(name)?;
        if topic.schema().type_name() != T::TYPE_NAME {
            return Err(Error::TypeMismatch {
                topic: name.to_string(),
                reason: format!(
                    "topic carries '{}', not '{}'",
                    topic.schema().type_name(),
                    T::TYPE_NAME
                ),
            });
        }
        Ok(topic)
    }
}

impl std::fmt::Debug for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Domain")
            .field("domain_id", &self.domain_id)
            .field("topics", &self.registry.topics())
            .field("instances", &self.store.len())
            .finish()
    }
}

struct ShutdownInner {
    requested: AtomicBool,
    guards: Mutex<Vec<GuardCondition>>,
    // Dropped on trigger; receivers then see a disconnected channel.
    closer: Mutex<Option<Sender<()>>>,
    closed: Receiver<()>,
}

/// Cooperative shutdown signal.
///
/// Every station attaches a [`Shutdown::guard`] to its waitset; triggering
/// the signal raises all guards so blocked dispatches return at once.
#[derive(Clone)]
pub struct Shutdown {
    inner: Arc<ShutdownInner>,
}

impl Shutdown {
    /// New, untriggered signal.
    pub fn new() -> Self {
        let (closer, closed) = channel::bounded(0);
        Self {
            inner: Arc::new(ShutdownInner {
                requested: AtomicBool::new(false),
                guards: Mutex::new(Vec::new()),
                closer: Mutex::new(Some(closer)),
                closed,
            }),
        }
    }

    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        if self.inner.requested.swap(true, Ordering::AcqRel) {
            return;
        }
        log::info!("[shutdown] requested");
        self.inner.closer.lock().take();
        for guard in self.inner.guards.lock().iter() {
            guard.set_trigger_value(true);
        }
    }

    /// `true` once [`Shutdown::trigger`] was called.
    pub fn is_triggered(&self) -> bool {
        self.inner.requested.load(Ordering::Acquire)
    }

    /// Channel that disconnects on shutdown, for `select!` in worker threads.
    pub fn receiver(&self) -> Receiver<()> {
        self.inner.closed.clone()
    }

    /// Sleep for `duration` unless shutdown comes first.
    ///
    /// Returns `true` if the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        if self.is_triggered() {
            return false;
        }
        match self.inner.closed.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => true,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// A guard condition raised on shutdown (already raised if it happened).
    pub fn guard(&self) -> GuardCondition {
        let guard = GuardCondition::new();
        let mut guards = self.inner.guards.lock();
        guards.push(guard.clone());
        if self.is_triggered() {
            guard.set_trigger_value(true);
        }
        guard
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;

    fn sensor_schema() -> Schema {
        Schema::new("Reading")
            .field("sensor_id", FieldType::String)
            .field("degrees", FieldType::Int32)
    }

    #[test]
    fn test_domain_id_range() {
        assert!(Domain::new(0, QosProvider::builtin()).is_ok());
        assert!(Domain::new(MAX_DOMAIN_ID, QosProvider::builtin()).is_ok());
        assert!(matches!(
            Domain::new(233, QosProvider::builtin()),
            Err(Error::InvalidDomainId(233))
        ));
    }

    #[test]
    fn test_endpoints_require_declared_topic() {
        let domain = Domain::new(0, QosProvider::builtin()).unwrap();
        assert!(matches!(
            domain.create_writer("Missing", QoS::default()),
            Err(Error::UnknownTopic(_))
        ));
        assert!(matches!(
            domain.create_filter("Missing", "degrees > 1", vec![]),
            Err(Error::UnknownTopic(_))
        ));

        domain.declare_topic("Readings", sensor_schema(), &[]).unwrap();
        let writer = domain.create_writer("Readings", QoS::default()).unwrap();
        let _reader = domain.create_reader("Readings", None, QoS::default()).unwrap();
        assert_eq!(writer.topic().name(), "Readings");
        assert_eq!(domain.broker().reader_count("Readings"), 1);
    }

    #[test]
    fn test_named_filter_from_provider() {
        let domain = Domain::new(3, QosProvider::builtin()).unwrap();
        domain
            .declare_topic("ChocolateTemperature", sensor_schema(), &[])
            .unwrap();
        let filter = domain
            .named_filter(crate::qos::TEMPERATURE_ALARM_FILTER)
            .unwrap();
        assert_eq!(filter.topic_name(), "ChocolateTemperature");
        assert_eq!(filter.name(), Some(crate::qos::TEMPERATURE_ALARM_FILTER));
        assert!(matches!(domain.named_filter("Nope"), Err(Error::Config(_))));
    }

    #[test]
    fn test_shutdown_raises_guards() {
        let shutdown = Shutdown::new();
        let early = shutdown.guard();
        assert!(!early.trigger_value());

        shutdown.trigger();
        shutdown.trigger();
        assert!(shutdown.is_triggered());
        assert!(early.trigger_value());
        assert!(shutdown.guard().trigger_value());
    }

    #[test]
    fn test_sleep_interrupted_by_trigger() {
        let shutdown = Shutdown::new();
        assert!(shutdown.sleep(Duration::from_millis(5)));

        let remote = shutdown.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.trigger();
        });
        let start = std::time::Instant::now();
        assert!(!shutdown.sleep(Duration::from_secs(30)));
        assert!(start.elapsed() < Duration::from_secs(10));
        handle.join().unwrap();
        assert!(shutdown.receiver().recv().is_err());
    }
}
