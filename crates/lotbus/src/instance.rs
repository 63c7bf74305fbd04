// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Instance State Store - last value and lifecycle of every keyed instance
//!
//! One record per (topic, key). Records are never removed: disposal flips the
//! state and keeps the last value, so a completion can be observed and
//! reported after the fact.
//!
//! Uses DashMap so publishers on distinct keys do not contend.

use crate::error::{Error, Result};
use crate::schema::{InstanceKey, Sample};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Published and not disposed since.
    Alive,
    /// Disposed; the last value is retained.
    Disposed,
}

/// Snapshot of one instance record.
#[derive(Debug, Clone)]
pub struct Instance {
    topic: Arc<str>,
    key: InstanceKey,
    last_value: Arc<Sample>,
    state: InstanceState,
    sequence: u64,
}

impl Instance {
    /// Owning topic name.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Instance key.
    pub fn key(&self) -> &InstanceKey {
        &self.key
    }

    /// Current value; `None` once disposed.
    pub fn value(&self) -> Option<&Arc<Sample>> {
        match self.state {
            InstanceState::Alive => Some(&self.last_value),
            InstanceState::Disposed => None,
        }
    }

    /// Last published value, kept across disposal.
    pub fn last_value(&self) -> &Arc<Sample> {
        &self.last_value
    }

    /// Lifecycle state.
    pub fn state(&self) -> InstanceState {
        self.state
    }

    /// `true` while the instance is alive.
    pub fn is_alive(&self) -> bool {
        self.state == InstanceState::Alive
    }

    /// Sequence number of the last update or disposal.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

type StoreKey = (Arc<str>, InstanceKey);

/// Concurrent (topic, key) -> [`Instance`] table.
pub struct InstanceStore {
    records: DashMap<StoreKey, Instance>,
    next_sequence: AtomicU64,
}

impl Default for InstanceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            next_sequence: AtomicU64::new(1),
        }
    }

    fn bump(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Create or update the instance, resurrecting it if disposed.
    ///
    /// Returns the new snapshot and whether the key had never been seen.
    pub fn upsert(&self, topic: &Arc<str>, key: InstanceKey, value: Arc<Sample>) -> (Instance, bool) {
        self.upsert_with(topic, key, value, |_| {})
    }

    /// [`InstanceStore::upsert`], running `deliver` before the record is
    /// unlocked so updates of one key reach readers in sequence order.
    pub(crate) fn upsert_with(
        &self,
        topic: &Arc<str>,
        key: InstanceKey,
        value: Arc<Sample>,
        deliver: impl FnOnce(&Instance),
    ) -> (Instance, bool) {
        let mut is_new_key = false;
        // The sequence is drawn under the shard lock so it grows per key.
        let entry = self
            .records
            .entry((Arc::clone(topic), key.clone()))
            .and_modify(|inst| {
                inst.last_value = Arc::clone(&value);
                inst.state = InstanceState::Alive;
                inst.sequence = self.bump();
            })
            .or_insert_with(|| {
                is_new_key = true;
                Instance {
                    topic: Arc::clone(topic),
                    key,
                    last_value: Arc::clone(&value),
                    state: InstanceState::Alive,
                    sequence: self.bump(),
                }
            });
        deliver(entry.value());
        (entry.value().clone(), is_new_key)
    }

    /// Mark an alive instance disposed.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownInstance`] if the key was never published or is already
    /// disposed.
    pub fn dispose(&self, topic: &Arc<str>, key: &InstanceKey) -> Result<Instance> {
        self.dispose_with(topic, key, |_| {})
    }

    /// [`InstanceStore::dispose`], running `deliver` under the record lock.
    pub(crate) fn dispose_with(
        &self,
        topic: &Arc<str>,
        key: &InstanceKey,
        deliver: impl FnOnce(&Instance),
    ) -> Result<Instance> {
        let unknown = || Error::UnknownInstance {
            topic: topic.to_string(),
            key: key.clone(),
        };
        let mut record = self
            .records
            .get_mut(&(Arc::clone(topic), key.clone()))
            .ok_or_else(unknown)?;
        if record.state == InstanceState::Disposed {
            return Err(unknown());
        }
        record.state = InstanceState::Disposed;
        record.sequence = self.bump();
        deliver(record.value());
        Ok(record.clone())
    }

    /// Visit the alive records of `topic` in key order, each under its
    /// record lock so no update of that key interleaves with `deliver`.
    pub(crate) fn for_each_alive(&self, topic: &str, mut deliver: impl FnMut(&Instance)) {
        let topic: Arc<str> = Arc::from(topic);
        for snapshot in self.alive_instances(&topic) {
            if let Some(record) = self.records.get(&(Arc::clone(&topic), snapshot.key)) {
                if record.is_alive() {
                    deliver(record.value());
                }
            }
        }
    }

    /// Snapshot of one record.
    pub fn lookup(&self, topic: &str, key: &InstanceKey) -> Option<Instance> {
        self.records
            .get(&(Arc::from(topic), key.clone()))
            .map(|r| r.value().clone())
    }

    /// All records of `topic`, sorted by key.
    pub fn instances(&self, topic: &str) -> Vec<Instance> {
        let mut out: Vec<Instance> = self
            .records
            .iter()
            .filter(|r| &*r.key().0 == topic)
            .map(|r| r.value().clone())
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    /// Alive records of `topic`, sorted by key.
    pub fn alive_instances(&self, topic: &str) -> Vec<Instance> {
        let mut out = self.instances(topic);
        out.retain(Instance::is_alive);
        out
    }

    /// Number of records across all topics.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` if no instance was ever published.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldValue;

    fn topic() -> Arc<str> {
        Arc::from("Lots")
    }

    fn value(v: u32) -> Arc<Sample> {
        Arc::new(Sample::new(vec![FieldValue::from_u32(v)]))
    }

    #[test]
    fn test_last_value_wins() {
        let store = InstanceStore::new();
        let key = InstanceKey::from_u64(1);
        let (_, new1) = store.upsert(&topic(), key.clone(), value(1));
        let (_, new2) = store.upsert(&topic(), key.clone(), value(2));
        assert!(new1);
        assert!(!new2);
        let inst = store.lookup("Lots", &key).unwrap();
        assert_eq!(**inst.value().unwrap(), *value(2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_dispose_unknown_instance() {
        let store = InstanceStore::new();
        let err = store.dispose(&topic(), &InstanceKey::from_u64(9)).unwrap_err();
        assert!(matches!(err, Error::UnknownInstance { .. }));
    }

    #[test]
    fn test_dispose_keeps_record_and_last_value() {
        let store = InstanceStore::new();
        let key = InstanceKey::from_u64(1);
        let (alive, _) = store.upsert(&topic(), key.clone(), value(7));
        let disposed = store.dispose(&topic(), &key).unwrap();
        assert_eq!(disposed.state(), InstanceState::Disposed);
        assert!(disposed.value().is_none());
        assert_eq!(**disposed.last_value(), *value(7));
        assert!(disposed.sequence() > alive.sequence());

        // Second dispose has no alive instance to act on.
        assert!(store.dispose(&topic(), &key).is_err());
        assert_eq!(store.instances("Lots").len(), 1);
        assert!(store.alive_instances("Lots").is_empty());
    }

    #[test]
    fn test_republish_resurrects() {
        let store = InstanceStore::new();
        let key = InstanceKey::from_u64(1);
        store.upsert(&topic(), key.clone(), value(1));
        let disposed = store.dispose(&topic(), &key).unwrap();
        let (back, is_new) = store.upsert(&topic(), key.clone(), value(3));
        assert!(!is_new);
        assert!(back.is_alive());
        assert!(back.sequence() > disposed.sequence());
    }

    #[test]
    fn test_instances_are_per_topic_and_sorted() {
        let store = InstanceStore::new();
        let other: Arc<str> = Arc::from("Other");
        store.upsert(&topic(), InstanceKey::from_u64(3), value(3));
        store.upsert(&topic(), InstanceKey::from_u64(1), value(1));
        store.upsert(&other, InstanceKey::from_u64(2), value(2));
        let keys: Vec<InstanceKey> = store
            .instances("Lots")
            .iter()
            .map(|i| i.key().clone())
            .collect();
        assert_eq!(keys, vec![InstanceKey::from_u64(1), InstanceKey::from_u64(3)]);
    }

    #[test]
    fn test_concurrent_upserts_keep_sequences_increasing() {
        let store = Arc::new(InstanceStore::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let mut last = 0;
                    for i in 0..200 {
                        let (inst, _) =
                            store.upsert(&topic(), InstanceKey::from_u64(t), value(i));
                        assert!(inst.sequence() > last);
                        last = inst.sequence();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 4);
    }
}
