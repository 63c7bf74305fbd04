// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reader side of the broker: per-reader notice queue and status flags.
//!
//! ```text
//! publish ──► filter ──► enqueue ──► queue [N0][N1][N2] ──► take() drains all
//!                          │
//!                          └─► status |= DATA_AVAILABLE, signal waitsets
//! ```

use super::status::{
    ReaderStatus, RequestedIncompatibleQosStatus, SampleLostStatus, SampleRejectedStatus,
    SubscriptionMatchedStatus,
};
use super::{Broker, Notice, NoticeKind};
use crate::condition::{ConditionCore, ReadCondition, StatusCondition, StatusMask};
use crate::error::{Error, Result};
use crate::filter::ContentFilter;
use crate::qos::{History, QoS};
use crate::schema::InstanceKey;
use crate::topic::Topic;
use crate::waitset::driver::SignalHooks;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// State shared between a [`Reader`], its conditions and the broker.
pub(crate) struct ReaderShared {
    id: u64,
    topic: Topic,
    qos: QoS,
    filter: Option<ContentFilter>,
    queue: Mutex<VecDeque<Notice>>,
    /// Keys delivered alive and not disposed since (filtered readers only).
    seen: Mutex<HashSet<InstanceKey>>,
    /// Highest store sequence enqueued per key. Sequence numbers are unique
    /// store-wide, so an equal one is the same update delivered twice.
    latest: Mutex<HashMap<InstanceKey, u64>>,
    /// Writers this reader refuses because of QoS.
    incompatible_writers: Mutex<HashSet<u64>>,
    status: Mutex<ReaderStatus>,
    enabled: Mutex<StatusMask>,
    status_core: Arc<ConditionCore>,
    hooks: SignalHooks,
}

impl ReaderShared {
    pub(crate) fn new(id: u64, topic: Topic, qos: QoS, filter: Option<ContentFilter>) -> Self {
        Self {
            id,
            topic,
            qos,
            filter,
            queue: Mutex::new(VecDeque::new()),
            seen: Mutex::new(HashSet::new()),
            latest: Mutex::new(HashMap::new()),
            incompatible_writers: Mutex::new(HashSet::new()),
            status: Mutex::new(ReaderStatus::default()),
            enabled: Mutex::new(StatusMask::ALL),
            status_core: ConditionCore::new(),
            hooks: SignalHooks::default(),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn topic(&self) -> &Topic {
        &self.topic
    }

    pub(crate) fn qos(&self) -> &QoS {
        &self.qos
    }

    pub(crate) fn filter(&self) -> Option<&ContentFilter> {
        self.filter.as_ref()
    }

    pub(crate) fn hooks(&self) -> &SignalHooks {
        &self.hooks
    }

    pub(crate) fn has_notices(&self) -> bool {
        !self.queue.lock().is_empty()
    }

    pub(crate) fn active_statuses(&self) -> StatusMask {
        self.status.lock().active
    }

    pub(crate) fn enabled_statuses(&self) -> StatusMask {
        *self.enabled.lock()
    }

    pub(crate) fn set_enabled_statuses(&self, mask: StatusMask) {
        *self.enabled.lock() = mask;
        if self.active_statuses().intersects(mask) {
            self.hooks.notify();
        }
    }

    pub(crate) fn accepts_writer(&self, writer_id: u64) -> bool {
        !self.incompatible_writers.lock().contains(&writer_id)
    }

    /// Whether a dispose of `key` must reach this reader.
    pub(crate) fn wants_dispose(&self, key: &InstanceKey) -> bool {
        self.filter.is_none() || self.seen.lock().contains(key)
    }

    pub(crate) fn on_writer_matched(&self) {
        self.status.lock().on_matched();
        self.hooks.notify();
    }

    pub(crate) fn on_writer_incompatible(&self, writer_id: u64, policy: &'static str) {
        self.incompatible_writers.lock().insert(writer_id);
        self.status.lock().on_incompatible(policy);
        log::debug!(
            "[broker] reader {} on '{}' refuses writer {}: incompatible {}",
            self.id,
            self.topic.name(),
            writer_id,
            policy
        );
        self.hooks.notify();
    }

    pub(crate) fn on_writer_gone(&self, writer_id: u64) {
        let was_incompatible = self.incompatible_writers.lock().remove(&writer_id);
        if !was_incompatible {
            self.status.lock().on_unmatched();
            self.hooks.notify();
        }
    }

    /// Append a notice, applying history and resource limits.
    ///
    /// Returns `false` if the notice was rejected or already delivered.
    pub(crate) fn enqueue(&self, notice: Notice) -> bool {
        self.push(notice, false)
    }

    /// Append a late-joiner replay notice, unless the same or a newer update
    /// of the key already reached this reader live.
    pub(crate) fn enqueue_replay(&self, notice: Notice) -> bool {
        self.push(notice, true)
    }

    fn push(&self, notice: Notice, replay: bool) -> bool {
        {
            let mut queue = self.queue.lock();
            let mut latest = self.latest.lock();
            let delivered = latest.get(&notice.key).copied();
            let duplicate = match delivered {
                Some(seq) if replay => seq >= notice.sequence,
                Some(seq) => seq == notice.sequence,
                None => false,
            };
            if duplicate {
                log::trace!(
                    "[broker] reader {} already has {} seq {}",
                    self.id,
                    notice.key,
                    notice.sequence
                );
                return false;
            }

            let mut status = self.status.lock();

            if let History::KeepLast(depth) = self.qos.history {
                while queue.len() >= depth {
                    queue.pop_front();
                    status.on_lost();
                }
            }
            if let Some(max) = self.qos.resource_limits.max_samples {
                if queue.len() >= max {
                    status.on_rejected(&notice.key);
                    drop(status);
                    drop(latest);
                    drop(queue);
                    self.hooks.notify();
                    return false;
                }
            }

            if self.filter.is_some() {
                let mut seen = self.seen.lock();
                match notice.kind {
                    NoticeKind::Alive => seen.insert(notice.key.clone()),
                    NoticeKind::Disposed => seen.remove(&notice.key),
                };
            }

            let newest = delivered.map_or(notice.sequence, |seq| seq.max(notice.sequence));
            latest.insert(notice.key.clone(), newest);
            queue.push_back(notice);
            status.active |= StatusMask::DATA_AVAILABLE;
        }
        self.hooks.notify();
        true
    }

    pub(crate) fn drain(&self) -> Vec<Notice> {
        let mut queue = self.queue.lock();
        let notices: Vec<Notice> = queue.drain(..).collect();
        let mut status = self.status.lock();
        status.active = status.active.without(StatusMask::DATA_AVAILABLE);
        notices
    }
}

/// Subscriber endpoint: a queue of notices for one topic, optionally filtered.
///
/// Dropping the reader unregisters it from the broker.
pub struct Reader {
    pub(super) shared: Arc<ReaderShared>,
    broker: Arc<Broker>,
}

impl Reader {
    pub(crate) fn new(shared: Arc<ReaderShared>, broker: Arc<Broker>) -> Self {
        Self { shared, broker }
    }

    /// Reader identifier, unique within the broker.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Subscribed topic.
    pub fn topic(&self) -> &Topic {
        &self.shared.topic
    }

    /// Reader QoS.
    pub fn qos(&self) -> &QoS {
        &self.shared.qos
    }

    /// Content filter, if any.
    pub fn filter(&self) -> Option<&ContentFilter> {
        self.shared.filter()
    }

    /// Atomically drain every queued notice, oldest first. Never blocks.
    pub fn take(&self) -> Vec<Notice> {
        self.shared.drain()
    }

    /// `true` if notices are waiting.
    pub fn has_notices(&self) -> bool {
        self.shared.has_notices()
    }

    /// New condition active while notices are queued.
    pub fn read_condition(&self) -> ReadCondition {
        ReadCondition::new(Arc::clone(&self.shared))
    }

    /// The reader's status condition (one per reader; clones share identity).
    pub fn status_condition(&self) -> StatusCondition {
        StatusCondition::new(
            Arc::clone(&self.shared.status_core),
            Arc::clone(&self.shared),
        )
    }

    /// Raised, unread status flags.
    pub fn status_changes(&self) -> StatusMask {
        self.shared.active_statuses()
    }

    /// Incompatible-QoS status; clears REQUESTED_INCOMPATIBLE_QOS.
    pub fn requested_incompatible_qos_status(&self) -> RequestedIncompatibleQosStatus {
        self.shared.status.lock().take_incompatible()
    }

    /// Lost-notice status; clears SAMPLE_LOST.
    pub fn sample_lost_status(&self) -> SampleLostStatus {
        self.shared.status.lock().take_lost()
    }

    /// Rejected-notice status; clears SAMPLE_REJECTED.
    pub fn sample_rejected_status(&self) -> SampleRejectedStatus {
        self.shared.status.lock().take_rejected()
    }

    /// Writer matching status; clears SUBSCRIPTION_MATCHED.
    pub fn subscription_matched_status(&self) -> SubscriptionMatchedStatus {
        self.shared.status.lock().take_matched()
    }

    /// `Err(IncompatibleQos)` while a refused writer is still registered.
    ///
    /// Unlike [`Reader::requested_incompatible_qos_status`] this does not
    /// clear any status flag.
    pub fn ensure_compatible(&self) -> Result<()> {
        if self.shared.incompatible_writers.lock().is_empty() {
            return Ok(());
        }
        let policy = self
            .shared
            .status
            .lock()
            .incompatible
            .last_policy
            .unwrap_or("UNKNOWN");
        Err(Error::IncompatibleQos {
            topic: self.shared.topic.name().to_string(),
            policy,
        })
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.broker.unregister_reader(&self.shared);
    }
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("id", &self.shared.id)
            .field("topic", &self.shared.topic.name())
            .field("filter", &self.shared.filter.as_ref().map(|c| c.expression()))
            .finish()
    }
}
