// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Conditions - wakeable predicates aggregated by a [`WaitSet`](crate::WaitSet)
//!
//! [`Condition`] is a closed enum over the three condition kinds:
//!
//! - [`ReadCondition`]: active while the reader queue holds notices.
//! - [`StatusCondition`]: active while an enabled reader status flag is raised.
//! - [`GuardCondition`]: active while the application says so.
//!
//! A condition belongs to at most one waitset at a time.

use crate::broker::ReaderShared;
use crate::waitset::driver::{Notifier, SignalHooks};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_CONDITION_ID: AtomicU64 = AtomicU64::new(1);

/// Status mask bits for StatusCondition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusMask(u32);

impl StatusMask {
    /// No status enabled
    pub const NONE: StatusMask = StatusMask(0);

    /// All statuses enabled
    pub const ALL: StatusMask = StatusMask(0x1F);

    /// Data available to take
    pub const DATA_AVAILABLE: StatusMask = StatusMask(1 << 0);

    /// Notice evicted by KEEP_LAST history
    pub const SAMPLE_LOST: StatusMask = StatusMask(1 << 1);

    /// Notice refused by resource limits
    pub const SAMPLE_REJECTED: StatusMask = StatusMask(1 << 2);

    /// A writer with incompatible QoS was found
    pub const REQUESTED_INCOMPATIBLE_QOS: StatusMask = StatusMask(1 << 3);

    /// A compatible writer was matched or unmatched
    pub const SUBSCRIPTION_MATCHED: StatusMask = StatusMask(1 << 4);

    /// Raw bits.
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Check if this mask contains every bit of `other`.
    #[must_use]
    pub const fn contains(&self, other: StatusMask) -> bool {
        (self.0 & other.0) == other.0
    }

    /// `true` if any bit is shared with `other`.
    #[must_use]
    pub const fn intersects(&self, other: StatusMask) -> bool {
        (self.0 & other.0) != 0
    }

    /// `true` if no bit is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Clear the bits of `other`.
    #[must_use]
    pub const fn without(self, other: StatusMask) -> Self {
        StatusMask(self.0 & !other.0)
    }
}

impl std::ops::BitOr for StatusMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        StatusMask(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for StatusMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl std::ops::BitAnd for StatusMask {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        StatusMask(self.0 & rhs.0)
    }
}

/// Identity and waitset ownership shared by every clone of a condition.
pub(crate) struct ConditionCore {
    id: u64,
    /// Notifier id of the owning waitset, 0 when detached.
    owner: AtomicU64,
}

impl ConditionCore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_CONDITION_ID.fetch_add(1, Ordering::Relaxed),
            owner: AtomicU64::new(0),
        })
    }
}

/// Active while the reader has queued notices.
#[derive(Clone)]
pub struct ReadCondition {
    core: Arc<ConditionCore>,
    reader: Arc<ReaderShared>,
}

impl ReadCondition {
    pub(crate) fn new(reader: Arc<ReaderShared>) -> Self {
        Self {
            core: ConditionCore::new(),
            reader,
        }
    }
}

/// Active while any enabled status flag of the reader is raised.
#[derive(Clone)]
pub struct StatusCondition {
    core: Arc<ConditionCore>,
    reader: Arc<ReaderShared>,
}

impl StatusCondition {
    pub(crate) fn new(core: Arc<ConditionCore>, reader: Arc<ReaderShared>) -> Self {
        Self { core, reader }
    }

    /// Select which statuses raise the trigger value.
    ///
    /// ```ignore
    /// reader.status_condition().set_enabled_statuses(
    ///     StatusMask::DATA_AVAILABLE | StatusMask::REQUESTED_INCOMPATIBLE_QOS,
    /// );
    /// ```
    pub fn set_enabled_statuses(&self, mask: StatusMask) {
        self.reader.set_enabled_statuses(mask);
    }

    /// Currently enabled statuses.
    pub fn enabled_statuses(&self) -> StatusMask {
        self.reader.enabled_statuses()
    }

    /// Statuses raised and not yet read, regardless of the enabled mask.
    pub fn active_statuses(&self) -> StatusMask {
        self.reader.active_statuses()
    }
}

struct GuardInner {
    trigger: AtomicBool,
    hooks: SignalHooks,
}

/// Application-controlled condition.
#[derive(Clone)]
pub struct GuardCondition {
    core: Arc<ConditionCore>,
    inner: Arc<GuardInner>,
}

impl GuardCondition {
    /// New guard with trigger value `false`.
    pub fn new() -> Self {
        Self {
            core: ConditionCore::new(),
            inner: Arc::new(GuardInner {
                trigger: AtomicBool::new(false),
                hooks: SignalHooks::default(),
            }),
        }
    }

    /// Set the trigger value; `true` wakes the owning waitset.
    pub fn set_trigger_value(&self, value: bool) {
        self.inner.trigger.store(value, Ordering::Release);
        if value {
            self.inner.hooks.notify();
        }
    }

    /// Current trigger value.
    pub fn trigger_value(&self) -> bool {
        self.inner.trigger.load(Ordering::Acquire)
    }
}

impl Default for GuardCondition {
    fn default() -> Self {
        Self::new()
    }
}

/// A wakeable predicate attachable to a waitset.
#[derive(Clone)]
pub enum Condition {
    /// Reader queue non-empty
    Read(ReadCondition),
    /// Reader status flag raised
    Status(StatusCondition),
    /// Application trigger
    Guard(GuardCondition),
}

impl Condition {
    fn core(&self) -> &Arc<ConditionCore> {
        match self {
            Condition::Read(c) => &c.core,
            Condition::Status(c) => &c.core,
            Condition::Guard(c) => &c.core,
        }
    }

    fn hooks(&self) -> &SignalHooks {
        match self {
            Condition::Read(c) => c.reader.hooks(),
            Condition::Status(c) => c.reader.hooks(),
            Condition::Guard(c) => &c.inner.hooks,
        }
    }

    /// Unique identifier, shared by clones.
    pub fn id(&self) -> u64 {
        self.core().id
    }

    /// `true` while the condition is ACTIVE.
    pub fn trigger_value(&self) -> bool {
        match self {
            Condition::Read(c) => c.reader.has_notices(),
            Condition::Status(c) => c
                .reader
                .active_statuses()
                .intersects(c.reader.enabled_statuses()),
            Condition::Guard(c) => c.trigger_value(),
        }
    }

    /// Topic of the underlying reader, `None` for guards.
    pub fn topic_name(&self) -> Option<&str> {
        match self {
            Condition::Read(c) => Some(c.reader.topic().name()),
            Condition::Status(c) => Some(c.reader.topic().name()),
            Condition::Guard(_) => None,
        }
    }

    /// Claim the condition for the waitset owning `notifier`.
    pub(crate) fn claim(&self, notifier: &Arc<Notifier>) -> bool {
        let claimed = self
            .core()
            .owner
            .compare_exchange(0, notifier.id(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if claimed {
            self.hooks().add(self.id(), notifier);
            if self.trigger_value() {
                notifier.signal();
            }
        }
        claimed
    }

    /// Release the claim taken by [`Condition::claim`].
    pub(crate) fn release(&self, notifier: &Notifier) {
        self.hooks().remove(self.id(), notifier.id());
        let _ = self.core().owner.compare_exchange(
            notifier.id(),
            0,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

impl From<ReadCondition> for Condition {
    fn from(c: ReadCondition) -> Self {
        Condition::Read(c)
    }
}

impl From<StatusCondition> for Condition {
    fn from(c: StatusCondition) -> Self {
        Condition::Status(c)
    }
}

impl From<GuardCondition> for Condition {
    fn from(c: GuardCondition) -> Self {
        Condition::Guard(c)
    }
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Condition::Read(_) => "Read",
            Condition::Status(_) => "Status",
            Condition::Guard(_) => "Guard",
        };
        f.debug_struct("Condition")
            .field("kind", &kind)
            .field("id", &self.id())
            .field("topic", &self.topic_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_status_mask_ops() {
        let mask = StatusMask::DATA_AVAILABLE | StatusMask::REQUESTED_INCOMPATIBLE_QOS;
        assert!(mask.contains(StatusMask::DATA_AVAILABLE));
        assert!(!mask.contains(StatusMask::SAMPLE_LOST));
        assert!(mask.intersects(StatusMask::ALL));
        assert!(mask.without(mask).is_empty());
        assert_eq!((mask & StatusMask::DATA_AVAILABLE), StatusMask::DATA_AVAILABLE);
    }

    #[test]
    fn test_guard_trigger_signals_owner() {
        let guard = GuardCondition::new();
        let cond = Condition::from(guard.clone());
        let notifier = Notifier::new();
        assert!(cond.claim(&notifier));
        notifier.clear();

        guard.set_trigger_value(true);
        assert!(cond.trigger_value());
        assert!(notifier.wait_until(Some(Instant::now())));
    }

    #[test]
    fn test_claim_is_exclusive() {
        let cond = Condition::from(GuardCondition::new());
        let first = Notifier::new();
        let second = Notifier::new();
        assert!(cond.claim(&first));
        assert!(!cond.claim(&second));
        assert!(!cond.claim(&first));
        cond.release(&first);
        assert!(cond.claim(&second));
    }

    #[test]
    fn test_clones_share_identity() {
        let guard = GuardCondition::new();
        let a = Condition::from(guard.clone());
        let b = Condition::from(guard);
        assert_eq!(a, b);
        assert_ne!(a, Condition::from(GuardCondition::new()));
    }
}
