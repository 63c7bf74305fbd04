// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reader communication statuses.
//!
//! Each getter on [`Reader`](super::Reader) returns a snapshot and resets the
//! `*_change` counters together with the matching status flag.

use crate::condition::StatusMask;
use crate::schema::InstanceKey;

/// Notices evicted by KEEP_LAST history before they were taken.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleLostStatus {
    /// Total cumulative count of lost notices.
    pub total_count: u32,
    /// Change in total_count since last read.
    pub total_count_change: i32,
}

/// Reason why a notice was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleRejectedReason {
    /// Nothing rejected yet.
    #[default]
    NotRejected,
    /// Queue reached `max_samples`.
    SamplesLimit,
}

/// Notices refused because the queue hit its resource limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleRejectedStatus {
    /// Total cumulative count of rejected notices.
    pub total_count: u32,
    /// Change in total_count since last read.
    pub total_count_change: i32,
    /// Reason for the last rejection.
    pub last_reason: SampleRejectedReason,
    /// Instance of the last rejected notice.
    pub last_instance_key: Option<InstanceKey>,
}

/// Writers whose offered QoS cannot serve this reader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestedIncompatibleQosStatus {
    /// Total cumulative count of incompatible writers seen.
    pub total_count: u32,
    /// Change in total_count since last read.
    pub total_count_change: i32,
    /// Name of the last offending policy (`RELIABILITY`, `DURABILITY`).
    pub last_policy: Option<&'static str>,
}

/// Compatible writers matched with this reader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionMatchedStatus {
    /// Total cumulative count of matched writers.
    pub total_count: u32,
    /// Change in total_count since last read.
    pub total_count_change: i32,
    /// Writers currently matched.
    pub current_count: u32,
    /// Change in current_count since last read.
    pub current_count_change: i32,
}

#[derive(Debug, Default)]
pub(crate) struct ReaderStatus {
    pub(crate) active: StatusMask,
    pub(crate) lost: SampleLostStatus,
    pub(crate) rejected: SampleRejectedStatus,
    pub(crate) incompatible: RequestedIncompatibleQosStatus,
    pub(crate) matched: SubscriptionMatchedStatus,
}

impl ReaderStatus {
    pub(crate) fn on_lost(&mut self) {
        self.lost.total_count += 1;
        self.lost.total_count_change += 1;
        self.active |= StatusMask::SAMPLE_LOST;
    }

    pub(crate) fn on_rejected(&mut self, key: &InstanceKey) {
        self.rejected.total_count += 1;
        self.rejected.total_count_change += 1;
        self.rejected.last_reason = SampleRejectedReason::SamplesLimit;
        self.rejected.last_instance_key = Some(key.clone());
        self.active |= StatusMask::SAMPLE_REJECTED;
    }

    pub(crate) fn on_incompatible(&mut self, policy: &'static str) {
        self.incompatible.total_count += 1;
        self.incompatible.total_count_change += 1;
        self.incompatible.last_policy = Some(policy);
        self.active |= StatusMask::REQUESTED_INCOMPATIBLE_QOS;
    }

    pub(crate) fn on_matched(&mut self) {
        self.matched.total_count += 1;
        self.matched.total_count_change += 1;
        self.matched.current_count += 1;
        self.matched.current_count_change += 1;
        self.active |= StatusMask::SUBSCRIPTION_MATCHED;
    }

    pub(crate) fn on_unmatched(&mut self) {
        self.matched.current_count = self.matched.current_count.saturating_sub(1);
        self.matched.current_count_change -= 1;
        self.active |= StatusMask::SUBSCRIPTION_MATCHED;
    }

    pub(crate) fn take_lost(&mut self) -> SampleLostStatus {
        let snapshot = self.lost.clone();
        self.lost.total_count_change = 0;
        self.active = self.active.without(StatusMask::SAMPLE_LOST);
        snapshot
    }

    pub(crate) fn take_rejected(&mut self) -> SampleRejectedStatus {
        let snapshot = self.rejected.clone();
        self.rejected.total_count_change = 0;
        self.active = self.active.without(StatusMask::SAMPLE_REJECTED);
        snapshot
    }

    pub(crate) fn take_incompatible(&mut self) -> RequestedIncompatibleQosStatus {
        let snapshot = self.incompatible.clone();
        self.incompatible.total_count_change = 0;
        self.active = self.active.without(StatusMask::REQUESTED_INCOMPATIBLE_QOS);
        snapshot
    }

    pub(crate) fn take_matched(&mut self) -> SubscriptionMatchedStatus {
        let snapshot = self.matched.clone();
        self.matched.total_count_change = 0;
        self.matched.current_count_change = 0;
        self.active = self.active.without(StatusMask::SUBSCRIPTION_MATCHED);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_resets_changes_and_flag() {
        let mut status = ReaderStatus::default();
        status.on_incompatible("RELIABILITY");
        status.on_incompatible("DURABILITY");
        assert!(status.active.contains(StatusMask::REQUESTED_INCOMPATIBLE_QOS));

        let snap = status.take_incompatible();
        assert_eq!(snap.total_count, 2);
        assert_eq!(snap.total_count_change, 2);
        assert_eq!(snap.last_policy, Some("DURABILITY"));
        assert!(status.active.is_empty());

        let again = status.take_incompatible();
        assert_eq!(again.total_count, 2);
        assert_eq!(again.total_count_change, 0);
    }

    #[test]
    fn test_match_unmatch_counts() {
        let mut status = ReaderStatus::default();
        status.on_matched();
        status.on_matched();
        status.on_unmatched();
        let snap = status.take_matched();
        assert_eq!(snap.total_count, 2);
        assert_eq!(snap.current_count, 1);
        assert_eq!(snap.current_count_change, 1);
    }
}
