// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Quality of Service policies for writers and readers.
//!
//! Only the policies that change broker behavior are modelled:
//! reliability and durability take part in writer/reader matching, history
//! and resource limits bound a reader's queue.

mod profile;

pub use profile::{
    FilterProfile, QosProvider, LOT_STATE_PROFILE, TEMPERATURE_ALARM_FILTER, TEMPERATURE_PROFILE,
};

use crate::error::{Error, Result};
use serde::Deserialize;

/// Reliability policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reliability {
    /// Samples may be dropped.
    BestEffort,
    /// Every sample is delivered.
    Reliable,
}

/// Durability policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Durability {
    /// Late-joining readers see only new samples.
    Volatile,
    /// Late-joining readers receive the current alive instances.
    TransientLocal,
}

/// Reader history policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum History {
    /// Keep the newest `depth` notices, evicting the oldest.
    KeepLast(usize),
    /// Keep every notice (bounded only by resource limits).
    KeepAll,
}

/// Resource limits applied to a reader queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceLimits {
    /// Maximum queued notices; `None` is unbounded.
    pub max_samples: Option<usize>,
}

/// QoS of a writer or reader.
///
/// ```rust
/// use lotbus::qos::{QoS, Reliability};
///
/// let qos = QoS::reliable().transient_local().keep_last(10);
/// assert_eq!(qos.reliability, Reliability::Reliable);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QoS {
    /// Reliability policy
    pub reliability: Reliability,
    /// Durability policy
    pub durability: Durability,
    /// History policy
    pub history: History,
    /// Resource limits
    pub resource_limits: ResourceLimits,
}

impl Default for QoS {
    fn default() -> Self {
        Self::best_effort()
    }
}

impl QoS {
    /// Best-effort, volatile, keep-all.
    pub fn best_effort() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            durability: Durability::Volatile,
            history: History::KeepAll,
            resource_limits: ResourceLimits::default(),
        }
    }

    /// Reliable, volatile, keep-all.
    pub fn reliable() -> Self {
        Self {
            reliability: Reliability::Reliable,
            ..Self::best_effort()
        }
    }

    /// Set KEEP_LAST history depth.
    #[must_use]
    pub fn keep_last(mut self, depth: usize) -> Self {
        self.history = History::KeepLast(depth);
        self
    }

    /// Set KEEP_ALL history policy.
    #[must_use]
    pub fn keep_all(mut self) -> Self {
        self.history = History::KeepAll;
        self
    }

    /// Set volatile durability.
    #[must_use]
    pub fn volatile(mut self) -> Self {
        self.durability = Durability::Volatile;
        self
    }

    /// Set transient-local durability.
    #[must_use]
    pub fn transient_local(mut self) -> Self {
        self.durability = Durability::TransientLocal;
        self
    }

    /// Cap the reader queue length.
    #[must_use]
    pub fn max_samples(mut self, max: usize) -> Self {
        self.resource_limits.max_samples = Some(max);
        self
    }

    /// Reject settings that cannot be honored.
    pub fn validate(&self) -> Result<()> {
        if self.history == History::KeepLast(0) {
            return Err(Error::InvalidQos("KEEP_LAST depth must be > 0".to_string()));
        }
        if self.resource_limits.max_samples == Some(0) {
            return Err(Error::InvalidQos("max_samples must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Name of the first policy that prevents `writer` from serving `reader`.
///
/// Matching rules:
/// - Reliable writer -> any reader
/// - BestEffort writer + Reliable reader: RELIABILITY
/// - Volatile writer + TransientLocal reader: DURABILITY
pub fn incompatible_policy(writer: &QoS, reader: &QoS) -> Option<&'static str> {
    let reliability_ok = match (writer.reliability, reader.reliability) {
        (Reliability::Reliable, _) => true,
        (Reliability::BestEffort, Reliability::BestEffort) => true,
        (Reliability::BestEffort, Reliability::Reliable) => false,
    };
    if !reliability_ok {
        log::debug!(
            "[qos] reliability mismatch (writer={:?}, reader={:?})",
            writer.reliability,
            reader.reliability
        );
        return Some("RELIABILITY");
    }

    let rank = |d: Durability| match d {
        Durability::Volatile => 0u8,
        Durability::TransientLocal => 1u8,
    };
    if rank(writer.durability) < rank(reader.durability) {
        log::debug!(
            "[qos] durability mismatch (writer={:?}, reader={:?})",
            writer.durability,
            reader.durability
        );
        return Some("DURABILITY");
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let qos = QoS::reliable().transient_local().keep_last(50);
        assert_eq!(qos.reliability, Reliability::Reliable);
        assert_eq!(qos.durability, Durability::TransientLocal);
        assert_eq!(qos.history, History::KeepLast(50));
        assert_eq!(QoS::default(), QoS::best_effort());
    }

    #[test]
    fn test_validate() {
        assert!(QoS::reliable().validate().is_ok());
        assert!(matches!(
            QoS::reliable().keep_last(0).validate(),
            Err(Error::InvalidQos(_))
        ));
        assert!(QoS::reliable().max_samples(0).validate().is_err());
    }

    #[test]
    fn test_compatibility_matrix() {
        let be = QoS::best_effort();
        let rel = QoS::reliable();
        assert_eq!(incompatible_policy(&rel, &be), None);
        assert_eq!(incompatible_policy(&rel, &rel), None);
        assert_eq!(incompatible_policy(&be, &be), None);
        assert_eq!(incompatible_policy(&be, &rel), Some("RELIABILITY"));
        assert_eq!(
            incompatible_policy(&rel, &rel.transient_local()),
            Some("DURABILITY")
        );
        assert_eq!(
            incompatible_policy(&rel.transient_local(), &rel.transient_local()),
            None
        );
    }
}
