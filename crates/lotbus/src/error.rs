// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy shared by every lotbus entity.
//!
//! Setup-time errors (`UnknownTopic`, `DuplicateTopic`, `InvalidSchema`,
//! `InvalidFilterSyntax`, `InvalidQos`, `Config`) are meant to abort startup.
//! Runtime errors raised inside a waitset handler (`UnknownInstance` from a
//! racing dispose, `TypeMismatch`) are reported through
//! [`DispatchOutcome`](crate::DispatchOutcome) and never stop the loop.

use crate::filter::FilterError;
use crate::schema::InstanceKey;
use thiserror::Error;

/// Errors returned by lotbus operations.
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Topic name was never declared in this domain.
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// Topic name already declared with a different schema or key set.
    #[error("Topic {0} already declared with a different schema")]
    DuplicateTopic(String),

    /// Schema or key-field declaration is inconsistent.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Content filter expression does not parse or references unknown fields.
    #[error("Invalid filter: {0}")]
    InvalidFilterSyntax(#[from] FilterError),

    /// QoS policy is invalid (e.g. zero history depth).
    #[error("Invalid QoS: {0}")]
    InvalidQos(String),

    /// Profile file could not be parsed or a profile name is missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Domain ID out of range (0-232).
    #[error("Invalid domain_id: {0} (must be 0-232)")]
    InvalidDomainId(u32),

    // ========================================================================
    // Data Errors
    // ========================================================================
    /// Dispose of a key that has no alive instance.
    #[error("Unknown instance {key} on topic {topic}")]
    UnknownInstance {
        /// Topic name.
        topic: String,
        /// Instance key that was disposed.
        key: InstanceKey,
    },

    /// Sample does not conform to the topic schema.
    #[error("Type mismatch on topic {topic}: {reason}")]
    TypeMismatch {
        /// Topic name.
        topic: String,
        /// What did not match.
        reason: String,
    },

    /// Reader and writer QoS policies cannot be matched.
    #[error("Incompatible QoS policy {policy} on topic {topic}")]
    IncompatibleQos {
        /// Topic name.
        topic: String,
        /// Name of the offending policy.
        policy: &'static str,
    },

    // ========================================================================
    // Dispatch Errors
    // ========================================================================
    /// No condition became active before the timeout (not a failure).
    #[error("Timed out waiting for conditions")]
    Timeout,

    /// Condition is already attached to a waitset.
    #[error("Condition {0} is already attached to a waitset")]
    ConditionInUse(u64),

    /// Condition is not attached to this waitset.
    #[error("Condition {0} is not attached to this waitset")]
    ConditionNotAttached(u64),

    /// Invalid argument passed to an entry point.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error with underlying cause.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// `true` for the dispatch timeout, which callers treat as "no activity".
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}

/// Convenient alias for API results using the public `Error` type.
pub type Result<T> = core::result::Result<T, Error>;
