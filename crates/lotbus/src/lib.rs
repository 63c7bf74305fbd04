// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # lotbus - topic-routed, content-filtered pub/sub with keyed instances
//!
//! An intra-process publish/subscribe pipeline: writers publish samples on
//! named topics, the broker maintains the keyed instance table and routes each
//! update to the readers whose content filter matches, and waitsets block a
//! thread until reader data or status events arrive.
//!
//! ## Quick Start
//!
//! ```rust
//! use lotbus::{Domain, FieldType, FieldValue, QoS, QosProvider, Sample, Schema};
//!
//! fn main() -> lotbus::Result<()> {
//!     let domain = Domain::new(0, QosProvider::builtin())?;
//!     let schema = Schema::new("Lot")
//!         .field("lot_id", FieldType::UInt32)
//!         .field("next_station", FieldType::String);
//!     domain.declare_topic("Lots", schema, &["lot_id"])?;
//!
//!     let filter = domain.create_filter("Lots", "next_station = %0", vec!["'MILK'".into()])?;
//!     let reader = domain.create_reader("Lots", Some(filter), QoS::reliable())?;
//!     let writer = domain.create_writer("Lots", QoS::reliable())?;
//!
//!     writer.publish(Sample::new(vec![
//!         FieldValue::from_u32(1),
//!         FieldValue::from_string("MILK"),
//!     ]))?;
//!     assert_eq!(reader.take().len(), 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +----------------------------------------------------------------+
//! |  factory: stations, temperature sensor, monitor                 |
//! +----------------------------------------------------------------+
//! |  Domain: TopicRegistry | Broker | InstanceStore | QosProvider   |
//! +----------------------------------------------------------------+
//! |  Writer -> filter -> Reader queue -> Condition -> WaitSet       |
//! +----------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`topic`] / [`schema`] - topic declarations, samples and keys
//! - [`filter`] - SQL-like content filters
//! - [`instance`] - keyed instance lifecycle store
//! - [`broker`] - writers, readers, reader statuses, typed endpoints
//! - [`condition`] / [`waitset`] - event dispatch
//! - [`qos`] - QoS policies and YAML profiles
//! - [`factory`] - the chocolate factory station workflow

pub mod broker;
pub mod condition;
pub mod domain;
pub mod error;
pub mod factory;
pub mod filter;
pub mod instance;
pub mod qos;
pub mod schema;
pub mod topic;
pub mod waitset;

pub use broker::{
    Broker, DataReader, DataWriter, Notice, NoticeKind, Reader, RequestedIncompatibleQosStatus,
    SampleLostStatus, SampleRejectedReason, SampleRejectedStatus, SubscriptionMatchedStatus,
    TakenSample, TopicType, Writer,
};
pub use condition::{Condition, GuardCondition, ReadCondition, StatusCondition, StatusMask};
pub use domain::{Domain, Shutdown, MAX_DOMAIN_ID};
pub use error::{Error, Result};
pub use filter::{ContentFilter, FilterError};
pub use instance::{Instance, InstanceState, InstanceStore};
pub use qos::{QoS, QosProvider};
pub use schema::{FieldType, FieldValue, InstanceKey, KeyPart, Sample, Schema};
pub use topic::{Topic, TopicRegistry};
pub use waitset::{DispatchOutcome, WaitSet};

/// lotbus version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
