// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Chocolate factory workflow built on lotbus.
//!
//! Lots travel COCOA_BUTTER -> SUGAR -> MILK -> VANILLA -> TEMPERING. Every
//! station runs on its own thread against a shared [`Domain`]; the monitor
//! starts lots and counts completions.
//!
//! ```ignore
//! let domain = Domain::new(0, QosProvider::builtin())?;
//! let shutdown = Shutdown::new();
//! std::thread::scope(|s| {
//!     for kind in StationKind::stations() {
//!         s.spawn(|| station::run(&domain, kind, "7", &shutdown));
//!     }
//!     let report = monitor::run(&domain, &MonitorConfig::default(), &shutdown);
//!     shutdown.trigger();
//!     report
//! })?;
//! ```

pub mod monitor;
pub mod sensor;
pub mod station;
pub mod types;

pub use monitor::{MonitorConfig, MonitorReport};
pub use sensor::TemperatureSensor;
pub use station::{StationConfig, StationReport};
pub use types::{
    ChocolateLotState, LotStatusKind, StationKind, Temperature, LOT_STATE_TOPIC,
    TEMPERATURE_TOPIC,
};

use crate::domain::Domain;
use crate::error::Result;

/// Declare both factory topics; safe to call from every station.
pub fn declare_topics(domain: &Domain) -> Result<()> {
    domain.register_type::<ChocolateLotState>(LOT_STATE_TOPIC)?;
    domain.register_type::<Temperature>(TEMPERATURE_TOPIC)?;
    Ok(())
}
