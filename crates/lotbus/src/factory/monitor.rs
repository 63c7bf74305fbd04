// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Monitoring/control application.
//!
//! Starts lots at a fixed interval, follows every lot-state update, and counts
//! a lot as completed when the tempering station disposes it. Out-of-range
//! tempering temperatures are reported through a filtered reader.

use super::declare_topics;
use super::types::{
    ChocolateLotState, StationKind, Temperature, LOT_STATE_TOPIC, TEMPERATURE_TOPIC,
};
use crate::broker::{DataReader, DataWriter};
use crate::condition::StatusMask;
use crate::domain::{Domain, Shutdown};
use crate::error::{Error, Result};
use crate::qos::{LOT_STATE_PROFILE, TEMPERATURE_ALARM_FILTER, TEMPERATURE_PROFILE};
use crate::waitset::WaitSet;
use crossbeam::channel::{self, select, Receiver};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Monitor tuning.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Completions to wait for before returning.
    pub lots_to_process: u64,
    /// Delay between two started lots.
    pub lot_interval: Duration,
    /// Upper bound of a single waitset dispatch.
    pub dispatch_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            lots_to_process: 10,
            lot_interval: Duration::from_secs(10),
            dispatch_timeout: Duration::from_secs(10),
        }
    }
}

/// Counters returned when the monitor stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorReport {
    /// WAITING lots published by the starter.
    pub lots_started: u64,
    /// Lots seen disposed by the tempering station.
    pub lots_completed: u64,
    /// ALIVE lot-state updates received.
    pub updates_received: u64,
    /// Out-of-range temperature readings.
    pub temperature_alarms: u64,
}

#[derive(Default)]
struct Counters {
    started: AtomicU64,
    completed: AtomicU64,
    updates: AtomicU64,
    alarms: AtomicU64,
}

/// Run the monitor until `lots_to_process` lots completed or `shutdown`.
pub fn run(domain: &Domain, config: &MonitorConfig, shutdown: &Shutdown) -> Result<MonitorReport> {
    declare_topics(domain)?;

    let lot_qos = domain.profile(LOT_STATE_PROFILE)?;
    let writer = domain.create_data_writer::<ChocolateLotState>(LOT_STATE_TOPIC, lot_qos)?;
    let lot_reader = Arc::new(
        domain.create_data_reader::<ChocolateLotState>(LOT_STATE_TOPIC, None, lot_qos)?,
    );
    let temperature_reader = Arc::new(domain.create_data_reader::<Temperature>(
        TEMPERATURE_TOPIC,
        Some(domain.named_filter(TEMPERATURE_ALARM_FILTER)?),
        domain.profile(TEMPERATURE_PROFILE)?,
    )?);

    let counters = Arc::new(Counters::default());
    let waitset = WaitSet::new();
    waitset.attach(shutdown.guard())?;

    let lot_status = lot_reader.status_condition();
    lot_status.set_enabled_statuses(StatusMask::DATA_AVAILABLE);
    let (reader, tally) = (Arc::clone(&lot_reader), Arc::clone(&counters));
    waitset.attach_with_handler(lot_status, move |_| monitor_lot_state(&reader, &tally))?;

    let temperature_status = temperature_reader.status_condition();
    temperature_status.set_enabled_statuses(StatusMask::DATA_AVAILABLE);
    let (reader, tally) = (Arc::clone(&temperature_reader), Arc::clone(&counters));
    waitset.attach_with_handler(temperature_status, move |_| {
        monitor_temperature(&reader, &tally)
    })?;

    let (stop_tx, stop_rx) = channel::bounded::<()>(0);
    thread::scope(|scope| -> Result<()> {
        let starter = thread::Builder::new()
            .name("lotbus-lot-starter".to_string())
            .spawn_scoped(scope, || {
                publish_start_lots(&writer, config, &counters, &stop_rx, &shutdown.receiver());
            })?;

        let mut result = Ok(());
        while counters.completed.load(Ordering::Acquire) < config.lots_to_process
            && !shutdown.is_triggered()
        {
            match waitset.dispatch(config.dispatch_timeout) {
                Ok(_) => {}
                Err(Error::Timeout) => log::debug!("[monitor] no lot activity"),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        drop(stop_tx);
        if starter.join().is_err() {
            log::error!("[monitor] lot starter panicked");
        }
        result
    })?;

    let report = MonitorReport {
        lots_started: counters.started.load(Ordering::Acquire),
        lots_completed: counters.completed.load(Ordering::Acquire),
        updates_received: counters.updates.load(Ordering::Acquire),
        temperature_alarms: counters.alarms.load(Ordering::Acquire),
    };
    log::info!(
        "[monitor] done: {} lot(s) started, {} completed",
        report.lots_started,
        report.lots_completed
    );
    Ok(report)
}

fn publish_start_lots(
    writer: &DataWriter<ChocolateLotState>,
    config: &MonitorConfig,
    counters: &Counters,
    stop: &Receiver<()>,
    shutdown: &Receiver<()>,
) {
    for count in 0..config.lots_to_process {
        if count > 0 {
            select! {
                recv(stop) -> _ => return,
                recv(shutdown) -> _ => return,
                default(config.lot_interval) => {}
            }
        }

        let lot_id = (count % 100) as u32;
        let lot = ChocolateLotState::waiting(lot_id, StationKind::CocoaButterController);
        log::info!("[monitor] starting lot {}", lot);
        match writer.write(&lot) {
            Ok(_) => {
                counters.started.fetch_add(1, Ordering::AcqRel);
            }
            Err(e) => log::warn!("[monitor] failed to start lot #{}: {}", lot.lot_id, e),
        }
    }
}

fn monitor_lot_state(reader: &DataReader<ChocolateLotState>, counters: &Counters) -> Result<()> {
    for sample in reader.take() {
        if sample.is_alive() {
            counters.updates.fetch_add(1, Ordering::AcqRel);
            if let Some(lot) = &sample.data {
                log::info!("[monitor] received lot update {}", lot);
            }
        } else {
            counters.completed.fetch_add(1, Ordering::AcqRel);
            log::info!("[monitor] lot {} is completed", sample.key);
        }
    }
    Ok(())
}

fn monitor_temperature(reader: &DataReader<Temperature>, counters: &Counters) -> Result<()> {
    for sample in reader.take() {
        if !sample.is_alive() {
            continue;
        }
        if let Some(reading) = sample.data {
            counters.alarms.fetch_add(1, Ordering::AcqRel);
            log::warn!(
                "[monitor] tempering temperature out of range: {} (sensor {})",
                reading.degrees,
                reading.sensor_id
            );
        }
    }
    Ok(())
}
