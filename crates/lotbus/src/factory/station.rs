// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ingredient and tempering stations.
//!
//! Each station reads lot-state updates addressed to it through a content
//! filter on `next_station`, and answers every lot with two updates:
//!
//! ```text
//!   WAITING/COMPLETED, next=ME ──► PROCESSING, station=ME, next=INVALID
//!                                  (processing delay)
//!                              ──► COMPLETED, next=successor   (ingredient)
//!                              ──► dispose(lot)                (tempering)
//! ```

use super::sensor::{TemperatureSensor, SENSOR_PERIOD};
use super::types::{
    ChocolateLotState, LotStatusKind, StationKind, Temperature, LOT_STATE_TOPIC,
    TEMPERATURE_TOPIC,
};
use super::declare_topics;
use crate::broker::{DataReader, DataWriter};
use crate::condition::{StatusCondition, StatusMask};
use crate::domain::{Domain, Shutdown};
use crate::error::{Error, Result};
use crate::qos::{LOT_STATE_PROFILE, TEMPERATURE_PROFILE};
use crate::waitset::WaitSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Station tuning.
#[derive(Debug, Clone)]
pub struct StationConfig {
    /// Time spent "processing" each lot.
    pub processing_delay: Duration,
    /// Upper bound of a single waitset dispatch.
    pub dispatch_timeout: Duration,
    /// Temperature sensor period (tempering station only).
    pub sensor_period: Duration,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            processing_delay: Duration::from_secs(5),
            dispatch_timeout: Duration::from_secs(10),
            sensor_period: SENSOR_PERIOD,
        }
    }
}

/// Summary returned when a station stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationReport {
    /// Station that produced the report.
    pub station: Option<StationKind>,
    /// Lots fully processed (completed or disposed).
    pub lots_processed: u64,
    /// Temperature readings published (tempering station only).
    pub readings_published: u64,
    /// Handler errors logged during dispatch.
    pub handler_failures: usize,
}

/// Run a station with the default [`StationConfig`] until `shutdown`.
pub fn run(
    domain: &Domain,
    kind: StationKind,
    sensor_id: &str,
    shutdown: &Shutdown,
) -> Result<StationReport> {
    run_with_config(domain, kind, sensor_id, shutdown, &StationConfig::default())
}

/// Run a station until `shutdown` is triggered.
///
/// # Errors
///
/// [`Error::InvalidArgument`] for [`StationKind::InvalidController`]; setup
/// errors (topics, profiles, filter) abort before the loop starts.
pub fn run_with_config(
    domain: &Domain,
    kind: StationKind,
    sensor_id: &str,
    shutdown: &Shutdown,
    config: &StationConfig,
) -> Result<StationReport> {
    if kind == StationKind::InvalidController {
        return Err(Error::InvalidArgument(format!("{} is not a station", kind)));
    }
    declare_topics(domain)?;

    let lot_qos = domain.profile(LOT_STATE_PROFILE)?;
    let filter = domain
        .create_filter(
            LOT_STATE_TOPIC,
            "next_station = %0",
            vec![format!("'{}'", kind.label())],
        )?
        .with_name(format!("FilteredLot[{}]", kind));
    let reader =
        domain.create_data_reader::<ChocolateLotState>(LOT_STATE_TOPIC, Some(filter), lot_qos)?;
    let writer = domain.create_data_writer::<ChocolateLotState>(LOT_STATE_TOPIC, lot_qos)?;

    let sensor = if kind == StationKind::TemperingController {
        let temperature_writer = domain.create_data_writer::<Temperature>(
            TEMPERATURE_TOPIC,
            domain.profile(TEMPERATURE_PROFILE)?,
        )?;
        Some(TemperatureSensor::spawn(
            temperature_writer,
            sensor_id.to_string(),
            config.sensor_period,
        )?)
    } else {
        None
    };

    let status = reader.status_condition();
    status.set_enabled_statuses(if kind.is_ingredient() {
        StatusMask::DATA_AVAILABLE
    } else {
        StatusMask::DATA_AVAILABLE | StatusMask::REQUESTED_INCOMPATIBLE_QOS
    });

    let worker = Arc::new(LotWorker {
        kind,
        reader,
        writer,
        status: status.clone(),
        shutdown: shutdown.clone(),
        delay: config.processing_delay,
        processed: AtomicU64::new(0),
    });

    let waitset = WaitSet::new();
    waitset.attach(shutdown.guard())?;
    let handler_worker = Arc::clone(&worker);
    waitset.attach_with_handler(status, move |_| handler_worker.on_status())?;

    log::info!("[station] {} station starting", kind);
    let mut handler_failures = 0;
    while !shutdown.is_triggered() {
        match waitset.dispatch(config.dispatch_timeout) {
            Ok(outcome) => handler_failures += outcome.failures.len(),
            Err(Error::Timeout) => log::debug!("[station] {} waiting for lots", kind),
            Err(e) => return Err(e),
        }
    }
    drop(waitset);

    let readings_published = sensor.map_or(0, TemperatureSensor::stop);
    let report = StationReport {
        station: Some(kind),
        lots_processed: worker.processed.load(Ordering::Relaxed),
        readings_published,
        handler_failures,
    };
    log::info!(
        "[station] {} stopped ({} lot(s) processed)",
        kind,
        report.lots_processed
    );
    Ok(report)
}

struct LotWorker {
    kind: StationKind,
    reader: DataReader<ChocolateLotState>,
    writer: DataWriter<ChocolateLotState>,
    status: StatusCondition,
    shutdown: Shutdown,
    delay: Duration,
    processed: AtomicU64,
}

impl LotWorker {
    fn on_status(&self) -> Result<()> {
        let raised = self.status.active_statuses() & self.status.enabled_statuses();

        if raised.contains(StatusMask::REQUESTED_INCOMPATIBLE_QOS) {
            let incompatible = self.reader.reader().requested_incompatible_qos_status();
            log::warn!(
                "[station] {} discovered a writer with incompatible policy {}",
                self.kind,
                incompatible.last_policy.unwrap_or("UNKNOWN")
            );
        }
        if raised.contains(StatusMask::DATA_AVAILABLE) {
            self.process_lots()?;
        }
        Ok(())
    }

    /// Processes every addressed lot; a failing lot does not stop the others.
    fn process_lots(&self) -> Result<()> {
        let mut result = Ok(());
        for sample in self.reader.take() {
            if self.shutdown.is_triggered() {
                break;
            }
            // Dispose notices for lots this station saw earlier.
            if !sample.is_alive() {
                continue;
            }
            let Some(lot) = sample.data else {
                continue;
            };
            let addressed = lot.next_station == self.kind
                && matches!(
                    lot.lot_status,
                    LotStatusKind::Waiting | LotStatusKind::Completed
                );
            if addressed {
                if let Err(e) = self.process(lot) {
                    result = Err(e);
                }
            }
        }
        result
    }

    fn process(&self, lot: ChocolateLotState) -> Result<()> {
        log::info!("[station] {} processing lot #{}", self.kind, lot.lot_id);

        let mut state = ChocolateLotState {
            lot_id: lot.lot_id,
            lot_status: LotStatusKind::Processing,
            station: self.kind,
            next_station: StationKind::InvalidController,
        };
        self.writer.write(&state)?;

        if !self.shutdown.sleep(self.delay) {
            log::info!(
                "[station] {} interrupted while processing lot #{}",
                self.kind,
                lot.lot_id
            );
            return Ok(());
        }

        match self.kind.next_station() {
            Some(next) => {
                state.lot_status = LotStatusKind::Completed;
                state.next_station = next;
                self.writer.write(&state)?;
                log::info!(
                    "[station] {} sent lot #{} to {}",
                    self.kind,
                    lot.lot_id,
                    next
                );
            }
            None => {
                self.writer.dispose(&state)?;
                log::info!("[station] lot #{} completed", lot.lot_id);
            }
        }
        self.processed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qos::{QoS, QosProvider};
    use std::thread;
    use std::time::Instant;

    fn fast() -> StationConfig {
        StationConfig {
            processing_delay: Duration::ZERO,
            dispatch_timeout: Duration::from_millis(50),
            sensor_period: Duration::from_millis(10),
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_invalid_station_is_refused() {
        let domain = Domain::new(0, QosProvider::builtin()).unwrap();
        let result = run(&domain, StationKind::InvalidController, "1", &Shutdown::new());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_ingredient_station_forwards_lot() {
        let domain = Domain::new(0, QosProvider::builtin()).unwrap();
        declare_topics(&domain).unwrap();
        let qos = domain.profile(LOT_STATE_PROFILE).unwrap();
        let observer = domain
            .create_data_reader::<ChocolateLotState>(LOT_STATE_TOPIC, None, qos)
            .unwrap();
        let starter = domain
            .create_data_writer::<ChocolateLotState>(LOT_STATE_TOPIC, qos)
            .unwrap();

        let shutdown = Shutdown::new();
        thread::scope(|s| {
            let station = s.spawn(|| {
                run_with_config(&domain, StationKind::MilkController, "1", &shutdown, &fast())
            });

            starter
                .write(&ChocolateLotState::waiting(5, StationKind::MilkController))
                .unwrap();
            // Addressed to another station: ignored.
            starter
                .write(&ChocolateLotState::waiting(6, StationKind::SugarController))
                .unwrap();

            let mut updates = Vec::new();
            assert!(wait_for(|| {
                updates.extend(observer.take());
                updates.iter().any(|u| {
                    u.data.as_ref().is_some_and(|l| {
                        l.lot_id == 5 && l.next_station == StationKind::VanillaController
                    })
                })
            }));
            shutdown.trigger();

            let report = station.join().unwrap().unwrap();
            assert_eq!(report.lots_processed, 1);
            assert_eq!(report.station, Some(StationKind::MilkController));

            let milk: Vec<_> = updates
                .iter()
                .filter_map(|u| u.data.as_ref())
                .filter(|l| l.station == StationKind::MilkController)
                .map(|l| l.lot_status)
                .collect();
            assert_eq!(milk, vec![LotStatusKind::Processing, LotStatusKind::Completed]);
        });
    }

    #[test]
    fn test_tempering_station_disposes_and_reports_incompatible_writer() {
        let domain = Domain::new(0, QosProvider::builtin()).unwrap();
        declare_topics(&domain).unwrap();
        let qos = domain.profile(LOT_STATE_PROFILE).unwrap();
        let starter = domain
            .create_data_writer::<ChocolateLotState>(LOT_STATE_TOPIC, qos)
            .unwrap();

        let shutdown = Shutdown::new();
        thread::scope(|s| {
            let station = s.spawn(|| {
                run_with_config(&domain, StationKind::TemperingController, "9", &shutdown, &fast())
            });
            assert!(wait_for(|| domain.broker().reader_count(LOT_STATE_TOPIC) == 1));

            // Best-effort writer cannot serve the reliable station reader.
            let _rogue = domain
                .create_data_writer::<ChocolateLotState>(LOT_STATE_TOPIC, QoS::best_effort())
                .unwrap();
            starter
                .write(&ChocolateLotState::waiting(1, StationKind::TemperingController))
                .unwrap();

            let key = crate::schema::InstanceKey::from_u64(1);
            assert!(wait_for(|| domain
                .store()
                .lookup(LOT_STATE_TOPIC, &key)
                .is_some_and(|i| !i.is_alive())));
            assert!(wait_for(|| domain
                .store()
                .lookup(TEMPERATURE_TOPIC, &crate::schema::InstanceKey::unkeyed())
                .is_some()));
            shutdown.trigger();

            let report = station.join().unwrap().unwrap();
            assert_eq!(report.lots_processed, 1);
            assert_eq!(report.handler_failures, 0);
            assert!(report.readings_published > 0);
        });
    }
}
