// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic

//! End-to-end chocolate factory run
//!
//! Five stations and the monitor share one domain; every started lot must
//! travel the full recipe and be disposed by the tempering station.

use lotbus::factory::{
    monitor, station, ChocolateLotState, MonitorConfig, StationConfig, StationKind,
    LOT_STATE_TOPIC,
};
use lotbus::{Domain, QosProvider, Shutdown};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn fast_station() -> StationConfig {
    StationConfig {
        processing_delay: Duration::ZERO,
        dispatch_timeout: Duration::from_millis(100),
        sensor_period: Duration::from_millis(10),
    }
}

fn run_factory(
    domain: &Arc<Domain>,
    lots: u64,
) -> (monitor::MonitorReport, Vec<station::StationReport>) {
    let shutdown = Shutdown::new();
    let station_config = fast_station();
    let monitor_config = MonitorConfig {
        lots_to_process: lots,
        lot_interval: Duration::from_millis(20),
        dispatch_timeout: Duration::from_millis(100),
    };

    thread::scope(|s| {
        let handles: Vec<_> = StationKind::stations()
            .into_iter()
            .map(|kind| {
                let (domain, shutdown, config) = (&**domain, &shutdown, &station_config);
                s.spawn(move || station::run_with_config(domain, kind, "12", shutdown, config))
            })
            .collect();

        // Safety net so a stuck pipeline fails instead of hanging.
        let watchdog = shutdown.clone();
        s.spawn(move || {
            if watchdog.sleep(Duration::from_secs(30)) {
                watchdog.trigger();
            }
        });

        let report = monitor::run(domain, &monitor_config, &shutdown).unwrap();
        shutdown.trigger();

        let stations = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();
        (report, stations)
    })
}

#[test]
fn test_every_lot_completes_the_recipe() {
    let domain = Domain::new(0, QosProvider::builtin()).unwrap();
    let (report, stations) = run_factory(&domain, 3);

    assert_eq!(report.lots_started, 3);
    assert_eq!(report.lots_completed, 3);
    // WAITING plus PROCESSING and COMPLETED from four stations, then the dispose.
    assert!(report.updates_received >= 3 * 10);

    for station in &stations {
        assert_eq!(station.lots_processed, 3, "{:?}", station.station);
        assert_eq!(station.handler_failures, 0, "{:?}", station.station);
    }
    let tempering = stations
        .iter()
        .find(|r| r.station == Some(StationKind::TemperingController))
        .unwrap();
    assert!(tempering.readings_published > 0);
    assert!(stations
        .iter()
        .filter(|r| r.station != Some(StationKind::TemperingController))
        .all(|r| r.readings_published == 0));

    // Every lot instance ends disposed.
    assert!(domain.store().alive_instances(LOT_STATE_TOPIC).is_empty());
    assert_eq!(domain.store().instances(LOT_STATE_TOPIC).len(), 3);
}

#[test]
fn test_late_station_picks_up_waiting_lot() {
    let domain = Domain::new(0, QosProvider::builtin()).unwrap();
    lotbus::factory::declare_topics(&domain).unwrap();

    // A lot already waiting for sugar before the station exists.
    let qos = domain.profile(lotbus::qos::LOT_STATE_PROFILE).unwrap();
    let writer = domain
        .create_data_writer::<ChocolateLotState>(LOT_STATE_TOPIC, qos)
        .unwrap();
    writer
        .write(&ChocolateLotState::waiting(5, StationKind::SugarController))
        .unwrap();

    let observer = domain
        .create_data_reader::<ChocolateLotState>(LOT_STATE_TOPIC, None, qos)
        .unwrap();
    let shutdown = Shutdown::new();
    let config = fast_station();

    thread::scope(|s| {
        let sugar = s.spawn(|| {
            station::run_with_config(&domain, StationKind::SugarController, "1", &shutdown, &config)
        });

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        let mut forwarded = false;
        while !forwarded && std::time::Instant::now() < deadline {
            forwarded = observer.take().iter().any(|sample| {
                sample.data.as_ref().is_some_and(|l| {
                    l.lot_id == 5 && l.next_station == StationKind::MilkController
                })
            });
            if !forwarded {
                thread::sleep(Duration::from_millis(5));
            }
        }
        shutdown.trigger();

        let report = sugar.join().unwrap().unwrap();
        assert!(forwarded);
        assert_eq!(report.lots_processed, 1);
    });
}
