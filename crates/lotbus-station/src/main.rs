// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! lotbus chocolate factory
//!
//! Runs the factory stations and the monitoring/control application against
//! one in-process lotbus domain.
//!
//! # Usage
//!
//! ```bash
//! # Whole factory, 10 lots, default timings
//! lotbus-station
//!
//! # Fast run with custom QoS profiles
//! lotbus-station --lots 3 --processing-ms 200 --lot-interval-ms 500 --qos-file qos.yaml
//!
//! # Only the tempering station, until Ctrl+C
//! lotbus-station --station tempering --no-monitor
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use lotbus::factory::{monitor, station, MonitorConfig, StationConfig, StationKind};
use lotbus::{Domain, QosProvider, Shutdown};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "lotbus-station")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Chocolate factory stations on the lotbus event pipeline")]
#[command(long_about = None)]
struct Cli {
    /// Domain ID (0-232)
    #[arg(short, long, default_value = "0")]
    domain: u32,

    /// YAML QoS profile file (overrides the built-in profiles)
    #[arg(short, long)]
    qos_file: Option<PathBuf>,

    /// Tempering sensor id (random when omitted)
    #[arg(long)]
    sensor_id: Option<String>,

    /// Lots the monitor starts and waits for
    #[arg(short, long, default_value = "10")]
    lots: u64,

    /// Processing time per lot at each station (ms)
    #[arg(long, default_value = "5000")]
    processing_ms: u64,

    /// Interval between two started lots (ms)
    #[arg(long, default_value = "10000")]
    lot_interval_ms: u64,

    /// Station to run (repeatable; all stations when omitted)
    #[arg(short, long, value_enum)]
    station: Vec<StationArg>,

    /// Do not run the monitoring/control application
    #[arg(long)]
    no_monitor: bool,

    /// Verbose mode (debug logs from lotbus)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StationArg {
    CocoaButter,
    Sugar,
    Milk,
    Vanilla,
    Tempering,
}

impl From<StationArg> for StationKind {
    fn from(arg: StationArg) -> Self {
        match arg {
            StationArg::CocoaButter => StationKind::CocoaButterController,
            StationArg::Sugar => StationKind::SugarController,
            StationArg::Milk => StationKind::MilkController,
            StationArg::Vanilla => StationKind::VanillaController,
            StationArg::Tempering => StationKind::TemperingController,
        }
    }
}

impl Cli {
    fn stations(&self) -> Vec<StationKind> {
        if self.station.is_empty() {
            return StationKind::stations().to_vec();
        }
        let mut kinds: Vec<StationKind> = Vec::new();
        for kind in self.station.iter().copied().map(StationKind::from) {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds
    }

    fn station_config(&self) -> StationConfig {
        StationConfig {
            processing_delay: Duration::from_millis(self.processing_ms),
            ..StationConfig::default()
        }
    }

    fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            lots_to_process: self.lots,
            lot_interval: Duration::from_millis(self.lot_interval_ms),
            ..MonitorConfig::default()
        }
    }

    fn sensor_id(&self) -> String {
        self.sensor_id
            .clone()
            .unwrap_or_else(|| fastrand::u32(0..50).to_string())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("lotbus_station=debug,lotbus=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("lotbus_station=info,lotbus=info"))
    };
    fmt().with_env_filter(filter).with_target(false).init();

    let provider = match &cli.qos_file {
        Some(path) => QosProvider::from_file(path)
            .with_context(|| format!("Failed to load QoS profiles from {}", path.display()))?,
        None => QosProvider::builtin(),
    };
    let domain = Domain::new(cli.domain, provider).context("Failed to create domain")?;

    let shutdown = Shutdown::new();
    ctrlc_handler(shutdown.clone())?;

    let stations = cli.stations();
    let sensor_id = cli.sensor_id();
    tracing::info!(
        domain = cli.domain,
        stations = ?stations,
        sensor_id = %sensor_id,
        monitor = !cli.no_monitor,
        "Starting chocolate factory"
    );

    let station_config = cli.station_config();
    let outcome = thread::scope(|scope| -> Result<()> {
        let mut handles = Vec::with_capacity(stations.len());
        for kind in stations {
            let (domain, shutdown, config, sensor_id) =
                (&domain, &shutdown, &station_config, sensor_id.as_str());
            let handle = thread::Builder::new()
                .name(format!("station-{}", kind))
                .spawn_scoped(scope, move || {
                    station::run_with_config(domain, kind, sensor_id, shutdown, config)
                })
                .with_context(|| format!("Failed to spawn {} station", kind))?;
            handles.push((kind, handle));
        }

        let monitored = if cli.no_monitor {
            None
        } else {
            let report = monitor::run(&domain, &cli.monitor_config(), &shutdown);
            // Stations run until told otherwise.
            shutdown.trigger();
            Some(report)
        };

        let mut failed = Vec::new();
        for (kind, handle) in handles {
            match handle.join() {
                Ok(Ok(report)) => tracing::info!(
                    station = %kind,
                    lots = report.lots_processed,
                    readings = report.readings_published,
                    failures = report.handler_failures,
                    "Station stopped"
                ),
                Ok(Err(e)) => {
                    tracing::error!(station = %kind, error = %e, "Station failed");
                    failed.push(kind);
                }
                Err(_) => {
                    tracing::error!(station = %kind, "Station thread panicked");
                    failed.push(kind);
                }
            }
        }

        if let Some(report) = monitored {
            let report = report.context("Monitor failed")?;
            tracing::info!(
                started = report.lots_started,
                completed = report.lots_completed,
                alarms = report.temperature_alarms,
                "Monitor finished"
            );
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("{} station(s) failed: {:?}", failed.len(), failed))
        }
    });

    tracing::info!("Factory shutdown complete");
    outcome
}

/// Setup Ctrl+C handler.
fn ctrlc_handler(shutdown: Shutdown) -> Result<()> {
    ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, shutting down...");
        shutdown.trigger();
    })
    .context("Failed to install Ctrl+C handler")
}
