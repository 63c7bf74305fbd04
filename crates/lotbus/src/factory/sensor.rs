// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background temperature sensor of the tempering station.

use super::types::Temperature;
use crate::broker::DataWriter;
use crate::error::Result;
use crossbeam::channel::{self, select, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Publishing period of the sensor.
pub const SENSOR_PERIOD: Duration = Duration::from_millis(100);

/// Handle to a running sensor thread; stops and joins on [`TemperatureSensor::stop`] or drop.
pub struct TemperatureSensor {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    published: Arc<AtomicU64>,
}

impl TemperatureSensor {
    /// Start publishing a reading in `[30, 32]` every `period`.
    pub fn spawn(
        writer: DataWriter<Temperature>,
        sensor_id: String,
        period: Duration,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let published = Arc::new(AtomicU64::new(0));
        let count = Arc::clone(&published);

        let handle = thread::Builder::new()
            .name(format!("lotbus-sensor-{}", sensor_id))
            .spawn(move || {
                let ticker = channel::tick(period);
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            let reading = Temperature {
                                sensor_id: sensor_id.clone(),
                                degrees: fastrand::i32(30..=32),
                            };
                            match writer.write(&reading) {
                                Ok(_) => {
                                    count.fetch_add(1, Ordering::Relaxed);
                                }
                                Err(e) => log::warn!("[sensor] publish failed: {}", e),
                            }
                        }
                    }
                }
                log::debug!("[sensor] {} stopped", sensor_id);
            })?;

        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
            published,
        })
    }

    /// Readings published so far.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(mut self) -> u64 {
        self.shutdown();
        self.published()
    }

    fn shutdown(&mut self) {
        // Disconnecting the channel wakes the select.
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("[sensor] thread panicked");
            }
        }
    }
}

impl Drop for TemperatureSensor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
