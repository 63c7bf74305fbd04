// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Chocolate factory data types and topic names.

use crate::broker::TopicType;
use crate::schema::{FieldType, FieldValue, Sample, Schema};
use std::fmt;
use std::str::FromStr;

/// Topic carrying [`ChocolateLotState`], keyed by `lot_id`.
pub const LOT_STATE_TOPIC: &str = "ChocolateLotState";
/// Unkeyed topic carrying [`Temperature`] readings.
pub const TEMPERATURE_TOPIC: &str = "ChocolateTemperature";

macro_rules! labelled_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $label:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Labels in declaration order, as carried on the wire.
            pub const LABELS: &'static [&'static str] = &[$($label),+];

            /// Wire label.
            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            fn field_type() -> FieldType {
                FieldType::enumeration(Self::LABELS)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($name::$variant),)+
                    other => Err(format!(
                        "unknown {} label '{}'",
                        stringify!($name),
                        other
                    )),
                }
            }
        }
    };
}

labelled_enum! {
    /// Lifecycle of a lot at a station.
    LotStatusKind {
        /// Waiting to be processed by `next_station`.
        Waiting => "WAITING",
        /// Being processed by `station`.
        Processing => "PROCESSING",
        /// Done at `station`, waiting for `next_station`.
        Completed => "COMPLETED",
    }
}

labelled_enum! {
    /// Processing stations of the factory.
    StationKind {
        /// No station (lot in flight).
        InvalidController => "INVALID_CONTROLLER",
        CocoaButterController => "COCOA_BUTTER_CONTROLLER",
        SugarController => "SUGAR_CONTROLLER",
        MilkController => "MILK_CONTROLLER",
        VanillaController => "VANILLA_CONTROLLER",
        /// Terminal station.
        TemperingController => "TEMPERING_CONTROLLER",
    }
}

impl StationKind {
    /// Station a lot goes to after this one; `None` for tempering.
    pub fn next_station(self) -> Option<StationKind> {
        match self {
            StationKind::CocoaButterController => Some(StationKind::SugarController),
            StationKind::SugarController => Some(StationKind::MilkController),
            StationKind::MilkController => Some(StationKind::VanillaController),
            StationKind::VanillaController => Some(StationKind::TemperingController),
            StationKind::TemperingController | StationKind::InvalidController => None,
        }
    }

    /// `true` for the four ingredient stations.
    pub fn is_ingredient(self) -> bool {
        matches!(
            self,
            StationKind::CocoaButterController
                | StationKind::SugarController
                | StationKind::MilkController
                | StationKind::VanillaController
        )
    }

    /// Stations that run a workflow, in processing order.
    pub fn stations() -> [StationKind; 5] {
        [
            StationKind::CocoaButterController,
            StationKind::SugarController,
            StationKind::MilkController,
            StationKind::VanillaController,
            StationKind::TemperingController,
        ]
    }
}

/// State of one chocolate lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChocolateLotState {
    /// Lot identifier (instance key).
    pub lot_id: u32,
    /// Processing state at `station`.
    pub lot_status: LotStatusKind,
    /// Station that last updated the lot.
    pub station: StationKind,
    /// Station the lot is addressed to.
    pub next_station: StationKind,
}

impl ChocolateLotState {
    /// A new lot waiting at `next_station`.
    pub fn waiting(lot_id: u32, next_station: StationKind) -> Self {
        Self {
            lot_id,
            lot_status: LotStatusKind::Waiting,
            station: StationKind::InvalidController,
            next_station,
        }
    }
}

impl fmt::Display for ChocolateLotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[lot_id: {}, status: {}, station: {}, next_station: {}]",
            self.lot_id, self.lot_status, self.station, self.next_station
        )
    }
}

fn field<'a>(sample: &'a Sample, idx: usize, name: &str) -> Result<&'a FieldValue, String> {
    sample
        .get(idx)
        .ok_or_else(|| format!("missing field '{}'", name))
}

fn label<T: FromStr<Err = String>>(sample: &Sample, idx: usize, name: &str) -> Result<T, String> {
    field(sample, idx, name)?
        .as_str()
        .ok_or_else(|| format!("field '{}' is not a label", name))?
        .parse()
}

impl TopicType for ChocolateLotState {
    const TYPE_NAME: &'static str = "ChocolateLotState";

    fn schema() -> Schema {
        Schema::new(Self::TYPE_NAME)
            .field("lot_id", FieldType::UInt32)
            .field("lot_status", LotStatusKind::field_type())
            .field("station", StationKind::field_type())
            .field("next_station", StationKind::field_type())
    }

    fn key_fields() -> &'static [&'static str] {
        &["lot_id"]
    }

    fn to_sample(&self) -> Sample {
        Sample::new(vec![
            FieldValue::from_u32(self.lot_id),
            FieldValue::from_string(self.lot_status.label()),
            FieldValue::from_string(self.station.label()),
            FieldValue::from_string(self.next_station.label()),
        ])
    }

    fn from_sample(sample: &Sample) -> Result<Self, String> {
        let lot_id = field(sample, 0, "lot_id")?
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or("field 'lot_id' is not a u32")?;
        Ok(Self {
            lot_id,
            lot_status: label(sample, 1, "lot_status")?,
            station: label(sample, 2, "station")?,
            next_station: label(sample, 3, "next_station")?,
        })
    }
}

/// One tempering temperature reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Temperature {
    /// Sensor that took the reading.
    pub sensor_id: String,
    /// Degrees Fahrenheit.
    pub degrees: i32,
}

impl TopicType for Temperature {
    const TYPE_NAME: &'static str = "Temperature";

    fn schema() -> Schema {
        Schema::new(Self::TYPE_NAME)
            .field("sensor_id", FieldType::String)
            .field("degrees", FieldType::Int32)
    }

    fn key_fields() -> &'static [&'static str] {
        &[]
    }

    fn to_sample(&self) -> Sample {
        Sample::new(vec![
            FieldValue::from_string(self.sensor_id.clone()),
            FieldValue::from_i32(self.degrees),
        ])
    }

    fn from_sample(sample: &Sample) -> Result<Self, String> {
        let sensor_id = field(sample, 0, "sensor_id")?
            .as_str()
            .ok_or("field 'sensor_id' is not a string")?
            .to_string();
        let degrees = field(sample, 1, "degrees")?
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or("field 'degrees' is not an i32")?;
        Ok(Self { sensor_id, degrees })
    }
}
