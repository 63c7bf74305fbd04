// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! YAML QoS profile provider.
//!
//! Profiles are resolved once at startup into plain [`QoS`] values. Unknown
//! keys are rejected rather than ignored.
//!
//! # Example YAML
//!
//! ```yaml
//! default_profile: ChocolateLotStateProfile
//! profiles:
//!   ChocolateLotStateProfile:
//!     reliability: RELIABLE
//!     durability: TRANSIENT_LOCAL
//!     history:
//!       kind: KEEP_ALL
//!   ChocolateTemperatureProfile:
//!     reliability: BEST_EFFORT
//!     history:
//!       kind: KEEP_LAST
//!       depth: 10
//! filters:
//!   ChocolateTemperatureAlarm:
//!     topic: ChocolateTemperature
//!     expression: "degrees > %0 or degrees < %1"
//!     parameters: ["32", "30"]
//! ```

use super::{Durability, History, QoS, Reliability, ResourceLimits};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Built-in profile for lot-state writers and readers.
pub const LOT_STATE_PROFILE: &str = "ChocolateLotStateProfile";
/// Built-in profile for temperature writers and readers.
pub const TEMPERATURE_PROFILE: &str = "ChocolateTemperatureProfile";
/// Built-in out-of-range temperature filter.
pub const TEMPERATURE_ALARM_FILTER: &str = "ChocolateTemperatureAlarm";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlQosDocument {
    #[serde(default)]
    profiles: HashMap<String, YamlQosProfile>,
    #[serde(default)]
    filters: HashMap<String, FilterProfile>,
    #[serde(default)]
    default_profile: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct YamlQosProfile {
    reliability: Option<Reliability>,
    durability: Option<Durability>,
    history: Option<YamlHistory>,
    resource_limits: Option<YamlResourceLimits>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum YamlHistoryKind {
    KeepLast,
    KeepAll,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlHistory {
    kind: YamlHistoryKind,
    #[serde(default = "default_history_depth")]
    depth: usize,
}

fn default_history_depth() -> usize {
    1
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlResourceLimits {
    max_samples: Option<usize>,
}

impl YamlQosProfile {
    fn to_qos(&self) -> QoS {
        let base = QoS::best_effort();
        QoS {
            reliability: self.reliability.unwrap_or(base.reliability),
            durability: self.durability.unwrap_or(base.durability),
            history: match &self.history {
                Some(YamlHistory {
                    kind: YamlHistoryKind::KeepLast,
                    depth,
                }) => History::KeepLast(*depth),
                Some(YamlHistory {
                    kind: YamlHistoryKind::KeepAll,
                    ..
                }) => History::KeepAll,
                None => base.history,
            },
            resource_limits: ResourceLimits {
                max_samples: self.resource_limits.as_ref().and_then(|r| r.max_samples),
            },
        }
    }
}

/// Named content filter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterProfile {
    /// Topic the filter applies to.
    pub topic: String,
    /// Filter expression.
    pub expression: String,
    /// Positional parameters.
    #[serde(default)]
    pub parameters: Vec<String>,
}

/// Resolved QoS profiles and filter profiles.
#[derive(Debug, Clone)]
pub struct QosProvider {
    profiles: HashMap<String, QoS>,
    filters: HashMap<String, FilterProfile>,
    default_profile: Option<String>,
}

impl Default for QosProvider {
    fn default() -> Self {
        Self::builtin()
    }
}

impl QosProvider {
    /// Provider with the built-in chocolate factory profiles only.
    pub fn builtin() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            LOT_STATE_PROFILE.to_string(),
            QoS::reliable().transient_local().keep_all(),
        );
        profiles.insert(
            TEMPERATURE_PROFILE.to_string(),
            QoS::best_effort().keep_last(10),
        );

        let mut filters = HashMap::new();
        filters.insert(
            TEMPERATURE_ALARM_FILTER.to_string(),
            FilterProfile {
                topic: "ChocolateTemperature".to_string(),
                expression: "degrees > %0 or degrees < %1".to_string(),
                parameters: vec!["32".to_string(), "30".to_string()],
            },
        );

        Self {
            profiles,
            filters,
            default_profile: None,
        }
    }

    /// Parse a YAML document; its entries override the built-ins.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] on malformed YAML, unknown keys or invalid policies.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let doc: YamlQosDocument = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("invalid QoS YAML: {}", e)))?;

        let mut provider = Self::builtin();
        for (name, profile) in &doc.profiles {
            let qos = profile.to_qos();
            qos.validate()
                .map_err(|e| Error::Config(format!("profile '{}': {}", name, e)))?;
            provider.profiles.insert(name.clone(), qos);
        }
        provider.filters.extend(doc.filters);

        if let Some(default) = &doc.default_profile {
            if !provider.profiles.contains_key(default) {
                return Err(Error::Config(format!(
                    "default_profile '{}' is not defined",
                    default
                )));
            }
        }
        provider.default_profile = doc.default_profile;
        Ok(provider)
    }

    /// Load a YAML profile file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        log::debug!("[qos] loading profiles from {}", path.display());
        Self::from_yaml_str(&content)
    }

    /// Resolve a profile by name.
    pub fn profile(&self, name: &str) -> Result<QoS> {
        self.profiles
            .get(name)
            .copied()
            .ok_or_else(|| Error::Config(format!("unknown QoS profile '{}'", name)))
    }

    /// The configured default profile, or best-effort.
    pub fn default_qos(&self) -> QoS {
        self.default_profile
            .as_deref()
            .and_then(|name| self.profiles.get(name).copied())
            .unwrap_or_default()
    }

    /// Resolve a filter profile by name.
    pub fn filter(&self, name: &str) -> Result<&FilterProfile> {
        self.filters
            .get(name)
            .ok_or_else(|| Error::Config(format!("unknown filter profile '{}'", name)))
    }

    /// Profile names, sorted.
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}
