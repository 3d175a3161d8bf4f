// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! YAML QoS profile loader.
//!
//! # Example YAML
//!
//! ```yaml
//! # qos_profiles.yaml
//! default_profile: reliable_sensor
//! profiles:
//!   reliable_sensor:
//!     reliability: RELIABLE
//!     history:
//!       kind: KEEP_ALL
//!     max_blocking_time_ms: 200
//!     resource_limits:
//!       max_samples: 512
//!
//!   best_effort_telemetry:
//!     reliability: BEST_EFFORT
//!     history:
//!       kind: KEEP_LAST
//!       depth: 1
//! ```

use super::{History, QosProfile, Reliability, ResourceLimits, LENGTH_UNLIMITED};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// YAML QoS profile loader.
pub struct YamlLoader;

/// Root YAML document structure.
#[derive(Debug, Deserialize, Default)]
pub struct YamlQosDocument {
    /// Named QoS profiles.
    #[serde(default)]
    pub profiles: HashMap<String, YamlQosProfile>,

    /// Default profile name (optional).
    #[serde(default)]
    pub default_profile: Option<String>,
}

/// A single QoS profile in YAML format.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct YamlQosProfile {
    /// Reliability: RELIABLE or BEST_EFFORT
    pub reliability: Option<String>,

    /// History configuration
    pub history: Option<YamlHistory>,

    /// Maximum blocking time for writes, in milliseconds
    pub max_blocking_time_ms: Option<u64>,

    /// Resource limits
    pub resource_limits: Option<YamlResourceLimits>,
}

/// History QoS in YAML.
#[derive(Debug, Deserialize)]
pub struct YamlHistory {
    /// KEEP_LAST or KEEP_ALL
    pub kind: String,
    /// Depth for KEEP_LAST
    #[serde(default = "default_history_depth")]
    pub depth: u32,
}

fn default_history_depth() -> u32 {
    1
}

/// Resource limits in YAML (-1 = unlimited).
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct YamlResourceLimits {
    pub max_samples: i64,
    pub max_instances: i64,
    pub max_samples_per_instance: i64,
    pub max_quota_bytes: i64,
}

impl Default for YamlResourceLimits {
    fn default() -> Self {
        let defaults = ResourceLimits::default();
        Self {
            max_samples: to_yaml_limit(defaults.max_samples),
            max_instances: to_yaml_limit(defaults.max_instances),
            max_samples_per_instance: to_yaml_limit(defaults.max_samples_per_instance),
            max_quota_bytes: to_yaml_limit(defaults.max_quota_bytes),
        }
    }
}

fn to_yaml_limit(value: usize) -> i64 {
    if value == LENGTH_UNLIMITED {
        -1
    } else {
        i64::try_from(value).unwrap_or(i64::MAX)
    }
}

fn from_yaml_limit(value: i64) -> usize {
    if value < 0 {
        LENGTH_UNLIMITED
    } else {
        usize::try_from(value).unwrap_or(LENGTH_UNLIMITED)
    }
}

impl YamlLoader {
    /// Load QoS profiles from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<YamlQosDocument, String> {
        let yaml_content =
            fs::read_to_string(path).map_err(|e| format!("Failed to read YAML file: {}", e))?;
        Self::parse_yaml(&yaml_content)
    }

    /// Parse YAML content.
    pub fn parse_yaml(yaml_content: &str) -> Result<YamlQosDocument, String> {
        serde_yaml::from_str(yaml_content).map_err(|e| format!("Failed to parse YAML: {}", e))
    }

    /// Get QoS by profile name.
    pub fn get_profile(doc: &YamlQosDocument, name: &str) -> Result<QosProfile, String> {
        let profile = doc
            .profiles
            .get(name)
            .ok_or_else(|| format!("Profile '{}' not found", name))?;
        Self::profile_to_qos(profile)
    }

    /// Get default QoS from document.
    pub fn get_default_profile(doc: &YamlQosDocument) -> Result<QosProfile, String> {
        if let Some(ref default_name) = doc.default_profile {
            Self::get_profile(doc, default_name)
        } else if doc.profiles.len() == 1 {
            match doc.profiles.values().next() {
                Some(profile) => Self::profile_to_qos(profile),
                None => Ok(QosProfile::default()),
            }
        } else {
            Ok(QosProfile::default())
        }
    }

    /// Convert YAML profile to QoS and validate it.
    pub fn profile_to_qos(profile: &YamlQosProfile) -> Result<QosProfile, String> {
        let mut qos = QosProfile::default();

        if let Some(ref rel) = profile.reliability {
            qos.reliability = match rel.to_uppercase().as_str() {
                "RELIABLE" => Reliability::Reliable,
                "BEST_EFFORT" => Reliability::BestEffort,
                other => return Err(format!("Invalid reliability: {}", other)),
            };
        }

        if let Some(ref hist) = profile.history {
            qos.history = match hist.kind.to_uppercase().as_str() {
                "KEEP_LAST" => History::KeepLast(hist.depth),
                "KEEP_ALL" => History::KeepAll,
                other => return Err(format!("Invalid history kind: {}", other)),
            };
        }

        if let Some(ms) = profile.max_blocking_time_ms {
            qos.max_blocking_time = Duration::from_millis(ms);
        }

        if let Some(ref limits) = profile.resource_limits {
            qos.resource_limits = ResourceLimits {
                max_samples: from_yaml_limit(limits.max_samples),
                max_instances: from_yaml_limit(limits.max_instances),
                max_samples_per_instance: from_yaml_limit(limits.max_samples_per_instance),
                max_quota_bytes: from_yaml_limit(limits.max_quota_bytes),
            };
        }

        qos.validate()?;
        Ok(qos)
    }

    /// Load a single QoS profile directly from file.
    ///
    /// If profile_name is None, uses the default profile.
    pub fn load_qos<P: AsRef<Path>>(
        path: P,
        profile_name: Option<&str>,
    ) -> Result<QosProfile, String> {
        let doc = Self::load_from_file(path)?;
        match profile_name {
            Some(name) => Self::get_profile(&doc, name),
            None => Self::get_default_profile(&doc),
        }
    }
}
