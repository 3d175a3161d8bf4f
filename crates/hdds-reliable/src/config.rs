// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reliability core configuration - Single Source of Truth
//!
//! - **Level 1 (Static)**: compile-time constants (RTPS limits, default timings)
//! - **Level 2 (Dynamic)**: `RuntimeConfig`, built from the constants and
//!   optionally overridden from YAML (`qos-loaders` feature)
//!
//! ```ignore
//! use hdds_reliable::config::RuntimeConfig;
//!
//! let cfg = RuntimeConfig::from_yaml_str("heartbeat_period_ms: 50")?;
//! assert_eq!(cfg.heartbeat_period.as_millis(), 50);
//! ```

use std::time::Duration;

// =======================================================================
// Wire limits
// =======================================================================

/// Largest sequence number representable on the wire (RTPS SequenceNumber_t
/// is a signed 64-bit high/low pair).
pub const MAX_SEQUENCE_NUMBER: u64 = i64::MAX as u64;

/// Bits in an RTPS SequenceNumberSet bitmap (Sec.9.4.2.6).
///
/// Bounds how many sequence numbers one ACKNACK or GAP can name, so large
/// gaps are requested incrementally.
pub const MAX_SEQ_SET_BITS: u32 = 256;

/// Maximum UDP datagram size accepted by receivers.
pub const MAX_PACKET_SIZE: usize = 65536;

/// Maximum user payload per sample (no fragmentation).
pub const MAX_PAYLOAD_SIZE: usize = 64_000;

// =======================================================================
// Default network endpoints
// =======================================================================

/// RTPS v2.5 base port (OMG DDS-RTPS spec Sec.9.6.1.1)
pub const PORT_BASE: u16 = 7400;

/// User data multicast port for domain 0.
pub const DATA_MULTICAST_PORT_DOMAIN0: u16 = PORT_BASE + 1;

/// Default multicast group (239.255.0.1, site-local)
pub const MULTICAST_IP: [u8; 4] = [239, 255, 0, 1];

/// Requested kernel socket buffer size (SO_RCVBUF / SO_SNDBUF).
pub const SOCKET_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Receive thread poll timeout, so stop flags are noticed.
pub const RECEIVE_POLL_TIMEOUT_MS: u64 = 100;

// =======================================================================
// Reliable protocol timing
// =======================================================================

/// Writer heartbeat period.
pub const HEARTBEAT_PERIOD_MS: u64 = 100;

/// Coalescing window before a reader NACKs out-of-order arrivals.
pub const NACK_RESPONSE_DELAY_MS: u64 = 20;

/// First NACK retry backoff; doubles per retry.
pub const NACK_BACKOFF_INITIAL_MS: u64 = 50;

/// Backoff ceiling.
pub const NACK_BACKOFF_MAX_MS: u64 = 1_000;

/// NACK retry budget per gap before waiting for the next heartbeat.
pub const NACK_MAX_RETRIES: u32 = 5;

/// Minimum spacing of heartbeat-triggered ACKNACKs per writer association.
pub const ACKNACK_RATE_LIMIT_MS: u64 = 10;

/// Grace period for draining a SHUTTING_DOWN association.
pub const DRAIN_TIMEOUT_MS: u64 = 500;

/// Writer silence after which a reader declares the association lost.
pub const LIVELINESS_LEASE_MS: u64 = 10_000;

/// Timer thread tick.
pub const TICK_INTERVAL_MS: u64 = 5;

// =======================================================================
// Capacities
// =======================================================================

/// Locator cache entries before LRU eviction.
pub const LOCATOR_CACHE_CAPACITY: usize = 1024;

/// Datagrams queued per unresolved reliable route.
pub const PENDING_QUEUE_CAPACITY: usize = 256;

/// Out-of-order samples buffered per writer association.
pub const MAX_OUT_OF_ORDER_SAMPLES: usize = 4096;

/// Runtime-tunable settings.
///
/// `Default` is built from the constants above.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub heartbeat_period: Duration,
    pub nack_response_delay: Duration,
    pub nack_backoff_initial: Duration,
    pub nack_backoff_max: Duration,
    pub nack_max_retries: u32,
    pub acknack_rate_limit: Duration,
    pub drain_timeout: Duration,
    pub liveliness_lease: Duration,
    pub tick_interval: Duration,
    pub locator_cache_capacity: usize,
    pub pending_queue_capacity: usize,
    pub max_payload_size: usize,
    /// Resolve unicast locators first for new associations.
    pub prefer_unicast: bool,
    /// Out-of-order samples buffered per writer association.
    pub max_out_of_order: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_period: Duration::from_millis(HEARTBEAT_PERIOD_MS),
            nack_response_delay: Duration::from_millis(NACK_RESPONSE_DELAY_MS),
            nack_backoff_initial: Duration::from_millis(NACK_BACKOFF_INITIAL_MS),
            nack_backoff_max: Duration::from_millis(NACK_BACKOFF_MAX_MS),
            nack_max_retries: NACK_MAX_RETRIES,
            acknack_rate_limit: Duration::from_millis(ACKNACK_RATE_LIMIT_MS),
            drain_timeout: Duration::from_millis(DRAIN_TIMEOUT_MS),
            liveliness_lease: Duration::from_millis(LIVELINESS_LEASE_MS),
            tick_interval: Duration::from_millis(TICK_INTERVAL_MS),
            locator_cache_capacity: LOCATOR_CACHE_CAPACITY,
            pending_queue_capacity: PENDING_QUEUE_CAPACITY,
            max_payload_size: MAX_PAYLOAD_SIZE,
            prefer_unicast: true,
            max_out_of_order: MAX_OUT_OF_ORDER_SAMPLES,
        }
    }
}

impl RuntimeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject values the protocol cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.heartbeat_period.is_zero() {
            return Err("heartbeat_period must be > 0".to_string());
        }
        if self.tick_interval.is_zero() {
            return Err("tick_interval must be > 0".to_string());
        }
        if self.locator_cache_capacity == 0 {
            return Err("locator_cache_capacity must be > 0".to_string());
        }
        if self.max_payload_size == 0 || self.max_payload_size > MAX_PACKET_SIZE {
            return Err(format!(
                "max_payload_size must be in 1..={}",
                MAX_PACKET_SIZE
            ));
        }
        if self.max_out_of_order == 0 {
            return Err("max_out_of_order must be > 0".to_string());
        }
        if self.nack_backoff_initial > self.nack_backoff_max {
            return Err("nack_backoff_initial must not exceed nack_backoff_max".to_string());
        }
        Ok(())
    }
}

#[cfg(feature = "qos-loaders")]
mod yaml {
    use super::RuntimeConfig;
    use crate::dds::{Error, Result};
    use serde::Deserialize;
    use std::path::Path;
    use std::time::Duration;

    /// Overrides; absent keys keep their defaults.
    #[derive(Debug, Deserialize, Default)]
    #[serde(default, deny_unknown_fields)]
    struct YamlRuntimeConfig {
        heartbeat_period_ms: Option<u64>,
        nack_response_delay_ms: Option<u64>,
        nack_backoff_initial_ms: Option<u64>,
        nack_backoff_max_ms: Option<u64>,
        nack_max_retries: Option<u32>,
        acknack_rate_limit_ms: Option<u64>,
        drain_timeout_ms: Option<u64>,
        liveliness_lease_ms: Option<u64>,
        tick_interval_ms: Option<u64>,
        locator_cache_capacity: Option<usize>,
        pending_queue_capacity: Option<usize>,
        max_payload_size: Option<usize>,
        prefer_unicast: Option<bool>,
        max_out_of_order: Option<usize>,
    }

    fn ms(target: &mut Duration, value: Option<u64>) {
        if let Some(v) = value {
            *target = Duration::from_millis(v);
        }
    }

    impl RuntimeConfig {
        /// Parse YAML overrides on top of the defaults.
        pub fn from_yaml_str(yaml: &str) -> Result<Self> {
            let raw: YamlRuntimeConfig = if yaml.trim().is_empty() {
                YamlRuntimeConfig::default()
            } else {
                serde_yaml::from_str(yaml)
                    .map_err(|e| Error::InvalidConfig(format!("Failed to parse YAML: {}", e)))?
            };

            let mut cfg = RuntimeConfig::default();
            ms(&mut cfg.heartbeat_period, raw.heartbeat_period_ms);
            ms(&mut cfg.nack_response_delay, raw.nack_response_delay_ms);
            ms(&mut cfg.nack_backoff_initial, raw.nack_backoff_initial_ms);
            ms(&mut cfg.nack_backoff_max, raw.nack_backoff_max_ms);
            ms(&mut cfg.acknack_rate_limit, raw.acknack_rate_limit_ms);
            ms(&mut cfg.drain_timeout, raw.drain_timeout_ms);
            ms(&mut cfg.liveliness_lease, raw.liveliness_lease_ms);
            ms(&mut cfg.tick_interval, raw.tick_interval_ms);
            if let Some(v) = raw.nack_max_retries {
                cfg.nack_max_retries = v;
            }
            if let Some(v) = raw.locator_cache_capacity {
                cfg.locator_cache_capacity = v;
            }
            if let Some(v) = raw.pending_queue_capacity {
                cfg.pending_queue_capacity = v;
            }
            if let Some(v) = raw.max_payload_size {
                cfg.max_payload_size = v;
            }
            if let Some(v) = raw.prefer_unicast {
                cfg.prefer_unicast = v;
            }
            if let Some(v) = raw.max_out_of_order {
                cfg.max_out_of_order = v;
            }

            cfg.validate().map_err(Error::InvalidConfig)?;
            Ok(cfg)
        }

        /// Load YAML overrides from a file.
        pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
            let path = path.as_ref();
            let content = std::fs::read_to_string(path)
                .map_err(|_| Error::ConfigFileNotFound(path.display().to_string()))?;
            Self::from_yaml_str(&content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_from_constants() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.heartbeat_period, Duration::from_millis(HEARTBEAT_PERIOD_MS));
        assert_eq!(cfg.nack_max_retries, NACK_MAX_RETRIES);
        assert_eq!(cfg.locator_cache_capacity, LOCATOR_CACHE_CAPACITY);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_heartbeat() {
        let cfg = RuntimeConfig {
            heartbeat_period: Duration::ZERO,
            ..RuntimeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_max_sequence_number_matches_wire() {
        assert_eq!(MAX_SEQUENCE_NUMBER, 0x7FFF_FFFF_FFFF_FFFF);
    }

    #[cfg(feature = "qos-loaders")]
    #[test]
    fn test_yaml_overrides() {
        let cfg = RuntimeConfig::from_yaml_str(
            "heartbeat_period_ms: 25\nnack_max_retries: 9\npending_queue_capacity: 8\n",
        )
        .expect("valid yaml");
        assert_eq!(cfg.heartbeat_period, Duration::from_millis(25));
        assert_eq!(cfg.nack_max_retries, 9);
        assert_eq!(cfg.pending_queue_capacity, 8);
        assert_eq!(cfg.drain_timeout, Duration::from_millis(DRAIN_TIMEOUT_MS));
    }

    #[cfg(feature = "qos-loaders")]
    #[test]
    fn test_yaml_unknown_key_rejected() {
        let err = RuntimeConfig::from_yaml_str("heartbeat_perod_ms: 25").unwrap_err();
        assert!(matches!(err, crate::dds::Error::InvalidConfig(_)));
    }

    #[cfg(feature = "qos-loaders")]
    #[test]
    fn test_yaml_empty_is_default() {
        assert_eq!(
            RuntimeConfig::from_yaml_str("").expect("empty"),
            RuntimeConfig::default()
        );
    }
}
