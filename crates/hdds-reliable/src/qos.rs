// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

/// YAML QoS profile loader.
#[cfg(feature = "qos-loaders")]
pub mod loaders;

use std::time::Duration;

/// Special value meaning "no limit" (DDS LENGTH_UNLIMITED).
pub const LENGTH_UNLIMITED: usize = usize::MAX;

/// Delivery and retention policies for one endpoint.
///
/// Checked by `create_writer`/`create_reader`; an invalid profile never
/// produces an endpoint.
///
/// # Examples
///
/// ```
/// use hdds_reliable::qos::{History, QosProfile, Reliability};
/// use std::time::Duration;
///
/// let qos = QosProfile::reliable()
///     .keep_all()
///     .with_max_blocking_time(Duration::from_millis(50));
///
/// assert_eq!(qos.reliability, Reliability::Reliable);
/// assert_eq!(qos.history, History::KeepAll);
/// assert!(qos.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QosProfile {
    pub reliability: Reliability,
    pub history: History,
    /// Upper bound for a write waiting on a full KEEP_ALL history
    pub max_blocking_time: Duration,
    pub resource_limits: ResourceLimits,
}

impl Default for QosProfile {
    fn default() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            history: History::KeepLast(10),
            max_blocking_time: Duration::from_millis(100),
            resource_limits: ResourceLimits::default(),
        }
    }
}

impl QosProfile {
    /// RELIABLE with default history.
    #[must_use]
    pub fn reliable() -> Self {
        Self {
            reliability: Reliability::Reliable,
            ..Self::default()
        }
    }

    /// BEST_EFFORT with default history.
    #[must_use]
    pub fn best_effort() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn keep_last(mut self, depth: u32) -> Self {
        self.history = History::KeepLast(depth);
        self
    }

    #[must_use]
    pub fn keep_all(mut self) -> Self {
        self.history = History::KeepAll;
        self
    }

    #[must_use]
    pub fn with_max_blocking_time(mut self, timeout: Duration) -> Self {
        self.max_blocking_time = timeout;
        self
    }

    #[must_use]
    pub fn with_resource_limits(mut self, limits: ResourceLimits) -> Self {
        self.resource_limits = limits;
        self
    }

    #[must_use]
    pub fn is_reliable(&self) -> bool {
        self.reliability == Reliability::Reliable
    }

    /// Reject profiles no history can honour.
    ///
    /// ```
    /// use hdds_reliable::qos::QosProfile;
    ///
    /// assert!(QosProfile::default().validate().is_ok());
    /// assert!(QosProfile::default().keep_last(0).validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), String> {
        let limits = &self.resource_limits;
        match self.history {
            History::KeepLast(0) => return Err("keep_last depth must be > 0".to_string()),
            History::KeepAll if limits.max_samples == 0 => {
                return Err("keep_all needs a non-zero max_samples".to_string());
            }
            _ => {}
        }

        if limits.max_instances == 0 || limits.max_samples_per_instance == 0 {
            return Err("instance limits must be > 0".to_string());
        }
        let bounded = limits.max_instances != LENGTH_UNLIMITED
            && limits.max_samples_per_instance != LENGTH_UNLIMITED;
        if bounded
            && limits.max_samples
                < limits
                    .max_samples_per_instance
                    .saturating_mul(limits.max_instances)
        {
            return Err(format!(
                "max_samples {} below {} instances x {} samples",
                limits.max_samples, limits.max_instances, limits.max_samples_per_instance
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Reliability {
    /// No acknowledgment, no repair
    #[default]
    BestEffort,
    /// Reliable delivery with heartbeat/ACKNACK-driven retransmission
    Reliable,
}

impl Reliability {
    /// Requested-vs-offered rule (DDS v1.4 Sec.2.2.3): a RELIABLE request
    /// needs a RELIABLE offer.
    #[must_use]
    pub fn is_compatible(offered: Reliability, requested: Reliability) -> bool {
        !(requested == Reliability::Reliable && offered == Reliability::BestEffort)
    }
}

/// Retention: the N newest samples per instance, or everything not yet acknowledged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum History {
    /// Keep last N samples per instance (drops oldest of that instance)
    KeepLast(u32),
    /// Keep all samples within resource limits; writes block once full.
    KeepAll,
}

impl Default for History {
    fn default() -> Self {
        Self::KeepLast(10)
    }
}

/// Bounds on a history cache. `LENGTH_UNLIMITED` disables a bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceLimits {
    pub max_samples: usize,
    pub max_instances: usize,
    pub max_samples_per_instance: usize,
    /// Payload bytes retained across all samples
    pub max_quota_bytes: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_samples: 100_000,
            max_instances: LENGTH_UNLIMITED,
            max_samples_per_instance: LENGTH_UNLIMITED,
            max_quota_bytes: 100_000_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let qos = QosProfile::default();
        assert!(!qos.is_reliable());
        assert_eq!(qos.history, History::KeepLast(10));
        assert_eq!(qos.max_blocking_time, Duration::from_millis(100));
        assert!(qos.validate().is_ok());
    }

    #[test]
    fn test_zero_depth_rejected() {
        let err = QosProfile::reliable().keep_last(0).validate().unwrap_err();
        assert!(err.contains("depth"));
    }

    #[test]
    fn test_keep_all_without_samples_rejected() {
        let qos = QosProfile::reliable()
            .keep_all()
            .with_resource_limits(ResourceLimits {
                max_samples: 0,
                ..ResourceLimits::default()
            });
        assert!(qos.validate().unwrap_err().contains("max_samples"));
    }

    #[test]
    fn test_instance_product_exceeds_total() {
        let qos = QosProfile::default().with_resource_limits(ResourceLimits {
            max_samples: 12,
            max_instances: 4,
            max_samples_per_instance: 4,
            ..ResourceLimits::default()
        });
        assert!(qos.validate().is_err());

        let fits = QosProfile::default().with_resource_limits(ResourceLimits {
            max_samples: 16,
            max_instances: 4,
            max_samples_per_instance: 4,
            ..ResourceLimits::default()
        });
        assert!(fits.validate().is_ok());
    }

    #[test]
    fn test_unlimited_instances_skip_product_check() {
        let qos = QosProfile::default().with_resource_limits(ResourceLimits {
            max_samples: 10,
            max_samples_per_instance: 10,
            ..ResourceLimits::default()
        });
        assert!(qos.validate().is_ok());
    }

    #[test]
    fn test_reliability_compatibility() {
        use Reliability::*;
        assert!(Reliability::is_compatible(Reliable, Reliable));
        assert!(Reliability::is_compatible(Reliable, BestEffort));
        assert!(Reliability::is_compatible(BestEffort, BestEffort));
        assert!(!Reliability::is_compatible(BestEffort, Reliable));
    }
}
