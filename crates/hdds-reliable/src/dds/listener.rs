// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reader listener and status types
//!
//! Callbacks run on whichever thread drives the participant (the receive
//! thread for data and GAPs, the timer thread for liveliness). They must be
//! `Send + Sync`, return quickly and never call back into the same reader's
//! `take`.
//!
//! ```ignore
//! use hdds_reliable::{ReaderListener, SampleLostStatus};
//!
//! struct LossLogger;
//!
//! impl ReaderListener for LossLogger {
//!     fn on_sample_lost(&self, status: SampleLostStatus) {
//!         eprintln!("lost {} samples", status.total_count_change);
//!     }
//! }
//! ```

use crate::core::discovery::Guid;

/// Status information for sample lost events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleLostStatus {
    /// Total cumulative count of lost samples.
    pub total_count: u32,
    /// Change in total_count since last callback.
    pub total_count_change: i32,
}

impl SampleLostStatus {
    pub(crate) fn record(&mut self, lost: u64) -> Self {
        let lost = u32::try_from(lost).unwrap_or(u32::MAX);
        self.total_count = self.total_count.saturating_add(lost);
        self.total_count_change = i32::try_from(lost).unwrap_or(i32::MAX);
        *self
    }
}

/// A matched writer went silent for longer than the liveliness lease.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LivelinessLostStatus {
    /// Writers declared lost so far.
    pub total_count: u32,
    /// Change in total_count since last callback.
    pub total_count_change: i32,
    /// Writer that triggered the last change.
    pub last_writer: Option<Guid>,
}

impl LivelinessLostStatus {
    pub(crate) fn record(&mut self, writer: Guid) -> Self {
        self.total_count = self.total_count.saturating_add(1);
        self.total_count_change = 1;
        self.last_writer = Some(writer);
        *self
    }
}

/// Optional notifications for a `DataReader`.
///
/// Every method has a no-op default.
pub trait ReaderListener: Send + Sync {
    /// New samples are ready to `take`.
    fn on_data_available(&self, reader: Guid) {
        let _ = reader;
    }

    /// The writer declared samples irretrievable (GAP, or history moved past
    /// them).
    fn on_sample_lost(&self, status: SampleLostStatus) {
        let _ = status;
    }

    /// A matched writer stopped sending data and heartbeats.
    fn on_liveliness_lost(&self, status: LivelinessLostStatus) {
        let _ = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_lost_status_accumulates() {
        let mut status = SampleLostStatus::default();
        status.record(2);
        let snapshot = status.record(3);
        assert_eq!(snapshot.total_count, 5);
        assert_eq!(snapshot.total_count_change, 3);
    }

    #[test]
    fn test_liveliness_status_tracks_last_writer() {
        let writer = Guid::new([1; 12], [0, 0, 1, 0x02]);
        let mut status = LivelinessLostStatus::default();
        let snapshot = status.record(writer);
        assert_eq!(snapshot.total_count, 1);
        assert_eq!(snapshot.last_writer, Some(writer));
    }
}
