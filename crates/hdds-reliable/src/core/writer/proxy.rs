// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ReaderProxy - Per-reader state of a writer (RTPS Sec.8.4.7.4)
//!
//! Tracks, for one matched remote reader:
//! - the highest sequence number it acknowledged (everything at or below is
//!   no longer outstanding for it)
//! - the sequences it asked to be resent and not yet served
//! - where its relevant history starts (volatile readers see nothing written
//!   before they matched)
//! - the association lifecycle

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::core::association::{AssociationState, Lifecycle, Termination};
use crate::core::discovery::guid::Guid;
use crate::reliability::AckNackMsg;
use crate::transport::Route;

/// Writer-side view of one matched reader.
#[derive(Debug)]
pub struct ReaderProxy {
    remote: Guid,
    /// Effective reliability: reliable only when both sides are.
    reliable: bool,
    prefer_unicast: bool,
    lifecycle: Lifecycle,
    /// Last sequence assigned when the reader matched.
    start_seq: u64,
    acked: u64,
    highest_sent: u64,
    requested: BTreeSet<u64>,
    last_acknack_count: Option<u32>,
    last_activity: Instant,
}

impl ReaderProxy {
    pub fn new(remote: Guid, reliable: bool, prefer_unicast: bool, start_seq: u64, now: Instant) -> Self {
        Self {
            remote,
            reliable,
            prefer_unicast,
            lifecycle: Lifecycle::new(),
            start_seq,
            acked: start_seq,
            highest_sent: start_seq,
            requested: BTreeSet::new(),
            last_acknack_count: None,
            last_activity: now,
        }
    }

    #[must_use]
    pub fn remote(&self) -> Guid {
        self.remote
    }

    #[must_use]
    pub fn is_reliable(&self) -> bool {
        self.reliable
    }

    #[must_use]
    pub fn route(&self, local: Guid) -> Route {
        Route::new(self.remote, local, self.reliable, self.prefer_unicast)
    }

    /// First sequence this reader may be sent.
    #[must_use]
    pub fn first_relevant(&self) -> u64 {
        self.start_seq + 1
    }

    #[must_use]
    pub fn acked(&self) -> u64 {
        self.acked
    }

    #[must_use]
    pub fn highest_sent(&self) -> u64 {
        self.highest_sent
    }

    #[must_use]
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    #[must_use]
    pub fn state(&self) -> AssociationState {
        self.lifecycle.state()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.lifecycle.is_terminated()
    }

    /// Apply an ACKNACK.
    ///
    /// Returns false (and changes nothing) when its count is not newer than
    /// the last one seen. Acknowledgments past `last_assigned` are clamped.
    pub fn on_acknack(&mut self, msg: &AckNackMsg, last_assigned: u64, now: Instant) -> bool {
        if self.last_acknack_count.is_some_and(|last| msg.count <= last) {
            return false;
        }
        self.last_acknack_count = Some(msg.count);
        self.last_activity = now;

        let acked = msg.acked_up_to().min(last_assigned);
        if acked > self.acked {
            self.acked = acked;
        }
        let floor = self.acked;
        self.requested.retain(|seq| *seq > floor);
        self.requested
            .extend(msg.missing().filter(|seq| *seq > floor && *seq <= last_assigned));

        if self.lifecycle.on_exchange() {
            log::debug!("[writer] reader {} associated (acked={})", self.remote, self.acked);
        }
        true
    }

    /// Drain the resend requests, ascending.
    pub fn take_requested(&mut self) -> Vec<u64> {
        std::mem::take(&mut self.requested).into_iter().collect()
    }

    #[must_use]
    pub fn has_requested(&self) -> bool {
        !self.requested.is_empty()
    }

    /// DATA `seq` went out to this reader.
    pub fn on_sent(&mut self, seq: u64) {
        self.highest_sent = self.highest_sent.max(seq);
        // best-effort readers never answer; sending is the exchange
        if !self.reliable && self.lifecycle.on_exchange() {
            log::debug!("[writer] best-effort reader {} associated", self.remote);
        }
    }

    /// Nothing up to `last_assigned` is outstanding.
    #[must_use]
    pub fn is_acked(&self, last_assigned: u64) -> bool {
        !self.reliable || self.acked >= last_assigned
    }

    /// Sequences written but not yet acknowledged.
    #[must_use]
    pub fn unacked(&self, last_assigned: u64) -> u64 {
        if self.reliable {
            last_assigned.saturating_sub(self.acked)
        } else {
            0
        }
    }

    pub fn begin_shutdown(&mut self, now: Instant, drain_timeout: Duration) -> bool {
        self.lifecycle.begin_shutdown(now, drain_timeout)
    }

    /// Finish a drain once this reader acknowledged everything.
    pub fn try_terminate(&mut self, now: Instant, last_assigned: u64) -> Option<Termination> {
        let drained = self.is_acked(last_assigned) && self.requested.is_empty();
        self.lifecycle.try_terminate(now, drained)
    }

    pub fn terminate(&mut self) {
        self.lifecycle.terminate();
    }
}
