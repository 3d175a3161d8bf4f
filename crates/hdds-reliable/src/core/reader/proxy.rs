// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WriterProxy -- RTPS Sec.8.4.10 per-writer state of a reader
//!
//! Tracks, for one matched remote writer:
//! - `delivered`: highest sequence handed to the reader history, with every
//!   lower sequence either delivered or declared lost
//! - samples received ahead of that point, held until the hole fills
//! - the missing set (`GapTracker`) that drives ACKNACK bitmaps
//! - heartbeat count filtering, NACK retry timing, ACKNACK rate limiting
//! - liveliness and the association lifecycle
//!
//! Without a correct `delivered` point the ACKNACK base is wrong, and a wrong
//! base turns one HEARTBEAT into an endless HEARTBEAT/ACKNACK loop.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RuntimeConfig;
use crate::core::association::{AssociationState, Lifecycle, Termination};
use crate::core::discovery::guid::{EntityId, Guid};
use crate::core::sample::Sample;
use crate::reliability::{
    AckNackMsg, GapMsg, GapTracker, HeartbeatMsg, HeartbeatRx, HistoryCache, NackScheduler,
    RtpsRange, SequenceNumberSet,
};
use crate::transport::Route;

/// Decision after processing a HEARTBEAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcknackDecision {
    /// Stale count, FINAL with nothing missing, or best-effort association.
    Ignore,

    /// Everything announced is here; ACKNACK with FINAL set.
    Synchronized { bitmap_base: u64 },

    /// Missing data; ACKNACK naming it.
    NeedData { bitmap_base: u64 },

    /// An ACKNACK went out less than `acknack_rate_limit` ago.
    RateLimited,
}

/// What one inbound message changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Samples newly handed to the reader history.
    pub delivered: u64,
    /// Sequences newly declared lost.
    pub lost: u64,
    /// Already received or lost; dropped.
    pub duplicate: bool,
    /// Arrived above a hole.
    pub out_of_order: bool,
    /// Filled a hole (retransmission).
    pub repaired: bool,
    /// Size of the hole this arrival opened.
    pub opened_gap: u64,
}

/// Reader-side view of one matched writer.
#[derive(Debug)]
pub struct WriterProxy {
    remote: Guid,
    reliable: bool,
    prefer_unicast: bool,
    lifecycle: Lifecycle,
    delivered: u64,
    ahead: BTreeMap<u64, Arc<Sample>>,
    max_ahead: usize,
    tracker: GapTracker,
    heartbeat: HeartbeatRx,
    nack: NackScheduler,
    acknack_count: u32,
    last_acknack: Option<Instant>,
    acknack_rate_limit: Duration,
    last_activity: Instant,
    liveliness_lost: bool,
}

impl WriterProxy {
    pub fn new(
        remote: Guid,
        reliable: bool,
        prefer_unicast: bool,
        config: &RuntimeConfig,
        now: Instant,
    ) -> Self {
        Self {
            remote,
            reliable,
            prefer_unicast,
            lifecycle: Lifecycle::new(),
            delivered: 0,
            ahead: BTreeMap::new(),
            max_ahead: config.max_out_of_order.max(1),
            tracker: GapTracker::new(),
            heartbeat: HeartbeatRx::new(),
            nack: NackScheduler::from_config(config),
            acknack_count: 0,
            last_acknack: None,
            acknack_rate_limit: config.acknack_rate_limit,
            last_activity: now,
            liveliness_lost: false,
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

    /// Highest contiguous sequence handed to the history.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Samples waiting for a hole below them.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.ahead.len()
    }

    #[must_use]
    pub fn missing(&self) -> u64 {
        self.tracker.total_missing()
    }

    #[must_use]
    pub fn acknack_count(&self) -> u32 {
        self.acknack_count
    }

    #[must_use]
    pub fn is_liveliness_lost(&self) -> bool {
        self.liveliness_lost
    }

    #[must_use]
    pub fn state(&self) -> AssociationState {
        self.lifecycle.state()
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.lifecycle.is_terminated()
    }

    fn touch(&mut self, now: Instant) {
        self.last_activity = now;
        self.liveliness_lost = false;
        if self.lifecycle.on_exchange() {
            log::debug!("[reader] writer {} associated", self.remote);
        }
    }

    // ========================================================================
    // DATA
    // ========================================================================

    /// Accept one DATA sample and deliver whatever became contiguous.
    pub fn on_data(&mut self, sample: Arc<Sample>, history: &HistoryCache, now: Instant) -> Progress {
        let mut progress = Progress::default();
        let seq = sample.seq;
        self.touch(now);

        if !self.reliable {
            // best-effort: newest wins, holes are never repaired
            if seq <= self.delivered {
                progress.duplicate = true;
                return progress;
            }
            progress.out_of_order = seq > self.delivered + 1;
            match history.try_insert_received(sample) {
                Ok(()) => {
                    self.delivered = seq;
                    progress.delivered = 1;
                }
                Err(e) => log::trace!("[reader] best-effort seq {} dropped: {}", seq, e),
            }
            return progress;
        }

        if seq > self.delivered + 1 && !self.ahead.contains_key(&seq) && self.ahead.len() >= self.max_ahead {
            // not recorded: the next heartbeat announces it as missing
            log::debug!(
                "[reader] {} out-of-order buffer full ({}), dropping seq {}",
                self.remote,
                self.max_ahead,
                seq
            );
            return progress;
        }

        let was_missing = self.tracker.is_missing(seq);
        let opened_gap = seq.saturating_sub(self.tracker.last_seen() + 1);
        if !self.tracker.on_receive(seq) {
            progress.duplicate = true;
            return progress;
        }
        progress.repaired = was_missing;
        progress.opened_gap = opened_gap;
        progress.out_of_order = seq > self.delivered + 1;

        self.ahead.insert(seq, sample);
        self.release(history, &mut progress);
        self.nack.on_gaps_changed(self.tracker.has_gaps(), now);
        progress
    }

    /// Move contiguous samples from `ahead` into the history, skipping
    /// sequences declared lost.
    fn release(&mut self, history: &HistoryCache, progress: &mut Progress) {
        loop {
            let next = self.delivered + 1;
            if let Some(sample) = self.ahead.remove(&next) {
                if let Err(e) = history.try_insert_received(Arc::clone(&sample)) {
                    // reader history full: hold it, leave it unacknowledged
                    log::trace!("[reader] seq {} held back: {}", next, e);
                    self.ahead.insert(next, sample);
                    return;
                }
                self.delivered = next;
                progress.delivered += 1;
                continue;
            }

            if next <= self.tracker.last_seen() && !self.tracker.is_missing(next) {
                // declared lost: jump to the next sequence still expected
                let resume = [
                    self.tracker.first_missing(),
                    self.ahead.keys().next().copied(),
                    Some(self.tracker.last_seen() + 1),
                ]
                .into_iter()
                .flatten()
                .min()
                .unwrap_or(next);
                if resume <= next {
                    return;
                }
                self.delivered = resume - 1;
                continue;
            }
            return;
        }
    }

    /// Sequences below `end` will never arrive.
    fn declare_lost(&mut self, end: u64) -> u64 {
        let Some(range) = RtpsRange::new(self.delivered + 1, end) else {
            return 0;
        };
        self.tracker.mark_lost(range)
    }

    // ========================================================================
    // HEARTBEAT / GAP
    // ========================================================================

    /// Process a HEARTBEAT and decide whether to answer.
    pub fn on_heartbeat(
        &mut self,
        hb: &HeartbeatMsg,
        history: &HistoryCache,
        now: Instant,
    ) -> (AcknackDecision, Progress) {
        let mut progress = Progress::default();
        if !self.reliable {
            self.touch(now);
            return (AcknackDecision::Ignore, progress);
        }
        if !self.heartbeat.on_heartbeat(hb) {
            log::trace!("[reader] stale HEARTBEAT count={} from {}", hb.count, self.remote);
            return (AcknackDecision::Ignore, progress);
        }
        self.touch(now);

        let first_contact = self.delivered == 0;
        if hb.first_seq > self.delivered + 1 {
            let lost = self.declare_lost(hb.first_seq);
            // a late joiner starts at the writer's first available sample
            if !first_contact {
                progress.lost = lost;
            }
        }
        if !hb.is_empty() {
            self.tracker.announce(hb.last_seq);
        }
        self.release(history, &mut progress);
        self.nack.on_gaps_changed(self.tracker.has_gaps(), now);

        let missing = self.tracker.has_gaps();
        if hb.final_flag && !missing {
            return (AcknackDecision::Ignore, progress);
        }
        if self
            .last_acknack
            .is_some_and(|last| now.duration_since(last) < self.acknack_rate_limit)
        {
            return (AcknackDecision::RateLimited, progress);
        }

        let bitmap_base = self.delivered + 1;
        let decision = if missing {
            AcknackDecision::NeedData { bitmap_base }
        } else {
            AcknackDecision::Synchronized { bitmap_base }
        };
        (decision, progress)
    }

    /// Writer declared sequences irrelevant.
    pub fn on_gap(&mut self, gap: &GapMsg, history: &HistoryCache, now: Instant) -> Progress {
        let mut progress = Progress::default();
        if !self.reliable {
            return progress;
        }
        self.touch(now);

        let floor = self.delivered + 1;
        for range in gap.lost_ranges() {
            if let Some(range) = RtpsRange::new(range.start().max(floor), range.end()) {
                progress.lost += self.tracker.mark_lost(range);
            }
        }
        self.release(history, &mut progress);
        self.nack.on_gaps_changed(self.tracker.has_gaps(), now);
        progress
    }

    // ========================================================================
    // ACKNACK
    // ========================================================================

    /// ACKNACK from the current state: base = `delivered + 1`, bitmap = the
    /// first 256 missing sequences from there.
    pub fn build_acknack(&mut self, reader_id: EntityId) -> AckNackMsg {
        let base = self.delivered + 1;
        let missing = self.tracker.missing_from(base, SequenceNumberSet::MAX_BITS);
        let state = SequenceNumberSet::from_sequences(base, &missing)
            .unwrap_or_else(|| SequenceNumberSet::empty(base));
        self.acknack_count = self.acknack_count.wrapping_add(1);
        AckNackMsg {
            reader_id,
            writer_id: self.remote.entity_id,
            state,
            count: self.acknack_count,
            final_flag: missing.is_empty(),
        }
    }

    /// Answer to a HEARTBEAT; postpones the next NACK retry.
    pub fn heartbeat_acknack(&mut self, reader_id: EntityId, now: Instant) -> AckNackMsg {
        self.last_acknack = Some(now);
        self.nack.on_heartbeat_response(now);
        self.build_acknack(reader_id)
    }

    /// Unsolicited NACK when the coalescing window or a retry backoff expired.
    pub fn poll_nack(&mut self, reader_id: EntityId, now: Instant) -> Option<AckNackMsg> {
        if !self.reliable || self.is_terminated() || !self.nack.due(now) {
            return None;
        }
        if !self.tracker.has_gaps() {
            self.nack.reset();
            return None;
        }
        self.nack.on_nack_sent(now);
        self.last_acknack = Some(now);
        Some(self.build_acknack(reader_id))
    }

    /// Next time `poll_nack` may fire.
    #[must_use]
    pub fn next_nack(&self) -> Option<Instant> {
        self.nack.next_flush()
    }

    // ========================================================================
    // Liveliness and lifecycle
    // ========================================================================

    /// True once, when a reliable writer has been silent for `lease`.
    pub fn check_liveliness(&mut self, now: Instant, lease: Duration) -> bool {
        if !self.reliable || !self.lifecycle.is_active() || self.liveliness_lost {
            return false;
        }
        if now.saturating_duration_since(self.last_activity) < lease {
            return false;
        }
        self.liveliness_lost = true;
        true
    }

    pub fn begin_shutdown(&mut self, now: Instant, drain_timeout: Duration) -> bool {
        self.lifecycle.begin_shutdown(now, drain_timeout)
    }

    /// Finish a drain once nothing is awaited from the writer.
    pub fn try_terminate(&mut self, now: Instant) -> Option<Termination> {
        let drained = !self.reliable || (!self.tracker.has_gaps() && self.ahead.is_empty());
        self.lifecycle.try_terminate(now, drained)
    }

    pub fn terminate(&mut self) {
        self.lifecycle.terminate();
    }
}
