// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reader-side reliability protocol handlers
//!
//! - HeartbeatRx: stale-heartbeat filtering
//! - NackScheduler: time-windowed NACK coalescing with exponential backoff
//!
//! Both take `now` explicitly so the timer thread and tests share one clock.

use std::time::{Duration, Instant};

use super::messages::HeartbeatMsg;
use crate::config::RuntimeConfig;

// ============================================================================
// HEARTBEAT RX
// ============================================================================

/// Heartbeat receiver (reader-side).
#[derive(Debug, Default)]
pub struct HeartbeatRx {
    last_count: Option<u32>,
}

impl HeartbeatRx {
    #[must_use]
    pub fn new() -> Self {
        Self { last_count: None }
    }

    /// Accept a heartbeat. Returns false when its count is not newer than the
    /// last one seen (duplicated or reordered on the wire).
    pub fn on_heartbeat(&mut self, hb: &HeartbeatMsg) -> bool {
        if let Some(last_count) = self.last_count {
            if hb.count <= last_count {
                return false;
            }
        }
        self.last_count = Some(hb.count);
        true
    }

    /// Last heartbeat count seen.
    #[must_use]
    pub fn last_count(&self) -> Option<u32> {
        self.last_count
    }
}

// ============================================================================
// NACK SCHEDULER
// ============================================================================

/// NACK scheduler with time-windowed gap coalescing and exponential backoff.
///
/// ```text
///   ┌────────┐  gap detected   ┌─────────┐  window expires  ┌───────┐
///   │  IDLE  │ ───────────────▶│ PENDING │ ────────────────▶│ RETRY │
///   └────────┘                 └─────────┘                  └───────┘
///       ▲                           │                           │
///       │      all gaps filled      │   retry_count >= budget   │
///       └───────────────────────────┴───────────────────────────┘
/// ```
///
/// The scheduler only decides *when*; the gap set itself lives in the
/// association's `GapTracker`. Giving up after the retry budget is not data
/// loss: the next heartbeat still triggers an ACKNACK.
#[derive(Debug, Clone)]
pub struct NackScheduler {
    next_flush: Option<Instant>,
    window: Duration,
    retry_count: u32,
    max_retries: u32,
    backoff: Duration,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl NackScheduler {
    #[must_use]
    pub fn new(
        window: Duration,
        initial_backoff: Duration,
        max_backoff: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            next_flush: None,
            window,
            retry_count: 0,
            max_retries,
            backoff: initial_backoff,
            initial_backoff,
            max_backoff,
        }
    }

    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(
            config.nack_response_delay,
            config.nack_backoff_initial,
            config.nack_backoff_max,
            config.nack_max_retries,
        )
    }

    /// Gap set changed. IDLE -> PENDING on the first gap, any -> IDLE once
    /// nothing is missing.
    pub fn on_gaps_changed(&mut self, has_gaps: bool, now: Instant) {
        if !has_gaps {
            self.reset();
        } else if self.next_flush.is_none() {
            self.next_flush = Some(now + self.window);
        }
    }

    /// Window or backoff expired with gaps still pending.
    #[must_use]
    pub fn due(&self, now: Instant) -> bool {
        self.next_flush.is_some_and(|deadline| now >= deadline)
    }

    /// An ACKNACK went out because `due` fired.
    pub fn on_nack_sent(&mut self, now: Instant) {
        self.retry_count += 1;

        if self.retry_count >= self.max_retries {
            log::debug!(
                "[reader] NACK retry budget ({}) spent, waiting for next heartbeat",
                self.max_retries
            );
            self.reset();
        } else {
            self.next_flush = Some(now + self.backoff);
            self.backoff = (self.backoff * 2).min(self.max_backoff);
        }
    }

    /// A heartbeat-triggered ACKNACK already asked for the gaps; push the next
    /// retry out instead of sending a second one right away.
    pub fn on_heartbeat_response(&mut self, now: Instant) {
        if self.next_flush.is_some() {
            self.next_flush = Some(now + self.backoff);
        }
    }

    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    #[must_use]
    pub fn next_flush(&self) -> Option<Instant> {
        self.next_flush
    }

    /// Back to IDLE: no deadline, no retries, initial backoff.
    pub fn reset(&mut self) {
        self.next_flush = None;
        self.retry_count = 0;
        self.backoff = self.initial_backoff;
    }
}

impl Default for NackScheduler {
    fn default() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::discovery::guid::ENTITYID_UNKNOWN;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_heartbeat_rx_rejects_stale_counts() {
        let mut rx = HeartbeatRx::new();
        assert!(rx.on_heartbeat(&HeartbeatMsg::new(ENTITYID_UNKNOWN, 1, 5, 3)));
        assert!(!rx.on_heartbeat(&HeartbeatMsg::new(ENTITYID_UNKNOWN, 1, 6, 3)));
        assert!(!rx.on_heartbeat(&HeartbeatMsg::new(ENTITYID_UNKNOWN, 1, 6, 2)));
        assert!(rx.on_heartbeat(&HeartbeatMsg::new(ENTITYID_UNKNOWN, 1, 6, 4)));
        assert_eq!(rx.last_count(), Some(4));
    }

    #[test]
    fn test_nack_window_then_backoff() {
        let t0 = Instant::now();
        let mut nack = NackScheduler::new(ms(20), ms(50), ms(1000), 5);

        nack.on_gaps_changed(true, t0);
        assert!(!nack.due(t0 + ms(19)));
        assert!(nack.due(t0 + ms(20)));

        // more out-of-order arrivals do not restart the window
        nack.on_gaps_changed(true, t0 + ms(10));
        assert!(nack.due(t0 + ms(20)));

        nack.on_nack_sent(t0 + ms(20));
        assert!(!nack.due(t0 + ms(69)));
        assert!(nack.due(t0 + ms(70)));

        nack.on_nack_sent(t0 + ms(70));
        assert!(!nack.due(t0 + ms(169)));
        assert!(nack.due(t0 + ms(170)));
        assert_eq!(nack.retry_count(), 2);
    }

    #[test]
    fn test_nack_backoff_capped() {
        let t0 = Instant::now();
        let mut nack = NackScheduler::new(ms(0), ms(400), ms(500), 10);
        nack.on_gaps_changed(true, t0);
        nack.on_nack_sent(t0); // next in 400
        nack.on_nack_sent(t0); // next in 500 (capped from 800)
        assert!(!nack.due(t0 + ms(499)));
        assert!(nack.due(t0 + ms(500)));
    }

    #[test]
    fn test_nack_gives_up_after_budget() {
        let t0 = Instant::now();
        let mut nack = NackScheduler::new(ms(1), ms(1), ms(10), 3);
        nack.on_gaps_changed(true, t0);
        for _ in 0..3 {
            nack.on_nack_sent(t0);
        }
        assert_eq!(nack.retry_count(), 0);
        assert_eq!(nack.next_flush(), None);
        assert!(!nack.due(t0 + ms(1000)));
    }

    #[test]
    fn test_nack_reset_when_filled() {
        let t0 = Instant::now();
        let mut nack = NackScheduler::default();
        nack.on_gaps_changed(true, t0);
        nack.on_gaps_changed(false, t0);
        assert!(!nack.due(t0 + ms(10_000)));
    }

    #[test]
    fn test_heartbeat_response_defers_retry() {
        let t0 = Instant::now();
        let mut nack = NackScheduler::new(ms(20), ms(50), ms(1000), 5);
        nack.on_gaps_changed(true, t0);
        nack.on_heartbeat_response(t0 + ms(5));
        assert!(!nack.due(t0 + ms(54)));
        assert!(nack.due(t0 + ms(55)));

        let mut idle = NackScheduler::default();
        idle.on_heartbeat_response(t0);
        assert_eq!(idle.next_flush(), None);
    }
}
