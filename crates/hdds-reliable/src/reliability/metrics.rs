// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Metrics for Reliable QoS
//!
//! Lock-free counters updated from the write path, the receive thread and
//! the timer thread. One instance per endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ReliableMetrics {
    heartbeats_sent: AtomicU64,
    heartbeats_received: AtomicU64,
    nacks_sent: AtomicU64,
    nacks_received: AtomicU64,
    retransmit_sent: AtomicU64,
    retransmit_received: AtomicU64,
    gaps_sent: AtomicU64,
    gaps_detected: AtomicU64,
    max_gap_size: AtomicU64,
    samples_lost: AtomicU64,
    duplicates_dropped: AtomicU64,
    total_out_of_order: AtomicU64,
}

/// Point-in-time copy of [`ReliableMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub heartbeats_sent: u64,
    pub heartbeats_received: u64,
    pub nacks_sent: u64,
    pub nacks_received: u64,
    pub retransmit_sent: u64,
    pub retransmit_received: u64,
    pub gaps_sent: u64,
    pub gaps_detected: u64,
    pub max_gap_size: u64,
    pub samples_lost: u64,
    pub duplicates_dropped: u64,
    pub out_of_order: u64,
}

impl ReliableMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reader noticed a hole of `gap_size` sequences.
    pub fn record_gap(&self, gap_size: u64) {
        self.gaps_detected.fetch_add(1, Ordering::Relaxed);
        self.max_gap_size.fetch_max(gap_size, Ordering::Relaxed);
    }

    pub fn increment_heartbeats_sent(&self, count: u64) {
        self.heartbeats_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_heartbeats_received(&self, count: u64) {
        self.heartbeats_received.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_nacks_sent(&self, count: u64) {
        self.nacks_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_nacks_received(&self, count: u64) {
        self.nacks_received.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_retransmit_sent(&self, count: u64) {
        self.retransmit_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_retransmit_received(&self, count: u64) {
        self.retransmit_received.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_gaps_sent(&self, count: u64) {
        self.gaps_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_samples_lost(&self, count: u64) {
        self.samples_lost.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_duplicates_dropped(&self, count: u64) {
        self.duplicates_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_out_of_order(&self, count: u64) {
        self.total_out_of_order.fetch_add(count, Ordering::Relaxed);
    }

    pub fn heartbeats_sent(&self) -> u64 {
        self.heartbeats_sent.load(Ordering::Relaxed)
    }

    pub fn nacks_sent(&self) -> u64 {
        self.nacks_sent.load(Ordering::Relaxed)
    }

    pub fn nacks_received(&self) -> u64 {
        self.nacks_received.load(Ordering::Relaxed)
    }

    pub fn retransmit_sent(&self) -> u64 {
        self.retransmit_sent.load(Ordering::Relaxed)
    }

    pub fn samples_lost(&self) -> u64 {
        self.samples_lost.load(Ordering::Relaxed)
    }

    pub fn duplicates_dropped(&self) -> u64 {
        self.duplicates_dropped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
            heartbeats_received: self.heartbeats_received.load(Ordering::Relaxed),
            nacks_sent: self.nacks_sent.load(Ordering::Relaxed),
            nacks_received: self.nacks_received.load(Ordering::Relaxed),
            retransmit_sent: self.retransmit_sent.load(Ordering::Relaxed),
            retransmit_received: self.retransmit_received.load(Ordering::Relaxed),
            gaps_sent: self.gaps_sent.load(Ordering::Relaxed),
            gaps_detected: self.gaps_detected.load(Ordering::Relaxed),
            max_gap_size: self.max_gap_size.load(Ordering::Relaxed),
            samples_lost: self.samples_lost.load(Ordering::Relaxed),
            duplicates_dropped: self.duplicates_dropped.load(Ordering::Relaxed),
            out_of_order: self.total_out_of_order.load(Ordering::Relaxed),
        }
    }
}
