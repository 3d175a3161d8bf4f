// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Writer-side reliability protocol handlers
//!
//! - HeartbeatTx: periodic heartbeat scheduling and counting
//! - WriterRetransmitHandler: NACK processing, retransmission and GAPs

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::messages::{GapMsg, HeartbeatMsg};
use super::{HistoryCache, ReliableMetrics};
use crate::core::discovery::guid::{EntityId, Guid};
use crate::core::sample::Sample;

// ============================================================================
// HEARTBEAT TX
// ============================================================================

/// Heartbeat transmitter (writer-side).
///
/// The first heartbeat is due immediately; later ones every `period`.
#[derive(Debug)]
pub struct HeartbeatTx {
    next_deadline: Option<Instant>,
    period: Duration,
    count: u32,
}

impl HeartbeatTx {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            next_deadline: None,
            period,
            count: 0,
        }
    }

    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_deadline.map_or(true, |deadline| now >= deadline)
    }

    /// Next time the heartbeat should be sent (`None` = now).
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_deadline
    }

    /// Take the next count and schedule the following heartbeat.
    pub fn advance(&mut self, now: Instant) -> u32 {
        self.count = self.count.wrapping_add(1);
        self.next_deadline = Some(now + self.period);
        self.count
    }

    /// Build a heartbeat carrying the current count (call after `advance`).
    #[must_use]
    pub fn build_heartbeat(
        &self,
        reader_id: EntityId,
        writer_id: EntityId,
        first_seq: u64,
        last_seq: u64,
        final_flag: bool,
    ) -> HeartbeatMsg {
        HeartbeatMsg {
            reader_id,
            writer_id,
            first_seq,
            last_seq,
            count: self.count,
            final_flag,
        }
    }

    /// Monotonic heartbeat counter.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }
}

// ============================================================================
// WRITER RETRANSMIT HANDLER
// ============================================================================

/// Answer to one NACK: samples to resend and GAPs for the rest.
#[derive(Debug, Default)]
pub struct RetransmitPlan {
    pub samples: Vec<Arc<Sample>>,
    pub gaps: Vec<GapMsg>,
    /// Requested sequences no longer available (permanent misses).
    pub missed: u64,
}

/// Writer-side retransmission handler.
pub struct WriterRetransmitHandler<'a> {
    cache: &'a HistoryCache,
    writer: Guid,
    metrics: &'a ReliableMetrics,
}

impl<'a> WriterRetransmitHandler<'a> {
    pub fn new(cache: &'a HistoryCache, writer: Guid, metrics: &'a ReliableMetrics) -> Self {
        Self {
            cache,
            writer,
            metrics,
        }
    }

    /// Resolve requested sequences against the history cache.
    ///
    /// - Cache hit -> retransmit
    /// - Cache miss, or below `first_relevant` (written before this reader
    ///   matched) -> GAP, never retried
    /// - Never assigned -> ignored
    pub fn on_nack(
        &self,
        reader_id: EntityId,
        requested: &[u64],
        first_relevant: u64,
    ) -> RetransmitPlan {
        let last_assigned = self.cache.last_assigned();
        let mut plan = RetransmitPlan::default();
        let mut missing = Vec::new();

        let mut sorted = requested.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        for seq in sorted {
            if seq == 0 || seq > last_assigned {
                continue;
            }
            let hit = if seq >= first_relevant {
                self.cache.get(&self.writer, seq)
            } else {
                None
            };
            match hit {
                Some(sample) => plan.samples.push(sample),
                None => missing.push(seq),
            }
        }

        if !missing.is_empty() {
            plan.gaps = GapMsg::from_sequences(reader_id, self.writer.entity_id, &missing);
            plan.missed = missing.len() as u64;
            self.metrics.increment_gaps_sent(plan.gaps.len() as u64);
            log::debug!(
                "[writer] {} requested samples unavailable, sending {} GAP(s)",
                missing.len(),
                plan.gaps.len()
            );
        }
        self.metrics
            .increment_retransmit_sent(plan.samples.len() as u64);

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sample::InstanceHandle;
    use crate::qos::QosProfile;

    const READER: EntityId = [0, 0, 1, 0x07];

    fn writer() -> Guid {
        Guid::new([3; 12], [0, 0, 1, 0x02])
    }

    #[test]
    fn test_heartbeat_tx_schedule() {
        let t0 = Instant::now();
        let mut tx = HeartbeatTx::new(Duration::from_millis(100));
        assert!(tx.is_due(t0));

        assert_eq!(tx.advance(t0), 1);
        assert!(!tx.is_due(t0 + Duration::from_millis(99)));
        assert!(tx.is_due(t0 + Duration::from_millis(100)));

        let hb = tx.build_heartbeat(READER, writer().entity_id, 1, 5, true);
        assert_eq!((hb.first_seq, hb.last_seq, hb.count), (1, 5, 1));
        assert!(hb.final_flag);
        assert_eq!(tx.advance(t0), 2);
    }

    #[test]
    fn test_retransmit_hits_and_gaps() {
        let cache = HistoryCache::new(&QosProfile::default().keep_last(2));
        let metrics = ReliableMetrics::new();
        for i in 0..5u8 {
            cache
                .insert(Sample::new(writer(), InstanceHandle::NIL, &[i]))
                .expect("insert");
        }
        // depth 2: only 4 and 5 remain
        let handler = WriterRetransmitHandler::new(&cache, writer(), &metrics);
        let plan = handler.on_nack(READER, &[5, 2, 4, 3, 9, 2], 1);

        let seqs: Vec<u64> = plan.samples.iter().map(|s| s.seq).collect();
        assert_eq!(seqs, vec![4, 5]);
        assert_eq!(plan.missed, 2);
        assert_eq!(plan.gaps.len(), 1);
        assert_eq!(plan.gaps[0].lost_sequences(), vec![2, 3]);
        assert_eq!(metrics.retransmit_sent(), 2);
        assert_eq!(metrics.snapshot().gaps_sent, 1);
    }

    #[test]
    fn test_retransmit_skips_history_before_match() {
        let cache = HistoryCache::new(&QosProfile::default().keep_all());
        let metrics = ReliableMetrics::new();
        for i in 0..4u8 {
            cache
                .insert(Sample::new(writer(), InstanceHandle::NIL, &[i]))
                .expect("insert");
        }
        let handler = WriterRetransmitHandler::new(&cache, writer(), &metrics);
        let plan = handler.on_nack(READER, &[1, 2, 3, 4], 3);
        assert_eq!(plan.samples.len(), 2);
        assert_eq!(plan.gaps[0].lost_sequences(), vec![1, 2]);
    }
}
