// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reliable Writer Session -- RTPS Sec.8.4.7 StatefulWriter
//!
//! # Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |  WriterSession                                              |
//! |  +--------------+   +-------------------------------------+ |
//! |  | HistoryCache |   | MatchedReaders                      | |
//! |  +--------------+   |  DashMap<Guid, Mutex<ReaderProxy>>  | |
//! |                     +-------------------------------------+ |
//! |                                                             |
//! |  write()      -> insert, DATA to every active reader        |
//! |  on_acknack() -> ack bookkeeping, DATA/GAP repair           |
//! |  tick()       -> HEARTBEAT per reliable reader, drain       |
//! +-------------------------------------------------------------+
//! ```
//!
//! Messages are built under the proxy locks and sent after releasing them.

mod matched_readers;
mod proxy;

pub use matched_readers::{MatchedReaders, SharedReaderProxy};
pub use proxy::ReaderProxy;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::RuntimeConfig;
use crate::core::association::Termination;
use crate::core::discovery::guid::{EntityId, Guid};
use crate::core::sample::Sample;
use crate::dds::{Error, Result};
use crate::qos::{History, QosProfile};
use crate::reliability::{
    AckNackMsg, DataMsg, HeartbeatTx, HistoryCache, ReliableMetrics, RetransmitPlan, RtpsMessage,
    Submessage, WriterRetransmitHandler,
};
use crate::transport::{Route, SendOutcome, TransportMux};

/// Local writer endpoint and its associations.
pub struct WriterSession {
    guid: Guid,
    qos: QosProfile,
    history: Arc<HistoryCache>,
    readers: MatchedReaders,
    heartbeat: Mutex<HeartbeatTx>,
    metrics: Arc<ReliableMetrics>,
    mux: Arc<TransportMux>,
    drain_timeout: Duration,
    closing: AtomicBool,
}

impl WriterSession {
    pub fn new(guid: Guid, qos: QosProfile, config: &RuntimeConfig, mux: Arc<TransportMux>) -> Self {
        Self {
            guid,
            history: Arc::new(HistoryCache::new(&qos)),
            qos,
            readers: MatchedReaders::new(),
            heartbeat: Mutex::new(HeartbeatTx::new(config.heartbeat_period)),
            metrics: Arc::new(ReliableMetrics::new()),
            mux,
            drain_timeout: config.drain_timeout,
            closing: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn guid(&self) -> Guid {
        self.guid
    }

    #[must_use]
    pub fn qos(&self) -> &QosProfile {
        &self.qos
    }

    #[must_use]
    pub fn history(&self) -> &Arc<HistoryCache> {
        &self.history
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<ReliableMetrics> {
        &self.metrics
    }

    #[must_use]
    pub fn matched(&self) -> &MatchedReaders {
        &self.readers
    }

    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    // ========================================================================
    // Matching
    // ========================================================================

    /// Associate `reader`. The association is reliable only when both the
    /// writer offers and the reader requests RELIABLE.
    pub fn match_reader(&self, reader: Guid, reader_reliable: bool, prefer_unicast: bool, now: Instant) -> bool {
        let reliable = self.qos.is_reliable() && reader_reliable;
        let start_seq = self.history.last_assigned();
        let added = self
            .readers
            .add(ReaderProxy::new(reader, reliable, prefer_unicast, start_seq, now));
        if added {
            log::debug!(
                "[writer] {} matched reader {} (reliable={}, from seq {})",
                self.guid,
                reader,
                reliable,
                start_seq + 1
            );
        }
        added
    }

    /// Local or remote end of the association is going away.
    pub fn unmatch_reader(&self, reader: &Guid, now: Instant) -> bool {
        let Some(proxy) = self.readers.get(reader) else {
            return false;
        };
        let started = proxy.lock().begin_shutdown(now, self.drain_timeout);
        if started {
            log::debug!("[writer] {} draining reader {}", self.guid, reader);
        }
        started
    }

    /// Remote departure: every association with an endpoint of `identity`.
    pub fn on_remote_removed(&self, identity: &Guid, now: Instant) -> usize {
        self.readers
            .matching(identity)
            .iter()
            .filter(|reader| self.unmatch_reader(reader, now))
            .count()
    }

    /// Local disposal: stop accepting writes and drain every association.
    pub fn begin_shutdown(&self, now: Instant) {
        self.closing.store(true, Ordering::Release);
        for proxy in self.readers.snapshot() {
            proxy.lock().begin_shutdown(now, self.drain_timeout);
        }
    }

    /// Closing and no association left.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.is_closing() && self.readers.is_empty()
    }

    // ========================================================================
    // Write path
    // ========================================================================

    /// Sequence, retain and publish one sample.
    ///
    /// Blocks up to `max_blocking_time` when the history is full.
    pub fn write(&self, sample: Sample) -> Result<u64> {
        if self.is_closing() {
            return Err(Error::InvalidState("writer is being deleted".to_string()));
        }
        let seq = self.history.insert(sample)?;

        if let Some(stored) = self.history.get(&self.guid, seq) {
            self.publish(&stored);
        }
        self.prune();
        Ok(seq)
    }

    fn publish(&self, sample: &Arc<Sample>) {
        let targets: Vec<(Route, EntityId)> = self
            .readers
            .snapshot()
            .iter()
            .filter_map(|proxy| {
                let mut proxy = proxy.lock();
                if !proxy.is_active() || sample.seq < proxy.first_relevant() {
                    return None;
                }
                proxy.on_sent(sample.seq);
                Some((proxy.route(self.guid), proxy.remote().entity_id))
            })
            .collect();

        for (route, reader_id) in targets {
            let msg = RtpsMessage::with(self.guid.prefix, self.data_submessage(reader_id, sample));
            self.send(&route, &msg);
        }
        log::trace!("[writer] {} published seq {}", self.guid, sample.seq);
    }

    fn data_submessage(&self, reader_id: EntityId, sample: &Sample) -> Submessage {
        Submessage::Data(DataMsg {
            reader_id,
            writer_id: self.guid.entity_id,
            seq: sample.seq,
            instance: sample.instance,
            kind: sample.kind,
            timestamp_ns: sample.timestamp_ns,
            payload: Arc::clone(&sample.payload),
        })
    }

    fn send(&self, route: &Route, msg: &RtpsMessage) -> SendOutcome {
        match msg.encode() {
            Ok(datagram) => self.mux.send(route, &datagram),
            Err(e) => {
                log::warn!("[writer] {} cannot encode message: {}", self.guid, e);
                SendOutcome::Dropped
            }
        }
    }

    /// KEEP_ALL: drop samples every live reliable reader acknowledged.
    fn prune(&self) {
        if self.history.history_kind() != History::KeepAll {
            return;
        }
        let last = self.history.last_assigned();
        let floor = self.readers.min_acked(last);
        let removed = self.history.remove_acknowledged(&self.guid, floor);
        if removed > 0 {
            log::trace!("[writer] {} pruned {} acknowledged samples", self.guid, removed);
        }
    }

    // ========================================================================
    // Inbound ACKNACK
    // ========================================================================

    pub fn on_acknack(&self, reader: &Guid, msg: &AckNackMsg, now: Instant) {
        let Some(proxy) = self.readers.get(reader) else {
            log::debug!("[writer] {} ACKNACK from unmatched reader {}", self.guid, reader);
            return;
        };
        let last = self.history.last_assigned();

        let (requested, first_relevant, route) = {
            let mut proxy = proxy.lock();
            if !proxy.is_reliable() || proxy.is_terminated() {
                return;
            }
            if !proxy.on_acknack(msg, last, now) {
                log::trace!("[writer] stale ACKNACK count={} from {}", msg.count, reader);
                return;
            }
            (proxy.take_requested(), proxy.first_relevant(), proxy.route(self.guid))
        };

        if !requested.is_empty() {
            self.metrics.increment_nacks_received(1);
            let plan = WriterRetransmitHandler::new(&self.history, self.guid, &self.metrics)
                .on_nack(reader.entity_id, &requested, first_relevant);
            log::debug!(
                "[writer] {} NACK from {}: {} requested, {} resent, {} gone",
                self.guid,
                reader,
                requested.len(),
                plan.samples.len(),
                plan.missed
            );
            self.send_repair(&route, reader.entity_id, plan);
        }
        self.prune();
    }

    fn send_repair(&self, route: &Route, reader_id: EntityId, plan: RetransmitPlan) {
        for sample in &plan.samples {
            let msg = RtpsMessage::with(self.guid.prefix, self.data_submessage(reader_id, sample));
            self.send(route, &msg);
        }
        if !plan.gaps.is_empty() {
            let mut msg = RtpsMessage::new(self.guid.prefix);
            for gap in plan.gaps {
                msg.push(Submessage::Gap(gap));
            }
            self.send(route, &msg);
        }
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Heartbeats when due, then drain bookkeeping.
    ///
    /// Returns the readers whose association terminated and was removed.
    pub fn tick(&self, now: Instant) -> Vec<Guid> {
        self.send_heartbeats(now);
        self.reap(now)
    }

    /// Next time `tick` has heartbeat work.
    #[must_use]
    pub fn next_heartbeat(&self) -> Option<Instant> {
        self.heartbeat.lock().next_deadline()
    }

    fn send_heartbeats(&self, now: Instant) {
        // nothing written yet still heartbeats (1..0) so readers see the writer alive
        let last = self.history.last_assigned();
        let oldest = self.history.oldest_seq(&self.guid);

        let targets: Vec<(Route, Submessage)> = {
            let mut tx = self.heartbeat.lock();
            if !tx.is_due(now) {
                return;
            }
            tx.advance(now);
            self.readers
                .snapshot()
                .iter()
                .filter_map(|proxy| {
                    let proxy = proxy.lock();
                    if !proxy.is_reliable() || proxy.is_terminated() {
                        return None;
                    }
                    // empty history is announced as first = last + 1
                    let first = oldest.map_or(last + 1, |o| o.max(proxy.first_relevant()));
                    let hb = tx.build_heartbeat(
                        proxy.remote().entity_id,
                        self.guid.entity_id,
                        first,
                        last,
                        proxy.is_acked(last),
                    );
                    Some((proxy.route(self.guid), Submessage::Heartbeat(hb)))
                })
                .collect()
        };

        let sent = targets.len() as u64;
        for (route, hb) in targets {
            self.send(&route, &RtpsMessage::with(self.guid.prefix, hb));
        }
        if sent > 0 {
            self.metrics.increment_heartbeats_sent(sent);
            log::trace!("[writer] {} sent {} HEARTBEAT(s) last={}", self.guid, sent, last);
        }
    }

    fn reap(&self, now: Instant) -> Vec<Guid> {
        let last = self.history.last_assigned();
        for proxy in self.readers.snapshot() {
            let mut proxy = proxy.lock();
            match proxy.try_terminate(now, last) {
                Some(Termination::Drained) => {
                    log::debug!("[writer] {} reader {} drained", self.guid, proxy.remote());
                }
                Some(Termination::Forced) => {
                    log::warn!(
                        "[writer] {} reader {} force-terminated with {} unacknowledged",
                        self.guid,
                        proxy.remote(),
                        proxy.unacked(last)
                    );
                }
                None => {}
            }
        }
        let removed = self.readers.reap_terminated();
        if !removed.is_empty() {
            self.prune();
        }
        removed
    }
}
