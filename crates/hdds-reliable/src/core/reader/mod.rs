// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reliable Reader Session -- RTPS Sec.8.4.10 StatefulReader
//!
//! One [`WriterProxy`] per matched writer. Inbound DATA, HEARTBEAT and GAP
//! update that proxy under its own lock; ACKNACKs are built under the lock
//! and sent after it is released. Listener callbacks also run unlocked.

mod matched_writers;
mod proxy;

pub use matched_writers::{MatchedWriters, SharedWriterProxy};
pub use proxy::{AcknackDecision, Progress, WriterProxy};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::config::RuntimeConfig;
use crate::core::association::Termination;
use crate::core::discovery::guid::Guid;
use crate::core::sample::Sample;
use crate::dds::{LivelinessLostStatus, ReaderListener, SampleLostStatus};
use crate::qos::QosProfile;
use crate::reliability::{
    AckNackMsg, DataMsg, GapMsg, HeartbeatMsg, HistoryCache, ReliableMetrics, RtpsMessage,
    Submessage,
};
use crate::transport::{Route, TransportMux};

#[derive(Debug, Default)]
struct Statuses {
    sample_lost: SampleLostStatus,
    liveliness_lost: LivelinessLostStatus,
}

/// Local reader endpoint and its associations.
pub struct ReaderSession {
    guid: Guid,
    qos: QosProfile,
    config: RuntimeConfig,
    history: Arc<HistoryCache>,
    writers: MatchedWriters,
    metrics: Arc<ReliableMetrics>,
    mux: Arc<TransportMux>,
    statuses: Mutex<Statuses>,
    listener: RwLock<Option<Arc<dyn ReaderListener>>>,
    closing: AtomicBool,
}

impl ReaderSession {
    pub fn new(guid: Guid, qos: QosProfile, config: &RuntimeConfig, mux: Arc<TransportMux>) -> Self {
        Self {
            guid,
            history: Arc::new(HistoryCache::new(&qos)),
            qos,
            config: config.clone(),
            writers: MatchedWriters::new(),
            metrics: Arc::new(ReliableMetrics::new()),
            mux,
            statuses: Mutex::new(Statuses::default()),
            listener: RwLock::new(None),
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
    pub fn matched(&self) -> &MatchedWriters {
        &self.writers
    }

    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn sample_lost_status(&self) -> SampleLostStatus {
        self.statuses.lock().sample_lost
    }

    #[must_use]
    pub fn liveliness_lost_status(&self) -> LivelinessLostStatus {
        self.statuses.lock().liveliness_lost
    }

    pub fn set_listener(&self, listener: Option<Arc<dyn ReaderListener>>) {
        *self.listener.write() = listener;
    }

    fn listener(&self) -> Option<Arc<dyn ReaderListener>> {
        self.listener.read().clone()
    }

    // ========================================================================
    // Matching
    // ========================================================================

    /// Associate `writer`; reliable only when both sides are.
    pub fn match_writer(&self, writer: Guid, writer_reliable: bool, prefer_unicast: bool, now: Instant) -> bool {
        if self.is_closing() {
            return false;
        }
        let reliable = self.qos.is_reliable() && writer_reliable;
        let added = self.writers.add(WriterProxy::new(
            writer,
            reliable,
            prefer_unicast,
            &self.config,
            now,
        ));
        if added {
            log::debug!(
                "[reader] {} matched writer {} (reliable={})",
                self.guid,
                writer,
                reliable
            );
        }
        added
    }

    pub fn unmatch_writer(&self, writer: &Guid, now: Instant) -> bool {
        let Some(proxy) = self.writers.get(writer) else {
            return false;
        };
        let started = proxy.lock().begin_shutdown(now, self.config.drain_timeout);
        if started {
            log::debug!("[reader] {} draining writer {}", self.guid, writer);
        }
        started
    }

    pub fn on_remote_removed(&self, identity: &Guid, now: Instant) -> usize {
        self.writers
            .matching(identity)
            .iter()
            .filter(|writer| self.unmatch_writer(writer, now))
            .count()
    }

    pub fn begin_shutdown(&self, now: Instant) {
        self.closing.store(true, Ordering::Release);
        for proxy in self.writers.snapshot() {
            proxy.lock().begin_shutdown(now, self.config.drain_timeout);
        }
    }

    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.is_closing() && self.writers.is_empty()
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    pub fn on_data(&self, writer: Guid, msg: DataMsg, now: Instant) {
        let Some(proxy) = self.writers.get(&writer) else {
            log::trace!("[reader] {} DATA from unmatched writer {}", self.guid, writer);
            return;
        };
        let sample = Arc::new(Sample {
            writer,
            seq: msg.seq,
            instance: msg.instance,
            kind: msg.kind,
            timestamp_ns: msg.timestamp_ns,
            payload: msg.payload,
        });

        let progress = {
            let mut proxy = proxy.lock();
            if proxy.is_terminated() {
                return;
            }
            proxy.on_data(sample, &self.history, now)
        };
        if progress.duplicate {
            self.metrics.increment_duplicates_dropped(1);
            log::trace!("[reader] {} duplicate seq {} from {}", self.guid, msg.seq, writer);
        }
        if progress.repaired {
            self.metrics.increment_retransmit_received(1);
        }
        if progress.out_of_order {
            self.metrics.increment_out_of_order(1);
        }
        if progress.opened_gap > 0 {
            self.metrics.record_gap(progress.opened_gap);
        }
        self.report(writer, progress);
    }

    pub fn on_heartbeat(&self, writer: Guid, hb: &HeartbeatMsg, now: Instant) {
        let Some(proxy) = self.writers.get(&writer) else {
            log::trace!("[reader] {} HEARTBEAT from unmatched writer {}", self.guid, writer);
            return;
        };
        self.metrics.increment_heartbeats_received(1);

        let (reply, progress) = {
            let mut proxy = proxy.lock();
            if proxy.is_terminated() {
                return;
            }
            let (decision, progress) = proxy.on_heartbeat(hb, &self.history, now);
            let reply = match decision {
                AcknackDecision::Synchronized { .. } | AcknackDecision::NeedData { .. } => Some((
                    proxy.route(self.guid),
                    proxy.heartbeat_acknack(self.guid.entity_id, now),
                )),
                AcknackDecision::Ignore | AcknackDecision::RateLimited => None,
            };
            (reply, progress)
        };

        if let Some((route, acknack)) = reply {
            self.send_acknack(&route, acknack);
        }
        self.report(writer, progress);
    }

    pub fn on_gap(&self, writer: Guid, gap: &GapMsg, now: Instant) {
        let Some(proxy) = self.writers.get(&writer) else {
            return;
        };
        let progress = {
            let mut proxy = proxy.lock();
            if proxy.is_terminated() {
                return;
            }
            proxy.on_gap(gap, &self.history, now)
        };
        self.report(writer, progress);
    }

    fn send_acknack(&self, route: &Route, acknack: AckNackMsg) {
        let nack = !acknack.state.is_empty();
        log::trace!(
            "[reader] {} ACKNACK to {} base={} count={} nack={}",
            self.guid,
            route.remote,
            acknack.state.base(),
            acknack.count,
            nack
        );
        let msg = RtpsMessage::with(self.guid.prefix, Submessage::AckNack(acknack));
        match msg.encode() {
            Ok(datagram) => {
                self.mux.send(route, &datagram);
                if nack {
                    self.metrics.increment_nacks_sent(1);
                }
            }
            Err(e) => log::warn!("[reader] {} cannot encode ACKNACK: {}", self.guid, e),
        }
    }

    /// Metrics, statuses and listener callbacks for one update.
    fn report(&self, writer: Guid, progress: Progress) {
        let listener = self.listener();
        if progress.lost > 0 {
            self.metrics.increment_samples_lost(progress.lost);
            let status = self.statuses.lock().sample_lost.record(progress.lost);
            log::warn!(
                "[reader] {} lost {} sample(s) from {} (total {})",
                self.guid,
                progress.lost,
                writer,
                status.total_count
            );
            if let Some(listener) = &listener {
                listener.on_sample_lost(status);
            }
        }
        if progress.delivered > 0 {
            if let Some(listener) = &listener {
                listener.on_data_available(self.guid);
            }
        }
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// NACK retries, liveliness and drain bookkeeping.
    ///
    /// Returns the writers whose association terminated and was removed.
    pub fn tick(&self, now: Instant) -> Vec<Guid> {
        let lease = self.config.liveliness_lease;
        let mut acknacks: Vec<(Route, AckNackMsg)> = Vec::new();
        let mut silent: Vec<Guid> = Vec::new();

        for proxy in self.writers.snapshot() {
            let mut proxy = proxy.lock();
            if let Some(acknack) = proxy.poll_nack(self.guid.entity_id, now) {
                acknacks.push((proxy.route(self.guid), acknack));
            }
            if proxy.check_liveliness(now, lease) {
                silent.push(proxy.remote());
                proxy.begin_shutdown(now, self.config.drain_timeout);
            }
            match proxy.try_terminate(now) {
                Some(Termination::Forced) => log::warn!(
                    "[reader] {} writer {} force-terminated with {} sequence(s) missing",
                    self.guid,
                    proxy.remote(),
                    proxy.missing()
                ),
                Some(Termination::Drained) => {
                    log::debug!("[reader] {} writer {} drained", self.guid, proxy.remote());
                }
                None => {}
            }
        }

        for (route, acknack) in acknacks {
            self.send_acknack(&route, acknack);
        }
        if !silent.is_empty() {
            self.report_liveliness(&silent);
        }
        self.writers.reap_terminated()
    }

    fn report_liveliness(&self, writers: &[Guid]) {
        let listener = self.listener();
        for writer in writers {
            let status = self.statuses.lock().liveliness_lost.record(*writer);
            log::warn!("[reader] {} liveliness lost for writer {}", self.guid, writer);
            if let Some(listener) = &listener {
                listener.on_liveliness_lost(status);
            }
        }
    }

    /// Earliest pending NACK deadline across writers.
    #[must_use]
    pub fn next_nack(&self) -> Option<Instant> {
        self.writers
            .snapshot()
            .iter()
            .filter_map(|p| p.lock().next_nack())
            .min()
    }

    /// Time a drain may still take.
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        self.config.drain_timeout
    }
}
