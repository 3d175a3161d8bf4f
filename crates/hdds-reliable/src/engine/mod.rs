// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound dispatch and periodic work for one participant
//!
//! # Architecture
//!
//! ```text
//! Transport receive thread
//!       v
//! Engine::on_datagram() -> RtpsMessage::decode()
//!       v
//!   DATA / HEARTBEAT / GAP -> ReaderSession (by reader id, or every
//!                             reader matched to the writer)
//!   ACKNACK                -> WriterSession (by writer id)
//!
//! Timer thread
//!       v
//! Engine::tick() -> WriterSession::tick() / ReaderSession::tick()
//!                -> TransportMux::flush_pending()
//!                -> reap drained endpoints
//! ```
//!
//! Malformed datagrams are counted and dropped; they never reach a session.

mod timer;

pub use timer::{spawn_timer, TimerHandle};

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::core::discovery::guid::{EntityId, Guid, GuidPrefix, ENTITYID_UNKNOWN};
use crate::core::discovery::DiscoveryEvent;
use crate::core::reader::ReaderSession;
use crate::core::writer::WriterSession;
use crate::reliability::{RtpsMessage, Submessage};
use crate::transport::{Locator, LocatorCacheKey, TransportMux};

// ============================================================================
// Metrics
// ============================================================================

/// Inbound datagram counters.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    datagrams_received: AtomicU64,
    submessages_routed: AtomicU64,
    malformed: AtomicU64,
    orphaned: AtomicU64,
}

/// Point-in-time copy of [`EngineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineSnapshot {
    pub datagrams_received: u64,
    pub submessages_routed: u64,
    pub malformed: u64,
    /// Submessages addressed to no local endpoint.
    pub orphaned: u64,
}

impl EngineMetrics {
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            submessages_routed: self.submessages_routed.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            orphaned: self.orphaned.load(Ordering::Relaxed),
        }
    }
}

/// Endpoints removed by one `tick`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Associations that finished draining, as (local, remote).
    pub terminated: Vec<(Guid, Guid)>,
    /// Local endpoints fully torn down.
    pub deleted: Vec<Guid>,
    /// Queued datagrams that went out.
    pub flushed: usize,
}

// ============================================================================
// Engine
// ============================================================================

/// Endpoint registry of one participant plus protocol dispatch.
pub struct Engine {
    prefix: GuidPrefix,
    writers: DashMap<EntityId, Arc<WriterSession>>,
    readers: DashMap<EntityId, Arc<ReaderSession>>,
    mux: Arc<TransportMux>,
    metrics: EngineMetrics,
}

impl Engine {
    pub fn new(prefix: GuidPrefix, mux: Arc<TransportMux>) -> Self {
        Self {
            prefix,
            writers: DashMap::new(),
            readers: DashMap::new(),
            mux,
            metrics: EngineMetrics::default(),
        }
    }

    #[must_use]
    pub fn prefix(&self) -> GuidPrefix {
        self.prefix
    }

    #[must_use]
    pub fn mux(&self) -> &Arc<TransportMux> {
        &self.mux
    }

    #[must_use]
    pub fn metrics(&self) -> EngineSnapshot {
        self.metrics.snapshot()
    }

    pub fn add_writer(&self, session: Arc<WriterSession>) {
        self.writers.insert(session.guid().entity_id, session);
    }

    pub fn add_reader(&self, session: Arc<ReaderSession>) {
        self.readers.insert(session.guid().entity_id, session);
    }

    #[must_use]
    pub fn writer(&self, entity_id: &EntityId) -> Option<Arc<WriterSession>> {
        self.writers.get(entity_id).map(|w| Arc::clone(w.value()))
    }

    #[must_use]
    pub fn reader(&self, entity_id: &EntityId) -> Option<Arc<ReaderSession>> {
        self.readers.get(entity_id).map(|r| Arc::clone(r.value()))
    }

    #[must_use]
    pub fn writer_count(&self) -> usize {
        self.writers.len()
    }

    #[must_use]
    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }

    fn writer_snapshot(&self) -> Vec<Arc<WriterSession>> {
        self.writers.iter().map(|w| Arc::clone(w.value())).collect()
    }

    fn reader_snapshot(&self) -> Vec<Arc<ReaderSession>> {
        self.readers.iter().map(|r| Arc::clone(r.value())).collect()
    }

    /// Readers a writer-originated submessage is meant for.
    fn targets(&self, reader_id: EntityId, writer: &Guid) -> Vec<Arc<ReaderSession>> {
        if reader_id == ENTITYID_UNKNOWN {
            self.reader_snapshot()
                .into_iter()
                .filter(|r| r.matched().contains(writer))
                .collect()
        } else {
            self.reader(&reader_id).into_iter().collect()
        }
    }

    // ========================================================================
    // Inbound (HOT PATH)
    // ========================================================================

    /// Decode one datagram and hand every submessage to its endpoint.
    pub fn on_datagram(&self, source: &Locator, datagram: &[u8], now: Instant) {
        self.metrics.datagrams_received.fetch_add(1, Ordering::Relaxed);
        let msg = match RtpsMessage::decode(datagram) {
            Ok(msg) => msg,
            Err(e) => {
                self.metrics.malformed.fetch_add(1, Ordering::Relaxed);
                log::debug!("[engine] dropped malformed datagram from {}: {}", source, e);
                return;
            }
        };

        let prefix = msg.guid_prefix;
        for sub in msg.submessages {
            if !self.dispatch(prefix, sub, now) {
                self.metrics.orphaned.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn dispatch(&self, prefix: GuidPrefix, sub: Submessage, now: Instant) -> bool {
        let routed = match sub {
            Submessage::Data(data) => {
                let writer = Guid::new(prefix, data.writer_id);
                let targets = self.targets(data.reader_id, &writer);
                for reader in &targets {
                    reader.on_data(writer, data.clone(), now);
                }
                !targets.is_empty()
            }
            Submessage::Heartbeat(hb) => {
                let writer = Guid::new(prefix, hb.writer_id);
                let targets = self.targets(hb.reader_id, &writer);
                for reader in &targets {
                    reader.on_heartbeat(writer, &hb, now);
                }
                !targets.is_empty()
            }
            Submessage::Gap(gap) => {
                let writer = Guid::new(prefix, gap.writer_id);
                let targets = self.targets(gap.reader_id, &writer);
                for reader in &targets {
                    reader.on_gap(writer, &gap, now);
                }
                !targets.is_empty()
            }
            Submessage::AckNack(acknack) => match self.writer(&acknack.writer_id) {
                Some(writer) => {
                    writer.on_acknack(&Guid::new(prefix, acknack.reader_id), &acknack, now);
                    true
                }
                None => false,
            },
        };
        if routed {
            self.metrics.submessages_routed.fetch_add(1, Ordering::Relaxed);
        }
        routed
    }

    // ========================================================================
    // Periodic work
    // ========================================================================

    /// Heartbeats, NACK retries, liveliness, pending sends and teardown.
    pub fn tick(&self, now: Instant) -> TickReport {
        let mut report = TickReport::default();

        for writer in self.writer_snapshot() {
            for reader in writer.tick(now) {
                self.forget_route(&reader, &writer.guid());
                report.terminated.push((writer.guid(), reader));
            }
            if writer.is_drained() {
                self.writers.remove(&writer.guid().entity_id);
                self.teardown(&writer.guid(), writer.history().clear());
                report.deleted.push(writer.guid());
            }
        }

        for reader in self.reader_snapshot() {
            for writer in reader.tick(now) {
                self.forget_route(&writer, &reader.guid());
                report.terminated.push((reader.guid(), writer));
            }
            if reader.is_drained() {
                self.readers.remove(&reader.guid().entity_id);
                self.teardown(&reader.guid(), reader.history().clear());
                report.deleted.push(reader.guid());
            }
        }

        report.flushed = self.mux.flush_pending();
        report
    }

    fn forget_route(&self, remote: &Guid, local: &Guid) {
        let cache = self.mux.locator_cache();
        for prefer_unicast in [true, false] {
            cache.invalidate_key(&LocatorCacheKey::new(*remote, *local, prefer_unicast));
        }
        self.mux.drop_pending_for(remote);
    }

    fn teardown(&self, local: &Guid, released: usize) {
        let entries = self.mux.locator_cache().invalidate(local);
        let dropped = self.mux.drop_pending_for(local);
        log::debug!(
            "[engine] endpoint {} deleted ({} samples released, {} cache entries, {} queued datagrams)",
            local,
            released,
            entries,
            dropped
        );
    }

    /// Begin draining every endpoint (participant teardown).
    pub fn begin_shutdown(&self, now: Instant) {
        for writer in self.writer_snapshot() {
            writer.begin_shutdown(now);
        }
        for reader in self.reader_snapshot() {
            reader.begin_shutdown(now);
        }
    }

    /// Locator changes invalidate the cache; removals also start draining
    /// every association with the departed identity.
    pub fn on_discovery_event(&self, event: &DiscoveryEvent, now: Instant) {
        self.mux.locator_cache().on_discovery_event(event);
        if let DiscoveryEvent::IdentityRemoved(identity) = event {
            let mut draining = 0;
            for writer in self.writer_snapshot() {
                draining += writer.on_remote_removed(identity, now);
            }
            for reader in self.reader_snapshot() {
                draining += reader.on_remote_removed(identity, now);
            }
            let dropped = self.mux.drop_pending_for(identity);
            log::debug!(
                "[engine] {} removed: {} association(s) draining, {} queued datagrams dropped",
                identity,
                draining,
                dropped
            );
        }
    }
}
