// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Participant: the explicitly owned context of one reliability domain member.
//!
//! A participant owns its transports, the locator cache, the transport
//! multiplexer and every local endpoint. Nothing is process-global: two
//! participants in one process share state only through the transports and
//! discovery handle they were built with.

use arc_swap::ArcSwap;
use md5::{Digest, Md5};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use super::reader::DataReader;
use super::writer::DataWriter;
use super::{Error, Result};
use crate::config::RuntimeConfig;
use crate::core::discovery::guid::{EntityId, EntityKind, Guid, GuidPrefix, GUID_PREFIX_LEN};
use crate::core::discovery::{Discovery, DiscoveryEvent, StaticDiscovery};
use crate::core::reader::ReaderSession;
use crate::core::writer::WriterSession;
use crate::engine::{spawn_timer, Engine, EngineSnapshot, TickReport, TimerHandle};
use crate::qos::{QosProfile, Reliability};
use crate::transport::{DatagramSink, Locator, LocatorCache, Transport, TransportMux};

static PREFIX_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Builder for configuring and creating a [`Participant`].
pub struct ParticipantBuilder {
    name: String,
    transports: Vec<Arc<dyn Transport>>,
    discovery: Option<Arc<dyn Discovery>>,
    config: RuntimeConfig,
    guid_prefix: Option<GuidPrefix>,
}

impl ParticipantBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            transports: Vec::new(),
            discovery: None,
            config: RuntimeConfig::default(),
            guid_prefix: None,
        }
    }

    /// Register a transport. At least one is required.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.push(transport);
        self
    }

    /// Locator source for remote identities (default: empty [`StaticDiscovery`]).
    #[must_use]
    pub fn with_discovery(mut self, discovery: Arc<dyn Discovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    #[must_use]
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Fixed GUID prefix instead of a generated one.
    #[must_use]
    pub fn guid_prefix(mut self, prefix: GuidPrefix) -> Self {
        self.guid_prefix = Some(prefix);
        self
    }

    /// Build the participant.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when no transport is registered or the runtime
    /// configuration does not validate.
    pub fn build(self) -> Result<Arc<Participant>> {
        self.config.validate().map_err(Error::InvalidConfig)?;
        if self.transports.is_empty() {
            return Err(Error::InvalidConfig(
                "participant needs at least one transport".to_string(),
            ));
        }

        let prefix = self
            .guid_prefix
            .unwrap_or_else(|| generate_guid_prefix(&self.name));
        let discovery = self
            .discovery
            .unwrap_or_else(|| Arc::new(StaticDiscovery::new()));
        let cache = Arc::new(LocatorCache::new(
            Arc::clone(&discovery),
            self.config.locator_cache_capacity,
        ));
        let mux = Arc::new(TransportMux::new(
            self.transports,
            cache,
            self.config.pending_queue_capacity,
        ));

        let guid = Guid::participant(prefix);
        log::debug!(
            "[participant] '{}' created guid={} reliable_transport={}",
            self.name,
            guid,
            mux.supports_reliable()
        );

        Ok(Arc::new(Participant {
            name: self.name,
            guid,
            config: ArcSwap::from_pointee(self.config),
            discovery,
            engine: Arc::new(Engine::new(prefix, mux)),
            next_entity: AtomicU32::new(1),
        }))
    }
}

/// Prefix from name, process id, wall clock and a process-local counter.
fn generate_guid_prefix(name: &str) -> GuidPrefix {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    let mut hasher = Md5::new();
    hasher.update(name.as_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(nanos.to_le_bytes());
    hasher.update(PREFIX_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; GUID_PREFIX_LEN];
    prefix.copy_from_slice(&digest[..GUID_PREFIX_LEN]);
    prefix
}

/// Explicitly constructed context owning transports, caches and endpoints.
pub struct Participant {
    name: String,
    guid: Guid,
    config: ArcSwap<RuntimeConfig>,
    discovery: Arc<dyn Discovery>,
    engine: Arc<Engine>,
    next_entity: AtomicU32,
}

impl Participant {
    #[must_use]
    pub fn builder(name: &str) -> ParticipantBuilder {
        ParticipantBuilder::new(name)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn guid(&self) -> Guid {
        self.guid
    }

    /// Snapshot of the runtime configuration.
    #[must_use]
    pub fn config(&self) -> Arc<RuntimeConfig> {
        self.config.load_full()
    }

    /// Replace the runtime configuration used by endpoints created from now on.
    pub fn set_config(&self, config: RuntimeConfig) -> Result<()> {
        config.validate().map_err(Error::InvalidConfig)?;
        self.config.store(Arc::new(config));
        Ok(())
    }

    #[must_use]
    pub fn discovery(&self) -> &Arc<dyn Discovery> {
        &self.discovery
    }

    /// Locators remote participants use to reach this one.
    #[must_use]
    pub fn local_locators(&self) -> Vec<Locator> {
        self.engine.mux().local_locators()
    }

    #[must_use]
    pub fn transport_mux(&self) -> &Arc<TransportMux> {
        self.engine.mux()
    }

    #[must_use]
    pub fn engine_metrics(&self) -> EngineSnapshot {
        self.engine.metrics()
    }

    fn allocate_entity_id(&self, kind: EntityKind) -> EntityId {
        let n = self.next_entity.fetch_add(1, Ordering::Relaxed);
        let key = n.to_be_bytes();
        [key[1], key[2], key[3], kind.octet()]
    }

    fn check_transport(&self, qos: &QosProfile) -> Result<()> {
        if qos.is_reliable() && !self.engine.mux().supports_reliable() {
            log::warn!(
                "[participant] '{}' has no transport able to carry RELIABLE",
                self.name
            );
            return Err(Error::QosIncompatible);
        }
        Ok(())
    }

    // ========================================================================
    // Endpoints
    // ========================================================================

    /// Create a writer.
    ///
    /// # Errors
    ///
    /// `InvalidQos` for an invalid profile, `QosIncompatible` for RELIABLE
    /// without a transport that can carry it.
    pub fn create_writer(&self, qos: QosProfile) -> Result<DataWriter> {
        qos.validate().map_err(Error::InvalidQos)?;
        self.check_transport(&qos)?;

        let config = self.config();
        let guid = Guid::new(self.guid.prefix, self.allocate_entity_id(EntityKind::WriterWithKey));
        let session = Arc::new(WriterSession::new(
            guid,
            qos,
            &config,
            Arc::clone(self.engine.mux()),
        ));
        self.engine.add_writer(Arc::clone(&session));
        log::debug!("[participant] writer {} created", guid);
        Ok(DataWriter::new(session, config.max_payload_size))
    }

    /// Create a reader.
    ///
    /// # Errors
    ///
    /// Same as [`create_writer`](Self::create_writer).
    pub fn create_reader(&self, qos: QosProfile) -> Result<DataReader> {
        qos.validate().map_err(Error::InvalidQos)?;
        self.check_transport(&qos)?;

        let config = self.config();
        let guid = Guid::new(self.guid.prefix, self.allocate_entity_id(EntityKind::ReaderWithKey));
        let session = Arc::new(ReaderSession::new(
            guid,
            qos,
            &config,
            Arc::clone(self.engine.mux()),
        ));
        self.engine.add_reader(Arc::clone(&session));
        log::debug!("[participant] reader {} created", guid);
        Ok(DataReader::new(session))
    }

    /// Start draining `writer`; it is removed by a later `tick` once every
    /// association drained or `drain_timeout` expired.
    pub fn delete_writer(&self, writer: DataWriter) {
        writer.session().begin_shutdown(Instant::now());
    }

    pub fn delete_reader(&self, reader: DataReader) {
        reader.session().begin_shutdown(Instant::now());
    }

    // ========================================================================
    // Matching
    // ========================================================================

    /// Associate a local writer with a remote reader requesting `requested`.
    ///
    /// # Errors
    ///
    /// `QosIncompatible` when the reader requests RELIABLE from a BEST_EFFORT
    /// writer, `InvalidState` when the writer is being deleted or the reader
    /// is already matched.
    pub fn match_remote_reader(
        &self,
        writer: &DataWriter,
        remote_reader: Guid,
        requested: Reliability,
    ) -> Result<()> {
        let session = writer.session();
        if !Reliability::is_compatible(session.qos().reliability, requested) {
            return Err(Error::QosIncompatible);
        }
        if session.is_closing() {
            return Err(Error::InvalidState("writer is being deleted".to_string()));
        }
        let prefer_unicast = self.config.load().prefer_unicast;
        let reliable = requested == Reliability::Reliable;
        if session.match_reader(remote_reader, reliable, prefer_unicast, Instant::now()) {
            Ok(())
        } else {
            Err(Error::InvalidState(format!("reader {} already matched", remote_reader)))
        }
    }

    /// Associate a local reader with a remote writer offering `offered`.
    ///
    /// # Errors
    ///
    /// As [`match_remote_reader`](Self::match_remote_reader).
    pub fn match_remote_writer(
        &self,
        reader: &DataReader,
        remote_writer: Guid,
        offered: Reliability,
    ) -> Result<()> {
        let session = reader.session();
        if !Reliability::is_compatible(offered, session.qos().reliability) {
            return Err(Error::QosIncompatible);
        }
        let prefer_unicast = self.config.load().prefer_unicast;
        let reliable = offered == Reliability::Reliable;
        if session.match_writer(remote_writer, reliable, prefer_unicast, Instant::now()) {
            Ok(())
        } else if session.is_closing() {
            Err(Error::InvalidState("reader is being deleted".to_string()))
        } else {
            Err(Error::InvalidState(format!("writer {} already matched", remote_writer)))
        }
    }

    /// Move the association to SHUTTING_DOWN. False when not matched.
    pub fn unmatch_remote_reader(&self, writer: &DataWriter, remote_reader: &Guid) -> bool {
        writer.session().unmatch_reader(remote_reader, Instant::now())
    }

    pub fn unmatch_remote_writer(&self, reader: &DataReader, remote_writer: &Guid) -> bool {
        reader.session().unmatch_writer(remote_writer, Instant::now())
    }

    // ========================================================================
    // Driving
    // ========================================================================

    /// Forward a discovery change (locator update or departure).
    pub fn on_discovery_event(&self, event: &DiscoveryEvent) {
        self.engine.on_discovery_event(event, Instant::now());
    }

    /// Run one round of periodic work at `now`.
    pub fn tick(&self, now: Instant) -> TickReport {
        self.engine.tick(now)
    }

    /// Spawn the timer thread calling [`tick`](Self::tick) every
    /// `tick_interval`. Dropping the handle stops it.
    pub fn start(&self) -> Result<TimerHandle> {
        let engine = Arc::clone(&self.engine);
        let interval = self.config.load().tick_interval;
        let handle = spawn_timer("hdds-timer", interval, move |now| {
            engine.tick(now);
        })?;
        Ok(handle)
    }

    /// Begin draining every endpoint.
    pub fn shutdown(&self) {
        log::debug!("[participant] '{}' shutting down", self.name);
        self.engine.begin_shutdown(Instant::now());
    }

    #[must_use]
    pub fn writer_count(&self) -> usize {
        self.engine.writer_count()
    }

    #[must_use]
    pub fn reader_count(&self) -> usize {
        self.engine.reader_count()
    }
}

impl DatagramSink for Participant {
    fn on_datagram(&self, source: &Locator, datagram: &[u8]) {
        self.engine.on_datagram(source, datagram, Instant::now());
    }
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant")
            .field("name", &self.name)
            .field("guid", &self.guid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::IntraNetwork;

    fn participant(reliable: bool) -> Arc<Participant> {
        let net = IntraNetwork::new();
        Participant::builder("test")
            .with_transport(Arc::new(net.attach(reliable)))
            .build()
            .expect("participant")
    }

    #[test]
    fn test_build_requires_transport() {
        let err = Participant::builder("empty").build().expect_err("no transport");
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_generated_prefixes_differ() {
        assert_ne!(generate_guid_prefix("a"), generate_guid_prefix("a"));
    }

    #[test]
    fn test_entity_ids_carry_kind() {
        let p = participant(true);
        let w = p.create_writer(QosProfile::reliable()).expect("writer");
        let r = p.create_reader(QosProfile::reliable()).expect("reader");
        assert_eq!(w.guid().kind(), EntityKind::WriterWithKey);
        assert_eq!(r.guid().kind(), EntityKind::ReaderWithKey);
        assert_eq!(w.guid().prefix, p.guid().prefix);
        assert_ne!(&w.guid().entity_id[..3], &r.guid().entity_id[..3]);
        assert_eq!(p.writer_count(), 1);
        assert_eq!(p.reader_count(), 1);
    }

    #[test]
    fn test_reliable_rejected_without_reliable_transport() {
        let p = participant(false);
        assert!(matches!(
            p.create_writer(QosProfile::reliable()),
            Err(Error::QosIncompatible)
        ));
        assert_eq!(p.writer_count(), 0);
        assert!(p.create_writer(QosProfile::best_effort()).is_ok());
    }

    #[test]
    fn test_invalid_qos_rejected() {
        let p = participant(true);
        let err = p
            .create_reader(QosProfile::reliable().keep_last(0))
            .expect_err("depth 0");
        assert!(matches!(err, Error::InvalidQos(_)));
        assert_eq!(p.reader_count(), 0);
    }

    #[test]
    fn test_match_compatibility() {
        let p = participant(true);
        let writer = p.create_writer(QosProfile::best_effort()).expect("writer");
        let remote = Guid::new([7; 12], [0, 0, 1, 0x07]);
        assert!(matches!(
            p.match_remote_reader(&writer, remote, Reliability::Reliable),
            Err(Error::QosIncompatible)
        ));
        p.match_remote_reader(&writer, remote, Reliability::BestEffort)
            .expect("best effort match");
        assert!(p
            .match_remote_reader(&writer, remote, Reliability::BestEffort)
            .is_err());
        assert!(p.unmatch_remote_reader(&writer, &remote));
    }

    #[test]
    fn test_delete_writer_removed_on_tick() {
        let p = participant(true);
        let writer = p.create_writer(QosProfile::reliable()).expect("writer");
        let guid = writer.guid();
        p.delete_writer(writer);
        let report = p.tick(Instant::now());
        assert_eq!(report.deleted, vec![guid]);
        assert_eq!(p.writer_count(), 0);
    }
}
