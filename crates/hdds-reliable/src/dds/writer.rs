// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DataWriter: application handle on a [`WriterSession`].

use std::sync::Arc;

use super::{Error, Result};
use crate::core::discovery::Guid;
use crate::core::sample::{ChangeKind, InstanceHandle, Sample};
use crate::core::writer::WriterSession;
use crate::qos::QosProfile;
use crate::reliability::MetricsSnapshot;

/// Writes samples and instance lifecycle changes.
///
/// Every operation goes through the same history cache and reliable session,
/// so a dispose is sequenced, retained and repaired like any other sample.
pub struct DataWriter {
    session: Arc<WriterSession>,
    max_payload_size: usize,
}

impl DataWriter {
    pub(crate) fn new(session: Arc<WriterSession>, max_payload_size: usize) -> Self {
        Self {
            session,
            max_payload_size,
        }
    }

    pub(crate) fn session(&self) -> &Arc<WriterSession> {
        &self.session
    }

    #[must_use]
    pub fn guid(&self) -> Guid {
        self.session.guid()
    }

    #[must_use]
    pub fn qos(&self) -> &QosProfile {
        self.session.qos()
    }

    /// Write `payload` for the instance keyed by `key`.
    ///
    /// Returns the assigned sequence number.
    ///
    /// # Errors
    ///
    /// - `PayloadTooLarge` (REJECTED) above `max_payload_size`
    /// - `Timeout` (TIMEOUT) when the history stayed full for `max_blocking_time`
    /// - `SequenceExhausted` / `InvalidState` (ERROR)
    pub fn write(&self, key: &[u8], payload: &[u8]) -> Result<u64> {
        if payload.len() > self.max_payload_size {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload_size,
            });
        }
        let instance = InstanceHandle::from_key(key);
        self.session.write(Sample::new(self.guid(), instance, payload))
    }

    /// Announce an instance with an empty ALIVE sample.
    pub fn register_instance(&self, key: &[u8]) -> Result<InstanceHandle> {
        let instance = InstanceHandle::from_key(key);
        self.session
            .write(Sample::lifecycle(self.guid(), instance, ChangeKind::Alive))?;
        Ok(instance)
    }

    /// Mark the instance disposed.
    ///
    /// # Errors
    ///
    /// `Rejected` when the instance was never written or registered.
    pub fn dispose_instance(&self, key: &[u8]) -> Result<u64> {
        self.lifecycle(key, ChangeKind::Disposed)
    }

    /// Withdraw this writer from the instance.
    pub fn unregister_instance(&self, key: &[u8]) -> Result<u64> {
        self.lifecycle(key, ChangeKind::Unregistered)
    }

    fn lifecycle(&self, key: &[u8], kind: ChangeKind) -> Result<u64> {
        let instance = InstanceHandle::from_key(key);
        let history = self.session.history();
        if history.instance_state(&instance).is_none() {
            return Err(Error::Rejected(format!("unknown instance {:?}", instance)));
        }
        let seq = self
            .session
            .write(Sample::lifecycle(self.guid(), instance, kind))?;
        history.evict_policy(&instance);
        Ok(seq)
    }

    /// Latest disposition of an instance, `None` once retired.
    #[must_use]
    pub fn instance_state(&self, key: &[u8]) -> Option<ChangeKind> {
        self.session
            .history()
            .instance_state(&InstanceHandle::from_key(key))
    }

    /// Highest sequence number assigned so far.
    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.session.history().last_assigned()
    }

    /// Samples still retained for retransmission.
    #[must_use]
    pub fn retained(&self) -> usize {
        self.session.history().len()
    }

    #[must_use]
    pub fn matched_readers(&self) -> usize {
        self.session.matched().len()
    }

    /// True when every reliable reader acknowledged everything written.
    #[must_use]
    pub fn is_acknowledged(&self) -> bool {
        self.session
            .matched()
            .all_acked(self.session.history().last_assigned())
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.session.metrics().snapshot()
    }
}

impl std::fmt::Debug for DataWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataWriter")
            .field("guid", &self.guid())
            .field("qos", self.qos())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dds::Participant;
    use crate::transport::IntraNetwork;
    use crate::WriteErrorKind;

    fn writer(qos: QosProfile) -> (Arc<Participant>, DataWriter) {
        let net = IntraNetwork::new();
        let participant = Participant::builder("writer-test")
            .with_transport(Arc::new(net.attach(true)))
            .build()
            .expect("participant");
        let writer = participant.create_writer(qos).expect("writer");
        (participant, writer)
    }

    #[test]
    fn test_sequence_numbers_strictly_increase() {
        let (_p, writer) = writer(QosProfile::reliable().keep_all());
        let seqs: Vec<u64> = (0..20)
            .map(|i| writer.write(b"k", &[i as u8]).expect("write"))
            .collect();
        assert_eq!(seqs, (1..=20).collect::<Vec<u64>>());
        assert_eq!(writer.last_sequence(), 20);
    }

    #[test]
    fn test_payload_too_large_rejected() {
        let (_p, writer) = writer(QosProfile::reliable());
        let payload = vec![0u8; crate::config::MAX_PAYLOAD_SIZE + 1];
        let err = writer.write(b"k", &payload).expect_err("too large");
        assert_eq!(err.kind(), WriteErrorKind::Rejected);
        assert_eq!(writer.last_sequence(), 0);
    }

    #[test]
    fn test_dispose_unknown_instance_rejected() {
        let (_p, writer) = writer(QosProfile::reliable());
        let err = writer.dispose_instance(b"ghost").expect_err("unknown");
        assert_eq!(err.kind(), WriteErrorKind::Rejected);
        assert!(writer.unregister_instance(b"ghost").is_err());
    }

    #[test]
    fn test_instance_lifecycle_is_sequenced() {
        let (_p, writer) = writer(QosProfile::reliable().keep_last(4));
        let handle = writer.register_instance(b"sensor").expect("register");
        assert_eq!(handle, InstanceHandle::from_key(b"sensor"));
        writer.write(b"sensor", b"1").expect("write");
        let seq = writer.dispose_instance(b"sensor").expect("dispose");
        assert_eq!(seq, 3);
        assert_eq!(writer.instance_state(b"sensor"), Some(ChangeKind::Disposed));
        let seq = writer.unregister_instance(b"sensor").expect("unregister");
        assert_eq!(seq, 4);
        assert_eq!(writer.instance_state(b"sensor"), Some(ChangeKind::Unregistered));
    }

    #[test]
    fn test_write_after_delete_fails() {
        let (participant, writer) = writer(QosProfile::reliable());
        writer.session().begin_shutdown(std::time::Instant::now());
        let err = writer.write(b"k", b"v").expect_err("closing");
        assert_eq!(err.kind(), WriteErrorKind::Error);
        participant.delete_writer(writer);
    }
}
