// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Samples, instance handles and change kinds.

use crate::core::discovery::guid::Guid;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Instance identifier (RTPS KeyHash, Sec.9.6.4.8).
///
/// Keys of at most 16 bytes are used verbatim, zero padded; longer keys are
/// replaced by their MD5 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct InstanceHandle([u8; 16]);

impl InstanceHandle {
    /// Single instance of an unkeyed topic.
    pub const NIL: InstanceHandle = InstanceHandle([0u8; 16]);

    #[must_use]
    pub fn from_key(key: &[u8]) -> Self {
        let mut bytes = [0u8; 16];
        if key.len() <= 16 {
            bytes[..key.len()].copy_from_slice(key);
        } else {
            use md5::{Digest, Md5};
            let mut hasher = Md5::new();
            hasher.update(key);
            bytes.copy_from_slice(&hasher.finalize());
        }
        Self(bytes)
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0 == [0u8; 16]
    }
}

impl fmt::Debug for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceHandle(")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

/// Disposition carried by a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChangeKind {
    #[default]
    Alive,
    Disposed,
    Unregistered,
}

impl ChangeKind {
    /// Status-info style wire code.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            ChangeKind::Alive => 0,
            ChangeKind::Disposed => 1,
            ChangeKind::Unregistered => 2,
        }
    }

    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ChangeKind::Alive),
            1 => Some(ChangeKind::Disposed),
            2 => Some(ChangeKind::Unregistered),
            _ => None,
        }
    }
}

/// One change in a writer's stream.
///
/// `seq` is 0 until the writer's history cache assigns one.
#[derive(Clone, PartialEq, Eq)]
pub struct Sample {
    pub writer: Guid,
    pub seq: u64,
    pub instance: InstanceHandle,
    pub kind: ChangeKind,
    pub timestamp_ns: u64,
    pub payload: Arc<[u8]>,
}

impl Sample {
    /// Unsequenced ALIVE sample stamped with the current time.
    #[must_use]
    pub fn new(writer: Guid, instance: InstanceHandle, payload: &[u8]) -> Self {
        Self {
            writer,
            seq: 0,
            instance,
            kind: ChangeKind::Alive,
            timestamp_ns: current_time_ns(),
            payload: Arc::from(payload),
        }
    }

    /// Unsequenced disposition change with an empty payload.
    #[must_use]
    pub fn lifecycle(writer: Guid, instance: InstanceHandle, kind: ChangeKind) -> Self {
        Self {
            kind,
            ..Self::new(writer, instance, &[])
        }
    }

    #[must_use]
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl fmt::Debug for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sample")
            .field("writer", &self.writer)
            .field("seq", &self.seq)
            .field("instance", &self.instance)
            .field("kind", &self.kind)
            .field("len", &self.payload.len())
            .finish()
    }
}

/// Nanoseconds since the Unix epoch.
#[must_use]
pub fn current_time_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_key_is_padded() {
        let handle = InstanceHandle::from_key(&[1, 2, 3]);
        assert_eq!(&handle.as_bytes()[..4], &[1, 2, 3, 0]);
        assert!(!handle.is_nil());
        assert!(InstanceHandle::from_key(&[]).is_nil());
    }

    #[test]
    fn test_long_key_is_hashed() {
        let key = [7u8; 40];
        let a = InstanceHandle::from_key(&key);
        let b = InstanceHandle::from_key(&key);
        let mut other = key;
        other[39] = 8;
        assert_eq!(a, b);
        assert_ne!(a, InstanceHandle::from_key(&other));
    }

    #[test]
    fn test_change_kind_codes() {
        for kind in [ChangeKind::Alive, ChangeKind::Disposed, ChangeKind::Unregistered] {
            assert_eq!(ChangeKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ChangeKind::from_code(9), None);
    }

    #[test]
    fn test_lifecycle_sample_has_no_payload() {
        let writer = Guid::new([1; 12], [0, 0, 1, 0x02]);
        let sample = Sample::lifecycle(writer, InstanceHandle::NIL, ChangeKind::Disposed);
        assert!(sample.is_empty());
        assert_eq!(sample.seq, 0);
        assert_eq!(sample.with_seq(4).seq, 4);
    }
}
