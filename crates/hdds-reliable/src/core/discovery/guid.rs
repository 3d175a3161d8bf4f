// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RTPS GUID (Globally Unique Identifier): the identity of every participant,
//! writer and reader in the domain.

use std::fmt;

/// GUID prefix length (participant part).
pub const GUID_PREFIX_LEN: usize = 12;
/// Entity ID length.
pub const ENTITY_ID_LEN: usize = 4;
/// Full GUID length.
pub const GUID_LEN: usize = GUID_PREFIX_LEN + ENTITY_ID_LEN;

/// 12-byte participant prefix.
pub type GuidPrefix = [u8; GUID_PREFIX_LEN];
/// 4-byte entity identifier (3 key bytes + 1 kind byte).
pub type EntityId = [u8; ENTITY_ID_LEN];

/// Entity ID of a participant (RTPS Sec.9.3.1.2).
pub const ENTITYID_PARTICIPANT: EntityId = [0x00, 0x00, 0x01, 0xC1];
/// Entity ID addressing every reader of a participant.
pub const ENTITYID_UNKNOWN: EntityId = [0x00, 0x00, 0x00, 0x00];

/// Kind of entity, decoded from the last byte of the entity ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Participant,
    WriterWithKey,
    WriterNoKey,
    ReaderWithKey,
    ReaderNoKey,
    Unknown,
}

impl EntityKind {
    /// RTPS entity-kind octet for user-defined entities.
    #[must_use]
    pub fn octet(self) -> u8 {
        match self {
            EntityKind::Participant => 0xC1,
            EntityKind::WriterWithKey => 0x02,
            EntityKind::WriterNoKey => 0x03,
            EntityKind::ReaderNoKey => 0x04,
            EntityKind::ReaderWithKey => 0x07,
            EntityKind::Unknown => 0x00,
        }
    }

    fn from_octet(octet: u8) -> Self {
        // Built-in entities set 0xC0; the low bits carry the kind.
        match octet {
            0xC1 => EntityKind::Participant,
            0x02 | 0xC2 => EntityKind::WriterWithKey,
            0x03 | 0xC3 => EntityKind::WriterNoKey,
            0x04 | 0xC4 => EntityKind::ReaderNoKey,
            0x07 | 0xC7 => EntityKind::ReaderWithKey,
            _ => EntityKind::Unknown,
        }
    }

    #[must_use]
    pub fn is_writer(self) -> bool {
        matches!(self, EntityKind::WriterWithKey | EntityKind::WriterNoKey)
    }

    #[must_use]
    pub fn is_reader(self) -> bool {
        matches!(self, EntityKind::ReaderWithKey | EntityKind::ReaderNoKey)
    }
}

/// RTPS GUID
///
/// 16-byte identifier following DDS-RTPS v2.5 Sec.8.2.4.
///
/// # Structure
/// - Prefix: 12 bytes (participant, host/vendor unique)
/// - Entity ID: 4 bytes (entity within participant, last byte = kind)
///
/// Equality, ordering and hashing are over the 16 bytes in that order, so two
/// GUIDs compare exactly like their wire encodings.
///
/// # Display Format
/// Hex with dots: "01.0f.ac.10.00.00.00.00.00.00.00.01.00.00.01.c1"
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Guid {
    pub prefix: GuidPrefix,
    pub entity_id: EntityId,
}

impl Guid {
    /// Create GUID from separate prefix and entity ID
    #[must_use]
    pub const fn new(prefix: GuidPrefix, entity_id: EntityId) -> Self {
        Self { prefix, entity_id }
    }

    /// Create GUID from raw bytes (16 bytes total)
    #[must_use]
    pub fn from_bytes(bytes: [u8; GUID_LEN]) -> Self {
        let mut prefix = [0u8; GUID_PREFIX_LEN];
        let mut entity_id = [0u8; ENTITY_ID_LEN];
        prefix.copy_from_slice(&bytes[0..GUID_PREFIX_LEN]);
        entity_id.copy_from_slice(&bytes[GUID_PREFIX_LEN..GUID_LEN]);
        Self { prefix, entity_id }
    }

    /// Participant GUID for a prefix.
    #[must_use]
    pub const fn participant(prefix: GuidPrefix) -> Self {
        Self {
            prefix,
            entity_id: ENTITYID_PARTICIPANT,
        }
    }

    /// Convert GUID to its canonical 16-byte encoding.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; GUID_LEN] {
        let mut bytes = [0u8; GUID_LEN];
        bytes[0..GUID_PREFIX_LEN].copy_from_slice(&self.prefix);
        bytes[GUID_PREFIX_LEN..GUID_LEN].copy_from_slice(&self.entity_id);
        bytes
    }

    /// GUID with all zeros (invalid/placeholder)
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            prefix: [0; GUID_PREFIX_LEN],
            entity_id: [0; ENTITY_ID_LEN],
        }
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.prefix.iter().all(|&b| b == 0) && self.entity_id.iter().all(|&b| b == 0)
    }

    /// Entity kind encoded in the last entity ID byte.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        EntityKind::from_octet(self.entity_id[ENTITY_ID_LEN - 1])
    }

    /// True when this GUID names a participant.
    #[must_use]
    pub fn is_participant(&self) -> bool {
        self.entity_id == ENTITYID_PARTICIPANT
    }

    /// True when both GUIDs belong to the same participant.
    #[must_use]
    pub fn same_participant(&self, other: &Guid) -> bool {
        self.prefix == other.prefix
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.prefix.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        for byte in &self.entity_id {
            write!(f, ".{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guid_from_bytes() {
        let bytes = [1, 15, 172, 16, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 1, 193];
        let guid = Guid::from_bytes(bytes);

        assert_eq!(guid.prefix[0], 1);
        assert_eq!(guid.prefix[1], 15);
        assert_eq!(guid.entity_id[3], 193);
        assert_eq!(guid.to_bytes(), bytes);
        assert!(guid.is_participant());
    }

    #[test]
    fn test_guid_display() {
        let guid = Guid::new([1, 15, 172, 16, 0, 0, 0, 0, 0, 0, 0, 1], [0, 0, 1, 193]);
        assert_eq!(
            guid.to_string(),
            "01.0f.ac.10.00.00.00.00.00.00.00.01.00.00.01.c1"
        );
    }

    #[test]
    fn test_guid_kind() {
        let prefix = [7u8; GUID_PREFIX_LEN];
        assert_eq!(Guid::new(prefix, [0, 0, 1, 0x02]).kind(), EntityKind::WriterWithKey);
        assert_eq!(Guid::new(prefix, [0, 0, 1, 0x07]).kind(), EntityKind::ReaderWithKey);
        assert_eq!(Guid::new(prefix, [0, 0, 1, 0xC2]).kind(), EntityKind::WriterWithKey);
        assert_eq!(Guid::participant(prefix).kind(), EntityKind::Participant);
        assert_eq!(Guid::new(prefix, [0, 0, 1, 0x55]).kind(), EntityKind::Unknown);
        assert!(EntityKind::WriterNoKey.is_writer());
        assert!(EntityKind::ReaderNoKey.is_reader());
    }

    #[test]
    fn test_guid_ordering_follows_bytes() {
        let a = Guid::new([1; 12], [0, 0, 0, 1]);
        let b = Guid::new([1; 12], [0, 0, 0, 2]);
        let c = Guid::new([2; 12], [0, 0, 0, 0]);

        assert!(a < b);
        assert!(b < c);
        assert_eq!(a.cmp(&b), a.to_bytes().cmp(&b.to_bytes()));
        assert!(a.same_participant(&b));
        assert!(!a.same_participant(&c));
    }

    #[test]
    fn test_guid_zero() {
        assert!(Guid::zero().is_zero());
        assert!(!Guid::new([1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], [0, 0, 0, 0]).is_zero());
    }
}
