// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport layer
//!
//! Every transport exposes the same capability set (`kind`, `locator_kind`,
//! `can_be_reliable`, `send`); the [`TransportMux`] picks one per destination
//! locator and never needs to know which concrete variant it holds.
//!
//! | Variant | Locators | Notes |
//! |---------|----------|-------|
//! | [`UdpTransport`] | unicast UDPv4/v6 | socket2-built, receive thread via [`spawn_receiver`] |
//! | [`MulticastTransport`] | multicast UDPv4 | joins one group |
//! | [`IntraProcessTransport`] | in-process | crossbeam channel hub, optional loss filter |

pub mod intra;
pub mod locator;
pub mod locator_cache;
pub mod multicast;
pub mod mux;
pub mod udp;

use std::fmt;
use std::io;

pub use intra::{DropFilter, IntraNetwork, IntraProcessTransport};
pub use locator::{Locator, LocatorKind, LocatorSet};
pub use locator_cache::{CacheEntry, CacheStats, LocatorCache, LocatorCacheKey};
pub use multicast::MulticastTransport;
pub use mux::{MuxStats, Route, SendOutcome, TransportMux};
pub use udp::{spawn_receiver, ReceiverHandle, UdpTransport};

/// Concrete transport variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    UdpUnicast,
    UdpMulticast,
    IntraProcess,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::UdpUnicast => "udp",
            TransportKind::UdpMulticast => "udp-multicast",
            TransportKind::IntraProcess => "intra-process",
        };
        f.write_str(name)
    }
}

/// Capability set of one transport.
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Locator family this transport reaches.
    fn locator_kind(&self) -> LocatorKind;

    /// Whether reliable associations may run over it.
    fn can_be_reliable(&self) -> bool;

    /// Whether `locator` is reachable through this transport.
    fn accepts(&self, locator: &Locator) -> bool {
        locator.kind == self.locator_kind() && !locator.is_multicast()
    }

    /// Send one datagram. `ErrorKind::WouldBlock` is transient.
    fn send(&self, destination: &Locator, datagram: &[u8]) -> io::Result<()>;

    /// Locators remote participants use to reach this transport.
    fn local_locators(&self) -> Vec<Locator>;
}

/// Inbound datagram consumer (implemented by `Participant`).
pub trait DatagramSink: Send + Sync {
    fn on_datagram(&self, source: &Locator, datagram: &[u8]);
}
