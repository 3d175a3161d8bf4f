// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RTPS locators (Sec.8.3.3.1 Locator_t) and immutable locator sets.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

/// Transport family a locator belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LocatorKind {
    /// LOCATOR_KIND_UDPv4
    UdpV4,
    /// LOCATOR_KIND_UDPv6
    UdpV6,
    /// Vendor-specific in-process (shared-memory class) channel.
    InProcess,
}

impl LocatorKind {
    /// Wire code (RTPS Sec.9.3.2.4, vendor range for in-process).
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            LocatorKind::UdpV4 => 1,
            LocatorKind::UdpV6 => 2,
            LocatorKind::InProcess => 0x0100_0000,
        }
    }

    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(LocatorKind::UdpV4),
            2 => Some(LocatorKind::UdpV6),
            0x0100_0000 => Some(LocatorKind::InProcess),
            _ => None,
        }
    }

    /// Whether sockets of this kind are UDP.
    #[must_use]
    pub fn is_udp(self) -> bool {
        matches!(self, LocatorKind::UdpV4 | LocatorKind::UdpV6)
    }
}

/// Network address at which an endpoint can be reached.
///
/// IPv4 addresses occupy the last four bytes of `address`, as on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locator {
    pub kind: LocatorKind,
    pub port: u32,
    pub address: [u8; 16],
}

impl Locator {
    /// Locator for a UDP socket address.
    #[must_use]
    pub fn udp(addr: SocketAddr) -> Self {
        let mut address = [0u8; 16];
        let kind = match addr.ip() {
            IpAddr::V4(v4) => {
                address[12..16].copy_from_slice(&v4.octets());
                LocatorKind::UdpV4
            }
            IpAddr::V6(v6) => {
                address = v6.octets();
                LocatorKind::UdpV6
            }
        };
        Self {
            kind,
            port: u32::from(addr.port()),
            address,
        }
    }

    /// Locator for an in-process channel identified by `port`.
    #[must_use]
    pub fn in_process(port: u32) -> Self {
        Self {
            kind: LocatorKind::InProcess,
            port,
            address: [0u8; 16],
        }
    }

    /// Socket address for UDP locators, `None` otherwise.
    #[must_use]
    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        let port = u16::try_from(self.port).ok()?;
        match self.kind {
            LocatorKind::UdpV4 => {
                let ip = Ipv4Addr::new(
                    self.address[12],
                    self.address[13],
                    self.address[14],
                    self.address[15],
                );
                Some(SocketAddr::new(IpAddr::V4(ip), port))
            }
            LocatorKind::UdpV6 => Some(SocketAddr::new(
                IpAddr::V6(Ipv6Addr::from(self.address)),
                port,
            )),
            LocatorKind::InProcess => None,
        }
    }

    /// True for IP multicast group addresses.
    #[must_use]
    pub fn is_multicast(&self) -> bool {
        self.to_socket_addr()
            .map(|addr| addr.ip().is_multicast())
            .unwrap_or(false)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_socket_addr() {
            Some(addr) => write!(f, "udp://{}", addr),
            None => write!(f, "inproc://{}", self.port),
        }
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Locator({})", self)
    }
}

/// Immutable set of locators for one remote identity.
///
/// Cloning shares the underlying allocation, so a set handed out by the
/// locator cache is never modified behind a reader's back.
#[derive(Clone)]
pub struct LocatorSet {
    inner: Arc<[Locator]>,
}

impl LocatorSet {
    #[must_use]
    pub fn new(mut locators: Vec<Locator>) -> Self {
        locators.sort_unstable();
        locators.dedup();
        Self {
            inner: Arc::from(locators),
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Locator> {
        self.inner.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Locator] {
        &self.inner
    }

    /// True when both handles share the same allocation.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Narrow to the preferred addressing mode.
    ///
    /// With `prefer_unicast` the unicast locators are returned, falling back to
    /// multicast when the remote advertised none; the reverse otherwise.
    #[must_use]
    pub fn select(&self, prefer_unicast: bool) -> Self {
        let (multicast, unicast): (Vec<Locator>, Vec<Locator>) =
            self.inner.iter().partition(|loc| loc.is_multicast());
        let (first, second) = if prefer_unicast {
            (unicast, multicast)
        } else {
            (multicast, unicast)
        };
        if first.is_empty() {
            Self::new(second)
        } else {
            Self::new(first)
        }
    }
}

impl Default for LocatorSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for LocatorSet {
    fn eq(&self, other: &Self) -> bool {
        self.inner[..] == other.inner[..]
    }
}

impl Eq for LocatorSet {}

impl fmt::Debug for LocatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.iter()).finish()
    }
}

impl From<Vec<Locator>> for LocatorSet {
    fn from(locators: Vec<Locator>) -> Self {
        Self::new(locators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn udp(s: &str) -> Locator {
        Locator::udp(s.parse().expect("valid socket addr"))
    }

    #[test]
    fn test_udp_v4_roundtrip() {
        let loc = udp("192.168.1.10:7411");
        assert_eq!(loc.kind, LocatorKind::UdpV4);
        assert_eq!(loc.port, 7411);
        assert_eq!(&loc.address[12..], &[192, 168, 1, 10]);
        assert_eq!(
            loc.to_socket_addr(),
            Some("192.168.1.10:7411".parse().expect("valid"))
        );
        assert!(!loc.is_multicast());
    }

    #[test]
    fn test_multicast_detection() {
        assert!(udp("239.255.0.1:7401").is_multicast());
        assert!(!Locator::in_process(3).is_multicast());
        assert_eq!(Locator::in_process(3).to_socket_addr(), None);
    }

    #[test]
    fn test_kind_codes() {
        for kind in [LocatorKind::UdpV4, LocatorKind::UdpV6, LocatorKind::InProcess] {
            assert_eq!(LocatorKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(LocatorKind::from_code(99), None);
    }

    #[test]
    fn test_set_dedup_and_equality() {
        let a = LocatorSet::new(vec![udp("10.0.0.1:1"), udp("10.0.0.1:1"), udp("10.0.0.2:1")]);
        let b = LocatorSet::new(vec![udp("10.0.0.2:1"), udp("10.0.0.1:1")]);
        assert_eq!(a.len(), 2);
        assert_eq!(a, b);
        assert!(!LocatorSet::ptr_eq(&a, &b));
        assert!(LocatorSet::ptr_eq(&a, &a.clone()));
    }

    #[test]
    fn test_select_preference() {
        let set = LocatorSet::new(vec![udp("10.0.0.1:7411"), udp("239.255.0.1:7401")]);

        let uni = set.select(true);
        assert_eq!(uni.as_slice(), &[udp("10.0.0.1:7411")]);

        let multi = set.select(false);
        assert_eq!(multi.as_slice(), &[udp("239.255.0.1:7401")]);

        let only_unicast = LocatorSet::new(vec![udp("10.0.0.1:7411")]);
        assert_eq!(only_unicast.select(false), only_unicast);
        assert!(LocatorSet::empty().select(true).is_empty());
    }
}
