// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDPv4 multicast transport: one socket joined to one group.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use super::locator::{Locator, LocatorKind};
use super::udp::{spawn_receiver, ReceiverHandle};
use super::{DatagramSink, Transport, TransportKind};
use crate::config::{DATA_MULTICAST_PORT_DOMAIN0, MULTICAST_IP, RECEIVE_POLL_TIMEOUT_MS};

/// Socket bound to `group:port` with group membership on `iface`.
pub struct MulticastTransport {
    socket: Arc<UdpSocket>,
    group: SocketAddrV4,
    iface: Ipv4Addr,
    reliable: bool,
}

impl MulticastTransport {
    /// Join `group` on `iface` (`UNSPECIFIED` lets the kernel choose) and
    /// bind its port with address reuse so several participants on one host
    /// can share it.
    pub fn join(group: SocketAddrV4, iface: Ipv4Addr, reliable: bool) -> io::Result<Self> {
        if !group.ip().is_multicast() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a multicast group address",
            ));
        }

        let socket2 = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket2.set_reuse_address(true)?;
        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, group.port()));
        socket2.bind(&bind_addr.into())?;

        let socket: UdpSocket = socket2.into();
        match socket.join_multicast_v4(group.ip(), &iface) {
            Ok(()) => log::debug!("[UDP] join_multicast_v4({}) on {}", group.ip(), iface),
            Err(e) => {
                log::debug!("[UDP] join_multicast_v4({}) on {} failed: {}", group.ip(), iface, e);
                return Err(e);
            }
        }
        socket.set_multicast_loop_v4(true)?;
        let _ = socket.set_multicast_ttl_v4(1);
        socket.set_read_timeout(Some(Duration::from_millis(RECEIVE_POLL_TIMEOUT_MS)))?;

        Ok(Self {
            socket: Arc::new(socket),
            group,
            iface,
            reliable,
        })
    }

    /// Default user-data group (239.255.0.1:7401), best-effort.
    pub fn default_group() -> io::Result<Self> {
        let [a, b, c, d] = MULTICAST_IP;
        Self::join(
            SocketAddrV4::new(Ipv4Addr::new(a, b, c, d), DATA_MULTICAST_PORT_DOMAIN0),
            Ipv4Addr::UNSPECIFIED,
            false,
        )
    }

    #[must_use]
    pub fn group(&self) -> SocketAddrV4 {
        self.group
    }

    #[must_use]
    pub fn interface(&self) -> Ipv4Addr {
        self.iface
    }

    pub fn spawn_receiver(&self, sink: Arc<dyn DatagramSink>) -> io::Result<ReceiverHandle> {
        spawn_receiver("hdds-mcast-rx", Arc::clone(&self.socket), sink)
    }
}

impl Drop for MulticastTransport {
    fn drop(&mut self) {
        let _ = self.socket.leave_multicast_v4(self.group.ip(), &self.iface);
    }
}

impl Transport for MulticastTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::UdpMulticast
    }

    fn locator_kind(&self) -> LocatorKind {
        LocatorKind::UdpV4
    }

    fn can_be_reliable(&self) -> bool {
        self.reliable
    }

    /// Only multicast destinations.
    fn accepts(&self, locator: &Locator) -> bool {
        locator.kind == LocatorKind::UdpV4 && locator.is_multicast()
    }

    fn send(&self, destination: &Locator, datagram: &[u8]) -> io::Result<()> {
        let addr = destination
            .to_socket_addr()
            .filter(|addr| addr.ip().is_multicast())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "not a multicast locator"))?;
        self.socket.send_to(datagram, addr)?;
        Ok(())
    }

    fn local_locators(&self) -> Vec<Locator> {
        vec![Locator::udp(SocketAddr::V4(self.group))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unicast_group() {
        let err = MulticastTransport::join(
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 7401),
            Ipv4Addr::UNSPECIFIED,
            false,
        )
        .err()
        .map(|e| e.kind());
        assert_eq!(err, Some(io::ErrorKind::InvalidInput));
    }

    #[test]
    fn test_accepts_only_multicast_locators() {
        // Joining may be refused in sandboxed environments; only check
        // locator filtering when it succeeds.
        let group = SocketAddrV4::new(Ipv4Addr::new(239, 255, 0, 77), 0);
        let Ok(transport) = MulticastTransport::join(group, Ipv4Addr::UNSPECIFIED, false) else {
            return;
        };
        assert_eq!(transport.kind(), TransportKind::UdpMulticast);
        assert!(transport.accepts(&Locator::udp("239.255.0.77:7401".parse().expect("addr"))));
        assert!(!transport.accepts(&Locator::udp("10.0.0.1:7401".parse().expect("addr"))));
        assert_eq!(transport.local_locators().len(), 1);
    }
}
