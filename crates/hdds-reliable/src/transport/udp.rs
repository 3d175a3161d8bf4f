// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP unicast transport and the receive thread shared with multicast.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::locator::{Locator, LocatorKind};
use super::{DatagramSink, Transport, TransportKind};
use crate::config::{MAX_PACKET_SIZE, RECEIVE_POLL_TIMEOUT_MS, SOCKET_BUFFER_SIZE};

/// Unicast UDP socket usable for sending and, through [`spawn_receiver`],
/// receiving.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local: SocketAddr,
    reliable: bool,
}

impl UdpTransport {
    /// Bind `addr` (port 0 picks an ephemeral port).
    ///
    /// `reliable` is the advertised capability: whether reliable
    /// associations may run over this socket.
    pub fn bind(addr: SocketAddr, reliable: bool) -> io::Result<Self> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket2 = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket2.set_reuse_address(true)?;
        if let Err(e) = socket2.set_recv_buffer_size(SOCKET_BUFFER_SIZE) {
            log::debug!("[UDP] SO_RCVBUF {} refused: {}", SOCKET_BUFFER_SIZE, e);
        }
        if let Err(e) = socket2.set_send_buffer_size(SOCKET_BUFFER_SIZE) {
            log::debug!("[UDP] SO_SNDBUF {} refused: {}", SOCKET_BUFFER_SIZE, e);
        }
        socket2.bind(&addr.into())?;

        let socket: UdpSocket = socket2.into();
        socket.set_read_timeout(Some(Duration::from_millis(RECEIVE_POLL_TIMEOUT_MS)))?;
        let local = socket.local_addr()?;
        log::debug!("[UDP] bound {} (reliable={})", local, reliable);

        Ok(Self {
            socket: Arc::new(socket),
            local,
            reliable,
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Shared handle to the socket, for [`spawn_receiver`].
    #[must_use]
    pub fn socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }

    /// Start the receive thread for this socket.
    pub fn spawn_receiver(&self, sink: Arc<dyn DatagramSink>) -> io::Result<ReceiverHandle> {
        spawn_receiver("hdds-udp-rx", self.socket(), sink)
    }
}

impl Transport for UdpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::UdpUnicast
    }

    fn locator_kind(&self) -> LocatorKind {
        if self.local.is_ipv4() {
            LocatorKind::UdpV4
        } else {
            LocatorKind::UdpV6
        }
    }

    fn can_be_reliable(&self) -> bool {
        self.reliable
    }

    fn send(&self, destination: &Locator, datagram: &[u8]) -> io::Result<()> {
        let addr = destination.to_socket_addr().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "not a UDP locator")
        })?;
        self.socket.send_to(datagram, addr)?;
        Ok(())
    }

    /// The bound address; a wildcard bind is advertised as loopback.
    fn local_locators(&self) -> Vec<Locator> {
        let mut addr = self.local;
        if addr.ip().is_unspecified() {
            let loopback = match addr.ip() {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
            };
            addr.set_ip(loopback);
        }
        vec![Locator::udp(addr)]
    }
}

// ============================================================================
// Receive thread
// ============================================================================

/// Receive thread handle. Dropping it stops and joins the thread.
pub struct ReceiverHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ReceiverHandle {
    /// Stop and join now.
    pub fn stop(mut self) {
        self.shutdown();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ReceiverHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Pump datagrams from `socket` into `sink` on a named thread.
///
/// The socket needs a read timeout so the loop can observe the stop flag;
/// one is set here if missing.
pub fn spawn_receiver(
    name: &str,
    socket: Arc<UdpSocket>,
    sink: Arc<dyn DatagramSink>,
) -> io::Result<ReceiverHandle> {
    if socket.read_timeout()?.is_none() {
        socket.set_read_timeout(Some(Duration::from_millis(RECEIVE_POLL_TIMEOUT_MS)))?;
    }
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);

    let thread = thread::Builder::new()
        .name(name.into())
        .spawn(move || receive_loop(&socket, sink.as_ref(), &stop_flag))?;

    Ok(ReceiverHandle {
        stop,
        thread: Some(thread),
    })
}

fn receive_loop(socket: &UdpSocket, sink: &dyn DatagramSink, stop: &AtomicBool) {
    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    log::debug!(
        "[UDP] receive thread started on {:?}",
        socket.local_addr().ok()
    );

    while !stop.load(Ordering::Acquire) {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) => sink.on_datagram(&Locator::udp(from), &buf[..len]),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                log::debug!("[UDP] recv_from failed: {}", e);
                thread::sleep(Duration::from_millis(RECEIVE_POLL_TIMEOUT_MS));
            }
        }
    }

    log::debug!("[UDP] receive thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::{self, Sender};
    use parking_lot::Mutex;

    struct Forward(Mutex<Sender<Vec<u8>>>);

    impl DatagramSink for Forward {
        fn on_datagram(&self, _source: &Locator, datagram: &[u8]) {
            let _ = self.0.lock().send(datagram.to_vec());
        }
    }

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().expect("addr")
    }

    #[test]
    fn test_udp_loopback_roundtrip() {
        let a = UdpTransport::bind(loopback(), true).expect("bind a");
        let b = UdpTransport::bind(loopback(), true).expect("bind b");

        let (tx, rx) = channel::unbounded();
        let receiver = b
            .spawn_receiver(Arc::new(Forward(Mutex::new(tx))))
            .expect("spawn");
        assert!(receiver.is_running());

        let dest = b.local_locators()[0];
        a.send(&dest, b"hello").expect("send");
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).expect("datagram"),
            b"hello".to_vec()
        );
        receiver.stop();
    }

    #[test]
    fn test_udp_capabilities() {
        let t = UdpTransport::bind(loopback(), false).expect("bind");
        assert_eq!(t.kind(), TransportKind::UdpUnicast);
        assert_eq!(t.locator_kind(), LocatorKind::UdpV4);
        assert!(!t.can_be_reliable());
        assert!(t.accepts(&Locator::udp("10.0.0.1:7411".parse().expect("addr"))));
        assert!(!t.accepts(&Locator::udp("239.255.0.1:7401".parse().expect("addr"))));
        assert!(!t.accepts(&Locator::in_process(3)));

        let err = t.send(&Locator::in_process(3), b"x").expect_err("not udp");
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
