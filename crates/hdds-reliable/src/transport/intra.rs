// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process transport.
//!
//! An [`IntraNetwork`] is a hub of crossbeam channels, one inbox per attached
//! transport, addressed by `Locator::in_process(port)`. It stands in for the
//! shared-memory class of transports and is what the integration tests run
//! two participants over. An optional drop filter simulates a lossy link.

use std::io;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use dashmap::DashMap;
use parking_lot::RwLock;

use super::locator::{Locator, LocatorKind};
use super::{DatagramSink, Transport, TransportKind};

/// Loss predicate: return true to drop `datagram` on its way to `destination`.
pub type DropFilter = Box<dyn Fn(&Locator, &[u8]) -> bool + Send + Sync>;

type Datagram = (Locator, Vec<u8>);

/// Channel hub connecting in-process transports.
pub struct IntraNetwork {
    inboxes: DashMap<u32, Sender<Datagram>>,
    next_port: AtomicU32,
    filter: RwLock<Option<DropFilter>>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl IntraNetwork {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inboxes: DashMap::new(),
            next_port: AtomicU32::new(1),
            filter: RwLock::new(None),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    /// New transport with its own inbox. `reliable` sets the advertised
    /// capability.
    pub fn attach(self: &Arc<Self>, reliable: bool) -> IntraProcessTransport {
        let port = self.next_port.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = channel::unbounded();
        self.inboxes.insert(port, tx);
        log::debug!("[intra] attached port {} (reliable={})", port, reliable);
        IntraProcessTransport {
            network: Arc::clone(self),
            locator: Locator::in_process(port),
            inbox: rx,
            reliable,
        }
    }

    /// Install a loss filter, replacing any previous one.
    pub fn set_drop_filter<F>(&self, filter: F)
    where
        F: Fn(&Locator, &[u8]) -> bool + Send + Sync + 'static,
    {
        *self.filter.write() = Some(Box::new(filter));
    }

    pub fn clear_drop_filter(&self) {
        *self.filter.write() = None;
    }

    /// Datagrams discarded by the filter so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    fn route(&self, source: Locator, destination: &Locator, datagram: &[u8]) -> io::Result<()> {
        if destination.kind != LocatorKind::InProcess {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not an in-process locator",
            ));
        }
        if let Some(filter) = self.filter.read().as_ref() {
            if filter(destination, datagram) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::trace!("[intra] filter dropped {} bytes to {}", datagram.len(), destination);
                return Ok(());
            }
        }

        let sender = self
            .inboxes
            .get(&destination.port)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no such in-process port"))?;
        sender
            .send((source, datagram.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::NotConnected, "in-process port closed"))?;
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn detach(&self, port: u32) {
        self.inboxes.remove(&port);
        log::debug!("[intra] detached port {}", port);
    }
}

/// One endpoint of an [`IntraNetwork`].
///
/// Inbound datagrams wait in the inbox until [`drain_into`](Self::drain_into)
/// or [`recv_timeout`](Self::recv_timeout) picks them up.
pub struct IntraProcessTransport {
    network: Arc<IntraNetwork>,
    locator: Locator,
    inbox: Receiver<Datagram>,
    reliable: bool,
}

impl IntraProcessTransport {
    #[must_use]
    pub fn locator(&self) -> Locator {
        self.locator
    }

    /// Hand every queued datagram to `sink`. Returns how many.
    pub fn drain_into(&self, sink: &dyn DatagramSink) -> usize {
        let mut count = 0;
        while let Ok((source, datagram)) = self.inbox.try_recv() {
            sink.on_datagram(&source, &datagram);
            count += 1;
        }
        count
    }

    /// Wait up to `timeout` for one datagram.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<(Locator, Vec<u8>)> {
        self.inbox.recv_timeout(timeout).ok()
    }

    /// Datagrams waiting in the inbox.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }
}

impl Transport for IntraProcessTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::IntraProcess
    }

    fn locator_kind(&self) -> LocatorKind {
        LocatorKind::InProcess
    }

    fn can_be_reliable(&self) -> bool {
        self.reliable
    }

    fn send(&self, destination: &Locator, datagram: &[u8]) -> io::Result<()> {
        self.network.route(self.locator, destination, datagram)
    }

    fn local_locators(&self) -> Vec<Locator> {
        vec![self.locator]
    }
}

impl Drop for IntraProcessTransport {
    fn drop(&mut self) {
        self.network.detach(self.locator.port);
    }
}
