// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport multiplexer.
//!
//! Turns an association route into datagrams on the wire:
//!
//! ```text
//! Route --LocatorCache--> LocatorSet --transport_for--> Transport::send
//!                             |
//!                             +-- empty / unusable: reliable -> pending queue
//!                                                   best-effort -> dropped
//! ```
//!
//! Nothing here holds a lock across `Transport::send`.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::locator::Locator;
use super::locator_cache::{LocatorCache, LocatorCacheKey};
use super::Transport;
use crate::core::discovery::guid::Guid;

/// Addressing of one association, seen from the local endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Route {
    pub remote: Guid,
    pub local: Guid,
    /// Negotiated reliability of the association.
    pub reliable: bool,
    pub prefer_unicast: bool,
}

impl Route {
    #[must_use]
    pub fn new(remote: Guid, local: Guid, reliable: bool, prefer_unicast: bool) -> Self {
        Self {
            remote,
            local,
            reliable,
            prefer_unicast,
        }
    }

    #[must_use]
    pub fn cache_key(&self) -> LocatorCacheKey {
        LocatorCacheKey::new(self.remote, self.local, self.prefer_unicast)
    }

    fn names(&self, identity: &Guid) -> bool {
        if identity.is_participant() {
            self.remote.same_participant(identity) || self.local.same_participant(identity)
        } else {
            self.remote == *identity || self.local == *identity
        }
    }
}

/// Result of [`TransportMux::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to this many locators.
    Sent(usize),
    /// Route unreachable for now; retried by `flush_pending`.
    Queued,
    /// Best-effort and unreachable.
    Dropped,
}

/// Counters of one multiplexer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MuxStats {
    pub datagrams_sent: u64,
    pub queued: u64,
    pub dropped: u64,
    pub send_errors: u64,
}

struct PendingSend {
    route: Route,
    datagram: Vec<u8>,
}

/// Picks a transport per destination locator and sends.
pub struct TransportMux {
    transports: Vec<Arc<dyn Transport>>,
    cache: Arc<LocatorCache>,
    pending: Mutex<VecDeque<PendingSend>>,
    pending_capacity: usize,
    datagrams_sent: AtomicU64,
    queued: AtomicU64,
    dropped: AtomicU64,
    send_errors: AtomicU64,
}

impl TransportMux {
    pub fn new(
        transports: Vec<Arc<dyn Transport>>,
        cache: Arc<LocatorCache>,
        pending_capacity: usize,
    ) -> Self {
        Self {
            transports,
            cache,
            pending: Mutex::new(VecDeque::new()),
            pending_capacity: pending_capacity.max(1),
            datagrams_sent: AtomicU64::new(0),
            queued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
        }
    }

    /// Whether any registered transport can carry a reliable association.
    #[must_use]
    pub fn supports_reliable(&self) -> bool {
        self.transports.iter().any(|t| t.can_be_reliable())
    }

    /// First transport reaching `locator` with the required capability.
    #[must_use]
    pub fn transport_for(&self, locator: &Locator, reliable: bool) -> Option<&Arc<dyn Transport>> {
        self.transports
            .iter()
            .find(|t| t.accepts(locator) && (!reliable || t.can_be_reliable()))
    }

    #[must_use]
    pub fn transports(&self) -> &[Arc<dyn Transport>] {
        &self.transports
    }

    /// Locators the local participant can be reached at.
    #[must_use]
    pub fn local_locators(&self) -> Vec<Locator> {
        self.transports
            .iter()
            .flat_map(|t| t.local_locators())
            .collect()
    }

    #[must_use]
    pub fn locator_cache(&self) -> &Arc<LocatorCache> {
        &self.cache
    }

    /// Send one datagram along `route`.
    pub fn send(&self, route: &Route, datagram: &[u8]) -> SendOutcome {
        let sent = self.deliver(route, datagram);
        if sent > 0 {
            return SendOutcome::Sent(sent);
        }

        if route.reliable {
            self.enqueue(PendingSend {
                route: *route,
                datagram: datagram.to_vec(),
            });
            SendOutcome::Queued
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            log::trace!("[mux] {} unreachable, best-effort datagram dropped", route.remote);
            SendOutcome::Dropped
        }
    }

    /// Retry queued reliable sends. Returns how many went out.
    pub fn flush_pending(&self) -> usize {
        let batch: Vec<PendingSend> = {
            let mut pending = self.pending.lock();
            if pending.is_empty() {
                return 0;
            }
            pending.drain(..).collect()
        };

        let mut flushed = 0;
        let mut retry = VecDeque::new();
        for item in batch {
            if self.deliver(&item.route, &item.datagram) > 0 {
                flushed += 1;
            } else {
                retry.push_back(item);
            }
        }

        if !retry.is_empty() {
            let mut pending = self.pending.lock();
            // older items go back in front of anything queued meanwhile
            while let Some(item) = retry.pop_back() {
                pending.push_front(item);
            }
            while pending.len() > self.pending_capacity {
                pending.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        if flushed > 0 {
            log::debug!("[mux] flushed {} queued datagrams", flushed);
        }
        flushed
    }

    /// Forget queued sends naming `identity` (teardown).
    pub fn drop_pending_for(&self, identity: &Guid) -> usize {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|item| !item.route.names(identity));
        before - pending.len()
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    #[must_use]
    pub fn stats(&self) -> MuxStats {
        MuxStats {
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
        }
    }

    fn enqueue(&self, item: PendingSend) {
        let remote = item.route.remote;
        let mut pending = self.pending.lock();
        if pending.len() >= self.pending_capacity {
            pending.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
            log::warn!(
                "[mux] pending queue full ({}), dropped oldest datagram",
                self.pending_capacity
            );
        }
        pending.push_back(item);
        drop(pending);

        self.queued.fetch_add(1, Ordering::Relaxed);
        log::debug!("[mux] {} unreachable, datagram queued", remote);
    }

    /// Resolve and send, trying the other addressing mode when the preferred
    /// one has no usable transport. Returns the number of locators reached.
    fn deliver(&self, route: &Route, datagram: &[u8]) -> usize {
        for prefer_unicast in [route.prefer_unicast, !route.prefer_unicast] {
            let key = LocatorCacheKey::new(route.remote, route.local, prefer_unicast);
            let locators = self.cache.resolve(&key);

            let mut usable = false;
            let mut sent = 0;
            for locator in locators.iter() {
                let Some(transport) = self.transport_for(locator, route.reliable) else {
                    continue;
                };
                usable = true;
                match transport.send(locator, datagram) {
                    Ok(()) => sent += 1,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        log::trace!("[mux] send to {} would block", locator);
                    }
                    Err(e) => {
                        self.send_errors.fetch_add(1, Ordering::Relaxed);
                        log::debug!("[mux] send to {} via {} failed: {}", locator, transport.kind(), e);
                    }
                }
            }

            if sent > 0 {
                self.datagrams_sent.fetch_add(sent as u64, Ordering::Relaxed);
                return sent;
            }
            if usable {
                return 0;
            }
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::discovery::StaticDiscovery;
    use crate::transport::locator::{LocatorKind, LocatorSet};
    use crate::transport::TransportKind;

    struct Recording {
        reliable: bool,
        fail: Option<io::ErrorKind>,
        sent: Mutex<Vec<(Locator, Vec<u8>)>>,
    }

    impl Recording {
        fn new(reliable: bool) -> Arc<Self> {
            Arc::new(Self {
                reliable,
                fail: None,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    impl Transport for Recording {
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
            if let Some(kind) = self.fail {
                return Err(io::Error::from(kind));
            }
            self.sent.lock().push((*destination, datagram.to_vec()));
            Ok(())
        }

        fn local_locators(&self) -> Vec<Locator> {
            vec![Locator::in_process(1)]
        }
    }

    fn remote() -> Guid {
        Guid::new([1; 12], [0, 0, 1, 0x07])
    }

    fn local() -> Guid {
        Guid::new([2; 12], [0, 0, 1, 0x02])
    }

    fn mux_with(
        transport: Arc<dyn Transport>,
        capacity: usize,
    ) -> (Arc<StaticDiscovery>, TransportMux) {
        let discovery = Arc::new(StaticDiscovery::new());
        let cache = Arc::new(LocatorCache::new(discovery.clone(), 16));
        (discovery, TransportMux::new(vec![transport], cache, capacity))
    }

    #[test]
    fn test_send_resolves_and_delivers() {
        let transport = Recording::new(true);
        let (discovery, mux) = mux_with(transport.clone(), 8);
        discovery.announce(remote(), LocatorSet::new(vec![Locator::in_process(7)]));

        let route = Route::new(remote(), local(), true, true);
        assert_eq!(mux.send(&route, b"abc"), SendOutcome::Sent(1));
        assert_eq!(transport.sent.lock()[0], (Locator::in_process(7), b"abc".to_vec()));
        assert_eq!(mux.stats().datagrams_sent, 1);
    }

    #[test]
    fn test_reliable_unresolved_is_queued_then_flushed() {
        let transport = Recording::new(true);
        let (discovery, mux) = mux_with(transport.clone(), 8);
        let route = Route::new(remote(), local(), true, true);

        assert_eq!(mux.send(&route, b"late"), SendOutcome::Queued);
        assert_eq!(mux.pending_len(), 1);
        assert_eq!(mux.flush_pending(), 0);
        assert_eq!(mux.pending_len(), 1);

        discovery.announce(remote(), LocatorSet::new(vec![Locator::in_process(7)]));
        assert_eq!(mux.flush_pending(), 1);
        assert_eq!(mux.pending_len(), 0);
        assert_eq!(transport.sent.lock().len(), 1);
    }

    #[test]
    fn test_best_effort_unresolved_is_dropped() {
        let (_discovery, mux) = mux_with(Recording::new(true), 8);
        let route = Route::new(remote(), local(), false, true);
        assert_eq!(mux.send(&route, b"x"), SendOutcome::Dropped);
        assert_eq!(mux.pending_len(), 0);
        assert_eq!(mux.stats().dropped, 1);
    }

    #[test]
    fn test_pending_queue_drops_oldest() {
        let (_discovery, mux) = mux_with(Recording::new(true), 2);
        let route = Route::new(remote(), local(), true, true);
        for _ in 0..3 {
            assert_eq!(mux.send(&route, b"x"), SendOutcome::Queued);
        }
        assert_eq!(mux.pending_len(), 2);
        assert_eq!(mux.stats().dropped, 1);

        assert_eq!(mux.drop_pending_for(&Guid::participant([1; 12])), 2);
        assert_eq!(mux.pending_len(), 0);
    }

    #[test]
    fn test_reliable_route_needs_reliable_transport() {
        let transport = Recording::new(false);
        let (discovery, mux) = mux_with(transport.clone(), 8);
        discovery.announce(remote(), LocatorSet::new(vec![Locator::in_process(7)]));
        assert!(!mux.supports_reliable());
        assert!(mux.transport_for(&Locator::in_process(7), true).is_none());
        assert!(mux.transport_for(&Locator::in_process(7), false).is_some());

        let best_effort = Route::new(remote(), local(), false, true);
        assert_eq!(mux.send(&best_effort, b"x"), SendOutcome::Sent(1));
        let reliable = Route::new(remote(), local(), true, true);
        assert_eq!(mux.send(&reliable, b"x"), SendOutcome::Queued);
    }

    #[test]
    fn test_would_block_is_transient() {
        let transport = Arc::new(Recording {
            reliable: true,
            fail: Some(io::ErrorKind::WouldBlock),
            sent: Mutex::new(Vec::new()),
        });
        let (discovery, mux) = mux_with(transport, 8);
        discovery.announce(remote(), LocatorSet::new(vec![Locator::in_process(7)]));

        let route = Route::new(remote(), local(), true, true);
        assert_eq!(mux.send(&route, b"x"), SendOutcome::Queued);
        assert_eq!(mux.stats().send_errors, 0);
    }
}
