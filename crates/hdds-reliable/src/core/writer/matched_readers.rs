// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MatchedReaders - Thread-safe registry of the readers matched to a writer
//!
//! Each proxy sits behind its own mutex, so an ACKNACK from one reader never
//! waits on another reader's state. Callers take a [`snapshot`] before doing
//! I/O so no shard or proxy lock is held across a send.
//!
//! [`snapshot`]: MatchedReaders::snapshot

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use super::proxy::ReaderProxy;
use crate::core::discovery::guid::Guid;

/// Shared handle to one proxy.
pub type SharedReaderProxy = Arc<Mutex<ReaderProxy>>;

#[derive(Default)]
pub struct MatchedReaders {
    proxies: DashMap<Guid, SharedReaderProxy>,
}

impl MatchedReaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `proxy`. A terminated association under the same GUID is
    /// replaced; a live one is kept and false is returned.
    pub fn add(&self, proxy: ReaderProxy) -> bool {
        match self.proxies.entry(proxy.remote()) {
            Entry::Occupied(mut slot) => {
                let terminated = slot.get().lock().is_terminated();
                if !terminated {
                    return false;
                }
                slot.insert(Arc::new(Mutex::new(proxy)));
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(proxy)));
                true
            }
        }
    }

    pub fn get(&self, reader: &Guid) -> Option<SharedReaderProxy> {
        self.proxies.get(reader).map(|p| Arc::clone(p.value()))
    }

    pub fn remove(&self, reader: &Guid) -> Option<SharedReaderProxy> {
        self.proxies.remove(reader).map(|(_, p)| p)
    }

    pub fn contains(&self, reader: &Guid) -> bool {
        self.proxies.contains_key(reader)
    }

    /// All proxies, detached from the map's shard locks.
    pub fn snapshot(&self) -> Vec<SharedReaderProxy> {
        self.proxies.iter().map(|p| Arc::clone(p.value())).collect()
    }

    /// Readers belonging to `identity` (every endpoint of a participant GUID).
    pub fn matching(&self, identity: &Guid) -> Vec<Guid> {
        self.proxies
            .iter()
            .map(|p| *p.key())
            .filter(|guid| {
                if identity.is_participant() {
                    guid.same_participant(identity)
                } else {
                    guid == identity
                }
            })
            .collect()
    }

    /// Lowest acknowledgment among live reliable readers; `last_assigned`
    /// when there are none.
    pub fn min_acked(&self, last_assigned: u64) -> u64 {
        self.proxies
            .iter()
            .filter_map(|p| {
                let proxy = p.lock();
                (proxy.is_reliable() && !proxy.is_terminated()).then(|| proxy.acked())
            })
            .min()
            .unwrap_or(last_assigned)
    }

    /// Every live reader acknowledged up to `last_assigned`.
    pub fn all_acked(&self, last_assigned: u64) -> bool {
        self.proxies.iter().all(|p| {
            let proxy = p.lock();
            proxy.is_terminated() || proxy.is_acked(last_assigned)
        })
    }

    /// Remove terminated associations and return their GUIDs.
    pub fn reap_terminated(&self) -> Vec<Guid> {
        let dead: Vec<Guid> = self
            .proxies
            .iter()
            .filter(|p| p.lock().is_terminated())
            .map(|p| *p.key())
            .collect();
        for guid in &dead {
            self.proxies.remove(guid);
        }
        dead
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}
