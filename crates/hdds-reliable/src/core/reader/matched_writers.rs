// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MatchedWriters - registry of the writers matched to a reader
//!
//! Same shape as the writer-side registry: one mutex per association so the
//! receive thread handling writer A never waits on writer B.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use super::proxy::WriterProxy;
use crate::core::discovery::guid::Guid;

pub type SharedWriterProxy = Arc<Mutex<WriterProxy>>;

#[derive(Default)]
pub struct MatchedWriters {
    proxies: DashMap<Guid, SharedWriterProxy>,
}

impl MatchedWriters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `proxy` unless a live association with that writer exists.
    pub fn add(&self, proxy: WriterProxy) -> bool {
        match self.proxies.entry(proxy.remote()) {
            Entry::Occupied(mut slot) => {
                if !slot.get().lock().is_terminated() {
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

    pub fn get(&self, writer: &Guid) -> Option<SharedWriterProxy> {
        self.proxies.get(writer).map(|p| Arc::clone(p.value()))
    }

    pub fn contains(&self, writer: &Guid) -> bool {
        self.proxies.contains_key(writer)
    }

    pub fn snapshot(&self) -> Vec<SharedWriterProxy> {
        self.proxies.iter().map(|p| Arc::clone(p.value())).collect()
    }

    /// Writers belonging to `identity`.
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
