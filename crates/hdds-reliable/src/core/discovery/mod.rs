// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery collaborator interface.
//!
//! SPDP/SEDP internals live elsewhere; the reliability core only needs to ask
//! where an identity can be reached and to hear when that answer changes.

pub mod guid;

pub use guid::{EntityId, EntityKind, Guid, GuidPrefix};

use crate::transport::locator::LocatorSet;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Locator source consulted by the locator cache on a miss.
pub trait Discovery: Send + Sync {
    /// Current locators of `identity`. Empty when unknown.
    fn locators_for(&self, identity: &Guid) -> LocatorSet;
}

/// Change notification from discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// Locators of the identity changed; cached resolutions are stale.
    IdentityUpdated(Guid),
    /// Identity left the domain; its associations must be torn down.
    IdentityRemoved(Guid),
}

impl DiscoveryEvent {
    #[must_use]
    pub fn identity(&self) -> Guid {
        match self {
            DiscoveryEvent::IdentityUpdated(guid) | DiscoveryEvent::IdentityRemoved(guid) => *guid,
        }
    }
}

/// Statically configured discovery table.
///
/// Endpoint GUIDs without their own entry inherit the locators registered for
/// their participant, as in SPDP default unicast/multicast locator lists.
#[derive(Default)]
pub struct StaticDiscovery {
    table: DashMap<Guid, ArcSwap<LocatorSet>>,
    queries: AtomicU64,
}

impl StaticDiscovery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish (or replace) the locators of `identity`.
    ///
    /// Returns the event the caller should forward to the participants.
    pub fn announce(&self, identity: Guid, locators: LocatorSet) -> DiscoveryEvent {
        match self.table.get(&identity) {
            Some(slot) => slot.store(Arc::new(locators)),
            None => {
                self.table.insert(identity, ArcSwap::from_pointee(locators));
            }
        }
        log::debug!("[discovery] announce {}", identity);
        DiscoveryEvent::IdentityUpdated(identity)
    }

    /// Forget `identity`. Endpoint entries of a removed participant go too.
    pub fn remove(&self, identity: &Guid) -> DiscoveryEvent {
        if identity.is_participant() {
            self.table.retain(|guid, _| !guid.same_participant(identity));
        } else {
            self.table.remove(identity);
        }
        log::debug!("[discovery] remove {}", identity);
        DiscoveryEvent::IdentityRemoved(*identity)
    }

    /// Number of `locators_for` calls served so far.
    #[must_use]
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }
}

impl Discovery for StaticDiscovery {
    fn locators_for(&self, identity: &Guid) -> LocatorSet {
        self.queries.fetch_add(1, Ordering::Relaxed);
        if let Some(slot) = self.table.get(identity) {
            return LocatorSet::clone(&slot.load());
        }
        self.table
            .get(&Guid::participant(identity.prefix))
            .map(|slot| LocatorSet::clone(&slot.load()))
            .unwrap_or_default()
    }
}
