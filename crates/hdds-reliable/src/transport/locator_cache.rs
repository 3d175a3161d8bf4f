// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Locator resolution cache.
//!
//! Memoizes `(remote, local, prefer_unicast) -> LocatorSet`. Hits are served
//! under a short mutex from an LRU map (bounded under churn); misses ask the
//! discovery collaborator outside the lock. Entries are replaced whole, never
//! patched, and the stored [`LocatorSet`] is shared: two hits on the same key
//! return the same allocation.
//!
//! An epoch counter bumped on every `invalidate`/`update` keeps a slow
//! discovery query that raced an invalidation from re-inserting stale data.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use super::locator::LocatorSet;
use crate::core::discovery::guid::{Guid, GUID_LEN};
use crate::core::discovery::{Discovery, DiscoveryEvent};

/// Canonical key length: remote GUID, local GUID, preference octet.
pub const LOCATOR_KEY_LEN: usize = GUID_LEN * 2 + 1;

/// Cache key with an explicit canonical byte encoding.
///
/// Equality, ordering and hashing all run over the encoded bytes, so the
/// order is total and identical across processes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocatorCacheKey {
    bytes: [u8; LOCATOR_KEY_LEN],
}

impl LocatorCacheKey {
    #[must_use]
    pub fn new(remote: Guid, local: Guid, prefer_unicast: bool) -> Self {
        let mut bytes = [0u8; LOCATOR_KEY_LEN];
        bytes[..GUID_LEN].copy_from_slice(&remote.to_bytes());
        bytes[GUID_LEN..GUID_LEN * 2].copy_from_slice(&local.to_bytes());
        bytes[GUID_LEN * 2] = u8::from(prefer_unicast);
        Self { bytes }
    }

    #[must_use]
    pub fn remote(&self) -> Guid {
        let mut raw = [0u8; GUID_LEN];
        raw.copy_from_slice(&self.bytes[..GUID_LEN]);
        Guid::from_bytes(raw)
    }

    #[must_use]
    pub fn local(&self) -> Guid {
        let mut raw = [0u8; GUID_LEN];
        raw.copy_from_slice(&self.bytes[GUID_LEN..GUID_LEN * 2]);
        Guid::from_bytes(raw)
    }

    #[must_use]
    pub fn prefer_unicast(&self) -> bool {
        self.bytes[GUID_LEN * 2] != 0
    }

    /// Same endpoint pair, other preference.
    #[must_use]
    pub fn with_preference(&self, prefer_unicast: bool) -> Self {
        let mut key = *self;
        key.bytes[GUID_LEN * 2] = u8::from(prefer_unicast);
        key
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; LOCATOR_KEY_LEN] {
        &self.bytes
    }

    fn names(&self, identity: &Guid) -> bool {
        let (remote, local) = (self.remote(), self.local());
        if identity.is_participant() {
            remote.same_participant(identity) || local.same_participant(identity)
        } else {
            remote == *identity || local == *identity
        }
    }
}

impl fmt::Debug for LocatorCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocatorCacheKey")
            .field("remote", &self.remote())
            .field("local", &self.local())
            .field("prefer_unicast", &self.prefer_unicast())
            .finish()
    }
}

/// Cached resolution plus the epoch it was stored in.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub locators: LocatorSet,
    pub epoch: u64,
}

/// Lookup counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub entries: usize,
}

/// LRU-bounded locator resolution cache.
pub struct LocatorCache {
    discovery: Arc<dyn Discovery>,
    entries: Mutex<LruCache<LocatorCacheKey, CacheEntry>>,
    epoch: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl LocatorCache {
    /// `capacity` of 0 is treated as 1.
    pub fn new(discovery: Arc<dyn Discovery>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            discovery,
            entries: Mutex::new(LruCache::new(capacity)),
            epoch: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Cached set for `key`, asking discovery on a miss.
    ///
    /// An empty answer is returned but not cached: the route is temporarily
    /// unreachable and the next call asks again.
    pub fn resolve(&self, key: &LocatorCacheKey) -> LocatorSet {
        if let Some(entry) = self.entries.lock().get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return entry.locators.clone();
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let epoch = self.epoch.load(Ordering::Acquire);
        let resolved = self
            .discovery
            .locators_for(&key.remote())
            .select(key.prefer_unicast());
        if resolved.is_empty() {
            log::trace!("[locator-cache] no locators for {}", key.remote());
            return resolved;
        }

        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(key) {
            // another thread resolved it meanwhile; share its set
            return existing.locators.clone();
        }
        if self.epoch.load(Ordering::Acquire) == epoch {
            entries.put(
                *key,
                CacheEntry {
                    locators: resolved.clone(),
                    epoch,
                },
            );
            log::trace!(
                "[locator-cache] cached {} -> {:?}",
                key.remote(),
                resolved
            );
        }
        resolved
    }

    /// Current entry without touching LRU order or asking discovery.
    #[must_use]
    pub fn peek(&self, key: &LocatorCacheKey) -> Option<CacheEntry> {
        self.entries.lock().peek(key).cloned()
    }

    /// Drop every entry naming `identity` as remote or local. A participant
    /// GUID covers all of its endpoints.
    pub fn invalidate(&self, identity: &Guid) -> usize {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let mut entries = self.entries.lock();
        let stale: Vec<LocatorCacheKey> = entries
            .iter()
            .map(|(key, _)| *key)
            .filter(|key| key.names(identity))
            .collect();
        for key in &stale {
            entries.pop(key);
        }
        drop(entries);

        if !stale.is_empty() {
            self.invalidations
                .fetch_add(stale.len() as u64, Ordering::Relaxed);
            log::debug!(
                "[locator-cache] invalidated {} entries for {}",
                stale.len(),
                identity
            );
        }
        stale.len()
    }

    /// Drop one resolution, leaving the other preference untouched.
    pub fn invalidate_key(&self, key: &LocatorCacheKey) -> bool {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let removed = self.entries.lock().pop(key).is_some();
        if removed {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Replace the entries resolving to `identity` with `locators`, each
    /// narrowed to its key's preference. Endpoint entries inheriting from a
    /// participant are invalidated and re-resolved lazily.
    pub fn update(&self, identity: &Guid, locators: &LocatorSet) -> usize {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let mut entries = self.entries.lock();

        let affected: Vec<LocatorCacheKey> = entries
            .iter()
            .map(|(key, _)| *key)
            .filter(|key| {
                let remote = key.remote();
                remote == *identity || (identity.is_participant() && remote.same_participant(identity))
            })
            .collect();

        let mut replaced = 0;
        for key in affected {
            if key.remote() == *identity && !locators.is_empty() {
                entries.put(
                    key,
                    CacheEntry {
                        locators: locators.select(key.prefer_unicast()),
                        epoch,
                    },
                );
                replaced += 1;
            } else {
                entries.pop(&key);
            }
        }
        replaced
    }

    /// Apply a discovery notification.
    pub fn on_discovery_event(&self, event: &DiscoveryEvent) -> usize {
        self.invalidate(&event.identity())
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::discovery::StaticDiscovery;
    use crate::transport::locator::Locator;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn guid(prefix: u8, entity: u8) -> Guid {
        Guid::new([prefix; 12], [0, 0, entity, 0x07])
    }

    fn udp(s: &str) -> Locator {
        Locator::udp(s.parse().expect("socket addr"))
    }

    fn hash_of(key: &LocatorCacheKey) -> u64 {
        let mut h = DefaultHasher::new();
        key.hash(&mut h);
        h.finish()
    }

    fn setup(capacity: usize) -> (Arc<StaticDiscovery>, LocatorCache) {
        let discovery = Arc::new(StaticDiscovery::new());
        let cache = LocatorCache::new(discovery.clone(), capacity);
        (discovery, cache)
    }

    #[test]
    fn test_key_encoding_roundtrip() {
        let key = LocatorCacheKey::new(guid(1, 2), guid(3, 4), true);
        assert_eq!(key.remote(), guid(1, 2));
        assert_eq!(key.local(), guid(3, 4));
        assert!(key.prefer_unicast());
        assert_eq!(key.as_bytes().len(), 33);
        assert_eq!(key.as_bytes()[32], 1);
    }

    #[test]
    fn test_key_equality_and_order() {
        let a = LocatorCacheKey::new(guid(1, 2), guid(3, 4), true);
        let b = LocatorCacheKey::new(guid(1, 2), guid(3, 4), true);
        let c = a.with_preference(false);

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(a, c);
        assert!(c < a);
        assert_eq!(a.cmp(&b), std::cmp::Ordering::Equal);
        assert_eq!(
            LocatorCacheKey::new(guid(1, 2), guid(3, 4), false),
            c
        );
    }

    #[test]
    fn test_resolve_twice_shares_set() {
        let (discovery, cache) = setup(16);
        discovery.announce(guid(1, 2), LocatorSet::new(vec![udp("10.0.0.1:7411")]));
        let key = LocatorCacheKey::new(guid(1, 2), guid(3, 4), true);

        let first = cache.resolve(&key);
        let second = cache.resolve(&key);
        assert!(LocatorSet::ptr_eq(&first, &second));
        assert_eq!(discovery.query_count(), 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_preference_resolves_independently() {
        let (discovery, cache) = setup(16);
        discovery.announce(
            guid(1, 2),
            LocatorSet::new(vec![udp("10.0.0.1:7411"), udp("239.255.0.1:7401")]),
        );
        let unicast = LocatorCacheKey::new(guid(1, 2), guid(3, 4), true);
        let multicast = unicast.with_preference(false);

        assert_eq!(cache.resolve(&unicast).as_slice(), &[udp("10.0.0.1:7411")]);
        assert_eq!(
            cache.resolve(&multicast).as_slice(),
            &[udp("239.255.0.1:7401")]
        );
        assert_eq!(discovery.query_count(), 2);

        assert!(cache.invalidate_key(&multicast));
        assert!(cache.peek(&unicast).is_some());
        assert!(cache.peek(&multicast).is_none());
    }

    #[test]
    fn test_empty_resolution_not_cached() {
        let (discovery, cache) = setup(16);
        let key = LocatorCacheKey::new(guid(1, 2), guid(3, 4), true);
        assert!(cache.resolve(&key).is_empty());
        assert!(cache.is_empty());

        discovery.announce(guid(1, 2), LocatorSet::new(vec![udp("10.0.0.1:7411")]));
        assert_eq!(cache.resolve(&key).len(), 1);
    }

    #[test]
    fn test_update_replaces_without_query() {
        let (discovery, cache) = setup(16);
        discovery.announce(guid(1, 2), LocatorSet::new(vec![udp("10.0.0.1:7411")]));
        let key = LocatorCacheKey::new(guid(1, 2), guid(3, 4), true);
        let before = cache.resolve(&key);

        let moved = LocatorSet::new(vec![udp("10.0.0.9:7411")]);
        assert_eq!(cache.update(&guid(1, 2), &moved), 1);

        let after = cache.resolve(&key);
        assert_eq!(after, moved);
        assert_ne!(before, after);
        assert_eq!(discovery.query_count(), 1);
    }

    #[test]
    fn test_participant_removal_invalidates_endpoints() {
        let (discovery, cache) = setup(16);
        let participant = Guid::participant([1; 12]);
        discovery.announce(participant, LocatorSet::new(vec![udp("10.0.0.1:7411")]));

        cache.resolve(&LocatorCacheKey::new(guid(1, 2), guid(3, 4), true));
        cache.resolve(&LocatorCacheKey::new(guid(1, 5), guid(3, 4), true));
        cache.resolve(&LocatorCacheKey::new(guid(9, 5), guid(3, 4), true));
        assert_eq!(cache.len(), 2);

        let event = discovery.remove(&participant);
        assert_eq!(cache.on_discovery_event(&event), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_bounds_memory() {
        let (discovery, cache) = setup(2);
        for entity in 1..=3u8 {
            discovery.announce(guid(1, entity), LocatorSet::new(vec![udp("10.0.0.1:7411")]));
            cache.resolve(&LocatorCacheKey::new(guid(1, entity), guid(3, 4), true));
        }
        assert_eq!(cache.len(), 2);
        assert!(cache
            .peek(&LocatorCacheKey::new(guid(1, 1), guid(3, 4), true))
            .is_none());
    }
}
