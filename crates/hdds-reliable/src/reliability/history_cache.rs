// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! History cache for writer-side retransmission and reader-side delivery
//!
//! Samples are stored in a sharded map keyed by `(writer, seq)` so `get` of
//! one sample never waits on the insertion of another. Ordering, per-instance
//! bookkeeping and quota live in a single index behind a mutex; eviction
//! removes from the map while that mutex is held, so a concurrent `get`
//! observes the sample either fully present or gone.
//!
//! Retention follows QoS:
//! - KEEP_LAST(N): inserting the (N+1)th sample of an instance evicts that
//!   instance's oldest sample, acknowledged or not
//! - KEEP_ALL: nothing is evicted; a full cache blocks the writer for up to
//!   `max_blocking_time`, then fails with [`Error::Timeout`]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use super::SeqNumGenerator;
use crate::core::discovery::Guid;
use crate::core::sample::{ChangeKind, InstanceHandle, Sample};
use crate::dds::{Error, Result};
use crate::qos::{History, QosProfile, ResourceLimits};

pub use crate::qos::LENGTH_UNLIMITED;

/// Storage key of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleKey {
    pub writer: Guid,
    pub seq: u64,
}

/// Index record of one stored sample.
#[derive(Debug, Clone, Copy)]
pub struct CacheEntry {
    pub key: SampleKey,
    pub instance: InstanceHandle,
    pub len: usize,
}

#[derive(Debug)]
struct InstanceRecord {
    /// Slots of this instance's samples, oldest first.
    slots: VecDeque<u64>,
    state: ChangeKind,
}

#[derive(Debug, Default)]
struct Index {
    /// Arrival slot -> entry. Slot order is insertion order, which is
    /// sequence order for any one writer.
    order: BTreeMap<u64, CacheEntry>,
    slots: HashMap<SampleKey, u64>,
    instances: HashMap<InstanceHandle, InstanceRecord>,
    next_slot: u64,
    quota_bytes: usize,
}

/// Per-endpoint sample store governed by History and ResourceLimits.
pub struct HistoryCache {
    history: History,
    limits: ResourceLimits,
    max_blocking_time: Duration,
    samples: DashMap<SampleKey, Arc<Sample>>,
    index: Mutex<Index>,
    space: Condvar,
    seq: SeqNumGenerator,
}

impl HistoryCache {
    /// Cache configured from an endpoint QoS.
    #[must_use]
    pub fn new(qos: &QosProfile) -> Self {
        Self::with_limits(qos.history, qos.resource_limits, qos.max_blocking_time)
    }

    #[must_use]
    pub fn with_limits(
        history: History,
        limits: ResourceLimits,
        max_blocking_time: Duration,
    ) -> Self {
        Self {
            history,
            limits,
            max_blocking_time,
            samples: DashMap::new(),
            index: Mutex::new(Index::default()),
            space: Condvar::new(),
            seq: SeqNumGenerator::new(),
        }
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    /// Assign the next sequence number to `sample` and store it.
    ///
    /// Blocks up to `max_blocking_time` while resource limits leave no room.
    pub fn insert(&self, sample: Sample) -> Result<u64> {
        // None: the bound is past what Instant can represent, wait without one
        let deadline = Instant::now().checked_add(self.max_blocking_time);
        let mut index = self.index.lock();

        loop {
            if let Some(victims) = self.admit(&index, &sample.instance, sample.len()) {
                let seq = self.seq.next()?;
                self.evict_oldest(&mut index, &sample.instance, victims);
                Self::store(&self.samples, &mut index, Arc::new(sample.with_seq(seq)));
                return Ok(seq);
            }

            let Some(deadline) = deadline else {
                self.space.wait(&mut index);
                continue;
            };
            if Instant::now() >= deadline {
                log::debug!(
                    "[history] insert timed out after {:?} ({} samples, {} bytes)",
                    self.max_blocking_time,
                    index.order.len(),
                    index.quota_bytes
                );
                return Err(Error::Timeout);
            }

            self.space.wait_until(&mut index, deadline);
        }
    }

    /// Like [`insert`](Self::insert) but fails with [`Error::WouldBlock`]
    /// instead of waiting.
    pub fn try_insert(&self, sample: Sample) -> Result<u64> {
        let mut index = self.index.lock();
        let victims = self
            .admit(&index, &sample.instance, sample.len())
            .ok_or(Error::WouldBlock)?;
        let seq = self.seq.next()?;
        self.evict_oldest(&mut index, &sample.instance, victims);
        Self::store(&self.samples, &mut index, Arc::new(sample.with_seq(seq)));
        Ok(seq)
    }

    /// Store a sample that already carries its writer's sequence number
    /// (reader side). Never blocks.
    pub fn try_insert_received(&self, sample: Arc<Sample>) -> Result<()> {
        let mut index = self.index.lock();
        let key = SampleKey {
            writer: sample.writer,
            seq: sample.seq,
        };
        if index.slots.contains_key(&key) {
            return Ok(());
        }
        let victims = self
            .admit(&index, &sample.instance, sample.len())
            .ok_or(Error::WouldBlock)?;
        self.evict_oldest(&mut index, &sample.instance, victims);
        Self::store(&self.samples, &mut index, sample);
        Ok(())
    }

    /// Number of same-instance samples to evict to admit a new one, or `None`
    /// when limits leave no room.
    fn admit(&self, index: &Index, instance: &InstanceHandle, len: usize) -> Option<usize> {
        let record = index.instances.get(instance);
        let in_instance = record.map_or(0, |r| r.slots.len());

        if record.is_none() && index.instances.len() >= self.limits.max_instances {
            return None;
        }

        let victims = match self.history {
            History::KeepLast(depth) => {
                let cap = (depth as usize).min(self.limits.max_samples_per_instance);
                (in_instance + 1).saturating_sub(cap)
            }
            History::KeepAll => {
                if in_instance >= self.limits.max_samples_per_instance {
                    return None;
                }
                0
            }
        };

        let freed_bytes: usize = record.map_or(0, |r| {
            r.slots
                .iter()
                .take(victims)
                .filter_map(|slot| index.order.get(slot))
                .map(|e| e.len)
                .sum()
        });

        let samples_after = index.order.len() - victims.min(index.order.len()) + 1;
        if samples_after > self.limits.max_samples {
            return None;
        }
        let bytes_after = (index.quota_bytes - freed_bytes).saturating_add(len);
        if bytes_after > self.limits.max_quota_bytes {
            return None;
        }

        Some(victims)
    }

    fn evict_oldest(&self, index: &mut Index, instance: &InstanceHandle, count: usize) {
        for _ in 0..count {
            let slot = match index.instances.get_mut(instance).and_then(|r| r.slots.pop_front()) {
                Some(slot) => slot,
                None => break,
            };
            if let Some(entry) = index.order.remove(&slot) {
                index.slots.remove(&entry.key);
                index.quota_bytes -= entry.len;
                self.samples.remove(&entry.key);
                log::trace!("[history] KEEP_LAST evicted seq={}", entry.key.seq);
            }
        }
    }

    fn store(samples: &DashMap<SampleKey, Arc<Sample>>, index: &mut Index, sample: Arc<Sample>) {
        let key = SampleKey {
            writer: sample.writer,
            seq: sample.seq,
        };
        let slot = index.next_slot;
        index.next_slot += 1;

        index.order.insert(
            slot,
            CacheEntry {
                key,
                instance: sample.instance,
                len: sample.len(),
            },
        );
        index.slots.insert(key, slot);
        index.quota_bytes += sample.len();

        let record = index
            .instances
            .entry(sample.instance)
            .or_insert_with(|| InstanceRecord {
                slots: VecDeque::new(),
                state: ChangeKind::Alive,
            });
        record.slots.push_back(slot);
        record.state = sample.kind;

        samples.insert(key, sample);
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Sample `seq` of `writer`, or `None` once evicted or acknowledged away.
    #[must_use]
    pub fn get(&self, writer: &Guid, seq: u64) -> Option<Arc<Sample>> {
        self.samples
            .get(&SampleKey {
                writer: *writer,
                seq,
            })
            .map(|s| Arc::clone(s.value()))
    }

    /// Lowest retained sequence of `writer`.
    #[must_use]
    pub fn oldest_seq(&self, writer: &Guid) -> Option<u64> {
        let index = self.index.lock();
        index
            .order
            .values()
            .find(|e| e.key.writer == *writer)
            .map(|e| e.key.seq)
    }

    /// Highest retained sequence of `writer`.
    #[must_use]
    pub fn newest_seq(&self, writer: &Guid) -> Option<u64> {
        let index = self.index.lock();
        index
            .order
            .values()
            .rev()
            .find(|e| e.key.writer == *writer)
            .map(|e| e.key.seq)
    }

    /// Highest sequence number handed out by [`insert`](Self::insert).
    #[must_use]
    pub fn last_assigned(&self) -> u64 {
        self.seq.last_assigned()
    }

    /// Retained samples of one instance, oldest first.
    #[must_use]
    pub fn instance_samples(&self, instance: &InstanceHandle) -> Vec<Arc<Sample>> {
        let index = self.index.lock();
        let Some(record) = index.instances.get(instance) else {
            return Vec::new();
        };
        record
            .slots
            .iter()
            .filter_map(|slot| index.order.get(slot))
            .filter_map(|e| self.samples.get(&e.key).map(|s| Arc::clone(s.value())))
            .collect()
    }

    /// Latest disposition of a known instance.
    #[must_use]
    pub fn instance_state(&self, instance: &InstanceHandle) -> Option<ChangeKind> {
        self.index.lock().instances.get(instance).map(|r| r.state)
    }

    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.index.lock().instances.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.lock().order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.lock().order.is_empty()
    }

    /// Payload bytes currently retained.
    #[must_use]
    pub fn quota_bytes(&self) -> usize {
        self.index.lock().quota_bytes
    }

    #[must_use]
    pub fn history_kind(&self) -> History {
        self.history
    }

    #[must_use]
    pub fn max_blocking_time(&self) -> Duration {
        self.max_blocking_time
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Apply retention to one instance: trim to the KEEP_LAST depth and drop
    /// the instance record once it is disposed/unregistered with no samples.
    ///
    /// Returns true when the record was dropped.
    pub fn evict_policy(&self, instance: &InstanceHandle) -> bool {
        let mut index = self.index.lock();
        if let History::KeepLast(depth) = self.history {
            let excess = index
                .instances
                .get(instance)
                .map_or(0, |r| r.slots.len().saturating_sub(depth as usize));
            if excess > 0 {
                self.evict_oldest(&mut index, instance, excess);
                self.space.notify_all();
            }
        }
        Self::drop_if_retired(&mut index, instance)
    }

    fn drop_if_retired(index: &mut Index, instance: &InstanceHandle) -> bool {
        let retired = index
            .instances
            .get(instance)
            .is_some_and(|r| r.slots.is_empty() && r.state != ChangeKind::Alive);
        if retired {
            index.instances.remove(instance);
            log::trace!("[history] instance {:?} retired", instance);
        }
        retired
    }

    fn remove_slot(&self, index: &mut Index, slot: u64) -> Option<Arc<Sample>> {
        let entry = index.order.remove(&slot)?;
        index.slots.remove(&entry.key);
        index.quota_bytes -= entry.len;
        if let Some(record) = index.instances.get_mut(&entry.instance) {
            record.slots.retain(|s| *s != slot);
        }
        Self::drop_if_retired(index, &entry.instance);
        self.samples.remove(&entry.key).map(|(_, sample)| sample)
    }

    /// Drop samples of `writer` up to and including `up_to` (acknowledged by
    /// every reliable reader). Wakes blocked writers.
    pub fn remove_acknowledged(&self, writer: &Guid, up_to: u64) -> usize {
        let mut index = self.index.lock();
        let victims: Vec<u64> = index
            .order
            .iter()
            .filter(|(_, e)| e.key.writer == *writer)
            .take_while(|(_, e)| e.key.seq <= up_to)
            .map(|(slot, _)| *slot)
            .collect();

        for slot in &victims {
            self.remove_slot(&mut index, *slot);
        }
        if !victims.is_empty() {
            self.space.notify_all();
        }
        victims.len()
    }

    /// Remove and return the oldest sample (reader-side take).
    pub fn pop_front(&self) -> Option<Arc<Sample>> {
        let mut index = self.index.lock();
        let slot = *index.order.keys().next()?;
        let sample = self.remove_slot(&mut index, slot);
        self.space.notify_all();
        sample
    }

    /// Drop everything (endpoint teardown). Returns the number of samples.
    pub fn clear(&self) -> usize {
        let mut index = self.index.lock();
        let count = index.order.len();
        index.order.clear();
        index.slots.clear();
        index.instances.clear();
        index.quota_bytes = 0;
        self.samples.clear();
        self.space.notify_all();
        count
    }
}

impl std::fmt::Debug for HistoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryCache")
            .field("history", &self.history)
            .field("len", &self.len())
            .field("last_assigned", &self.last_assigned())
            .finish()
    }
}
