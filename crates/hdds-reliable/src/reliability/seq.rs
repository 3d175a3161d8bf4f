// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sequence number generation for Reliable QoS
//!
//! Per-writer monotonic sequence numbering for RTPS DATA submessages.
//! Sequence 0 is reserved ("none"); the first assigned number is 1.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::MAX_SEQUENCE_NUMBER;
use crate::dds::{Error, Result};

/// Sequence number generator (per-writer)
///
/// # Thread Safety
///
/// `next()` is a single compare-and-swap loop; concurrent callers always get
/// distinct, strictly increasing values.
///
/// # Exhaustion
///
/// Running past [`MAX_SEQUENCE_NUMBER`] is a fatal configuration error: the
/// generator returns [`Error::SequenceExhausted`] forever after instead of
/// wrapping.
///
/// ```ignore
/// let gen = SeqNumGenerator::new();
/// let seq1 = gen.next()?; // 1
/// let seq2 = gen.next()?; // 2
/// assert!(seq2 > seq1);
/// ```
#[derive(Debug)]
pub struct SeqNumGenerator {
    /// Next sequence number to assign
    next: AtomicU64,
}

impl SeqNumGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Generator whose first `next()` returns `first` (tests, recovery).
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first.max(1)),
        }
    }

    /// Get next sequence number (monotonically increasing)
    #[inline]
    pub fn next(&self) -> Result<u64> {
        self.next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n <= MAX_SEQUENCE_NUMBER).then(|| n + 1)
            })
            .map_err(|_| Error::SequenceExhausted)
    }

    /// Highest sequence number assigned so far (0 = none).
    #[inline]
    pub fn last_assigned(&self) -> u64 {
        self.next.load(Ordering::Acquire).saturating_sub(1)
    }
}

impl Default for SeqNumGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_seqgen_starts_at_one() {
        let gen = SeqNumGenerator::new();
        assert_eq!(gen.last_assigned(), 0);
        assert_eq!(gen.next().expect("seq"), 1);
        assert_eq!(gen.last_assigned(), 1);
    }

    #[test]
    fn test_seqgen_strictly_increasing_without_gaps() {
        let gen = SeqNumGenerator::new();
        let seqs: Vec<u64> = (0..1000).map(|_| gen.next().expect("seq")).collect();
        for pair in seqs.windows(2) {
            assert_eq!(pair[1], pair[0] + 1);
        }
    }

    #[test]
    fn test_seqgen_concurrent_unique() {
        let gen = Arc::new(SeqNumGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gen = Arc::clone(&gen);
                thread::spawn(move || {
                    (0..500)
                        .map(|_| gen.next().expect("seq"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for seq in handle.join().expect("thread") {
                assert!(all.insert(seq), "duplicate sequence {}", seq);
            }
        }
        assert_eq!(all.len(), 2000);
        assert_eq!(gen.last_assigned(), 2000);
    }

    #[test]
    fn test_seqgen_exhaustion_is_fatal() {
        let gen = SeqNumGenerator::starting_at(MAX_SEQUENCE_NUMBER);
        assert_eq!(gen.next().expect("last valid"), MAX_SEQUENCE_NUMBER);
        assert!(matches!(gen.next(), Err(Error::SequenceExhausted)));
        assert!(matches!(gen.next(), Err(Error::SequenceExhausted)));
        assert_eq!(gen.last_assigned(), MAX_SEQUENCE_NUMBER);
    }
}
