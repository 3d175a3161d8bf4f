// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RTPS sequence number range abstraction
//!
//! Semantic constructors for `Range<u64>` that document RTPS boundary
//! conventions. Constructors return `None` instead of panicking because the
//! bounds usually come straight off the wire.

use std::ops::Range;

/// RTPS sequence number range (exclusive boundaries `[start, end)`)
///
/// Never empty by construction. Two ranges `A` and `B` are contiguous when
/// `A.end == B.start`, which keeps gap merging free of +1/-1 arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RtpsRange {
    inner: Range<u64>,
}

impl RtpsRange {
    /// Range from exclusive boundaries `[start, end)`. `None` when empty.
    ///
    /// ```ignore
    /// let r = RtpsRange::new(10, 20).unwrap(); // [10..20)
    /// assert_eq!(r.len(), 10);
    /// ```
    pub fn new(start: u64, end: u64) -> Option<Self> {
        (start < end).then_some(Self { inner: start..end })
    }

    /// Range from inclusive boundaries `[start, end_inclusive]`.
    #[allow(clippy::range_plus_one)]
    pub fn from_inclusive(start: u64, end_inclusive: u64) -> Option<Self> {
        if start > end_inclusive || end_inclusive == u64::MAX {
            return None;
        }
        Some(Self {
            inner: start..(end_inclusive + 1),
        })
    }

    /// Single-element range `[seq, seq+1)`.
    #[allow(clippy::range_plus_one)]
    pub fn from_sequence(seq: u64) -> Self {
        let seq = seq.min(u64::MAX - 1);
        Self {
            inner: seq..(seq + 1),
        }
    }

    /// Gap between `last_seen` and the next received `next_seq`:
    /// `[last_seen+1, next_seq)`.
    pub fn from_gap(last_seen: u64, next_seq: u64) -> Option<Self> {
        Self::new(last_seen.saturating_add(1), next_seq)
    }

    /// Start of range (inclusive)
    pub fn start(&self) -> u64 {
        self.inner.start
    }

    /// End of range (exclusive)
    pub fn end(&self) -> u64 {
        self.inner.end
    }

    /// Last sequence in range (inclusive)
    pub fn last(&self) -> u64 {
        self.inner.end - 1
    }

    pub fn as_range(&self) -> &Range<u64> {
        &self.inner
    }

    pub fn into_range(self) -> Range<u64> {
        self.inner
    }

    pub fn contains(&self, seq: u64) -> bool {
        self.inner.contains(&seq)
    }

    pub fn is_single(&self) -> bool {
        self.inner.end == self.inner.start + 1
    }

    pub fn iter_sequences(&self) -> impl Iterator<Item = u64> {
        self.inner.clone()
    }

    /// Number of sequences in range
    pub fn len(&self) -> u64 {
        self.inner.end - self.inner.start
    }

    /// Always false (non-empty by construction)
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Split into consecutive chunks of at most `max_len` sequences.
    pub fn chunks(&self, max_len: u64) -> Vec<RtpsRange> {
        let max_len = max_len.max(1);
        let mut out = Vec::new();
        let mut cursor = self.inner.start;
        while cursor < self.inner.end {
            let end = cursor.saturating_add(max_len).min(self.inner.end);
            out.push(Self { inner: cursor..end });
            cursor = end;
        }
        out
    }
}

impl TryFrom<Range<u64>> for RtpsRange {
    type Error = ();

    fn try_from(range: Range<u64>) -> Result<Self, Self::Error> {
        Self::new(range.start, range.end).ok_or(())
    }
}

impl std::ops::Deref for RtpsRange {
    type Target = Range<u64>;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
