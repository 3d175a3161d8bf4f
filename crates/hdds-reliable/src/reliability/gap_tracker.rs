// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gap detection and tracking for Reliable QoS
//!
//! Reader-side record of which sequence numbers of one writer are still
//! missing. Adjacent ranges are merged to keep memory proportional to the
//! number of holes, not the number of sequences.

use std::ops::Range;

use super::RtpsRange;

/// Gap tracker for detecting missing sequence numbers
///
/// # Algorithm
///
/// On `on_receive(seq)`:
/// 1. If `seq == last_seen + 1` -> contiguous, no gap
/// 2. If `seq > last_seen + 1` -> gap detected: `[last_seen+1..seq)`
/// 3. If `seq <= last_seen` -> fills a gap, or is a duplicate
///
/// Heartbeats extend `last_seen` without data (`announce`), and GAP
/// submessages remove ranges for good (`mark_lost`). Ranges are never dropped
/// for capacity reasons: a forgotten hole would never be NACKed again.
///
/// ```ignore
/// let mut tracker = GapTracker::new();
/// tracker.on_receive(1);
/// tracker.on_receive(5); // gap [2..5)
/// tracker.on_receive(3);
/// assert_eq!(tracker.pending_gaps(), &[2..3, 4..5]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct GapTracker {
    /// Highest sequence number seen or announced so far (0 = none)
    last_seen: u64,

    /// Sorted, merged, non-adjacent missing ranges, all `<= last_seen`
    gaps: Vec<Range<u64>>,
}

impl GapTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a received sequence number.
    ///
    /// Returns `false` for duplicates (already received or declared lost).
    pub fn on_receive(&mut self, seq: u64) -> bool {
        if seq == 0 {
            // RTPS spec: sequence numbers start at 1, ignore 0
            return false;
        }

        match seq.cmp(&(self.last_seen + 1)) {
            std::cmp::Ordering::Equal => {
                self.last_seen = seq;
                true
            }
            std::cmp::Ordering::Greater => {
                if let Some(gap) = RtpsRange::from_gap(self.last_seen, seq) {
                    self.push_merged(gap.into_range());
                }
                self.last_seen = seq;
                true
            }
            std::cmp::Ordering::Less => {
                if self.is_missing(seq) {
                    self.mark_filled(RtpsRange::from_sequence(seq));
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Writer announced sequences up to `last` (HEARTBEAT).
    ///
    /// Everything above `last_seen` becomes missing.
    pub fn announce(&mut self, last: u64) {
        if last <= self.last_seen {
            return;
        }
        if let Some(gap) = RtpsRange::from_gap(self.last_seen, last.saturating_add(1)) {
            self.push_merged(gap.into_range());
        }
        self.last_seen = last;
    }

    /// Remove `filled` from the missing ranges, splitting as needed.
    pub fn mark_filled(&mut self, filled: RtpsRange) {
        let mut updated_gaps = Vec::with_capacity(self.gaps.len() + 1);

        for gap in &self.gaps {
            if filled.end <= gap.start || filled.start >= gap.end {
                updated_gaps.push(gap.clone());
            } else {
                if gap.start < filled.start {
                    updated_gaps.push(gap.start..filled.start);
                }
                if filled.end < gap.end {
                    updated_gaps.push(filled.end..gap.end);
                }
            }
        }

        self.gaps = updated_gaps;
    }

    /// Writer declared `lost` irrecoverable (GAP, or a heartbeat whose first
    /// sequence moved past us).
    ///
    /// Returns how many of those sequences were still missing here.
    pub fn mark_lost(&mut self, lost: RtpsRange) -> u64 {
        self.announce(lost.last());
        let removed = self.missing_in(&lost);
        self.mark_filled(lost);
        removed
    }

    /// True when `seq` is known to exist but has not arrived.
    pub fn is_missing(&self, seq: u64) -> bool {
        // gaps are sorted; a linear scan stops early
        for gap in &self.gaps {
            if seq < gap.start {
                return false;
            }
            if seq < gap.end {
                return true;
            }
        }
        false
    }

    /// Lowest missing sequence.
    pub fn first_missing(&self) -> Option<u64> {
        self.gaps.first().map(|g| g.start)
    }

    /// Missing sequences in `[base, base + max_count)`, ascending.
    pub fn missing_from(&self, base: u64, max_count: u32) -> Vec<u64> {
        let limit = base.saturating_add(u64::from(max_count));
        let mut out = Vec::new();
        for gap in &self.gaps {
            if gap.end <= base {
                continue;
            }
            if gap.start >= limit {
                break;
            }
            out.extend(gap.start.max(base)..gap.end.min(limit));
        }
        out
    }

    pub fn pending_gaps(&self) -> &[Range<u64>] {
        &self.gaps
    }

    pub fn has_gaps(&self) -> bool {
        !self.gaps.is_empty()
    }

    /// Highest sequence number seen or announced.
    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }

    pub fn total_missing(&self) -> u64 {
        self.gaps.iter().map(|r| r.end - r.start).sum()
    }

    fn missing_in(&self, range: &RtpsRange) -> u64 {
        self.gaps
            .iter()
            .map(|g| {
                let start = g.start.max(range.start());
                let end = g.end.min(range.end());
                end.saturating_sub(start)
            })
            .sum()
    }

    fn push_merged(&mut self, gap: Range<u64>) {
        match self.gaps.last_mut() {
            Some(last) if last.end == gap.start => last.end = gap.end,
            _ => self.gaps.push(gap),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u64, end: u64) -> RtpsRange {
        RtpsRange::new(start, end).expect("non-empty")
    }

    #[test]
    fn test_gap_tracker_contiguous() {
        let mut tracker = GapTracker::new();

        assert!(tracker.on_receive(1));
        assert!(tracker.on_receive(2));
        assert!(tracker.on_receive(3));

        assert_eq!(tracker.last_seen(), 3);
        assert!(tracker.pending_gaps().is_empty());
        assert_eq!(tracker.total_missing(), 0);
    }

    #[test]
    fn test_gap_tracker_detect_and_fill() {
        let mut tracker = GapTracker::new();
        tracker.on_receive(1);
        tracker.on_receive(5);
        assert_eq!(tracker.pending_gaps(), &[2..5]);

        assert!(tracker.on_receive(3));
        assert_eq!(tracker.pending_gaps(), &[2..3, 4..5]);
        assert!(tracker.is_missing(2));
        assert!(!tracker.is_missing(3));
        assert_eq!(tracker.first_missing(), Some(2));
    }

    #[test]
    fn test_gap_tracker_duplicates() {
        let mut tracker = GapTracker::new();
        tracker.on_receive(1);
        tracker.on_receive(3);
        assert!(!tracker.on_receive(1));
        assert!(!tracker.on_receive(3));
        assert!(!tracker.on_receive(0));
        assert!(tracker.on_receive(2));
        assert!(!tracker.on_receive(2));
    }

    #[test]
    fn test_gap_tracker_announce_extends() {
        let mut tracker = GapTracker::new();
        tracker.on_receive(1);
        tracker.on_receive(3);
        tracker.announce(5);
        assert_eq!(tracker.pending_gaps(), &[2..3, 4..6]);
        assert_eq!(tracker.missing_from(2, 256), vec![2, 4, 5]);
        tracker.announce(4);
        assert_eq!(tracker.last_seen(), 5);
    }

    #[test]
    fn test_gap_tracker_mark_lost_counts_missing_only() {
        let mut tracker = GapTracker::new();
        tracker.on_receive(1);
        tracker.on_receive(4);
        // 2,3 missing; 4 received; 5,6 unknown until now
        let lost = tracker.mark_lost(range(2, 7));
        assert_eq!(lost, 4);
        assert!(tracker.pending_gaps().is_empty());
        assert_eq!(tracker.last_seen(), 6);
        assert!(!tracker.on_receive(5));
    }

    #[test]
    fn test_gap_tracker_missing_from_is_bounded() {
        let mut tracker = GapTracker::new();
        tracker.announce(1000);
        let missing = tracker.missing_from(1, 256);
        assert_eq!(missing.len(), 256);
        assert_eq!(missing[0], 1);
        assert_eq!(missing[255], 256);
        assert_eq!(tracker.total_missing(), 1000);
    }
}
