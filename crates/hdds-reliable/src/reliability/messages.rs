// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RTPS reliability protocol messages
//!
//! Compact RTPS-shaped framing for the four submessages the reliable session
//! exchanges:
//! - DATA (0x15): one sample, sequence number, key hash and change kind
//! - HEARTBEAT (0x07): writer announces `[first, last]`, FINAL = no reply needed
//! - ACKNACK (0x06): reader acknowledges `< base` and NACKs the bitmap
//! - GAP (0x08): writer declares sequences irrelevant (evicted or not owed)
//!
//! ```text
//! 0               4       6       8                              20
//! +---------------+-------+-------+------------------------------+
//! |  'R' 'T' 'P' 'S'  | ver 2.5 | vendor |      GUID prefix (12)      |
//! +---------------+-------+-------+------------------------------+
//! | id | flags | length (u16) | body ...                          |
//! ```
//!
//! Bodies are little-endian when the E flag is set; both byte orders decode.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use super::RtpsRange;
use crate::config::{MAX_SEQUENCE_NUMBER, MAX_SEQ_SET_BITS};
use crate::core::discovery::guid::{EntityId, GuidPrefix, ENTITYID_UNKNOWN, GUID_PREFIX_LEN};
use crate::core::sample::{ChangeKind, InstanceHandle};

// ============================================================================
// Framing constants
// ============================================================================

pub const RTPS_MAGIC: [u8; 4] = *b"RTPS";
pub const PROTOCOL_VERSION: [u8; 2] = [2, 5];
/// Vendor id carried in the header (experimental range).
pub const VENDOR_ID: [u8; 2] = [0x01, 0xAA];
pub const RTPS_HEADER_LEN: usize = 20;
pub const SUBMSG_HEADER_LEN: usize = 4;

pub const SUBMSG_ACKNACK: u8 = 0x06;
pub const SUBMSG_HEARTBEAT: u8 = 0x07;
pub const SUBMSG_GAP: u8 = 0x08;
pub const SUBMSG_DATA: u8 = 0x15;

/// E flag: body is little-endian.
pub const FLAG_ENDIANNESS: u8 = 0x01;
/// F flag on HEARTBEAT/ACKNACK.
pub const FLAG_FINAL: u8 = 0x02;

pub const WORD_BITS: u32 = 32;
pub const BITMAP_WORDS: usize = (MAX_SEQ_SET_BITS / WORD_BITS) as usize;

/// Framing failure. Receivers log it and drop the datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    TooShort,
    BadMagic,
    UnsupportedVersion(u8),
    Truncated { submessage: u8 },
    Malformed(&'static str),
    TooLarge(usize),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::TooShort => write!(f, "datagram shorter than RTPS header"),
            WireError::BadMagic => write!(f, "missing RTPS magic"),
            WireError::UnsupportedVersion(major) => {
                write!(f, "unsupported RTPS major version {}", major)
            }
            WireError::Truncated { submessage } => {
                write!(f, "submessage 0x{:02x} truncated", submessage)
            }
            WireError::Malformed(what) => write!(f, "malformed submessage: {}", what),
            WireError::TooLarge(len) => write!(f, "submessage body too large: {} bytes", len),
        }
    }
}

impl std::error::Error for WireError {}

// ============================================================================
// SequenceNumberSet
// ============================================================================

/// RTPS SequenceNumberSet (Sec.9.4.2.6): a base plus up to 256 bits.
///
/// Bit `i` (MSB-first within each 32-bit word) stands for `base + i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceNumberSet {
    base: u64,
    num_bits: u32,
    bitmap: [u32; BITMAP_WORDS],
}

impl SequenceNumberSet {
    pub const MAX_BITS: u32 = MAX_SEQ_SET_BITS;

    pub fn empty(base: u64) -> Self {
        Self {
            base,
            num_bits: 0,
            bitmap: [0; BITMAP_WORDS],
        }
    }

    /// Set with `sequences` marked. `None` if any falls outside
    /// `[base, base + 256)`.
    pub fn from_sequences(base: u64, sequences: &[u64]) -> Option<Self> {
        let mut set = Self::empty(base);
        let mut max_offset: Option<u32> = None;

        for &seq in sequences {
            let offset = seq.checked_sub(base)?;
            if offset >= u64::from(Self::MAX_BITS) {
                return None;
            }
            let offset = u32::try_from(offset).ok()?;
            let word = (offset / WORD_BITS) as usize;
            let bit = offset % WORD_BITS;
            set.bitmap[word] |= 1 << (31 - bit);
            max_offset = Some(max_offset.map_or(offset, |m| m.max(offset)));
        }

        set.num_bits = max_offset.map_or(0, |m| m + 1);
        Some(set)
    }

    fn from_raw(base: u64, num_bits: u32, words: &[u32]) -> Option<Self> {
        if num_bits > Self::MAX_BITS || words.len() > BITMAP_WORDS {
            return None;
        }
        let mut bitmap = [0u32; BITMAP_WORDS];
        bitmap[..words.len()].copy_from_slice(words);
        Some(Self {
            base,
            num_bits,
            bitmap,
        })
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    pub fn word_count(&self) -> usize {
        self.num_bits.div_ceil(WORD_BITS) as usize
    }

    pub fn contains(&self, seq: u64) -> bool {
        match seq.checked_sub(self.base) {
            Some(offset) if offset < u64::from(self.num_bits) => {
                let offset = offset as u32;
                self.bitmap[(offset / WORD_BITS) as usize] & (1 << (31 - offset % WORD_BITS)) != 0
            }
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn iter(&self) -> SequenceNumberIter {
        SequenceNumberIter {
            base: self.base,
            num_bits: self.num_bits,
            bitmap: self.bitmap,
            index: 0,
        }
    }
}

/// Ascending iterator over the sequences marked in a set.
#[derive(Clone)]
pub struct SequenceNumberIter {
    base: u64,
    num_bits: u32,
    bitmap: [u32; BITMAP_WORDS],
    index: u32,
}

impl Iterator for SequenceNumberIter {
    type Item = u64;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.num_bits {
            let offset = self.index;
            let word = (offset / WORD_BITS) as usize;
            let mask = 1u32 << (31 - offset % WORD_BITS);
            self.index += 1;
            if self.bitmap[word] & mask != 0 {
                return Some(self.base + u64::from(offset));
            }
        }
        None
    }
}

impl IntoIterator for &SequenceNumberSet {
    type Item = u64;
    type IntoIter = SequenceNumberIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ============================================================================
// Submessages
// ============================================================================

/// DATA: one sample of one writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMsg {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    pub seq: u64,
    pub instance: InstanceHandle,
    pub kind: ChangeKind,
    pub timestamp_ns: u64,
    pub payload: Arc<[u8]>,
}

/// HEARTBEAT: writer has `[first_seq, last_seq]` available.
///
/// An empty history is announced as `first_seq = last_seq + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatMsg {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    pub first_seq: u64,
    pub last_seq: u64,
    pub count: u32,
    /// Reader need not answer unless it is missing data.
    pub final_flag: bool,
}

impl HeartbeatMsg {
    #[must_use]
    pub fn new(writer_id: EntityId, first_seq: u64, last_seq: u64, count: u32) -> Self {
        Self {
            reader_id: ENTITYID_UNKNOWN,
            writer_id,
            first_seq,
            last_seq,
            count,
            final_flag: false,
        }
    }

    /// True when the writer announces no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.first_seq > self.last_seq
    }
}

/// ACKNACK: everything below `state.base()` received, bits = missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckNackMsg {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    pub state: SequenceNumberSet,
    pub count: u32,
    pub final_flag: bool,
}

impl AckNackMsg {
    /// Highest sequence acknowledged (`base - 1`).
    #[must_use]
    pub fn acked_up_to(&self) -> u64 {
        self.state.base().saturating_sub(1)
    }

    /// Sequences the reader asks to be resent.
    pub fn missing(&self) -> SequenceNumberIter {
        self.state.iter()
    }
}

/// GAP: `[gap_start, gap_list.base)` plus every bit in `gap_list` are
/// irrelevant to the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapMsg {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    pub gap_start: u64,
    pub gap_list: SequenceNumberSet,
}

impl GapMsg {
    /// Contiguous range, no bitmap needed.
    #[must_use]
    pub fn range(reader_id: EntityId, writer_id: EntityId, range: &RtpsRange) -> Self {
        Self {
            reader_id,
            writer_id,
            gap_start: range.start(),
            gap_list: SequenceNumberSet::empty(range.end()),
        }
    }

    /// Cover sorted `sequences` with as few GAPs as the 256-bit bitmap allows.
    pub fn from_sequences(reader_id: EntityId, writer_id: EntityId, sequences: &[u64]) -> Vec<Self> {
        let mut messages = Vec::new();
        let mut idx = 0usize;

        while idx < sequences.len() {
            // Leading run goes in [gap_start, base)
            let gap_start = sequences[idx];
            let mut run_end = gap_start;
            idx += 1;
            while idx < sequences.len() && sequences[idx] == run_end + 1 {
                run_end = sequences[idx];
                idx += 1;
            }

            let base = run_end + 1;
            let limit = base.saturating_add(u64::from(SequenceNumberSet::MAX_BITS));
            let mut extras = Vec::new();
            while idx < sequences.len() && sequences[idx] < limit {
                if sequences[idx] >= base {
                    extras.push(sequences[idx]);
                }
                idx += 1;
            }

            let gap_list = SequenceNumberSet::from_sequences(base, &extras)
                .unwrap_or_else(|| SequenceNumberSet::empty(base));
            messages.push(Self {
                reader_id,
                writer_id,
                gap_start,
                gap_list,
            });
        }

        messages
    }

    /// Every irrelevant sequence, ascending.
    #[must_use]
    pub fn lost_sequences(&self) -> Vec<u64> {
        let mut seqs: Vec<u64> = (self.gap_start..self.gap_list.base()).collect();
        seqs.extend(self.gap_list.iter());
        seqs
    }

    /// Irrelevant sequences as merged ranges.
    #[must_use]
    pub fn lost_ranges(&self) -> Vec<RtpsRange> {
        let mut ranges: Vec<Range<u64>> = Vec::new();
        if self.gap_start < self.gap_list.base() {
            ranges.push(self.gap_start..self.gap_list.base());
        }
        for seq in self.gap_list.iter() {
            match ranges.last_mut() {
                Some(last) if last.end == seq => last.end = seq + 1,
                _ => ranges.push(seq..seq + 1),
            }
        }
        ranges
            .into_iter()
            .filter_map(|r| RtpsRange::try_from(r).ok())
            .collect()
    }
}

/// One decoded submessage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submessage {
    Data(DataMsg),
    Heartbeat(HeartbeatMsg),
    AckNack(AckNackMsg),
    Gap(GapMsg),
}

// ============================================================================
// RtpsMessage
// ============================================================================

/// Header plus submessages from one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpsMessage {
    pub guid_prefix: GuidPrefix,
    pub submessages: Vec<Submessage>,
}

impl RtpsMessage {
    #[must_use]
    pub fn new(guid_prefix: GuidPrefix) -> Self {
        Self {
            guid_prefix,
            submessages: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(guid_prefix: GuidPrefix, submessage: Submessage) -> Self {
        Self {
            guid_prefix,
            submessages: vec![submessage],
        }
    }

    pub fn push(&mut self, submessage: Submessage) {
        self.submessages.push(submessage);
    }

    /// Serialize (little-endian bodies).
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut buf = Vec::with_capacity(RTPS_HEADER_LEN + 64);
        buf.extend_from_slice(&RTPS_MAGIC);
        buf.extend_from_slice(&PROTOCOL_VERSION);
        buf.extend_from_slice(&VENDOR_ID);
        buf.extend_from_slice(&self.guid_prefix);

        for sub in &self.submessages {
            let (id, mut flags) = match sub {
                Submessage::Data(_) => (SUBMSG_DATA, 0),
                Submessage::Heartbeat(hb) => (SUBMSG_HEARTBEAT, final_bit(hb.final_flag)),
                Submessage::AckNack(an) => (SUBMSG_ACKNACK, final_bit(an.final_flag)),
                Submessage::Gap(_) => (SUBMSG_GAP, 0),
            };
            flags |= FLAG_ENDIANNESS;

            let header_at = buf.len();
            buf.extend_from_slice(&[id, flags, 0, 0]);
            let body_at = buf.len();
            match sub {
                Submessage::Data(d) => encode_data(&mut buf, d),
                Submessage::Heartbeat(hb) => encode_heartbeat(&mut buf, hb),
                Submessage::AckNack(an) => encode_acknack(&mut buf, an),
                Submessage::Gap(gap) => encode_gap(&mut buf, gap),
            }
            let body_len = buf.len() - body_at;
            let len = u16::try_from(body_len).map_err(|_| WireError::TooLarge(body_len))?;
            buf[header_at + 2..header_at + 4].copy_from_slice(&len.to_le_bytes());
        }

        Ok(buf)
    }

    /// Parse a datagram. Unknown submessage ids are skipped.
    pub fn decode(datagram: &[u8]) -> Result<Self, WireError> {
        if datagram.len() < RTPS_HEADER_LEN {
            return Err(WireError::TooShort);
        }
        if datagram[0..4] != RTPS_MAGIC {
            return Err(WireError::BadMagic);
        }
        if datagram[4] != PROTOCOL_VERSION[0] {
            return Err(WireError::UnsupportedVersion(datagram[4]));
        }
        let mut guid_prefix = [0u8; GUID_PREFIX_LEN];
        guid_prefix.copy_from_slice(&datagram[8..RTPS_HEADER_LEN]);

        let mut msg = Self::new(guid_prefix);
        let mut offset = RTPS_HEADER_LEN;

        while offset + SUBMSG_HEADER_LEN <= datagram.len() {
            let id = datagram[offset];
            let flags = datagram[offset + 1];
            let little = flags & FLAG_ENDIANNESS != 0;
            let len_bytes = [datagram[offset + 2], datagram[offset + 3]];
            let len = usize::from(if little {
                u16::from_le_bytes(len_bytes)
            } else {
                u16::from_be_bytes(len_bytes)
            });
            let body_start = offset + SUBMSG_HEADER_LEN;
            let body = datagram
                .get(body_start..body_start + len)
                .ok_or(WireError::Truncated { submessage: id })?;
            let mut cur = Cursor::new(body, little, id);

            match id {
                SUBMSG_DATA => msg.push(Submessage::Data(decode_data(&mut cur)?)),
                SUBMSG_HEARTBEAT => {
                    msg.push(Submessage::Heartbeat(decode_heartbeat(&mut cur, flags)?))
                }
                SUBMSG_ACKNACK => msg.push(Submessage::AckNack(decode_acknack(&mut cur, flags)?)),
                SUBMSG_GAP => msg.push(Submessage::Gap(decode_gap(&mut cur)?)),
                other => log::trace!("[wire] skipping submessage 0x{:02x}", other),
            }

            offset = body_start + len;
        }

        Ok(msg)
    }
}

fn final_bit(set: bool) -> u8 {
    if set {
        FLAG_FINAL
    } else {
        0
    }
}

// ============================================================================
// Body codecs
// ============================================================================

fn put_seq(buf: &mut Vec<u8>, seq: u64) {
    // SequenceNumber_t { high: i32, low: u32 }
    buf.extend_from_slice(&((seq >> 32) as u32).to_le_bytes());
    buf.extend_from_slice(&(seq as u32).to_le_bytes());
}

fn put_set(buf: &mut Vec<u8>, set: &SequenceNumberSet) {
    put_seq(buf, set.base());
    buf.extend_from_slice(&set.num_bits().to_le_bytes());
    for word in &set.bitmap[..set.word_count()] {
        buf.extend_from_slice(&word.to_le_bytes());
    }
}

fn encode_data(buf: &mut Vec<u8>, d: &DataMsg) {
    buf.extend_from_slice(&0u16.to_le_bytes()); // extraFlags
    buf.extend_from_slice(&16u16.to_le_bytes()); // octetsToInlineQos
    buf.extend_from_slice(&d.reader_id);
    buf.extend_from_slice(&d.writer_id);
    put_seq(buf, d.seq);
    buf.extend_from_slice(d.instance.as_bytes());
    buf.extend_from_slice(&[d.kind.code(), 0, 0, 0]);
    buf.extend_from_slice(&d.timestamp_ns.to_le_bytes());
    buf.extend_from_slice(&d.payload);
}

fn encode_heartbeat(buf: &mut Vec<u8>, hb: &HeartbeatMsg) {
    buf.extend_from_slice(&hb.reader_id);
    buf.extend_from_slice(&hb.writer_id);
    put_seq(buf, hb.first_seq);
    put_seq(buf, hb.last_seq);
    buf.extend_from_slice(&hb.count.to_le_bytes());
}

fn encode_acknack(buf: &mut Vec<u8>, an: &AckNackMsg) {
    buf.extend_from_slice(&an.reader_id);
    buf.extend_from_slice(&an.writer_id);
    put_set(buf, &an.state);
    buf.extend_from_slice(&an.count.to_le_bytes());
}

fn encode_gap(buf: &mut Vec<u8>, gap: &GapMsg) {
    buf.extend_from_slice(&gap.reader_id);
    buf.extend_from_slice(&gap.writer_id);
    put_seq(buf, gap.gap_start);
    put_set(buf, &gap.gap_list);
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    little: bool,
    id: u8,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8], little: bool, id: u8) -> Self {
        Self {
            buf,
            pos: 0,
            little,
            id,
        }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + N)
            .ok_or(WireError::Truncated { submessage: self.id })?;
        self.pos += N;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16, WireError> {
        let b = self.take::<2>()?;
        Ok(if self.little {
            u16::from_le_bytes(b)
        } else {
            u16::from_be_bytes(b)
        })
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        let b = self.take::<4>()?;
        Ok(if self.little {
            u32::from_le_bytes(b)
        } else {
            u32::from_be_bytes(b)
        })
    }

    fn u64(&mut self) -> Result<u64, WireError> {
        let b = self.take::<8>()?;
        Ok(if self.little {
            u64::from_le_bytes(b)
        } else {
            u64::from_be_bytes(b)
        })
    }

    fn seq(&mut self) -> Result<u64, WireError> {
        let high = self.u32()?;
        let low = self.u32()?;
        let seq = (u64::from(high) << 32) | u64::from(low);
        if seq > MAX_SEQUENCE_NUMBER {
            return Err(WireError::Malformed("negative sequence number"));
        }
        Ok(seq)
    }

    fn set(&mut self) -> Result<SequenceNumberSet, WireError> {
        let base = self.seq()?;
        let num_bits = self.u32()?;
        if num_bits > SequenceNumberSet::MAX_BITS {
            return Err(WireError::Malformed("bitmap longer than 256 bits"));
        }
        let mut words = [0u32; BITMAP_WORDS];
        let count = num_bits.div_ceil(WORD_BITS) as usize;
        for word in words.iter_mut().take(count) {
            *word = self.u32()?;
        }
        SequenceNumberSet::from_raw(base, num_bits, &words[..count])
            .ok_or(WireError::Malformed("sequence number set"))
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos.min(self.buf.len())..];
        self.pos = self.buf.len();
        rest
    }
}

fn decode_data(cur: &mut Cursor<'_>) -> Result<DataMsg, WireError> {
    let _extra_flags = cur.u16()?;
    let octets_to_inline_qos = cur.u16()?;
    if octets_to_inline_qos != 16 {
        return Err(WireError::Malformed("unexpected octetsToInlineQos"));
    }
    let reader_id = cur.take::<4>()?;
    let writer_id = cur.take::<4>()?;
    let seq = cur.seq()?;
    if seq == 0 {
        return Err(WireError::Malformed("DATA with sequence number 0"));
    }
    let instance = InstanceHandle::from_bytes(cur.take::<16>()?);
    let status = cur.take::<4>()?;
    let kind = ChangeKind::from_code(status[0]).ok_or(WireError::Malformed("change kind"))?;
    let timestamp_ns = cur.u64()?;
    let payload = Arc::from(cur.rest());
    Ok(DataMsg {
        reader_id,
        writer_id,
        seq,
        instance,
        kind,
        timestamp_ns,
        payload,
    })
}

fn decode_heartbeat(cur: &mut Cursor<'_>, flags: u8) -> Result<HeartbeatMsg, WireError> {
    let reader_id = cur.take::<4>()?;
    let writer_id = cur.take::<4>()?;
    let first_seq = cur.seq()?;
    let last_seq = cur.seq()?;
    let count = cur.u32()?;
    if first_seq == 0 || last_seq.saturating_add(1) < first_seq {
        return Err(WireError::Malformed("heartbeat range"));
    }
    Ok(HeartbeatMsg {
        reader_id,
        writer_id,
        first_seq,
        last_seq,
        count,
        final_flag: flags & FLAG_FINAL != 0,
    })
}

fn decode_acknack(cur: &mut Cursor<'_>, flags: u8) -> Result<AckNackMsg, WireError> {
    let reader_id = cur.take::<4>()?;
    let writer_id = cur.take::<4>()?;
    let state = cur.set()?;
    if state.base() == 0 {
        return Err(WireError::Malformed("ACKNACK base 0"));
    }
    let count = cur.u32()?;
    Ok(AckNackMsg {
        reader_id,
        writer_id,
        state,
        count,
        final_flag: flags & FLAG_FINAL != 0,
    })
}

fn decode_gap(cur: &mut Cursor<'_>) -> Result<GapMsg, WireError> {
    let reader_id = cur.take::<4>()?;
    let writer_id = cur.take::<4>()?;
    let gap_start = cur.seq()?;
    let gap_list = cur.set()?;
    if gap_start == 0 || gap_list.base() < gap_start {
        return Err(WireError::Malformed("GAP range"));
    }
    Ok(GapMsg {
        reader_id,
        writer_id,
        gap_start,
        gap_list,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: EntityId = [0, 0, 1, 0x02];
    const R: EntityId = [0, 0, 1, 0x07];

    fn roundtrip(sub: Submessage) -> Submessage {
        let bytes = RtpsMessage::with([9; 12], sub).encode().expect("encode");
        let mut decoded = RtpsMessage::decode(&bytes).expect("decode");
        assert_eq!(decoded.guid_prefix, [9; 12]);
        assert_eq!(decoded.submessages.len(), 1);
        decoded.submessages.remove(0)
    }

    #[test]
    fn test_sequence_set_bits() {
        let set = SequenceNumberSet::from_sequences(2, &[2, 4]).expect("in range");
        assert_eq!(set.num_bits(), 3);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![2, 4]);
        assert!(set.contains(4));
        assert!(!set.contains(3));
        assert!(SequenceNumberSet::from_sequences(2, &[1]).is_none());
        assert!(SequenceNumberSet::from_sequences(1, &[257]).is_none());
        assert!(SequenceNumberSet::from_sequences(1, &[256]).is_some());
        assert!(SequenceNumberSet::empty(7).is_empty());
    }

    #[test]
    fn test_acknack_wire_layout() {
        let an = AckNackMsg {
            reader_id: R,
            writer_id: W,
            state: SequenceNumberSet::from_sequences(2, &[2, 4]).expect("set"),
            count: 3,
            final_flag: true,
        };
        let bytes = RtpsMessage::with([1; 12], Submessage::AckNack(an.clone()))
            .encode()
            .expect("encode");

        assert_eq!(&bytes[0..4], b"RTPS");
        assert_eq!(bytes[20], SUBMSG_ACKNACK);
        assert_eq!(bytes[21], FLAG_ENDIANNESS | FLAG_FINAL);
        // reader(4) writer(4) base(8) numBits(4) one word(4) count(4)
        assert_eq!(u16::from_le_bytes([bytes[22], bytes[23]]), 28);

        match RtpsMessage::decode(&bytes).expect("decode").submessages.remove(0) {
            Submessage::AckNack(decoded) => {
                assert_eq!(decoded, an);
                assert_eq!(decoded.acked_up_to(), 1);
                assert_eq!(decoded.missing().collect::<Vec<_>>(), vec![2, 4]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_data_keeps_payload_and_metadata() {
        let data = DataMsg {
            reader_id: ENTITYID_UNKNOWN,
            writer_id: W,
            seq: (5u64 << 32) | 7,
            instance: InstanceHandle::from_key(b"sensor-1"),
            kind: ChangeKind::Disposed,
            timestamp_ns: 123_456,
            payload: Arc::from(&b"hello"[..]),
        };
        assert_eq!(roundtrip(Submessage::Data(data.clone())), Submessage::Data(data));
    }

    #[test]
    fn test_heartbeat_final_flag() {
        let mut hb = HeartbeatMsg::new(W, 1, 5, 9);
        hb.final_flag = true;
        assert_eq!(roundtrip(Submessage::Heartbeat(hb)), Submessage::Heartbeat(hb));
        assert!(HeartbeatMsg::new(W, 6, 5, 1).is_empty());
    }

    #[test]
    fn test_gap_from_sequences() {
        let gaps = GapMsg::from_sequences(R, W, &[3, 4, 5, 9, 300, 301]);
        assert_eq!(gaps.len(), 2);
        assert_eq!(gaps[0].gap_start, 3);
        assert_eq!(gaps[0].gap_list.base(), 6);
        assert_eq!(gaps[0].lost_sequences(), vec![3, 4, 5, 9]);
        assert_eq!(gaps[1].lost_sequences(), vec![300, 301]);

        let ranges = gaps[0].lost_ranges();
        assert_eq!(ranges[0].as_range(), &(3..6));
        assert_eq!(ranges[1].as_range(), &(9..10));
    }

    #[test]
    fn test_big_endian_body_decodes() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&RTPS_MAGIC);
        bytes.extend_from_slice(&PROTOCOL_VERSION);
        bytes.extend_from_slice(&VENDOR_ID);
        bytes.extend_from_slice(&[2; 12]);
        bytes.extend_from_slice(&[SUBMSG_HEARTBEAT, 0, 0, 28]);
        bytes.extend_from_slice(&R);
        bytes.extend_from_slice(&W);
        bytes.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 1]);
        bytes.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 4]);
        bytes.extend_from_slice(&[0, 0, 0, 2]);

        match RtpsMessage::decode(&bytes).expect("decode").submessages.remove(0) {
            Submessage::Heartbeat(hb) => {
                assert_eq!((hb.first_seq, hb.last_seq, hb.count), (1, 4, 2));
                assert!(!hb.final_flag);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_malformed_inputs_rejected() {
        assert_eq!(RtpsMessage::decode(b"RTPS"), Err(WireError::TooShort));
        assert_eq!(RtpsMessage::decode(&[0u8; 24]), Err(WireError::BadMagic));

        let mut bytes = RtpsMessage::with([1; 12], Submessage::Heartbeat(HeartbeatMsg::new(W, 1, 2, 1)))
            .encode()
            .expect("encode");
        bytes.truncate(bytes.len() - 3);
        assert_eq!(
            RtpsMessage::decode(&bytes),
            Err(WireError::Truncated {
                submessage: SUBMSG_HEARTBEAT
            })
        );
    }

    #[test]
    fn test_unknown_submessage_skipped() {
        let mut bytes = RtpsMessage::new([1; 12]).encode().expect("encode");
        bytes.extend_from_slice(&[0x09, FLAG_ENDIANNESS, 8, 0]);
        bytes.extend_from_slice(&[0u8; 8]);
        let tail = RtpsMessage::with([1; 12], Submessage::Heartbeat(HeartbeatMsg::new(W, 1, 1, 1)))
            .encode()
            .expect("encode");
        bytes.extend_from_slice(&tail[RTPS_HEADER_LEN..]);

        let decoded = RtpsMessage::decode(&bytes).expect("decode");
        assert_eq!(decoded.submessages.len(), 1);
    }
}
