// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # RTPS Reliable QoS Protocol
//!
//! Building blocks of the reliable session: sequence numbering, gap
//! tracking, the wire messages and the timing/retransmission helpers. The
//! per-association state machines that drive them live in `core::writer`
//! and `core::reader`.
//!
//! ## Protocol Flow
//!
//! ```text
//! Writer                                    Reader
//!   |                                          |
//!   |--- DATA (seq=1) ------------------------>|
//!   |--- DATA (seq=2) ----------X (lost)       |
//!   |--- DATA (seq=3) ------------------------>|
//!   |                                          |
//!   |--- HEARTBEAT (first=1, last=3) -------->|
//!   |                                          | (detects gap: seq=2 missing)
//!   |<-- ACKNACK (base=2, missing: [2]) ------|
//!   |                                          |
//!   |--- DATA (seq=2) [retransmit] ---------->|
//!   |                                          | (gap filled, 2 and 3 delivered)
//! ```
//!
//! A NACK for a sample the history already dropped is answered with a GAP;
//! the reader skips it and reports it as lost.
//!
//! ## Components
//!
//! | Component | Role |
//! |-----------|------|
//! | `SeqNumGenerator` | Per-writer monotonic sequence numbers, fatal on exhaustion |
//! | `HistoryCache` | KEEP_ALL / KEEP_LAST sample store feeding delivery and retransmission |
//! | `HeartbeatTx` | Writer heartbeat schedule and count |
//! | `HeartbeatRx` | Reader stale-heartbeat filter |
//! | `NackScheduler` | Reader NACK coalescing window and backoff |
//! | `GapTracker` | Reader record of missing sequence numbers |
//! | `WriterRetransmitHandler` | Writer answer to a NACK (DATA + GAP) |
//! | `ReliableMetrics` | Counters (heartbeats, NACKs, retransmits, losses) |
//!
//! ## See Also
//!
//! - [RTPS v2.5 Sec.8.4](https://www.omg.org/spec/DDSI-RTPS/2.5/) - Reliability Protocol

// Core types
mod gap_tracker;
mod metrics;
mod rtps_range;
mod seq;

// Protocol messages
pub mod messages;

// Protocol handlers
mod reader;
mod writer;

// History cache
mod history_cache;

// ============================================================================
// Public re-exports: Core types
// ============================================================================

pub use gap_tracker::GapTracker;
pub use metrics::{MetricsSnapshot, ReliableMetrics};
pub use rtps_range::RtpsRange;
pub use seq::SeqNumGenerator;

// ============================================================================
// Public re-exports: Messages
// ============================================================================

pub use messages::{
    AckNackMsg, DataMsg, GapMsg, HeartbeatMsg, RtpsMessage, SequenceNumberIter,
    SequenceNumberSet, Submessage, WireError,
};

// ============================================================================
// Public re-exports: Writer-side (TX)
// ============================================================================

pub use writer::{HeartbeatTx, RetransmitPlan, WriterRetransmitHandler};

// ============================================================================
// Public re-exports: Reader-side (RX)
// ============================================================================

pub use reader::{HeartbeatRx, NackScheduler};

// ============================================================================
// Public re-exports: History cache
// ============================================================================

pub use history_cache::{CacheEntry, HistoryCache, SampleKey, LENGTH_UNLIMITED};
