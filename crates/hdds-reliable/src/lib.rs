// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # hdds-reliable - RTPS reliability core
//!
//! Reliable and best-effort sample delivery between participants over lossy
//! datagram transports: sequence numbering, HEARTBEAT/ACKNACK/GAP repair,
//! QoS-driven history retention and cached locator resolution.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hdds_reliable::{IntraNetwork, Participant, QosProfile, Result};
//!
//! fn main() -> Result<()> {
//!     let network = IntraNetwork::new();
//!     let participant = Participant::builder("publisher")
//!         .with_transport(Arc::new(network.attach(true)))
//!         .build()?;
//!     let _timer = participant.start()?;
//!
//!     let writer = participant.create_writer(QosProfile::reliable().keep_all())?;
//!     writer.write(b"sensor-1", b"21.5")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                         Application Layer                           |
//! |   Participant -> DataWriter / DataReader -> listener, status        |
//! +---------------------------------------------------------------------+
//! |                         Reliable Session                            |
//! |   WriterSession (ReaderProxy per reader)                            |
//! |   ReaderSession (WriterProxy per writer)                            |
//! |   HEARTBEAT / ACKNACK / GAP | NACK scheduling | History Cache       |
//! +---------------------------------------------------------------------+
//! |                        Transport Layer                              |
//! |   TransportMux -> LocatorCache -> UDP | Multicast | Intra-process   |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Participant`] | Owns transports, caches and endpoints |
//! | [`DataWriter`] | Sequences, retains and publishes samples |
//! | [`DataReader`] | Takes samples delivered in per-writer order |
//! | [`QosProfile`] | Reliability, history and blocking policy |
//! | [`LocatorCache`] | (remote, local, preference) -> locators |
//! | [`TransportMux`] | Picks a transport per locator, queues unreachable reliable sends |

/// Protocol constants and runtime configuration.
pub mod config;
/// Identities, samples, association lifecycle and per-endpoint sessions.
pub mod core;
/// Application API (Participant, DataWriter, DataReader, errors, listeners).
pub mod dds;
/// Inbound dispatch and periodic timers.
pub mod engine;
/// `QoS` policies and YAML profile loading.
pub mod qos;
/// Reliable protocol building blocks (messages, history cache, gap tracking).
pub mod reliability;
/// Transports, locator resolution and the transport multiplexer.
pub mod transport;

pub use crate::core::discovery::{Discovery, DiscoveryEvent, Guid, StaticDiscovery};
pub use crate::core::sample::{ChangeKind, InstanceHandle, Sample};
pub use config::RuntimeConfig;
pub use dds::{
    DataReader, DataWriter, Error, LivelinessLostStatus, Participant, ParticipantBuilder,
    ReaderListener, ReaderStatus, Result, SampleLostStatus, Take, WriteErrorKind,
};
pub use engine::TimerHandle;
pub use qos::{History, QosProfile, Reliability, ResourceLimits};
pub use reliability::MetricsSnapshot;
pub use transport::{
    IntraNetwork, IntraProcessTransport, Locator, LocatorCache, LocatorCacheKey, LocatorSet,
    MulticastTransport, Transport, TransportMux, UdpTransport,
};
