// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Application-facing API
//!
//! - **Participant**: explicitly constructed context owning transports, the
//!   locator cache and every endpoint
//! - **DataWriter/DataReader**: endpoints that write and take samples
//! - **QoS**: [`QosProfile`](crate::QosProfile) supplied at endpoint creation
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hdds_reliable::{IntraNetwork, Participant, QosProfile};
//!
//! let network = IntraNetwork::new();
//! let participant = Participant::builder("publisher")
//!     .with_transport(Arc::new(network.attach(true)))
//!     .build()?;
//! let writer = participant.create_writer(QosProfile::reliable().keep_all())?;
//! writer.write(b"sensor-1", b"42.0")?;
//! # Ok::<(), hdds_reliable::Error>(())
//! ```

/// Listener traits and status types.
pub mod listener;
mod participant;
mod reader;
mod writer;

pub use listener::{LivelinessLostStatus, ReaderListener, SampleLostStatus};
pub use participant::{Participant, ParticipantBuilder};
pub use reader::{DataReader, ReaderStatus, Take};
pub use writer::DataWriter;

/// Classification of a failed `write` as seen by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteErrorKind {
    /// Resources did not free up within `max_blocking_time`.
    Timeout,
    /// The request itself is not acceptable (QoS, size, unknown instance).
    Rejected,
    /// Anything else.
    Error,
}

/// Errors returned by hdds-reliable operations.
///
/// ```rust,no_run
/// use hdds_reliable::{Error, WriteErrorKind};
///
/// fn report(err: &Error) {
///     match err.kind() {
///         WriteErrorKind::Timeout => eprintln!("history full: {}", err),
///         WriteErrorKind::Rejected => eprintln!("rejected: {}", err),
///         WriteErrorKind::Error => eprintln!("failed: {}", err),
///     }
/// }
/// ```
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// QoS policy is invalid (e.g., KEEP_LAST depth 0).
    InvalidQos(String),
    /// Runtime configuration is invalid or unparsable.
    InvalidConfig(String),
    /// Configuration file not found at specified path.
    ConfigFileNotFound(String),

    // ========================================================================
    // Entity Errors
    // ========================================================================
    /// Invalid state for the requested operation.
    InvalidState(String),

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// I/O error with underlying cause.
    IoError(std::io::Error),

    // ========================================================================
    // Data Errors
    // ========================================================================
    /// Reliability requested by a reader is not offered by the writer, or no
    /// registered transport can carry it.
    QosIncompatible,
    /// Payload larger than the configured maximum.
    PayloadTooLarge { size: usize, max: usize },

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// History cache full and the caller asked not to block.
    WouldBlock,
    /// History cache stayed full for `max_blocking_time`.
    Timeout,
    /// Writer ran out of sequence numbers (fatal).
    SequenceExhausted,

    // ========================================================================
    // Other
    // ========================================================================
    /// Request refused (e.g., dispose of an unknown instance).
    Rejected(String),
}

impl Error {
    /// Map to the TIMEOUT / REJECTED / ERROR classification of `write`.
    #[must_use]
    pub fn kind(&self) -> WriteErrorKind {
        match self {
            Error::Timeout => WriteErrorKind::Timeout,
            Error::Rejected(_)
            | Error::QosIncompatible
            | Error::InvalidQos(_)
            | Error::PayloadTooLarge { .. } => WriteErrorKind::Rejected,
            _ => WriteErrorKind::Error,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Configuration
            Error::InvalidQos(msg) => write!(f, "Invalid QoS: {}", msg),
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::ConfigFileNotFound(path) => write!(f, "Config file not found: {}", path),
            // Entity
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            // Transport
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            // Data
            Error::QosIncompatible => write!(f, "QoS incompatible"),
            Error::PayloadTooLarge { size, max } => {
                write!(f, "Payload too large: {} bytes (max {})", size, max)
            }
            // Resource
            Error::WouldBlock => write!(f, "Operation would block"),
            Error::Timeout => write!(f, "Write timeout"),
            Error::SequenceExhausted => write!(f, "Sequence number space exhausted"),
            // Other
            Error::Rejected(msg) => write!(f, "Rejected: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e)
    }
}

/// Convenient alias for API results using the public `Error` type.
pub type Result<T> = core::result::Result<T, Error>;
