// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-endpoint reliability state.
//!
//! A [`writer::WriterSession`] keeps one `ReaderProxy` per matched reader and
//! a [`reader::ReaderSession`] one `WriterProxy` per matched writer. Both
//! share the association lifecycle in [`association`].

/// Association lifecycle (active, draining, terminated).
pub mod association;
/// Identities and the discovery collaborator.
pub mod discovery;
pub mod reader;
/// Samples, instance handles and change kinds.
pub mod sample;
pub mod writer;
