// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DataReader: application handle on a [`ReaderSession`].

use std::sync::Arc;

use super::listener::{LivelinessLostStatus, ReaderListener, SampleLostStatus};
use crate::core::discovery::Guid;
use crate::core::reader::ReaderSession;
use crate::core::sample::Sample;
use crate::qos::QosProfile;
use crate::reliability::{HistoryCache, MetricsSnapshot};

/// Communication status of a reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStatus {
    pub sample_lost: SampleLostStatus,
    pub liveliness_lost: LivelinessLostStatus,
    pub matched_writers: usize,
    /// Samples waiting to be taken.
    pub available: usize,
}

/// Takes delivered samples.
pub struct DataReader {
    session: Arc<ReaderSession>,
}

impl DataReader {
    pub(crate) fn new(session: Arc<ReaderSession>) -> Self {
        Self { session }
    }

    pub(crate) fn session(&self) -> &Arc<ReaderSession> {
        &self.session
    }

    #[must_use]
    pub fn guid(&self) -> Guid {
        self.session.guid()
    }

    #[must_use]
    pub fn qos(&self) -> &QosProfile {
        self.session.qos()
    }

    /// Lazily remove the samples available now, oldest first.
    ///
    /// Samples from one writer come out in sequence order. Samples delivered
    /// while the iterator is alive wait for the next call.
    pub fn take(&self) -> Take<'_> {
        let history = self.session.history();
        Take {
            history,
            remaining: history.len(),
        }
    }

    /// Remove the oldest available sample.
    pub fn try_take(&self) -> Option<Arc<Sample>> {
        self.session.history().pop_front()
    }

    #[must_use]
    pub fn available(&self) -> usize {
        self.session.history().len()
    }

    #[must_use]
    pub fn status(&self) -> ReaderStatus {
        ReaderStatus {
            sample_lost: self.session.sample_lost_status(),
            liveliness_lost: self.session.liveliness_lost_status(),
            matched_writers: self.session.matched().len(),
            available: self.available(),
        }
    }

    /// Install or clear the listener.
    pub fn set_listener(&self, listener: Option<Arc<dyn ReaderListener>>) {
        self.session.set_listener(listener);
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.session.metrics().snapshot()
    }
}

impl std::fmt::Debug for DataReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataReader")
            .field("guid", &self.guid())
            .field("qos", self.qos())
            .finish()
    }
}

/// Iterator returned by [`DataReader::take`].
pub struct Take<'a> {
    history: &'a HistoryCache,
    remaining: usize,
}

impl Iterator for Take<'_> {
    type Item = Arc<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let sample = self.history.pop_front();
        if sample.is_none() {
            self.remaining = 0;
        }
        sample
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}
