// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Association lifecycle shared by writer-side and reader-side proxies.
//!
//! ```text
//! PENDING --exchange--> ASSOCIATED --dispose/departure--> SHUTTING_DOWN
//!    |                                                        |
//!    +--------------------dispose/departure-------------------+
//!                                                             v
//!                                   drained or deadline --> TERMINATED
//! ```

use std::fmt;
use std::time::{Duration, Instant};

/// Lifecycle state of one writer/reader association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationState {
    /// Matched, nothing exchanged yet.
    Pending,
    /// Heartbeat/data flowing.
    Associated,
    /// Draining outstanding retransmissions.
    ShuttingDown,
    /// Removable.
    Terminated,
}

impl fmt::Display for AssociationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssociationState::Pending => "PENDING",
            AssociationState::Associated => "ASSOCIATED",
            AssociationState::ShuttingDown => "SHUTTING_DOWN",
            AssociationState::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}

/// How a SHUTTING_DOWN association ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Drained,
    Forced,
}

/// State plus drain deadline.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: AssociationState,
    drain_deadline: Option<Instant>,
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AssociationState::Pending,
            drain_deadline: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> AssociationState {
        self.state
    }

    /// PENDING or ASSOCIATED.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            AssociationState::Pending | AssociationState::Associated
        )
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.state == AssociationState::Terminated
    }

    /// First successful heartbeat/data exchange. True on PENDING -> ASSOCIATED.
    pub fn on_exchange(&mut self) -> bool {
        if self.state == AssociationState::Pending {
            self.state = AssociationState::Associated;
            true
        } else {
            false
        }
    }

    /// Local disposal or remote departure. True if the state changed.
    pub fn begin_shutdown(&mut self, now: Instant, drain_timeout: Duration) -> bool {
        if !self.is_active() {
            return false;
        }
        self.state = AssociationState::ShuttingDown;
        self.drain_deadline = Some(now + drain_timeout);
        true
    }

    /// Finish a drain once nothing is outstanding or the deadline passed.
    pub fn try_terminate(&mut self, now: Instant, drained: bool) -> Option<Termination> {
        if self.state != AssociationState::ShuttingDown {
            return None;
        }
        if drained {
            self.state = AssociationState::Terminated;
            return Some(Termination::Drained);
        }
        match self.drain_deadline {
            Some(deadline) if now < deadline => None,
            _ => {
                self.state = AssociationState::Terminated;
                Some(Termination::Forced)
            }
        }
    }

    /// Skip draining entirely.
    pub fn terminate(&mut self) {
        self.state = AssociationState::Terminated;
        self.drain_deadline = None;
    }

    #[must_use]
    pub fn drain_deadline(&self) -> Option<Instant> {
        self.drain_deadline
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_to_associated_once() {
        let mut lc = Lifecycle::new();
        assert_eq!(lc.state(), AssociationState::Pending);
        assert!(lc.on_exchange());
        assert!(!lc.on_exchange());
        assert_eq!(lc.state(), AssociationState::Associated);
    }

    #[test]
    fn test_drain_completes_when_empty() {
        let now = Instant::now();
        let mut lc = Lifecycle::new();
        lc.on_exchange();
        assert!(lc.begin_shutdown(now, Duration::from_secs(1)));
        assert!(!lc.begin_shutdown(now, Duration::from_secs(1)));
        assert_eq!(lc.try_terminate(now, false), None);
        assert_eq!(lc.try_terminate(now, true), Some(Termination::Drained));
        assert!(lc.is_terminated());
    }

    #[test]
    fn test_drain_forced_after_deadline() {
        let now = Instant::now();
        let mut lc = Lifecycle::new();
        lc.begin_shutdown(now, Duration::from_millis(10));
        assert_eq!(lc.state(), AssociationState::ShuttingDown);
        assert_eq!(
            lc.try_terminate(now + Duration::from_millis(10), false),
            Some(Termination::Forced)
        );
    }

    #[test]
    fn test_terminated_is_final() {
        let mut lc = Lifecycle::new();
        lc.terminate();
        assert!(!lc.on_exchange());
        assert!(!lc.begin_shutdown(Instant::now(), Duration::ZERO));
        assert_eq!(lc.try_terminate(Instant::now(), true), None);
        assert_eq!(lc.state().to_string(), "TERMINATED");
    }
}
