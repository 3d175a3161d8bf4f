// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Periodic timer thread driving heartbeats, NACK retries and teardown.
//!
//! Heartbeats must keep flowing while the application is idle, otherwise a
//! burst followed by silence leaves losses unrecovered. One thread per
//! participant calls the tick closure every `interval`.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct TimerState {
    stop: AtomicBool,
    ticks: AtomicU64,
}

/// Handle to a running timer thread.
///
/// When dropped, signals the thread to stop and waits for it to join.
pub struct TimerHandle {
    state: Arc<TimerState>,
    thread: Option<JoinHandle<()>>,
}

impl TimerHandle {
    /// Ticks executed so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.state.ticks.load(Ordering::Relaxed)
    }

    /// Stop the thread and wait for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.state.stop.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::warn!("[timer] tick thread panicked");
            }
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawn a thread named `name` calling `tick` every `interval`.
pub fn spawn_timer<F>(name: &str, interval: Duration, mut tick: F) -> io::Result<TimerHandle>
where
    F: FnMut(Instant) + Send + 'static,
{
    let state = Arc::new(TimerState::default());
    let thread_state = Arc::clone(&state);

    let thread = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            log::debug!("[timer] started (interval={:?})", interval);
            while !thread_state.stop.load(Ordering::Acquire) {
                tick(Instant::now());
                thread_state.ticks.fetch_add(1, Ordering::Relaxed);
                thread::sleep(interval);
            }
            log::debug!("[timer] stopped");
        })?;

    Ok(TimerHandle {
        state,
        thread: Some(thread),
    })
}
