//! Per-call timeouts and the soft end-to-end deadline
//!
//! Collaborator calls (graph retrieval, advisors, learned scorer) run on a
//! helper thread and are awaited with `recv_timeout`. A call that misses
//! its timeout is abandoned: the helper thread finishes in the background
//! and its result is dropped.

use crossbeam_channel::{bounded, RecvTimeoutError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_DEADLINE: Duration = Duration::from_millis(2000);

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Interrupted {
    #[error("timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),
    #[error("call panicked")]
    Panicked,
    #[error("could not spawn helper thread: {0}")]
    Spawn(String),
}

/// Run `f` on a helper thread, waiting at most `timeout` for its result.
pub fn call_with_timeout<T, F>(name: &str, timeout: Duration, f: F) -> Result<T, Interrupted>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = bounded(1);
    std::thread::Builder::new()
        .name(format!("pathwarden-{name}"))
        .spawn(move || {
            // Receiver may be gone after a timeout
            let _ = tx.send(f());
        })
        .map_err(|e| Interrupted::Spawn(e.to_string()))?;

    match rx.recv_timeout(timeout) {
        Ok(value) => Ok(value),
        Err(RecvTimeoutError::Timeout) => {
            debug!("{} abandoned after {}ms", name, timeout.as_millis());
            Err(Interrupted::TimedOut(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => Err(Interrupted::Panicked),
    }
}

/// Soft deadline for one request. Past it, optional work is skipped.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn new(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.started.elapsed())
    }

    pub fn expired(&self) -> bool {
        self.started.elapsed() >= self.budget
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Timeout for an optional call: the call timeout, cut short by the deadline
    pub fn clamp(&self, call_timeout: Duration) -> Duration {
        call_timeout.min(self.remaining())
    }
}
