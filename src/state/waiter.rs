//! Waiting primitives: bounded-wait status and cross-state wake signals.
//!
//! A [`WaitSignal`] is the external notification target an operation state
//! registers alongside its internal condition variable. Disjunctive waits
//! (`wait_for_any`, the `when_any` fallback) hand one shared signal to every
//! input, block on it, and re-scan on each wake. The generation counter
//! makes wakes level-triggered: a notification between the snapshot and the
//! wait is never lost.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Instant;

/// The result of a bounded wait on a future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureStatus {
    /// The outcome is ready.
    Ready,
    /// The deadline passed before the outcome was ready.
    Timeout,
    /// The state is deferred and its task has not been launched.
    Deferred,
}

impl FutureStatus {
    /// True when the wait observed a ready outcome.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// A shared wake-up channel between operation states and an external waiter.
#[derive(Debug, Default)]
pub struct WaitSignal {
    /// Wake generation; bumped on every notification.
    generation: Mutex<u64>,
    /// Condition variable external waiters block on.
    cond: Condvar,
}

impl WaitSignal {
    /// Creates a signal with no pending notifications.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current wake generation.
    ///
    /// Snapshot this before scanning; pass it to [`WaitSignal::wait`] so a
    /// notification delivered during the scan is observed.
    #[must_use]
    pub fn generation(&self) -> u64 {
        *lock(&self.generation)
    }

    /// Wakes all current and future waiters of the current generation.
    pub fn notify(&self) {
        let mut generation = lock(&self.generation);
        *generation = generation.wrapping_add(1);
        drop(generation);
        self.cond.notify_all();
    }

    /// Blocks until the generation advances past `seen`.
    pub fn wait(&self, seen: u64) {
        let mut generation = lock(&self.generation);
        while *generation == seen {
            generation = match self.cond.wait(generation) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Blocks until the generation advances past `seen` or the deadline
    /// passes. Returns `true` if a notification was observed.
    pub fn wait_until(&self, seen: u64, deadline: Instant) -> bool {
        let mut generation = lock(&self.generation);
        while *generation == seen {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _timed_out) = match self.cond.wait_timeout(generation, deadline - now) {
                Ok(r) => r,
                Err(poisoned) => poisoned.into_inner(),
            };
            generation = guard;
        }
        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
