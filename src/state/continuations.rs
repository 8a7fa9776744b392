//! Thread-safe append-or-fire sink for continuation callbacks.
//!
//! A continuation set accepts callbacks until its one-way `fired` latch
//! flips; from then on, every pushed callback is immediately forwarded to
//! the supplied executor instead of being recorded. Exactly one
//! `request_run` call ever succeeds.
//!
//! Two storage regimes:
//!
//! - **Eager** states admit concurrent pushes while the producer runs, so
//!   the callbacks live in a lock-free queue guarded by an atomic latch.
//!   `request_run` flips the latch, drains the queue without the gate, then
//!   takes the gate and drains once more to cover callbacks that slipped in
//!   between the flip and the first drain.
//! - **Always-deferred** states never race the producer; a plain vector and
//!   bool behind one mutex suffice.

use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::executor::{ExecutorHandle, TaskFn};

/// A recorded continuation callback.
pub(crate) type Continuation = TaskFn;

/// The continuation sink attached to a continuable operation state.
pub(crate) struct ContinuationSet {
    inner: Regime,
}

enum Regime {
    Eager {
        /// One-way latch: once true, no more insertions are accepted.
        fired: AtomicBool,
        /// Lock-free callback queue for the pre-fire fast path.
        queue: SegQueue<Continuation>,
        /// Gate closing the push/drain race window.
        gate: Mutex<()>,
    },
    Deferred {
        cell: Mutex<DeferredCell>,
    },
}

#[derive(Default)]
struct DeferredCell {
    fired: bool,
    pending: Vec<Continuation>,
}

impl ContinuationSet {
    /// Creates the sink for an eager state (concurrent pushes possible).
    pub(crate) fn eager() -> Self {
        Self {
            inner: Regime::Eager {
                fired: AtomicBool::new(false),
                queue: SegQueue::new(),
                gate: Mutex::new(()),
            },
        }
    }

    /// Creates the sink for an always-deferred state.
    pub(crate) fn deferred() -> Self {
        Self {
            inner: Regime::Deferred {
                cell: Mutex::new(DeferredCell::default()),
            },
        }
    }

    /// True once a run has been requested.
    pub(crate) fn fired(&self) -> bool {
        match &self.inner {
            Regime::Eager { fired, .. } => fired.load(Ordering::Acquire),
            Regime::Deferred { cell } => cell.lock().fired,
        }
    }

    /// Records `continuation`, or, when the latch has already flipped,
    /// submits it to `fallback` for execution.
    ///
    /// Returns `true` if the continuation was recorded for the drain.
    pub(crate) fn push(&self, fallback: &ExecutorHandle, continuation: Continuation) -> bool {
        match &self.inner {
            Regime::Eager { fired, queue, gate } => {
                let guard = gate.lock();
                if fired.load(Ordering::Acquire) {
                    drop(guard);
                    fallback.execute_boxed(continuation);
                    false
                } else {
                    queue.push(continuation);
                    true
                }
            }
            Regime::Deferred { cell } => {
                let mut cell = cell.lock();
                if cell.fired {
                    drop(cell);
                    fallback.execute_boxed(continuation);
                    false
                } else {
                    cell.pending.push(continuation);
                    true
                }
            }
        }
    }

    /// Flips the latch and runs every recorded continuation.
    ///
    /// Returns `true` for the single call that performed the transition.
    pub(crate) fn request_run(&self) -> bool {
        match &self.inner {
            Regime::Eager { fired, queue, gate } => {
                if fired
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    return false;
                }
                // Fast drain without the gate.
                while let Some(continuation) = queue.pop() {
                    continuation();
                }
                // A push may have landed between the flip and the drain
                // above; the gate orders us after any such insertion.
                let guard = gate.lock();
                drop(guard);
                while let Some(continuation) = queue.pop() {
                    continuation();
                }
                true
            }
            Regime::Deferred { cell } => {
                let mut guard = cell.lock();
                if guard.fired {
                    return false;
                }
                guard.fired = true;
                let pending = std::mem::take(&mut guard.pending);
                drop(guard);
                for continuation in pending {
                    continuation();
                }
                true
            }
        }
    }
}

impl std::fmt::Debug for ContinuationSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuationSet")
            .field("fired", &self.fired())
            .field(
                "regime",
                &match self.inner {
                    Regime::Eager { .. } => "eager",
                    Regime::Deferred { .. } => "deferred",
                },
            )
            .finish()
    }
}
