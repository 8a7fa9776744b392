//! The operation state: the shared object backing every future/promise pair.
//!
//! An operation state combines the outcome slot, the waiter primitive, the
//! continuation sink, and the optional stop source and executor, under one
//! phase machine:
//!
//! ```text
//! Deferred --launch--> Launched --wait--> Waiting --complete--> Ready
//! Launched ------------------------------complete--> Ready
//! ```
//!
//! `Ready` is terminal. The phase byte is the only lock-free mutable field;
//! every other mutation synchronizes through the waiter mutex. Completion
//! publishes the outcome with a release store on the phase so any thread
//! that observes `Ready` with acquire semantics also observes the outcome.
//!
//! Launching is lazy for deferred states: the first launching wait takes
//! the stored task, marks the state launched, releases the mutex, waits for
//! the parent state when the task is a continuation, and submits the task:
//! to the state's executor when it has one, inline on the waiting thread
//! otherwise.

use smallvec::SmallVec;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Instant;

use super::continuations::ContinuationSet;
use super::outcome::OutcomeSlot;
use super::waiter::{FutureStatus, WaitSignal};
use crate::cancel::StopSource;
use crate::error::{Error, Result};
use crate::executor::ExecutorHandle;

/// Nothing has happened yet; the task is stored, not submitted.
const PHASE_DEFERRED: u8 = 0;
/// The task has been submitted (or the state was born eager).
const PHASE_LAUNCHED: u8 = 1;
/// Some thread is blocked waiting for the result.
const PHASE_WAITING: u8 = 2;
/// The outcome has been set and everyone was notified. Terminal.
const PHASE_READY: u8 = 3;

/// Blocks until a predecessor state is ready. Implemented by every
/// operation state so deferred continuation tasks can wait on their parent
/// without knowing its value type.
pub(crate) trait ParentWait: Send + Sync {
    /// Waits for the state to become ready, launching it if deferred.
    fn wait_ready(&self);
}

/// Type-erased launch trigger, so an aggregate can start its deferred
/// inputs without knowing their value types. Launching never blocks on the
/// outcome.
pub(crate) trait LaunchTask: Send + Sync {
    /// Launches the state's task if it is still deferred.
    fn launch_task(&self);
}

/// A delayed computation stored inside a deferred state.
pub(crate) struct DeferredTask {
    /// Predecessor to wait on before running (continuation states only).
    pub(crate) parent: Option<Arc<dyn ParentWait>>,
    /// The computation; completes the state when it runs.
    pub(crate) run: Box<dyn FnOnce() + Send>,
}

/// Handle identifying an external-signal registration; pass it back to
/// `unnotify_when_ready` to unregister before dropping the signal's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyHandle(u64);

/// Fields protected by the waiter mutex.
struct Guarded<T> {
    /// The outcome storage; written once during the ready transition.
    slot: OutcomeSlot<T>,
    /// External signals to notify alongside the internal condvar.
    external: SmallVec<[(u64, Arc<WaitSignal>); 2]>,
    /// Id source for external registrations.
    next_external_id: u64,
    /// The stored task of a deferred state; taken at launch.
    task: Option<DeferredTask>,
}

/// The shared synchronization object behind a future/promise pair.
pub(crate) struct OperationState<T> {
    /// Phase atom; release/acquire pairs publish the outcome.
    phase: AtomicU8,
    guarded: Mutex<Guarded<T>>,
    ready_cv: Condvar,
    /// Present iff the state is continuable.
    continuations: Option<ContinuationSet>,
    /// Present iff the state is stoppable.
    stop: Option<StopSource>,
    /// Default scheduling context for the task and its continuations.
    executor: Option<ExecutorHandle>,
}

impl<T> OperationState<T> {
    /// Creates a state in its initial phase.
    ///
    /// Eager states start launched; deferred states hold their task until
    /// the first launching wait.
    pub(crate) fn new(
        deferred: bool,
        continuations: Option<ContinuationSet>,
        stop: Option<StopSource>,
        executor: Option<ExecutorHandle>,
    ) -> Self {
        Self {
            phase: AtomicU8::new(if deferred { PHASE_DEFERRED } else { PHASE_LAUNCHED }),
            guarded: Mutex::new(Guarded {
                slot: OutcomeSlot::Empty,
                external: SmallVec::new(),
                next_external_id: 0,
                task: None,
            }),
            ready_cv: Condvar::new(),
            continuations,
            stop,
            executor,
        }
    }

    fn phase_now(&self) -> u8 {
        self.phase.load(Ordering::Acquire)
    }

    /// True once the outcome is set. Never blocks.
    pub(crate) fn is_ready(&self) -> bool {
        self.phase_now() == PHASE_READY
    }

    /// True while the stored task has not been launched.
    pub(crate) fn is_deferred(&self) -> bool {
        self.phase_now() == PHASE_DEFERRED
    }

    /// True when continuations can be attached without a waiting bridge.
    pub(crate) fn supports_continuations(&self) -> bool {
        self.continuations.is_some()
    }

    /// The continuation sink, when the state is continuable.
    pub(crate) fn continuations(&self) -> Option<&ContinuationSet> {
        self.continuations.as_ref()
    }

    /// The stop source, when the state is stoppable.
    pub(crate) fn stop_source(&self) -> Option<&StopSource> {
        self.stop.as_ref()
    }

    /// The state's default executor, when it has one.
    pub(crate) fn executor(&self) -> Option<&ExecutorHandle> {
        self.executor.as_ref()
    }

    /// Stores the delayed task of a deferred state.
    ///
    /// Called during construction, before the state is shared.
    pub(crate) fn set_task(&self, task: DeferredTask) {
        lock(&self.guarded).task = Some(task);
    }

    /// Writes the outcome and performs the ready transition.
    ///
    /// Exactly one completion ever succeeds; later attempts report
    /// `AlreadySatisfied`. Waiters on the internal condvar and every
    /// registered external signal are notified, then the continuation sink
    /// fires, strictly outside the waiter mutex, so a continuation may
    /// itself complete other states (including reentrantly waiting on this
    /// one).
    pub(crate) fn complete(&self, outcome: Result<T>) -> Result<()> {
        let mut guarded = lock(&self.guarded);
        if self.is_ready() {
            return Err(Error::already_satisfied());
        }
        guarded.slot.set(outcome)?;
        // A not-yet-launched task can no longer contribute an outcome.
        guarded.task = None;

        let prev = self.phase.swap(PHASE_READY, Ordering::AcqRel);
        tracing::trace!(prev_phase = prev, "operation state ready");

        self.ready_cv.notify_all();
        let signals: SmallVec<[Arc<WaitSignal>; 2]> = guarded
            .external
            .iter()
            .map(|(_, signal)| Arc::clone(signal))
            .collect();
        drop(guarded);

        for signal in signals {
            signal.notify();
        }
        if let Some(set) = &self.continuations {
            set.request_run();
        }
        Ok(())
    }

    /// Launches a deferred state if it has not been launched yet.
    ///
    /// Takes the stored task under the lock, marks the state launched, then
    /// then, with the lock released, waits for the task's parent and submits
    /// the task to the state's executor, or runs it inline when there is
    /// none.
    pub(crate) fn launch(&self) {
        let guard = lock(&self.guarded);
        drop(self.launch_locked(guard));
    }

    fn launch_locked<'a>(
        &'a self,
        mut guarded: MutexGuard<'a, Guarded<T>>,
    ) -> MutexGuard<'a, Guarded<T>> {
        if self.phase_now() != PHASE_DEFERRED {
            return guarded;
        }
        let task = guarded.task.take();
        self.phase.store(PHASE_LAUNCHED, Ordering::Release);
        if let Some(DeferredTask { parent, run }) = task {
            tracing::trace!("launching deferred task");
            drop(guarded);
            if let Some(parent) = parent {
                parent.wait_ready();
            }
            match &self.executor {
                Some(executor) => executor.execute_boxed(run),
                None => run(),
            }
            guarded = lock(&self.guarded);
        }
        guarded
    }

    /// Waits for the ready transition, launching deferred states.
    ///
    /// With a deadline, returns `Timeout` once it passes, reverting the
    /// phase from `Waiting` back to `Launched`. Waits on an already-ready
    /// state return without touching the mutex.
    pub(crate) fn wait_deadline(&self, deadline: Option<Instant>) -> FutureStatus {
        if self.is_ready() {
            return FutureStatus::Ready;
        }

        let mut guarded = lock(&self.guarded);
        guarded = self.launch_locked(guarded);
        if self.is_ready() {
            return FutureStatus::Ready;
        }

        self.phase.store(PHASE_WAITING, Ordering::Release);
        while !self.is_ready() {
            match deadline {
                None => {
                    guarded = match self.ready_cv.wait(guarded) {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        // We hold the mutex, so no completion can interleave
                        // between this check and the revert.
                        self.phase.store(PHASE_LAUNCHED, Ordering::Release);
                        return FutureStatus::Timeout;
                    }
                    let (guard, _timed_out) =
                        match self.ready_cv.wait_timeout(guarded, deadline - now) {
                            Ok(r) => r,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                    guarded = guard;
                }
            }
        }
        FutureStatus::Ready
    }

    /// Blocks until ready, launching deferred states.
    pub(crate) fn wait(&self) {
        let _ = self.wait_deadline(None);
    }

    /// Registers an external signal to notify when this state becomes
    /// ready.
    ///
    /// Registration launches a deferred state (a disjunctive waiter is a
    /// consumer) and moves a pending state to `Waiting`. Registering on an
    /// already-ready state is harmless: the caller's scan will observe
    /// readiness directly.
    pub(crate) fn notify_when_ready(&self, signal: Arc<WaitSignal>) -> NotifyHandle {
        let guarded = lock(&self.guarded);
        let mut guarded = self.launch_locked(guarded);
        if self.phase_now() != PHASE_READY {
            self.phase.store(PHASE_WAITING, Ordering::Release);
        }
        let id = guarded.next_external_id;
        guarded.next_external_id += 1;
        guarded.external.push((id, signal));
        NotifyHandle(id)
    }

    /// Removes a previously registered external signal.
    pub(crate) fn unnotify_when_ready(&self, handle: NotifyHandle) {
        let mut guarded = lock(&self.guarded);
        guarded.external.retain(|(id, _)| *id != handle.0);
    }

    /// Destructive outcome read. Defined once the state is ready.
    pub(crate) fn take_outcome(&self) -> Result<T> {
        lock(&self.guarded).slot.take()
    }

    /// Cloning outcome read for shared consumers.
    pub(crate) fn peek_outcome(&self) -> Result<T>
    where
        T: Clone,
    {
        lock(&self.guarded).slot.peek()
    }
}

impl<T: Send> ParentWait for OperationState<T> {
    fn wait_ready(&self) {
        self.wait();
    }
}

impl<T: Send> LaunchTask for OperationState<T> {
    fn launch_task(&self) {
        self.launch();
    }
}

impl<T> Drop for OperationState<T> {
    fn drop(&mut self) {
        // A state dying with a running stoppable task asks it to wind down.
        if let Some(stop) = &self.stop {
            stop.request_stop();
        }
    }
}

impl<T> std::fmt::Debug for OperationState<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phase = match self.phase_now() {
            PHASE_DEFERRED => "deferred",
            PHASE_LAUNCHED => "launched",
            PHASE_WAITING => "waiting",
            _ => "ready",
        };
        f.debug_struct("OperationState")
            .field("phase", &phase)
            .field("continuable", &self.supports_continuations())
            .field("stoppable", &self.stop.is_some())
            .field("has_executor", &self.executor.is_some())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
