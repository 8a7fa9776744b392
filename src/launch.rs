//! Launchers: build an operation state, wire it to an executor, return a
//! future.
//!
//! [`spawn`] submits the task at construction (eager). [`schedule`] stores
//! it; the task runs only when a consumer first performs a blocking
//! operation on the future or on a future derived from it (deferred). The
//! `_with_token` variants attach a stop source and pass a [`StopToken`] to
//! the task.
//!
//! Every launched task completes its state through a [`TaskGuard`]: if an
//! executor tears down with the task still queued, the guard installs a
//! broken-promise error instead of leaving waiters blocked forever.

use std::sync::{Arc, Weak};

use crate::cancel::{StopSource, StopToken};
use crate::error::{panic_message, Error, Result};
use crate::executor::{default_executor, ExecutorHandle};
use crate::future::Future;
use crate::state::continuations::ContinuationSet;
use crate::state::operation::{DeferredTask, OperationState};

/// Runs a closure, converting a panic into a [`TaskPanicked`] error.
///
/// [`TaskPanicked`]: crate::error::ErrorKind::TaskPanicked
pub(crate) fn run_catching<R>(f: impl FnOnce() -> R) -> Result<R> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(f))
        .map_err(|payload| Error::panicked(panic_message(payload.as_ref())))
}

/// Completes an operation state exactly once, even if the task never runs.
///
/// Holds a weak reference so an abandoned state (all handles dropped, no
/// dependents) can be reclaimed before the task executes.
pub(crate) struct TaskGuard<T> {
    state: Weak<OperationState<T>>,
    completed: bool,
}

impl<T: Send + 'static> TaskGuard<T> {
    pub(crate) fn new(state: &Arc<OperationState<T>>) -> Self {
        Self {
            state: Arc::downgrade(state),
            completed: false,
        }
    }

    /// Completes the state with `outcome`. Consumes the guard.
    pub(crate) fn finish(mut self, outcome: Result<T>) {
        self.completed = true;
        if let Some(state) = self.state.upgrade() {
            let _ = state.complete(outcome);
        }
    }
}

impl<T> Drop for TaskGuard<T> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        if let Some(state) = self.state.upgrade() {
            if !state.is_ready() {
                tracing::debug!("task dropped before completion; installing broken promise");
                let _ = state.complete(Err(
                    Error::broken_promise().with_context("task dropped before completion")
                ));
            }
        }
    }
}

/// Runs `f` on the default pool executor; returns the eager future of its
/// result.
pub fn spawn<T, F>(f: F) -> Future<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    spawn_on(&default_executor(), f)
}

/// Runs `f` on `executor`; returns the eager future of its result.
pub fn spawn_on<T, F>(executor: &ExecutorHandle, f: F) -> Future<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let state = Arc::new(OperationState::new(
        false,
        Some(ContinuationSet::eager()),
        None,
        Some(executor.clone()),
    ));
    let guard = TaskGuard::new(&state);
    executor.execute(move || guard.finish(run_catching(f)));
    Future::from_state(state)
}

/// Like [`spawn`], with a stop source attached; `f` receives a token it is
/// expected to check cooperatively.
pub fn spawn_with_token<T, F>(f: F) -> Future<T>
where
    T: Send + 'static,
    F: FnOnce(StopToken) -> T + Send + 'static,
{
    spawn_on_with_token(&default_executor(), f)
}

/// Like [`spawn_on`], with a stop source attached.
pub fn spawn_on_with_token<T, F>(executor: &ExecutorHandle, f: F) -> Future<T>
where
    T: Send + 'static,
    F: FnOnce(StopToken) -> T + Send + 'static,
{
    let stop = StopSource::new();
    let token = stop.token();
    let state = Arc::new(OperationState::new(
        false,
        Some(ContinuationSet::eager()),
        Some(stop),
        Some(executor.clone()),
    ));
    let guard = TaskGuard::new(&state);
    executor.execute(move || guard.finish(run_catching(move || f(token))));
    Future::from_state(state)
}

/// Stores `f` in a deferred state; it runs inline on the first waiting
/// thread.
pub fn schedule<T, F>(f: F) -> Future<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    schedule_impl(None, None, f)
}

/// Stores `f` in a deferred state bound to `executor`; the first waiting
/// thread submits it there.
pub fn schedule_on<T, F>(executor: &ExecutorHandle, f: F) -> Future<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    schedule_impl(Some(executor.clone()), None, f)
}

/// Like [`schedule`], with a stop source attached.
pub fn schedule_with_token<T, F>(f: F) -> Future<T>
where
    T: Send + 'static,
    F: FnOnce(StopToken) -> T + Send + 'static,
{
    let stop = StopSource::new();
    let token = stop.token();
    schedule_impl(None, Some(stop), move || f(token))
}

/// Like [`schedule_on`], with a stop source attached.
pub fn schedule_on_with_token<T, F>(executor: &ExecutorHandle, f: F) -> Future<T>
where
    T: Send + 'static,
    F: FnOnce(StopToken) -> T + Send + 'static,
{
    let stop = StopSource::new();
    let token = stop.token();
    schedule_impl(Some(executor.clone()), Some(stop), move || f(token))
}

fn schedule_impl<T, F>(
    executor: Option<ExecutorHandle>,
    stop: Option<StopSource>,
    f: F,
) -> Future<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let state = Arc::new(OperationState::new(
        true,
        Some(ContinuationSet::deferred()),
        stop,
        executor,
    ));
    let guard = TaskGuard::new(&state);
    state.set_task(DeferredTask {
        parent: None,
        run: Box::new(move || guard.finish(run_catching(f))),
    });
    Future::from_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::PoolExecutor;
    use crate::test_utils::init_test_logging;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn spawn_returns_task_result() {
        init_test_logging();
        let future = spawn(|| 42);
        assert_eq!(future.get().expect("value"), 42);
    }

    #[test]
    fn spawn_on_uses_the_given_pool() {
        init_test_logging();
        let pool = ExecutorHandle::new(PoolExecutor::new(1));
        let future = spawn_on(&pool, || std::thread::current().name().map(String::from));
        let name = future.get().expect("value").unwrap_or_default();
        assert!(name.starts_with("awaitless-worker"), "ran on {name}");
    }

    #[test]
    fn spawn_records_panic_as_error() {
        init_test_logging();
        let future = spawn(|| -> u32 { panic!("exploded") });
        let err = future.get().expect_err("panic should surface");
        assert!(err.is_panic());
        assert!(err.to_string().contains("exploded"));
    }

    #[test]
    fn schedule_is_lazy_until_wait() {
        init_test_logging();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = Arc::clone(&counter);
        let future = schedule(move || {
            counter2.store(1, Ordering::SeqCst);
            0
        });

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(counter.load(Ordering::SeqCst), 0, "ran before demand");

        assert_eq!(future.get().expect("value"), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn schedule_runs_inline_on_the_waiting_thread() {
        init_test_logging();
        let waiter = std::thread::current().id();
        let future = schedule(move || std::thread::current().id() == waiter);
        assert!(future.get().expect("value"));
    }

    #[test]
    fn schedule_on_runs_on_the_executor() {
        init_test_logging();
        let pool = ExecutorHandle::new(PoolExecutor::new(1));
        let caller = std::thread::current().id();
        let future = schedule_on(&pool, move || std::thread::current().id() != caller);
        assert!(future.get().expect("value"));
    }

    #[test]
    fn token_variants_pass_an_unrequested_token() {
        init_test_logging();
        let future = spawn_with_token(|token: StopToken| token.stop_requested());
        assert!(!future.get().expect("value"));

        let future = schedule_with_token(|token: StopToken| token.stop_requested());
        assert!(!future.get().expect("value"));
    }

    #[test]
    fn guard_installs_broken_promise_when_task_is_dropped() {
        init_test_logging();

        // An executor that drops tasks instead of running them.
        struct Dropper;
        impl crate::executor::Executor for Dropper {
            fn execute(&self, task: crate::executor::TaskFn) {
                drop(task);
            }
        }

        let handle = ExecutorHandle::new(Dropper);
        let future = spawn_on(&handle, || 1);
        let err = future.get().expect_err("task was dropped");
        assert!(err.is_broken_promise());
    }
}
