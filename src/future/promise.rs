//! Producer handles: promises and packaged tasks.
//!
//! A [`Promise`] lets arbitrary code set the value or error of a state
//! exactly once; a [`PackagedTask`] wraps a stored closure whose run does
//! the same. Destroying either without producing an outcome installs a
//! broken-promise error so consumers are never stranded.
//!
//! Promise-backed states are not continuable: combinators fall back to
//! bounded polling or external-signal waits for them, and `then` bridges
//! through the pool.

use std::sync::Arc;

use super::Future;
use crate::error::{Error, ErrorKind, Result};
use crate::launch::run_catching;
use crate::state::operation::OperationState;

/// The producing side of a future/promise pair.
#[derive(Debug)]
pub struct Promise<T> {
    state: Arc<OperationState<T>>,
    retrieved: bool,
}

impl<T: Send + 'static> Promise<T> {
    /// Creates a promise with a fresh, unset state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(OperationState::new(false, None, None, None)),
            retrieved: false,
        }
    }

    /// Returns the consumer future. Callable at most once.
    pub fn future(&mut self) -> Result<Future<T>> {
        if self.retrieved {
            return Err(Error::new(ErrorKind::FutureAlreadyRetrieved));
        }
        self.retrieved = true;
        Ok(Future::from_state(Arc::clone(&self.state)))
    }

    /// Fulfills the promise with a value.
    ///
    /// Errors with `AlreadySatisfied` if an outcome was already set.
    pub fn set_value(&self, value: T) -> Result<()> {
        self.state.complete(Ok(value))
    }

    /// Fails the promise with an error.
    pub fn set_error(&self, error: Error) -> Result<()> {
        self.state.complete(Err(error))
    }

    /// True once an outcome has been set.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }
}

impl<T: Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if !self.state.is_ready() {
            let _ = self.state.complete(Err(Error::broken_promise()));
        }
    }
}

/// A stored computation bound to a future.
///
/// Unlike [`crate::spawn`], the caller decides where and when the task
/// runs by invoking [`PackagedTask::run`].
pub struct PackagedTask<T> {
    task: Option<Box<dyn FnOnce() -> T + Send>>,
    state: Arc<OperationState<T>>,
    retrieved: bool,
}

impl<T: Send + 'static> PackagedTask<T> {
    /// Packages `f` with a fresh state.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self {
            task: Some(Box::new(f)),
            state: Arc::new(OperationState::new(false, None, None, None)),
            retrieved: false,
        }
    }

    /// Returns the consumer future. Callable at most once.
    pub fn future(&mut self) -> Result<Future<T>> {
        if self.retrieved {
            return Err(Error::new(ErrorKind::FutureAlreadyRetrieved));
        }
        self.retrieved = true;
        Ok(Future::from_state(Arc::clone(&self.state)))
    }

    /// Runs the stored task on the calling thread and completes the state.
    ///
    /// A second run errors with `AlreadySatisfied`. A panicking task is
    /// recorded as a `TaskPanicked` outcome; `run` itself returns `Ok`.
    pub fn run(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Err(Error::already_satisfied());
        };
        self.state.complete(run_catching(task))
    }
}

impl<T> Drop for PackagedTask<T> {
    fn drop(&mut self) {
        if !self.state.is_ready() {
            let _ = self.state.complete(Err(Error::broken_promise()));
        }
    }
}

impl<T> std::fmt::Debug for PackagedTask<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackagedTask")
            .field("pending", &self.task.is_some())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use std::time::Duration;

    #[test]
    fn set_value_delivers_to_future() {
        init_test_logging();
        let mut promise = Promise::new();
        let future = promise.future().expect("future");

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            promise.set_value(7).expect("set");
        });

        assert_eq!(future.get().expect("value"), 7);
        handle.join().expect("thread panicked");
    }

    #[test]
    fn set_error_surfaces_through_get() {
        init_test_logging();
        let mut promise = Promise::<u32>::new();
        let future = promise.future().expect("future");
        promise
            .set_error(Error::new(ErrorKind::StopRequested))
            .expect("set error");
        let err = future.get().expect_err("error");
        assert_eq!(err.kind(), ErrorKind::StopRequested);
    }

    #[test]
    fn second_set_reports_already_satisfied() {
        init_test_logging();
        let promise = Promise::new();
        promise.set_value(1).expect("first");
        let err = promise.set_value(2).expect_err("second");
        assert!(err.is_already_satisfied());
    }

    #[test]
    fn future_is_retrievable_once() {
        init_test_logging();
        let mut promise = Promise::<()>::new();
        let _future = promise.future().expect("first");
        let err = promise.future().expect_err("second");
        assert_eq!(err.kind(), ErrorKind::FutureAlreadyRetrieved);
    }

    #[test]
    fn dropping_promise_breaks_it() {
        init_test_logging();
        let mut promise = Promise::<u32>::new();
        let future = promise.future().expect("future");
        drop(promise);
        let err = future.get().expect_err("broken");
        assert!(err.is_broken_promise());
    }

    #[test]
    fn promise_futures_are_not_continuable() {
        init_test_logging();
        let mut promise = Promise::<u32>::new();
        let future = promise.future().expect("future");
        assert!(!future.supports_continuations());
    }

    #[test]
    fn packaged_task_runs_once() {
        init_test_logging();
        let mut task = PackagedTask::new(|| 6 * 7);
        let future = task.future().expect("future");

        task.run().expect("run");
        let err = task.run().expect_err("second run");
        assert!(err.is_already_satisfied());

        assert_eq!(future.get().expect("value"), 42);
    }

    #[test]
    fn packaged_task_records_panics() {
        init_test_logging();
        let mut task = PackagedTask::new(|| -> u32 { panic!("kaboom") });
        let future = task.future().expect("future");
        task.run().expect("run returns ok");
        let err = future.get().expect_err("panic outcome");
        assert!(err.is_panic());
    }

    #[test]
    fn dropping_unrun_task_breaks_the_future() {
        init_test_logging();
        let mut task = PackagedTask::new(|| 1);
        let future = task.future().expect("future");
        drop(task);
        let err = future.get().expect_err("broken");
        assert!(err.is_broken_promise());
    }
}
