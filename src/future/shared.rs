//! Shared futures: reference-countable clones of a unique future.
//!
//! Shared reads are non-destructive, so the value type must be `Clone`;
//! every reader (and every attached continuation) receives its own copy.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::Future;
use crate::combinator::then::continue_shared;
use crate::error::Result;
use crate::executor::ExecutorHandle;
use crate::launch::run_catching;
use crate::state::operation::OperationState;
use crate::state::waiter::FutureStatus;

/// A cloneable consumer handle over one operation state.
#[must_use = "a shared future does nothing for its consumer unless waited on"]
pub struct SharedFuture<T: Clone> {
    state: Arc<OperationState<T>>,
}

impl<T: Clone + Send + 'static> SharedFuture<T> {
    pub(crate) fn from_state(state: Arc<OperationState<T>>) -> Self {
        Self { state }
    }

    /// True once the outcome is set. Never blocks.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    /// Blocks until the outcome is ready, launching a deferred task.
    pub fn wait(&self) {
        self.state.wait();
    }

    /// Bounded wait; `Deferred` when the task has not been launched.
    pub fn wait_for(&self, timeout: Duration) -> FutureStatus {
        self.wait_until(Instant::now() + timeout)
    }

    /// Bounded wait against a deadline.
    pub fn wait_until(&self, deadline: Instant) -> FutureStatus {
        if self.state.is_deferred() {
            return FutureStatus::Deferred;
        }
        self.state.wait_deadline(Some(deadline))
    }

    /// Waits for the outcome and returns a clone of it.
    ///
    /// Any number of holders may call this; each receives its own copy of
    /// the value or the error.
    pub fn get(&self) -> Result<T> {
        self.state.wait();
        self.state.peek_outcome()
    }

    /// True when continuations attach without a waiting bridge.
    #[must_use]
    pub fn supports_continuations(&self) -> bool {
        self.state.supports_continuations()
    }

    /// The executor this future's continuations default to.
    #[must_use]
    pub fn executor(&self) -> Option<ExecutorHandle> {
        self.state.executor().cloned()
    }

    /// Attaches a value continuation; the value is cloned for it.
    ///
    /// Multiple continuations may attach to the same shared future; each
    /// gets its own clone.
    pub fn then<U, F>(&self, f: F) -> Future<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        continue_shared(Arc::clone(&self.state), None, move |outcome| {
            outcome.and_then(|value| run_catching(move || f(value)))
        })
    }

    /// Attaches a continuation receiving the (cloned) outcome.
    pub fn then_result<U, F>(&self, f: F) -> Future<U>
    where
        U: Send + 'static,
        F: FnOnce(Result<T>) -> U + Send + 'static,
    {
        continue_shared(Arc::clone(&self.state), None, move |outcome| {
            run_catching(move || f(outcome))
        })
    }
}

impl<T: Clone> Clone for SharedFuture<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone> std::fmt::Debug for SharedFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedFuture")
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::launch::{schedule, spawn};
    use crate::test_utils::init_test_logging;

    #[test]
    fn multiple_holders_read_the_same_value() {
        init_test_logging();
        let shared = spawn(|| String::from("hello")).share();
        let other = shared.clone();

        assert_eq!(shared.get().expect("value"), "hello");
        assert_eq!(other.get().expect("value"), "hello");
        // Reads are non-destructive.
        assert_eq!(shared.get().expect("value"), "hello");
    }

    #[test]
    fn shared_deferred_future_launches_on_first_wait() {
        init_test_logging();
        let shared = schedule(|| 9).share();
        let other = shared.clone();
        assert_eq!(other.get().expect("value"), 9);
        assert_eq!(shared.get().expect("value"), 9);
    }

    #[test]
    fn errors_clone_to_every_holder() {
        init_test_logging();
        let shared = spawn(|| -> u32 { panic!("shared boom") }).share();
        let other = shared.clone();
        assert!(shared.get().expect_err("panic").is_panic());
        assert!(other.get().expect_err("panic").is_panic());
    }

    #[test]
    fn several_continuations_each_get_a_clone() {
        init_test_logging();
        let shared = spawn(|| 10).share();
        let doubled = shared.then(|v| v * 2);
        let tripled = shared.then(|v| v * 3);
        assert_eq!(doubled.get().expect("value"), 20);
        assert_eq!(tripled.get().expect("value"), 30);
    }
}
