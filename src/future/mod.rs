//! Future handles: thin ownership wrappers over operation states.
//!
//! A [`Future`] is the unique consumer handle: move-only, with a
//! destructive [`Future::get`] that consumes the handle. [`SharedFuture`]
//! allows multiple coexisting readers over a cloneable value.
//! [`Promise`] and [`PackagedTask`] are the producer handles.

pub mod promise;
pub mod shared;

pub use promise::{PackagedTask, Promise};
pub use shared::SharedFuture;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cancel::StopToken;
use crate::combinator::then::{continue_unique, forward_into, successor_state};
use crate::combinator::when_all::when_all2;
use crate::combinator::when_any::{when_any, WhenAny};
use crate::error::Result;
use crate::executor::ExecutorHandle;
use crate::launch::run_catching;
use crate::state::operation::{NotifyHandle, OperationState};
use crate::state::waiter::{FutureStatus, WaitSignal};

/// The unique handle to an asynchronous value.
///
/// Futures are move-only; [`Future::get`] consumes the handle, so a
/// consumed future is unrepresentable rather than "invalid". Dropping a
/// future with an unretrieved outcome does not block.
#[must_use = "a future does nothing for its consumer unless waited on"]
pub struct Future<T> {
    state: Arc<OperationState<T>>,
}

impl<T: Send + 'static> Future<T> {
    pub(crate) fn from_state(state: Arc<OperationState<T>>) -> Self {
        Self { state }
    }

    pub(crate) fn state(&self) -> &Arc<OperationState<T>> {
        &self.state
    }

    pub(crate) fn into_state(self) -> Arc<OperationState<T>> {
        self.state
    }

    /// True once the outcome is set. Never blocks.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    /// True while a deferred task has not been launched.
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        self.state.is_deferred()
    }

    /// Blocks until the outcome is ready, launching a deferred task.
    pub fn wait(&self) {
        self.state.wait();
    }

    /// Bounded wait. Returns [`FutureStatus::Deferred`] without launching
    /// when the task has not been started; use [`Future::wait`] or
    /// [`Future::get`] to launch.
    pub fn wait_for(&self, timeout: Duration) -> FutureStatus {
        self.wait_until(Instant::now() + timeout)
    }

    /// Bounded wait against a deadline. See [`Future::wait_for`].
    pub fn wait_until(&self, deadline: Instant) -> FutureStatus {
        if self.state.is_deferred() {
            return FutureStatus::Deferred;
        }
        self.state.wait_deadline(Some(deadline))
    }

    /// Waits for and returns the outcome, consuming the handle.
    pub fn get(self) -> Result<T> {
        self.state.wait();
        self.state.take_outcome()
    }

    /// Converts this unique future into a shared one.
    pub fn share(self) -> SharedFuture<T>
    where
        T: Clone,
    {
        SharedFuture::from_state(self.state)
    }

    /// True when continuations attach without a waiting bridge.
    #[must_use]
    pub fn supports_continuations(&self) -> bool {
        self.state.supports_continuations()
    }

    /// The executor this future's task and continuations default to.
    #[must_use]
    pub fn executor(&self) -> Option<ExecutorHandle> {
        self.state.executor().cloned()
    }

    /// A token observing this future's stop source, when stoppable.
    #[must_use]
    pub fn stop_token(&self) -> Option<StopToken> {
        self.state.stop_source().map(crate::cancel::StopSource::token)
    }

    /// Requests a stop on a stoppable future's task.
    ///
    /// Returns `true` if this call performed the request; `false` when the
    /// future is not stoppable or the request already landed.
    pub fn request_stop(&self) -> bool {
        self.state
            .stop_source()
            .is_some_and(crate::cancel::StopSource::request_stop)
    }

    /// Registers an external signal notified when this future is ready.
    ///
    /// Used by disjunctive waits; registration launches a deferred task.
    pub fn notify_when_ready(&self, signal: Arc<WaitSignal>) -> NotifyHandle {
        self.state.notify_when_ready(signal)
    }

    /// Removes a registration made by [`Future::notify_when_ready`].
    pub fn unnotify_when_ready(&self, handle: NotifyHandle) {
        self.state.unnotify_when_ready(handle)
    }

    /// Attaches a value continuation.
    ///
    /// `f` receives the value; a predecessor error propagates to the
    /// returned future without invoking `f`. The continuation runs on this
    /// future's executor when it has one, inline on the completing thread
    /// otherwise.
    pub fn then<U, F>(self, f: F) -> Future<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        continue_unique(self, None, move |outcome| {
            outcome.and_then(|value| run_catching(move || f(value)))
        })
    }

    /// Attaches a value continuation scheduled on `executor`.
    pub fn then_on<U, F>(self, executor: &ExecutorHandle, f: F) -> Future<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        continue_unique(self, Some(executor.clone()), move |outcome| {
            outcome.and_then(|value| run_catching(move || f(value)))
        })
    }

    /// Attaches a continuation that receives the full outcome, so error
    /// handling can happen inside the chain.
    pub fn then_result<U, F>(self, f: F) -> Future<U>
    where
        U: Send + 'static,
        F: FnOnce(Result<T>) -> U + Send + 'static,
    {
        continue_unique(self, None, move |outcome| run_catching(move || f(outcome)))
    }

    /// Attaches a continuation returning a future; the result is the inner
    /// future's value, not a future of a future.
    pub fn and_then<U, F>(self, f: F) -> Future<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Future<U> + Send + 'static,
    {
        self.then(f).flatten()
    }
}

impl<U: Send + 'static> Future<Future<U>> {
    /// Unwraps one level of future nesting.
    pub fn flatten(self) -> Future<U> {
        successor_state(self.into_state(), None, |reader, guard| {
            Box::new(move || {
                reader.wait();
                match reader.take_outcome() {
                    Ok(inner) => forward_into(inner, guard),
                    Err(err) => guard.finish(Err(err)),
                }
            })
        })
    }
}

impl<T> std::fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Future").field("state", &self.state).finish()
    }
}

/// `a & b` is sugar for the binary conjunction: a future of the pair of
/// (then ready) input futures. Chaining nests pair aggregates; the
/// [`crate::ThenUnpack`] trait unpacks through the nesting, so
/// `(a & b & c).then_unpack(|a, b, c| ...)` still receives positional
/// values. `when_all3`/`when_all4` build flat tuples directly.
impl<A, B> std::ops::BitAnd<Future<B>> for Future<A>
where
    A: Send + 'static,
    B: Send + 'static,
{
    type Output = Future<(Future<A>, Future<B>)>;

    fn bitand(self, rhs: Future<B>) -> Self::Output {
        when_all2(self, rhs)
    }
}

/// `a | b` is sugar for the binary disjunction over futures of one value
/// type. Use [`crate::when_any`] for wider input sets.
impl<T: Send + 'static> std::ops::BitOr for Future<T> {
    type Output = Future<WhenAny<T>>;

    fn bitor(self, rhs: Self) -> Self::Output {
        when_any(vec![self, rhs])
    }
}
