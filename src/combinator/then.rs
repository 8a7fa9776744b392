//! Successor-state construction for continuations.
//!
//! Every `then`-family method lowers to [`successor_state`]: build the
//! successor operation state, derive its stop source, and wire a body that
//! reads the predecessor's outcome and completes the successor.
//!
//! Attachment picks one of three routes:
//!
//! - **Deferred predecessor**: the successor is itself deferred. Its stored
//!   task names the predecessor as parent, so the successor's launch first
//!   waits for (and thereby launches) the predecessor. Laziness composes.
//! - **Eager continuable predecessor**: the body is pushed into the
//!   predecessor's continuation list. When the predecessor carries an
//!   executor, the recorded entry re-enters it; otherwise the body runs
//!   inline on the completing thread. A push after completion runs the
//!   entry immediately from the attaching thread.
//! - **Eager non-continuable predecessor** (promise-backed): a waiting
//!   bridge task blocks until the predecessor is ready, then runs the body.
//!   The bridge runs on the chosen executor (the override, then the
//!   predecessor's) and falls back to the default pool.

use std::sync::Arc;

use crate::cancel::StopSource;
use crate::error::Result;
use crate::executor::{default_executor, inline_executor, ExecutorHandle, TaskFn};
use crate::future::Future;
use crate::launch::TaskGuard;
use crate::state::continuations::ContinuationSet;
use crate::state::operation::{DeferredTask, OperationState, ParentWait};

/// Derives the successor's stop source from the predecessor's.
///
/// A stop request on the successor propagates upstream; the predecessor's
/// own requests are not mirrored downstream.
fn derive_stop<T>(pred: &Arc<OperationState<T>>) -> Option<StopSource> {
    pred.stop_source().map(|upstream| {
        let source = StopSource::new();
        let upstream = upstream.clone();
        source.on_stop(move || {
            upstream.request_stop();
        });
        source
    })
}

/// Builds a successor state attached to `pred`.
///
/// `build_body` receives the predecessor state and a guard that completes
/// the successor; the returned task must wait for the predecessor (a ready
/// fast-path when invoked from the continuation list), read its outcome,
/// and finish the guard.
pub(crate) fn successor_state<T, U>(
    pred: Arc<OperationState<T>>,
    executor_override: Option<ExecutorHandle>,
    build_body: impl FnOnce(Arc<OperationState<T>>, TaskGuard<U>) -> TaskFn,
) -> Future<U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    let chosen = executor_override.or_else(|| pred.executor().cloned());
    let stop = derive_stop(&pred);

    if pred.is_deferred() {
        let successor = Arc::new(OperationState::new(
            true,
            Some(ContinuationSet::deferred()),
            stop,
            chosen,
        ));
        let guard = TaskGuard::new(&successor);
        let run = build_body(Arc::clone(&pred), guard);
        let parent: Arc<dyn ParentWait> = Arc::clone(&pred) as Arc<dyn ParentWait>;
        successor.set_task(DeferredTask {
            parent: Some(parent),
            run,
        });
        return Future::from_state(successor);
    }

    let successor = Arc::new(OperationState::new(
        false,
        Some(ContinuationSet::eager()),
        stop,
        chosen.clone(),
    ));
    let guard = TaskGuard::new(&successor);
    let body = build_body(Arc::clone(&pred), guard);

    match pred.continuations() {
        Some(set) => {
            let entry: TaskFn = match chosen {
                Some(executor) => Box::new(move || executor.execute_boxed(body)),
                None => body,
            };
            set.push(&inline_executor(), entry);
        }
        None => {
            // The predecessor cannot call us back; park a bridge that
            // waits for it, on the chosen executor when one was named.
            match chosen {
                Some(executor) => executor.execute_boxed(body),
                None => default_executor().execute_boxed(body),
            }
        }
    }
    Future::from_state(successor)
}

/// Attaches `g` as a continuation of `pred`; `g` receives the ready
/// predecessor's outcome and its return value becomes the successor's.
pub(crate) fn continue_unique<T, U, G>(
    pred: Future<T>,
    executor_override: Option<ExecutorHandle>,
    g: G,
) -> Future<U>
where
    T: Send + 'static,
    U: Send + 'static,
    G: FnOnce(Result<T>) -> Result<U> + Send + 'static,
{
    successor_state(pred.into_state(), executor_override, |reader, guard| {
        Box::new(move || {
            reader.wait();
            guard.finish(g(reader.take_outcome()));
        })
    })
}

/// Shared-future variant of [`continue_unique`]: the predecessor's outcome
/// is cloned, so any number of continuations may attach.
pub(crate) fn continue_shared<T, U, G>(
    pred: Arc<OperationState<T>>,
    executor_override: Option<ExecutorHandle>,
    g: G,
) -> Future<U>
where
    T: Clone + Send + 'static,
    U: Send + 'static,
    G: FnOnce(Result<T>) -> Result<U> + Send + 'static,
{
    successor_state(pred, executor_override, |reader, guard| {
        Box::new(move || {
            reader.wait();
            guard.finish(g(reader.peek_outcome()));
        })
    })
}

/// Completes `guard`'s state with `inner`'s outcome once `inner` is ready.
///
/// This is the unwrapping step behind `and_then`/`flatten`: the outer
/// future resolved to `inner`, and the flattened future must adopt
/// `inner`'s outcome without nesting. A deferred `inner` is launched here;
/// the outer future only completed because something demanded the chain.
pub(crate) fn forward_into<U: Send + 'static>(inner: Future<U>, guard: TaskGuard<U>) {
    let state = inner.into_state();
    let reader = Arc::clone(&state);
    let body: TaskFn = Box::new(move || {
        reader.wait();
        guard.finish(reader.take_outcome());
    });
    match state.continuations() {
        Some(set) => {
            if state.is_deferred() {
                state.launch();
            }
            set.push(&inline_executor(), body);
        }
        None => default_executor().execute_boxed(body),
    }
}
