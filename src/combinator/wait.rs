//! Blocking waits over future collections, producing no new future.
//!
//! `wait_for_all*` waits each input in turn (a conjunction of waits shares
//! one deadline). `wait_for_any*` registers a shared signal on every input,
//! scans for readiness, and blocks on the signal between scans: the same
//! disjunctive protocol the `when_any` fallback uses, on the caller's
//! thread.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, ErrorKind, Result};
use crate::future::Future;
use crate::state::waiter::{FutureStatus, WaitSignal};

/// Blocks until every future in `futures` is ready.
pub fn wait_for_all<T: Send + 'static>(futures: &[Future<T>]) {
    for future in futures {
        future.wait();
    }
}

/// Bounded [`wait_for_all`]; the whole collection shares one deadline.
pub fn wait_for_all_for<T: Send + 'static>(
    timeout: Duration,
    futures: &[Future<T>],
) -> FutureStatus {
    wait_for_all_until(Instant::now() + timeout, futures)
}

/// Bounded [`wait_for_all`] against an absolute deadline.
pub fn wait_for_all_until<T: Send + 'static>(
    deadline: Instant,
    futures: &[Future<T>],
) -> FutureStatus {
    for future in futures {
        let _ = future.state().wait_deadline(Some(deadline));
    }
    if futures.iter().all(|future| future.is_ready()) {
        FutureStatus::Ready
    } else {
        FutureStatus::Timeout
    }
}

/// Blocks until any future in `futures` is ready; returns its index.
///
/// Errors with `InvalidInput` on an empty slice. Deferred inputs are
/// launched by the registration step, exactly as a direct wait would.
pub fn wait_for_any<T: Send + 'static>(futures: &[Future<T>]) -> Result<usize> {
    match wait_for_any_inner(futures, None)? {
        Some(index) => Ok(index),
        None => Err(Error::new(ErrorKind::Internal)
            .with_context("unbounded disjunctive wait returned without a winner")),
    }
}

/// Bounded [`wait_for_any`]; `Ok(None)` when the timeout passes first.
pub fn wait_for_any_for<T: Send + 'static>(
    timeout: Duration,
    futures: &[Future<T>],
) -> Result<Option<usize>> {
    wait_for_any_inner(futures, Some(Instant::now() + timeout))
}

/// Bounded [`wait_for_any`] against an absolute deadline.
pub fn wait_for_any_until<T: Send + 'static>(
    deadline: Instant,
    futures: &[Future<T>],
) -> Result<Option<usize>> {
    wait_for_any_inner(futures, Some(deadline))
}

fn wait_for_any_inner<T: Send + 'static>(
    futures: &[Future<T>],
    deadline: Option<Instant>,
) -> Result<Option<usize>> {
    if futures.is_empty() {
        return Err(Error::new(ErrorKind::InvalidInput)
            .with_context("wait_for_any requires at least one input"));
    }
    if let Some(index) = futures.iter().position(|future| future.is_ready()) {
        return Ok(Some(index));
    }

    let signal = Arc::new(WaitSignal::new());
    let registrations: Vec<_> = futures
        .iter()
        .map(|future| future.notify_when_ready(Arc::clone(&signal)))
        .collect();

    let winner = loop {
        let seen = signal.generation();
        if let Some(index) = futures.iter().position(|future| future.is_ready()) {
            break Some(index);
        }
        match deadline {
            None => signal.wait(seen),
            Some(deadline) => {
                if !signal.wait_until(seen, deadline)
                    && !futures.iter().any(|future| future.is_ready())
                {
                    break None;
                }
            }
        }
    };

    for (future, handle) in futures.iter().zip(registrations) {
        future.unnotify_when_ready(handle);
    }
    Ok(winner)
}
