//! Disjunction: a future that completes when any input has.
//!
//! Inputs with continuation support race through a winner CAS: the first
//! continuation to flip it completes the aggregate with the winning index
//! and the full (possibly still pending) input set.
//!
//! Inputs without continuation support are covered by a watch loop that
//! runs inline on the thread that launches the aggregate: it registers one
//! shared [`WaitSignal`] on every input, scans for readiness, and blocks on
//! the signal between scans. A winner from either path wins the CAS; no
//! thread is consumed before someone waits on the aggregate.
//!
//! The first *completion* wins, errors included; losers keep running.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, ErrorKind};
use crate::executor::inline_executor;
use crate::future::Future;
use crate::state::continuations::ContinuationSet;
use crate::state::operation::{DeferredTask, OperationState};
use crate::state::waiter::WaitSignal;

/// Bound on one blocking round of the watch loop; a winner decided by a
/// continuable input is observed within this tick.
const WATCH_TICK: Duration = Duration::from_millis(50);

/// Sentinel meaning "no winner yet".
const NO_WINNER: usize = usize::MAX;

/// The outcome of a disjunction: the index of the first input to complete,
/// plus every input future (losers possibly still pending).
#[derive(Debug)]
pub struct WhenAny<T> {
    /// Index of the winning input.
    pub index: usize,
    /// All input futures, in their original order.
    pub futures: Vec<Future<T>>,
}

struct AnyShared<T> {
    winner: AtomicUsize,
    slots: Mutex<Vec<Option<Future<T>>>>,
    target: Arc<OperationState<WhenAny<T>>>,
}

impl<T: Send + 'static> AnyShared<T> {
    /// Claims the win for `index`; only the first claim completes the
    /// aggregate.
    fn claim(&self, index: usize) {
        if self
            .winner
            .compare_exchange(NO_WINNER, index, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.finish(index);
        }
    }

    fn finish(&self, index: usize) {
        let mut slots = self.slots.lock();
        let taken: Vec<Option<Future<T>>> = slots.iter_mut().map(Option::take).collect();
        drop(slots);

        if taken.iter().any(Option::is_none) {
            let _ = self.target.complete(Err(Error::new(ErrorKind::Internal)
                .with_context("disjunction input missing at completion")));
            return;
        }
        let futures: Vec<Future<T>> = taken.into_iter().flatten().collect();
        let _ = self.target.complete(Ok(WhenAny { index, futures }));
    }

    fn decided(&self) -> bool {
        self.winner.load(Ordering::Acquire) != NO_WINNER
    }
}

/// Returns a future ready when any input is, carrying the winner's index
/// and the input set.
///
/// An empty input set completes with an `InvalidInput` error.
pub fn when_any<T, I>(futures: I) -> Future<WhenAny<T>>
where
    T: Send + 'static,
    I: IntoIterator<Item = Future<T>>,
{
    let futures: Vec<Future<T>> = futures.into_iter().collect();

    let any_deferred = futures.iter().any(Future::is_deferred);
    let any_plain = futures.iter().any(|f| !f.supports_continuations());
    // The watch loop must run on a launching thread, so the aggregate is
    // deferred whenever launching or scanning work remains.
    let needs_watch = any_deferred || any_plain;

    let aggregate: Arc<OperationState<WhenAny<T>>> = Arc::new(OperationState::new(
        needs_watch,
        Some(ContinuationSet::eager()),
        None,
        None,
    ));

    if futures.is_empty() {
        let _ = aggregate.complete(Err(Error::new(ErrorKind::InvalidInput)
            .with_context("when_any requires at least one input")));
        return Future::from_state(aggregate);
    }

    let input_states: Vec<Arc<OperationState<T>>> =
        futures.iter().map(|f| Arc::clone(f.state())).collect();

    let shared = Arc::new(AnyShared {
        winner: AtomicUsize::new(NO_WINNER),
        slots: Mutex::new(futures.into_iter().map(Some).collect()),
        target: Arc::clone(&aggregate),
    });

    if needs_watch {
        let watch_shared = Arc::clone(&shared);
        let watch_states = input_states.clone();
        aggregate.set_task(DeferredTask {
            parent: None,
            run: Box::new(move || watch(&watch_shared, &watch_states)),
        });
    }

    for (index, state) in input_states.iter().enumerate() {
        if let Some(set) = state.continuations() {
            let claimer = Arc::clone(&shared);
            set.push(
                &inline_executor(),
                Box::new(move || claimer.claim(index)),
            );
        }
    }
    Future::from_state(aggregate)
}

/// The disjunctive wait loop, run inline on the aggregate's launching
/// thread: launch deferred inputs, register the shared signal everywhere,
/// then scan-and-block until a winner exists.
fn watch<T: Send + 'static>(shared: &Arc<AnyShared<T>>, inputs: &[Arc<OperationState<T>>]) {
    for state in inputs {
        if state.is_deferred() {
            state.launch();
        }
    }
    if shared.decided() {
        return;
    }

    let signal = Arc::new(WaitSignal::new());
    let registrations: Vec<_> = inputs
        .iter()
        .map(|state| state.notify_when_ready(Arc::clone(&signal)))
        .collect();

    loop {
        if shared.decided() {
            break;
        }
        let seen = signal.generation();
        if let Some(index) = inputs.iter().position(|state| state.is_ready()) {
            shared.claim(index);
            break;
        }
        signal.wait_until(seen, Instant::now() + WATCH_TICK);
    }

    for (state, handle) in inputs.iter().zip(registrations) {
        state.unnotify_when_ready(handle);
    }
}
