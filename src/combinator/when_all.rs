//! Conjunction: a future that completes when every input has.
//!
//! Per-input strategy, chosen independently:
//!
//! - Inputs with continuation support get a continuation that decrements a
//!   shared counter; the last decrementer completes the aggregate with the
//!   collected (now ready) inputs. No thread is consumed while waiting.
//! - Inputs without continuation support (promise-backed) are watched by a
//!   bounded-polling task on the default pool: a timed wait with
//!   exponential backoff up to a ceiling, re-submitted to the pool between
//!   rounds. Never a pure busy loop.
//!
//! The aggregate completes with the inputs themselves, so per-input errors
//! are preserved: element `i` of the result reports exactly what
//! `inputs[i].get()` would have.
//!
//! Aggregates over deferred inputs are themselves deferred; their launch
//! launches every deferred input, so laziness composes through the
//! conjunction.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::combinator::then::continue_unique;
use crate::error::{Error, ErrorKind};
use crate::executor::{default_executor, inline_executor};
use crate::future::Future;
use crate::launch::run_catching;
use crate::state::continuations::ContinuationSet;
use crate::state::operation::{DeferredTask, LaunchTask, OperationState};

/// First bounded poll of the non-continuable fallback.
const POLL_INITIAL: Duration = Duration::from_millis(1);
/// Backoff ceiling of the non-continuable fallback.
const POLL_CEILING: Duration = Duration::from_millis(64);

/// Stores a ready input into the aggregate's bookkeeping.
type PlaceFn<T> = Box<dyn FnOnce(Future<T>) + Send>;
/// Signals one input's completion to the aggregate.
type DoneFn = Box<dyn FnOnce() + Send>;

/// Wires one input to its aggregate: continuation when supported, bounded
/// polling otherwise. `place` always runs before `done`.
pub(crate) fn attach_input<T: Send + 'static>(future: Future<T>, place: PlaceFn<T>, done: DoneFn) {
    let state = Arc::clone(future.state());
    if let Some(set) = state.continuations() {
        place(future);
        set.push(&inline_executor(), done);
    } else {
        poll_input(future, place, done, POLL_INITIAL);
    }
}

fn poll_input<T: Send + 'static>(
    future: Future<T>,
    place: PlaceFn<T>,
    done: DoneFn,
    backoff: Duration,
) {
    default_executor().execute(move || {
        if future
            .state()
            .wait_deadline(Some(Instant::now() + backoff))
            .is_ready()
        {
            place(future);
            done();
        } else {
            poll_input(future, place, done, (backoff * 2).min(POLL_CEILING));
        }
    });
}

/// Collects the deferred inputs' states and, when any exist, makes the
/// aggregate deferred with a task that launches them all.
fn wire_deferred_inputs<A: Send + 'static>(
    aggregate: &Arc<OperationState<A>>,
    deferred: Vec<Arc<dyn LaunchTask>>,
) {
    if deferred.is_empty() {
        return;
    }
    aggregate.set_task(DeferredTask {
        parent: None,
        run: Box::new(move || {
            for state in deferred {
                state.launch_task();
            }
        }),
    });
}

struct AllShared<T> {
    remaining: AtomicUsize,
    slots: Mutex<Vec<Option<Future<T>>>>,
    target: Arc<OperationState<Vec<Future<T>>>>,
}

impl<T: Send + 'static> AllShared<T> {
    fn put(&self, index: usize, future: Future<T>) {
        self.slots.lock()[index] = Some(future);
    }

    fn complete_one(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let mut slots = self.slots.lock();
        let taken: Vec<Option<Future<T>>> = slots.iter_mut().map(Option::take).collect();
        drop(slots);

        if taken.iter().any(Option::is_none) {
            let _ = self.target.complete(Err(Error::new(ErrorKind::Internal)
                .with_context("conjunction input missing at completion")));
            return;
        }
        let collected: Vec<Future<T>> = taken.into_iter().flatten().collect();
        let _ = self.target.complete(Ok(collected));
    }
}

/// Returns a future of every input future, ready when all of them are.
///
/// An empty input set completes immediately with an empty vector.
pub fn when_all<T, I>(futures: I) -> Future<Vec<Future<T>>>
where
    T: Send + 'static,
    I: IntoIterator<Item = Future<T>>,
{
    let futures: Vec<Future<T>> = futures.into_iter().collect();
    let deferred: Vec<Arc<dyn LaunchTask>> = futures
        .iter()
        .filter(|f| f.is_deferred())
        .map(|f| Arc::clone(f.state()) as Arc<dyn LaunchTask>)
        .collect();

    let aggregate: Arc<OperationState<Vec<Future<T>>>> = Arc::new(OperationState::new(
        !deferred.is_empty(),
        Some(ContinuationSet::eager()),
        None,
        None,
    ));

    if futures.is_empty() {
        let _ = aggregate.complete(Ok(Vec::new()));
        return Future::from_state(aggregate);
    }
    wire_deferred_inputs(&aggregate, deferred);

    let shared = Arc::new(AllShared {
        remaining: AtomicUsize::new(futures.len()),
        slots: Mutex::new((0..futures.len()).map(|_| None).collect()),
        target: Arc::clone(&aggregate),
    });

    for (index, future) in futures.into_iter().enumerate() {
        let placer = Arc::clone(&shared);
        let finisher = Arc::clone(&shared);
        attach_input(
            future,
            Box::new(move |f| placer.put(index, f)),
            Box::new(move || finisher.complete_one()),
        );
    }
    Future::from_state(aggregate)
}

struct Pair2Shared<A, B> {
    remaining: AtomicUsize,
    first: Mutex<Option<Future<A>>>,
    second: Mutex<Option<Future<B>>>,
    target: Arc<OperationState<(Future<A>, Future<B>)>>,
}

impl<A: Send + 'static, B: Send + 'static> Pair2Shared<A, B> {
    fn complete_one(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let first = self.first.lock().take();
        let second = self.second.lock().take();
        match (first, second) {
            (Some(fa), Some(fb)) => {
                let _ = self.target.complete(Ok((fa, fb)));
            }
            _ => {
                let _ = self.target.complete(Err(Error::new(ErrorKind::Internal)
                    .with_context("conjunction input missing at completion")));
            }
        }
    }
}

/// Heterogeneous binary conjunction; also reachable as `fa & fb`.
pub fn when_all2<A, B>(fa: Future<A>, fb: Future<B>) -> Future<(Future<A>, Future<B>)>
where
    A: Send + 'static,
    B: Send + 'static,
{
    let mut deferred: Vec<Arc<dyn LaunchTask>> = Vec::new();
    if fa.is_deferred() {
        deferred.push(Arc::clone(fa.state()) as Arc<dyn LaunchTask>);
    }
    if fb.is_deferred() {
        deferred.push(Arc::clone(fb.state()) as Arc<dyn LaunchTask>);
    }

    let aggregate: Arc<OperationState<(Future<A>, Future<B>)>> = Arc::new(OperationState::new(
        !deferred.is_empty(),
        Some(ContinuationSet::eager()),
        None,
        None,
    ));
    wire_deferred_inputs(&aggregate, deferred);

    let shared = Arc::new(Pair2Shared {
        remaining: AtomicUsize::new(2),
        first: Mutex::new(None),
        second: Mutex::new(None),
        target: Arc::clone(&aggregate),
    });

    let placer = Arc::clone(&shared);
    let finisher = Arc::clone(&shared);
    attach_input(
        fa,
        Box::new(move |f| *placer.first.lock() = Some(f)),
        Box::new(move || finisher.complete_one()),
    );
    let placer = Arc::clone(&shared);
    let finisher = Arc::clone(&shared);
    attach_input(
        fb,
        Box::new(move |f| *placer.second.lock() = Some(f)),
        Box::new(move || finisher.complete_one()),
    );
    Future::from_state(aggregate)
}

/// Heterogeneous ternary conjunction.
pub fn when_all3<A, B, C>(
    fa: Future<A>,
    fb: Future<B>,
    fc: Future<C>,
) -> Future<(Future<A>, Future<B>, Future<C>)>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
{
    continue_unique(when_all2(when_all2(fa, fb), fc), None, |outcome| {
        let (pair, fc) = outcome?;
        let (fa, fb) = pair.get()?;
        Ok((fa, fb, fc))
    })
}

/// Heterogeneous quaternary conjunction.
pub fn when_all4<A, B, C, D>(
    fa: Future<A>,
    fb: Future<B>,
    fc: Future<C>,
    fd: Future<D>,
) -> Future<(Future<A>, Future<B>, Future<C>, Future<D>)>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
    D: Send + 'static,
{
    continue_unique(when_all2(when_all3(fa, fb, fc), fd), None, |outcome| {
        let (triple, fd) = outcome?;
        let (fa, fb, fc) = triple.get()?;
        Ok((fa, fb, fc, fd))
    })
}

/// Applies a callable to a positionally unpacked argument tuple.
///
/// Implemented for closures of each supported arity so that
/// [`ThenUnpack`] can dispatch on the shape of the argument list.
pub trait UnpackCall<Args, U> {
    /// Invokes the callable with the unpacked arguments.
    fn call(self, args: Args) -> U;
}

impl<A, B, U, F: FnOnce(A, B) -> U> UnpackCall<(A, B), U> for F {
    fn call(self, (a, b): (A, B)) -> U {
        self(a, b)
    }
}

impl<A, B, C, U, F: FnOnce(A, B, C) -> U> UnpackCall<(A, B, C), U> for F {
    fn call(self, (a, b, c): (A, B, C)) -> U {
        self(a, b, c)
    }
}

impl<A, B, C, D, U, F: FnOnce(A, B, C, D) -> U> UnpackCall<(A, B, C, D), U> for F {
    fn call(self, (a, b, c, d): (A, B, C, D)) -> U {
        self(a, b, c, d)
    }
}

/// Positional-unpack continuation over conjunction aggregates.
///
/// The flat tuples built by [`when_all2`]/[`when_all3`]/[`when_all4`]
/// unpack directly. Chained `&` conjunctions nest pair aggregates
/// (`(fa & fb) & fc` is a pair whose first element is the inner pair);
/// the nested impls unpack through that nesting, so
/// `(fa & fb & fc).then_unpack(|a, b, c| ...)` still receives three
/// positional values. The first input error, if any, propagates instead
/// of invoking the continuation.
pub trait ThenUnpack<Args>: Sized {
    /// Attaches a continuation receiving the conjunction's values as
    /// positional arguments.
    fn then_unpack<U, F>(self, f: F) -> Future<U>
    where
        U: Send + 'static,
        F: UnpackCall<Args, U> + Send + 'static;
}

impl<A, B> ThenUnpack<(A, B)> for Future<(Future<A>, Future<B>)>
where
    A: Send + 'static,
    B: Send + 'static,
{
    fn then_unpack<U, F>(self, f: F) -> Future<U>
    where
        U: Send + 'static,
        F: UnpackCall<(A, B), U> + Send + 'static,
    {
        continue_unique(self, None, move |outcome| {
            let (fa, fb) = outcome?;
            let args = (fa.get()?, fb.get()?);
            run_catching(move || f.call(args))
        })
    }
}

impl<A, B, C> ThenUnpack<(A, B, C)> for Future<(Future<A>, Future<B>, Future<C>)>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
{
    fn then_unpack<U, F>(self, f: F) -> Future<U>
    where
        U: Send + 'static,
        F: UnpackCall<(A, B, C), U> + Send + 'static,
    {
        continue_unique(self, None, move |outcome| {
            let (fa, fb, fc) = outcome?;
            let args = (fa.get()?, fb.get()?, fc.get()?);
            run_catching(move || f.call(args))
        })
    }
}

impl<A, B, C, D> ThenUnpack<(A, B, C, D)>
    for Future<(Future<A>, Future<B>, Future<C>, Future<D>)>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
    D: Send + 'static,
{
    fn then_unpack<U, F>(self, f: F) -> Future<U>
    where
        U: Send + 'static,
        F: UnpackCall<(A, B, C, D), U> + Send + 'static,
    {
        continue_unique(self, None, move |outcome| {
            let (fa, fb, fc, fd) = outcome?;
            let args = (fa.get()?, fb.get()?, fc.get()?, fd.get()?);
            run_catching(move || f.call(args))
        })
    }
}

/// The shape `(fa & fb) & fc` produces: a pair whose first element is the
/// inner pair aggregate.
impl<A, B, C> ThenUnpack<(A, B, C)> for Future<(Future<(Future<A>, Future<B>)>, Future<C>)>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
{
    fn then_unpack<U, F>(self, f: F) -> Future<U>
    where
        U: Send + 'static,
        F: UnpackCall<(A, B, C), U> + Send + 'static,
    {
        continue_unique(self, None, move |outcome| {
            let (pair, fc) = outcome?;
            let (fa, fb) = pair.get()?;
            let args = (fa.get()?, fb.get()?, fc.get()?);
            run_catching(move || f.call(args))
        })
    }
}

/// The shape `((fa & fb) & fc) & fd` produces.
impl<A, B, C, D> ThenUnpack<(A, B, C, D)>
    for Future<(
        Future<(Future<(Future<A>, Future<B>)>, Future<C>)>,
        Future<D>,
    )>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
    D: Send + 'static,
{
    fn then_unpack<U, F>(self, f: F) -> Future<U>
    where
        U: Send + 'static,
        F: UnpackCall<(A, B, C, D), U> + Send + 'static,
    {
        continue_unique(self, None, move |outcome| {
            let (nested, fd) = outcome?;
            let (pair, fc) = nested.get()?;
            let (fa, fb) = pair.get()?;
            let args = (fa.get()?, fb.get()?, fc.get()?, fd.get()?);
            run_catching(move || f.call(args))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::Promise;
    use crate::launch::{schedule, spawn};
    use crate::test_utils::init_test_logging;

    #[test]
    fn collects_every_input() {
        init_test_logging();
        let futures = vec![spawn(|| 1), spawn(|| 2), spawn(|| 3)];
        let all = when_all(futures).get().expect("aggregate");
        let values: Vec<u32> = all.into_iter().map(|f| f.get().expect("value")).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn empty_input_completes_immediately() {
        init_test_logging();
        let all = when_all(Vec::<Future<u32>>::new());
        assert!(all.is_ready());
        assert!(all.get().expect("aggregate").is_empty());
    }

    #[test]
    fn per_input_errors_are_preserved() {
        init_test_logging();
        let failing = spawn(|| -> u32 { panic!("input failed") });
        let fine = spawn(|| 1);
        let mut all = when_all(vec![failing, fine]).get().expect("aggregate");

        let second = all.pop().expect("second");
        let first = all.pop().expect("first");
        assert!(first.get().expect_err("panic").is_panic());
        assert_eq!(second.get().expect("value"), 1);
    }

    #[test]
    fn non_continuable_inputs_use_the_polling_fallback() {
        init_test_logging();
        let mut promise = Promise::new();
        let plain = promise.future().expect("future");
        assert!(!plain.supports_continuations());

        let all = when_all(vec![plain]);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(40));
            promise.set_value(11).expect("set");
        });

        let mut collected = all.get().expect("aggregate");
        assert_eq!(collected.pop().expect("input").get().expect("value"), 11);
    }

    #[test]
    fn deferred_inputs_stay_lazy_until_the_aggregate_is_waited() {
        init_test_logging();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);
        let deferred = schedule(move || {
            ran2.store(1, Ordering::SeqCst);
            5
        });

        let all = when_all(vec![deferred]);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(ran.load(Ordering::SeqCst), 0, "ran before demand");

        let mut collected = all.get().expect("aggregate");
        assert_eq!(collected.pop().expect("input").get().expect("value"), 5);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pair_conjunction_is_heterogeneous() {
        init_test_logging();
        let numbers = spawn(|| 2);
        let words = spawn(|| String::from("two"));
        let (fa, fb) = when_all2(numbers, words).get().expect("pair");
        assert_eq!(fa.get().expect("number"), 2);
        assert_eq!(fb.get().expect("word"), "two");
    }

    #[test]
    fn then_unpack_receives_positional_values() {
        init_test_logging();
        let f = spawn(|| 6);
        let g = spawn(|| 7);
        let h = spawn(|| 8);
        let product = when_all3(f, g, h).then_unpack(|a, b, c| a * b * c);
        assert_eq!(product.get().expect("product"), 336);
    }

    #[test]
    fn when_all4_builds_a_flat_quadruple() {
        init_test_logging();
        let (fa, fb, fc, fd) = when_all4(spawn(|| 1), spawn(|| 2), spawn(|| 3), spawn(|| 4))
            .get()
            .expect("quadruple");
        assert_eq!(fa.get().expect("a"), 1);
        assert_eq!(fb.get().expect("b"), 2);
        assert_eq!(fc.get().expect("c"), 3);
        assert_eq!(fd.get().expect("d"), 4);
    }

    #[test]
    fn operator_and_maps_to_the_pair_conjunction() {
        init_test_logging();
        let doubled = (spawn(|| 20) & spawn(|| 1)).then_unpack(|a, b| a + b);
        assert_eq!(doubled.get().expect("sum"), 21);
    }

    #[test]
    fn chained_operator_unpacks_through_the_nesting() {
        init_test_logging();
        let product = (spawn(|| 6) & spawn(|| 7) & spawn(|| 8))
            .then_unpack(|a: i32, b: i32, c: i32| a * b * c);
        assert_eq!(product.get().expect("product"), 336);

        let sum = (spawn(|| 1) & spawn(|| 2) & spawn(|| 3) & spawn(|| 4))
            .then_unpack(|a: i32, b: i32, c: i32, d: i32| a + b + c + d);
        assert_eq!(sum.get().expect("sum"), 10);
    }
}
