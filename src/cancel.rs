//! Cooperative cancellation: stop sources and stop tokens.
//!
//! A [`StopSource`] may request a stop exactly once; every [`StopToken`]
//! minted from it observes the same flag. The library never preempts a
//! running task: stoppable tasks receive a token and are expected to check
//! it at convenient points.
//!
//! The shared stop state is a one-way latch with the same shape as the
//! continuation list: once the flag flips, callbacks registered afterwards
//! run immediately on the registering thread.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Callback invoked when a stop is requested.
type StopCallback = Box<dyn FnOnce() + Send>;

/// State shared between a stop source and its tokens.
struct StopState {
    /// Whether a stop has been requested. One-way: false → true.
    requested: AtomicBool,
    /// Callbacks to run when the stop request arrives.
    callbacks: Mutex<Vec<StopCallback>>,
}

impl std::fmt::Debug for StopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopState")
            .field("requested", &self.stop_requested())
            .finish_non_exhaustive()
    }
}

impl StopState {
    fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    fn stop_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Flips the flag and drains callbacks. Only the first caller gets true.
    fn request_stop(&self) -> bool {
        if self
            .requested
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        tracing::trace!("stop requested");
        let drained = std::mem::take(&mut *self.callbacks.lock());
        for cb in drained {
            cb();
        }
        true
    }

    /// Registers a callback; runs it immediately if the stop already landed.
    fn on_stop(&self, cb: StopCallback) {
        let mut callbacks = self.callbacks.lock();
        if self.stop_requested() {
            drop(callbacks);
            cb();
        } else {
            callbacks.push(cb);
        }
    }
}

/// The requesting side of a cancellation channel.
///
/// Cloning a source yields another handle to the same stop state.
#[derive(Debug, Clone)]
pub struct StopSource {
    state: Arc<StopState>,
}

impl StopSource {
    /// Creates a new source with a fresh, unrequested stop state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(StopState::new()),
        }
    }

    /// Requests a stop.
    ///
    /// Returns `true` if this call performed the transition, `false` if a
    /// stop had already been requested.
    pub fn request_stop(&self) -> bool {
        self.state.request_stop()
    }

    /// Returns true if a stop has been requested on this state.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.state.stop_requested()
    }

    /// Mints a token observing this source's stop state.
    #[must_use]
    pub fn token(&self) -> StopToken {
        StopToken {
            state: Arc::clone(&self.state),
        }
    }

    /// Registers a callback to run when a stop is requested.
    ///
    /// If the stop has already been requested, the callback runs
    /// immediately on the calling thread.
    pub fn on_stop(&self, cb: impl FnOnce() + Send + 'static) {
        self.state.on_stop(Box::new(cb));
    }
}

impl Default for StopSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for StopSource {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Eq for StopSource {}

/// The observing side of a cancellation channel.
#[derive(Debug, Clone)]
pub struct StopToken {
    state: Arc<StopState>,
}

impl StopToken {
    /// Returns true if a stop has been requested.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.state.stop_requested()
    }

    /// Registers a callback to run when a stop is requested.
    pub fn on_stop(&self, cb: impl FnOnce() + Send + 'static) {
        self.state.on_stop(Box::new(cb));
    }
}

impl PartialEq for StopToken {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Eq for StopToken {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn request_stop_is_one_way() {
        let source = StopSource::new();
        assert!(!source.stop_requested());
        assert!(source.request_stop());
        assert!(!source.request_stop());
        assert!(source.stop_requested());
    }

    #[test]
    fn tokens_observe_shared_state() {
        let source = StopSource::new();
        let token_a = source.token();
        let token_b = source.token();
        assert!(!token_a.stop_requested());

        source.request_stop();
        assert!(token_a.stop_requested());
        assert!(token_b.stop_requested());
    }

    #[test]
    fn tokens_compare_by_state() {
        let source = StopSource::new();
        let other = StopSource::new();
        assert_eq!(source.token(), source.token());
        assert_ne!(source.token(), other.token());
    }

    #[test]
    fn callbacks_drain_once_on_request() {
        let source = StopSource::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            source.on_stop(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        source.request_stop();
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        // A second request must not re-run anything.
        source.request_stop();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn late_callback_runs_immediately() {
        let source = StopSource::new();
        source.request_stop();

        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        source.token().on_stop(move || {
            hits2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_requests_race_to_one_winner() {
        let source = StopSource::new();
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let source = source.clone();
                let winners = Arc::clone(&winners);
                std::thread::spawn(move || {
                    if source.request_stop() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread panicked");
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
