//! Fixed-size thread pool executor.
//!
//! The pool keeps a work queue drained by a fixed set of worker threads.
//! Workers park on a condition variable when the queue is empty and are
//! woken on submission. Shutdown is graceful: pending tasks run to
//! completion, then workers exit and are joined.

use crossbeam_queue::SegQueue;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{Executor, TaskFn};

/// Upper bound on a worker's park time; bounds the cost of a lost wakeup.
const PARK_TIMEOUT: Duration = Duration::from_millis(50);

/// A fixed-size pool of worker threads implementing [`Executor`].
pub struct PoolExecutor {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    /// Work queue.
    queue: SegQueue<TaskFn>,
    /// Shutdown flag.
    shutdown: AtomicBool,
    /// Number of workers that have not yet exited their loop.
    active_threads: AtomicUsize,
    /// Condition variable for worker parking.
    condvar: Condvar,
    /// Mutex paired with the condition variable.
    mutex: Mutex<()>,
    /// Worker join handles for cleanup.
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl PoolExecutor {
    /// Creates a pool with `threads` eagerly-spawned workers.
    ///
    /// # Panics
    ///
    /// Panics if `threads` is 0.
    #[must_use]
    pub fn new(threads: usize) -> Self {
        assert!(threads > 0, "pool requires at least one thread");

        let inner = Arc::new(PoolInner {
            queue: SegQueue::new(),
            shutdown: AtomicBool::new(false),
            active_threads: AtomicUsize::new(0),
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
            handles: Mutex::new(Vec::with_capacity(threads)),
        });

        for index in 0..threads {
            spawn_worker(&inner, index);
        }

        Self { inner }
    }

    /// Returns the number of workers still running.
    #[must_use]
    pub fn active_threads(&self) -> usize {
        self.inner.active_threads.load(Ordering::Acquire)
    }

    /// Returns `true` if the pool has been shut down.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Initiates shutdown. Pending tasks still run; new submissions run
    /// inline on the submitting thread.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        let _guard = lock(&self.inner.mutex);
        self.inner.condvar.notify_all();
    }

    /// Shuts down and waits for the workers to exit.
    ///
    /// Returns `true` if all workers exited within `timeout`.
    pub fn shutdown_and_wait(&self, timeout: Duration) -> bool {
        self.shutdown();

        let deadline = std::time::Instant::now() + timeout;
        while self.inner.active_threads.load(Ordering::Acquire) > 0 {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }
            {
                let _guard = lock(&self.inner.mutex);
                self.inner.condvar.notify_all();
            }
            thread::sleep(Duration::from_millis(5).min(remaining));
        }

        let mut handles = lock(&self.inner.handles);
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
        true
    }
}

impl Executor for PoolExecutor {
    fn execute(&self, task: TaskFn) {
        if self.is_shutdown() {
            // The pool no longer drains its queue; degrade to inline so the
            // task is never silently lost.
            task();
            return;
        }
        self.inner.queue.push(task);
        let _guard = lock(&self.inner.mutex);
        self.inner.condvar.notify_one();
    }

    fn label(&self) -> &'static str {
        "pool"
    }
}

impl std::fmt::Debug for PoolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolExecutor")
            .field("active_threads", &self.active_threads())
            .field("pending", &self.inner.queue.len())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl Drop for PoolExecutor {
    fn drop(&mut self) {
        let _ = self.shutdown_and_wait(Duration::from_secs(5));
    }
}

fn spawn_worker(inner: &Arc<PoolInner>, index: usize) {
    let inner_clone = Arc::clone(inner);
    inner.active_threads.fetch_add(1, Ordering::AcqRel);

    let handle = thread::Builder::new()
        .name(format!("awaitless-worker-{index}"))
        .spawn(move || {
            worker_loop(&inner_clone);
            inner_clone.active_threads.fetch_sub(1, Ordering::AcqRel);
        })
        .expect("failed to spawn pool worker");

    lock(&inner.handles).push(handle);
}

fn worker_loop(inner: &PoolInner) {
    loop {
        if let Some(task) = inner.queue.pop() {
            task();
            continue;
        }

        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }

        // Re-check the queue under the lock so a submission between the pop
        // and the park costs at most one timeout.
        let guard = lock(&inner.mutex);
        if !inner.queue.is_empty() || inner.shutdown.load(Ordering::Acquire) {
            continue;
        }
        let (guard, _timed_out) = match inner.condvar.wait_timeout(guard, PARK_TIMEOUT) {
            Ok(r) => r,
            Err(poisoned) => poisoned.into_inner(),
        };
        drop(guard);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn executes_submitted_tasks() {
        let pool = PoolExecutor::new(2);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..16 {
            let counter = Arc::clone(&counter);
            pool.execute(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while counter.load(Ordering::SeqCst) < 16 {
            assert!(std::time::Instant::now() < deadline, "tasks did not drain");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn uses_multiple_worker_threads() {
        let pool = PoolExecutor::new(4);
        let seen = Arc::new(StdMutex::new(HashSet::new()));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..32 {
            let seen = Arc::clone(&seen);
            let done = Arc::clone(&done);
            pool.execute(Box::new(move || {
                seen.lock()
                    .expect("lock poisoned")
                    .insert(thread::current().id());
                thread::sleep(Duration::from_millis(5));
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while done.load(Ordering::SeqCst) < 32 {
            assert!(std::time::Instant::now() < deadline, "tasks did not drain");
            thread::sleep(Duration::from_millis(5));
        }
        assert!(seen.lock().expect("lock poisoned").len() > 1);
    }

    #[test]
    fn shutdown_runs_pending_then_degrades_to_inline() {
        let pool = PoolExecutor::new(1);
        let counter = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&counter);
        pool.execute(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(pool.shutdown_and_wait(Duration::from_secs(5)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(pool.active_threads(), 0);

        // Submissions after shutdown run on the caller thread.
        let caller = thread::current().id();
        let ran_on = Arc::new(StdMutex::new(None));
        let ran_on2 = Arc::clone(&ran_on);
        pool.execute(Box::new(move || {
            *ran_on2.lock().expect("lock poisoned") = Some(thread::current().id());
        }));
        assert_eq!(*ran_on.lock().expect("lock poisoned"), Some(caller));
    }
}
