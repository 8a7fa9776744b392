//! The executor contract consumed by the library.
//!
//! An executor accepts nullary tasks for execution and promises nothing
//! about where or when they run. Executors are cheap to clone (handles over
//! shared state) and comparable by identity, which is what the continuation
//! and combinator machinery needs to decide whether two futures share a
//! scheduling context.
//!
//! Three kinds are provided or expected:
//!
//! - [`PoolExecutor`]: the default multi-threaded pool, used when the caller
//!   supplies none (see [`default_executor`]).
//! - [`InlineExecutor`]: runs the task synchronously on the calling thread;
//!   the last-resort executor inside combinators and the fallback for
//!   deferred states without an executor.
//! - User-supplied executors: any type implementing [`Executor`].

mod inline;
mod pool;

pub use inline::InlineExecutor;
pub use pool::PoolExecutor;

use std::fmt;
use std::sync::{Arc, OnceLock};

/// A boxed nullary task submitted to an executor.
pub type TaskFn = Box<dyn FnOnce() + Send + 'static>;

/// Accepts nullary tasks for execution. No result is returned.
pub trait Executor: Send + Sync {
    /// Schedules `task` for execution.
    fn execute(&self, task: TaskFn);

    /// Short name for diagnostics.
    fn label(&self) -> &'static str {
        "executor"
    }
}

/// A cloneable, comparable handle to an executor.
///
/// Comparison is by identity: two handles are equal when they refer to the
/// same executor instance.
#[derive(Clone)]
pub struct ExecutorHandle {
    inner: Arc<dyn Executor>,
}

impl ExecutorHandle {
    /// Wraps an executor in a shareable handle.
    pub fn new(executor: impl Executor + 'static) -> Self {
        Self {
            inner: Arc::new(executor),
        }
    }

    /// Schedules a closure for execution.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.execute(Box::new(f));
    }

    /// Schedules an already-boxed task for execution.
    pub fn execute_boxed(&self, task: TaskFn) {
        self.inner.execute(task);
    }

    /// Short name for diagnostics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.inner.label()
    }
}

impl fmt::Debug for ExecutorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorHandle")
            .field("label", &self.label())
            .finish()
    }
}

impl PartialEq for ExecutorHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ExecutorHandle {}

/// Returns the process-wide default pool executor.
///
/// Sized to the available parallelism, created on first use, and kept alive
/// for the life of the process.
pub fn default_executor() -> ExecutorHandle {
    static DEFAULT: OnceLock<ExecutorHandle> = OnceLock::new();
    DEFAULT
        .get_or_init(|| {
            let threads = std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(4);
            tracing::debug!(threads, "initializing default pool executor");
            ExecutorHandle::new(PoolExecutor::new(threads))
        })
        .clone()
}

/// Returns the process-wide inline executor.
pub fn inline_executor() -> ExecutorHandle {
    static INLINE: OnceLock<ExecutorHandle> = OnceLock::new();
    INLINE
        .get_or_init(|| ExecutorHandle::new(InlineExecutor))
        .clone()
}
