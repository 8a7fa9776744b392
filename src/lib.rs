//! Awaitless: an eager/deferred future and promise library for Rust.
//!
//! # Overview
//!
//! Awaitless is a future/promise concurrency library built around a shared
//! *operation state*: one synchronization object carrying the status
//! machine, the outcome, the waiters, the continuations, and the optional
//! stop source behind every future/promise pair. There is no async/await
//! runtime: tasks run on executor worker threads and consumers block, with
//! continuations and combinators for building dependency graphs without
//! blocking.
//!
//! # Core Guarantees
//!
//! - **Single completion**: a state's outcome is written at most once;
//!   later attempts report `AlreadySatisfied`, and an abandoned producer
//!   installs `BrokenPromise`
//! - **Happens-before**: a thread that observes readiness observes the
//!   completing thread's outcome writes
//! - **Continuation liveness**: continuations attached before completion
//!   run exactly once at completion; continuations attached after run
//!   exactly once via their executor
//! - **Laziness**: a deferred task does not run until a blocking operation
//!   demands it, directly or through a derived future
//! - **Cooperative cancellation**: stop sources request, stop tokens
//!   observe; nothing is preempted
//!
//! # Module Structure
//!
//! - [`error`]: error types and the crate `Result`
//! - [`cancel`]: stop sources and tokens
//! - [`executor`]: the executor contract, the default pool, the inline
//!   executor
//! - [`state`]: the operation-state machine (outcome slot, waiter,
//!   continuation sink)
//! - [`future`]: future, shared-future, promise, and packaged-task handles
//! - [`launch`]: `spawn` and `schedule` launchers
//! - [`combinator`]: `then` internals, `when_all`/`when_any`, blocking
//!   waits
//! - [`test_utils`]: logging and assertion helpers for tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod cancel;
pub mod combinator;
pub mod error;
pub mod executor;
pub mod future;
pub mod launch;
pub mod state;
pub mod test_utils;

// Re-exports for convenient access to core types
pub use cancel::{StopSource, StopToken};
pub use combinator::{
    wait_for_all, wait_for_all_for, wait_for_all_until, wait_for_any, wait_for_any_for,
    wait_for_any_until, when_all, when_all2, when_all3, when_all4, when_any, ThenUnpack,
    UnpackCall, WhenAny,
};
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use executor::{
    default_executor, inline_executor, Executor, ExecutorHandle, InlineExecutor, PoolExecutor,
    TaskFn,
};
pub use future::{Future, PackagedTask, Promise, SharedFuture};
pub use launch::{
    schedule, schedule_on, schedule_on_with_token, schedule_with_token, spawn, spawn_on,
    spawn_on_with_token, spawn_with_token,
};
pub use state::{FutureStatus, NotifyHandle, WaitSignal};
