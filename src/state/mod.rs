//! The operation-state machine backing every future and promise.
//!
//! - [`waiter`]: bounded-wait status and cross-state wake signals
//! - [`outcome`]: set-at-most-once outcome storage
//! - [`continuations`]: the append-or-fire continuation sink
//! - [`operation`]: the combined state machine

pub mod waiter;

pub(crate) mod continuations;
pub(crate) mod operation;
pub(crate) mod outcome;

pub use operation::NotifyHandle;
pub use waiter::{FutureStatus, WaitSignal};
