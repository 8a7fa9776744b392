//! Error types and error handling strategy for Awaitless.
//!
//! This module defines the core error types used throughout the library.
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - User task failures travel inside the future until a consumer observes
//!   them through `get` or a continuation that accepts the outcome
//! - Library-internal misuse (double-set, double-retrieve) is reported at
//!   the call site

use core::fmt;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Producer / consumer protocol ===
    /// The producer was destroyed before setting an outcome.
    BrokenPromise,
    /// Second attempt to set a value or error on the same state.
    AlreadySatisfied,
    /// The outcome was accessed on a state that is not ready.
    Uninitialized,
    /// The future was already retrieved from this promise or task.
    FutureAlreadyRetrieved,

    // === Task execution ===
    /// The task panicked while running; the panic message is the context.
    TaskPanicked,
    /// The task observed a stop request and declined to produce a value.
    StopRequested,

    // === Misuse / internal ===
    /// An argument was outside the operation's domain (e.g. empty input set).
    InvalidInput,
    /// Internal library error (bug).
    Internal,
}

/// The main error type for Awaitless operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error reports a producer destroyed before set.
    #[must_use]
    pub const fn is_broken_promise(&self) -> bool {
        matches!(self.kind, ErrorKind::BrokenPromise)
    }

    /// Returns true if this error reports a repeated completion attempt.
    #[must_use]
    pub const fn is_already_satisfied(&self) -> bool {
        matches!(self.kind, ErrorKind::AlreadySatisfied)
    }

    /// Returns true if this error carries a captured task panic.
    #[must_use]
    pub const fn is_panic(&self) -> bool {
        matches!(self.kind, ErrorKind::TaskPanicked)
    }

    /// Adds context text to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Creates a broken-promise error.
    #[must_use]
    pub const fn broken_promise() -> Self {
        Self::new(ErrorKind::BrokenPromise)
    }

    /// Creates an already-satisfied error.
    #[must_use]
    pub const fn already_satisfied() -> Self {
        Self::new(ErrorKind::AlreadySatisfied)
    }

    /// Creates an uninitialized-access error.
    #[must_use]
    pub const fn uninitialized() -> Self {
        Self::new(ErrorKind::Uninitialized)
    }

    /// Creates an error carrying a captured panic message.
    #[must_use]
    pub fn panicked(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TaskPanicked).with_context(message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(ctx) = &self.context {
            write!(f, ": {ctx}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Attach a context string on error.
    fn context(self, ctx: impl Into<String>) -> Result<T>;
    /// Attach context computed lazily on error.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(ctx))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.into().with_context(f()))
    }
}

/// A specialized Result type for Awaitless operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Extracts a printable message from a panic payload.
///
/// Panic payloads are `&str` or `String` in practice; anything else is
/// reported as an opaque panic.
#[must_use]
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug)]
    struct Underlying;

    impl fmt::Display for Underlying {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "underlying")
        }
    }

    impl std::error::Error for Underlying {}

    #[test]
    fn display_without_context() {
        let err = Error::new(ErrorKind::BrokenPromise);
        assert_eq!(err.to_string(), "BrokenPromise");
    }

    #[test]
    fn display_with_context() {
        let err = Error::panicked("boom");
        assert_eq!(err.to_string(), "TaskPanicked: boom");
    }

    #[test]
    fn source_chain_is_exposed() {
        let err = Error::new(ErrorKind::Internal)
            .with_context("outer")
            .with_source(Underlying);
        let source = err.source().expect("source missing");
        assert_eq!(source.to_string(), "underlying");
    }

    #[test]
    fn predicates_match_kind() {
        assert!(Error::broken_promise().is_broken_promise());
        assert!(Error::already_satisfied().is_already_satisfied());
        assert!(Error::panicked("x").is_panic());
        assert!(!Error::uninitialized().is_panic());
    }

    #[test]
    fn result_ext_adds_context() {
        let res: core::result::Result<(), Error> = Err(Error::uninitialized());
        let err = res.context("during get").expect_err("expected err");
        assert_eq!(err.kind(), ErrorKind::Uninitialized);
        assert_eq!(err.to_string(), "Uninitialized: during get");
    }

    #[test]
    fn panic_message_extracts_str_and_string() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");

        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(boxed.as_ref()), "owned message");

        let boxed: Box<dyn std::any::Any + Send> = Box::new(17_u32);
        assert_eq!(panic_message(boxed.as_ref()), "opaque panic payload");
    }
}
