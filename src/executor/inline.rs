//! Executor that runs tasks synchronously on the calling thread.

use super::{Executor, TaskFn};

/// Runs every submitted task immediately, on the submitting thread.
///
/// Used as the last-resort executor inside combinators and as the "no
/// executor" fallback for deferred states.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, task: TaskFn) {
        task();
    }

    fn label(&self) -> &'static str {
        "inline"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_on_calling_thread() {
        let caller = std::thread::current().id();
        let observed = std::sync::Arc::new(std::sync::Mutex::new(None));
        let observed2 = std::sync::Arc::clone(&observed);

        InlineExecutor.execute(Box::new(move || {
            *observed2.lock().expect("lock poisoned") = Some(std::thread::current().id());
        }));

        assert_eq!(*observed.lock().expect("lock poisoned"), Some(caller));
    }
}
