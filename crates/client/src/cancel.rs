//! Cooperative cancellation of an in-flight query.
//!
//! The wait loop polls a [`ShouldTerminate`] source once per poll interval
//! while no reply has arrived. Any `FnMut() -> bool` closure qualifies, and
//! [`CancelFlag`] covers the common case of another thread deciding.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Source of the "give up on this query" decision.
pub trait ShouldTerminate {
    /// Returns `true` to abort the wait. Called at most once per poll
    /// interval, on the querying thread.
    fn should_terminate(&mut self) -> bool;
}

impl<F> ShouldTerminate for F
where
    F: FnMut() -> bool,
{
    fn should_terminate(&mut self) -> bool {
        self()
    }
}

/// A cloneable flag that any thread can raise to cancel queries polling it.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    raised: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

impl ShouldTerminate for CancelFlag {
    fn should_terminate(&mut self) -> bool {
        self.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let flag = CancelFlag::new();
        let mut polled = flag.clone();
        assert!(!polled.should_terminate());
        flag.cancel();
        assert!(polled.should_terminate());
    }

    #[test]
    fn closures_are_termination_sources() {
        let mut calls = 0;
        let mut source = || {
            calls += 1;
            calls > 2
        };
        let results: Vec<bool> = (0..3).map(|_| source.should_terminate()).collect();
        assert_eq!(results, vec![false, false, true]);
    }
}
