//! CAS-retry updates over immutable snapshots.
//!
//! [`AtomicState`] holds an `Arc<S>` that is only ever replaced wholesale.
//! [`AtomicState::update`] loads the current snapshot, lets a pure closure
//! decide the next snapshot and an outcome, and publishes it with a single
//! compare-and-swap. On conflict the whole decision is recomputed from the
//! fresh snapshot, so the closure must not have side effects: resuming
//! waiters and other effects happen afterwards, driven by the returned outcome.

use arc_swap::ArcSwap;
use std::fmt;
use std::sync::Arc;

/// What an update closure decided for one snapshot.
#[derive(Debug)]
pub enum Transition<S, R> {
    /// Publish `S` as the new snapshot and return `R` if the CAS wins.
    Commit(S, R),
    /// Leave the snapshot alone and return `R`.
    Abort(R),
}

/// An atomically swapped immutable state.
pub struct AtomicState<S> {
    current: ArcSwap<S>,
}

impl<S> AtomicState<S> {
    /// Wraps an initial snapshot.
    pub fn new(initial: S) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<S> {
        self.current.load_full()
    }

    /// Runs `decide` against the current snapshot until its decision is
    /// published (or it aborts), and returns the decision's outcome.
    pub fn update<R, F>(&self, mut decide: F) -> R
    where
        F: FnMut(&S) -> Transition<S, R>,
    {
        loop {
            let current = self.current.load_full();
            match decide(&current) {
                Transition::Abort(outcome) => return outcome,
                Transition::Commit(next, outcome) => {
                    let prev = self.current.compare_and_swap(&current, Arc::new(next));
                    if Arc::ptr_eq(&prev, &current) {
                        return outcome;
                    }
                }
            }
            std::hint::spin_loop();
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for AtomicState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicState")
            .field(&*self.current.load())
            .finish()
    }
}
