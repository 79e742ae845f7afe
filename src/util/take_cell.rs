//! A value that can be moved out exactly once through a shared reference.

use crossbeam_queue::ArrayQueue;

/// Holds at most one value; the first `take` wins it.
///
/// A one-element `ArrayQueue`: `pop` hands the value to exactly one caller
/// without a lock, and the cell is `Sync` for any `T: Send`.
pub(crate) struct TakeCell<T> {
    value: ArrayQueue<T>,
}

impl<T> TakeCell<T> {
    pub(crate) fn new(value: T) -> Self {
        let cell = Self::empty();
        // A fresh cell has room for exactly this value.
        let _ = cell.value.push(value);
        cell
    }

    pub(crate) fn empty() -> Self {
        Self {
            value: ArrayQueue::new(1),
        }
    }

    /// Moves the value out. Every call after the first returns `None`.
    pub(crate) fn take(&self) -> Option<T> {
        self.value.pop()
    }
}

impl<T> std::fmt::Debug for TakeCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TakeCell").finish_non_exhaustive()
    }
}
