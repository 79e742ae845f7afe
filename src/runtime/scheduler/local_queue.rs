//! Per-worker local queue.
//!
//! A lock-based deque: the owning worker pushes and pops at the back (LIFO,
//! cache-warm), thieves take from the front (FIFO, oldest work first).

use crate::runtime::task::TaskRef;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// A worker's own task deque. Cloning shares the same deque.
#[derive(Debug, Clone, Default)]
pub(crate) struct LocalQueue {
    inner: Arc<Mutex<VecDeque<TaskRef>>>,
}

impl LocalQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, task: TaskRef) {
        self.inner.lock().push_back(task);
    }

    pub(crate) fn pop(&self) -> Option<TaskRef> {
        self.inner.lock().pop_back()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub(crate) fn stealer(&self) -> Stealer {
        Stealer {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Steal side of another worker's [`LocalQueue`].
#[derive(Debug, Clone)]
pub(crate) struct Stealer {
    inner: Arc<Mutex<VecDeque<TaskRef>>>,
}

impl Stealer {
    pub(crate) fn steal(&self) -> Option<TaskRef> {
        self.inner.lock().pop_front()
    }

    /// Moves half of the victim's tasks (at least one) into `dest` and returns
    /// one of them to run immediately.
    pub(crate) fn steal_half_into(&self, dest: &LocalQueue) -> Option<TaskRef> {
        let mut stolen = {
            let mut victim = self.inner.lock();
            let count = victim.len().div_ceil(2);
            victim.drain(..count).collect::<VecDeque<_>>()
        };
        let first = stolen.pop_front()?;
        if !stolen.is_empty() {
            dest.inner.lock().extend(stolen);
        }
        Some(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::task::Task;

    fn ids(queue: &LocalQueue) -> Vec<u64> {
        std::iter::from_fn(|| queue.pop()).map(|t| t.id()).collect()
    }

    #[test]
    fn owner_pop_is_lifo() {
        let queue = LocalQueue::new();
        for id in 1..=3 {
            queue.push(Task::detached(id));
        }
        assert_eq!(ids(&queue), vec![3, 2, 1]);
        assert!(queue.is_empty());
    }

    #[test]
    fn thief_steal_is_fifo() {
        let queue = LocalQueue::new();
        for id in 1..=3 {
            queue.push(Task::detached(id));
        }
        let stealer = queue.stealer();
        assert_eq!(stealer.steal().map(|t| t.id()), Some(1));
        assert_eq!(stealer.steal().map(|t| t.id()), Some(2));
    }

    #[test]
    fn steal_half_moves_without_loss() {
        let src = LocalQueue::new();
        let dest = LocalQueue::new();
        for id in 0..7 {
            src.push(Task::detached(id));
        }
        let first = src.stealer().steal_half_into(&dest).expect("stolen");
        assert_eq!(first.id(), 0);
        let mut remaining = ids(&dest);
        remaining.extend(ids(&src));
        remaining.push(first.id());
        remaining.sort_unstable();
        assert_eq!(remaining, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn steal_from_empty() {
        let src = LocalQueue::new();
        assert!(src.stealer().steal_half_into(&LocalQueue::new()).is_none());
    }
}
