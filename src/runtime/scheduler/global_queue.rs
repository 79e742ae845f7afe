//! Global injection queue.
//!
//! Tasks spawned or woken from outside a worker thread land here; every
//! worker polls it after its own deque runs dry.

use crate::runtime::task::TaskRef;
use crossbeam_queue::SegQueue;

/// Unbounded MPMC queue shared by all workers.
#[derive(Debug, Default)]
pub(crate) struct GlobalQueue {
    inner: SegQueue<TaskRef>,
}

impl GlobalQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: SegQueue::new(),
        }
    }

    pub(crate) fn push(&self, task: TaskRef) {
        self.inner.push(task);
    }

    pub(crate) fn pop(&self) -> Option<TaskRef> {
        self.inner.pop()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
