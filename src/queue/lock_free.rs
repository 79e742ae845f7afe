//! Unbounded multi-producer multi-consumer FIFO queue.
//!
//! A Michael-Scott linked queue. `head` always points at a dummy node whose
//! successor holds the next value; `tail` points at the last node or lags it
//! by one link until some thread helps it forward.
//!
//! Links are [`ArcSwapOption`]s, so reclamation is reference counting rather
//! than hazard pointers or epochs. A dequeued dummy gets its `next` pointed at
//! a per-queue *marker* node. This does two things:
//!
//! - the retired node stops retaining the chain behind it, so a reader that
//!   still holds an old head cannot keep every later node alive;
//! - an operation that loaded a node just before it was unlinked sees
//!   `next == marker` and retries, instead of mistaking the node for the
//!   tail of an empty queue (`next == None`).

use crate::util::TakeCell;
use arc_swap::{ArcSwap, ArcSwapOption};
use std::fmt;
use std::sync::Arc;

struct Node<T> {
    value: TakeCell<T>,
    next: ArcSwapOption<Node<T>>,
}

impl<T> Node<T> {
    fn dummy() -> Arc<Self> {
        Arc::new(Self {
            value: TakeCell::empty(),
            next: ArcSwapOption::empty(),
        })
    }

    fn with_value(value: T) -> Arc<Self> {
        Arc::new(Self {
            value: TakeCell::new(value),
            next: ArcSwapOption::empty(),
        })
    }
}

/// Lock-free unbounded MPMC queue.
pub struct LockFreeQueue<T> {
    head: ArcSwap<Node<T>>,
    tail: ArcSwap<Node<T>>,
    marker: Arc<Node<T>>,
}

impl<T> LockFreeQueue<T> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let dummy = Node::dummy();
        Self {
            head: ArcSwap::new(Arc::clone(&dummy)),
            tail: ArcSwap::new(dummy),
            marker: Node::dummy(),
        }
    }

    fn is_marker(&self, node: &Arc<Node<T>>) -> bool {
        Arc::ptr_eq(node, &self.marker)
    }

    /// Appends a value at the tail.
    pub fn enqueue(&self, value: T) {
        let node = Node::with_value(value);
        loop {
            let tail = self.tail.load_full();
            match tail.next.load_full() {
                // `tail` was retired after we loaded it; reload.
                Some(next) if self.is_marker(&next) => {
                    std::hint::spin_loop();
                }
                // Someone linked ahead of the published tail: help it along.
                Some(next) => {
                    let _ = self.tail.compare_and_swap(&tail, next);
                }
                None => {
                    let prev = tail
                        .next
                        .compare_and_swap(&None::<Arc<Node<T>>>, Some(Arc::clone(&node)));
                    if prev.is_none() {
                        let _ = self.tail.compare_and_swap(&tail, node);
                        return;
                    }
                }
            }
        }
    }

    /// Removes the value at the head, or returns `None` if the queue is empty.
    pub fn dequeue(&self) -> Option<T> {
        loop {
            let head = self.head.load_full();
            let next = head.next.load_full()?;
            if self.is_marker(&next) {
                std::hint::spin_loop();
                continue;
            }
            if Arc::ptr_eq(&head, &self.tail.load()) {
                let _ = self.tail.compare_and_swap(&head, Arc::clone(&next));
            }
            let prev = self.head.compare_and_swap(&head, Arc::clone(&next));
            if Arc::ptr_eq(&prev, &head) {
                head.next.store(Some(Arc::clone(&self.marker)));
                return next.value.take();
            }
        }
    }

    /// Returns true if no value was queued at the instant of the check.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        loop {
            let head = self.head.load_full();
            match head.next.load_full() {
                None => return true,
                Some(next) if self.is_marker(&next) => std::hint::spin_loop(),
                Some(_) => return false,
            }
        }
    }

    /// Dequeues everything currently reachable, in FIFO order.
    pub fn drain(&self) -> Drain<'_, T> {
        Drain { queue: self }
    }
}

impl<T> Default for LockFreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LockFreeQueue<T> {
    fn drop(&mut self) {
        // Unlink iteratively; a recursive Arc drop would overflow on long chains.
        let mut next = self.head.load_full().next.swap(None);
        while let Some(node) = next {
            next = node.next.swap(None);
        }
    }
}

impl<T> fmt::Debug for LockFreeQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeQueue")
            .field("is_empty", &self.is_empty())
            .finish()
    }
}

/// Iterator returned by [`LockFreeQueue::drain`].
pub struct Drain<'a, T> {
    queue: &'a LockFreeQueue<T>,
}

impl<T> Iterator for Drain<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.queue.dequeue()
    }
}
