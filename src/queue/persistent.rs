//! Immutable FIFO queue with amortized O(1) operations.
//!
//! Two persistent cons lists: `front` in dequeue order and `rear` in reverse
//! enqueue order. Every operation returns a new queue and leaves the receiver
//! untouched; unchanged tails are shared between versions through `Arc`.
//! That makes a queue safe to embed in a snapshot that is swapped with CAS.
//!
//! Invariant: `rear.len() <= front.len()`. When an operation would break it,
//! the queue is rebuilt as `front ++ reverse(rear)`.

use std::fmt;
use std::iter::FromIterator;
use std::sync::Arc;

type Link<T> = Option<Arc<Cons<T>>>;

struct Cons<T> {
    head: T,
    tail: Link<T>,
}

/// A persistent list with tracked length.
struct List<T> {
    link: Link<T>,
    len: usize,
}

impl<T> Clone for List<T> {
    fn clone(&self) -> Self {
        Self {
            link: self.link.clone(),
            len: self.len,
        }
    }
}

impl<T> List<T> {
    const fn empty() -> Self {
        Self { link: None, len: 0 }
    }

    fn push(&self, head: T) -> Self {
        Self {
            link: Some(Arc::new(Cons {
                head,
                tail: self.link.clone(),
            })),
            len: self.len + 1,
        }
    }

    fn first(&self) -> Option<&T> {
        self.link.as_deref().map(|cons| &cons.head)
    }

    fn rest(&self) -> Self {
        self.link.as_deref().map_or_else(Self::empty, |cons| Self {
            link: cons.tail.clone(),
            len: self.len - 1,
        })
    }

    fn iter(&self) -> ListIter<'_, T> {
        ListIter {
            cursor: self.link.as_deref(),
        }
    }
}

impl<T> Drop for List<T> {
    fn drop(&mut self) {
        // Walk while we hold the only reference so long lists drop iteratively.
        let mut link = self.link.take();
        while let Some(cons) = link {
            match Arc::try_unwrap(cons) {
                Ok(mut owned) => link = owned.tail.take(),
                Err(_) => break,
            }
        }
    }
}

struct ListIter<'a, T> {
    cursor: Option<&'a Cons<T>>,
}

impl<'a, T> Iterator for ListIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let cons = self.cursor?;
        self.cursor = cons.tail.as_deref();
        Some(&cons.head)
    }
}

/// Immutable two-list FIFO queue.
pub struct PersistentQueue<T> {
    front: List<T>,
    rear: List<T>,
}

impl<T> Clone for PersistentQueue<T> {
    fn clone(&self) -> Self {
        Self {
            front: self.front.clone(),
            rear: self.rear.clone(),
        }
    }
}

impl<T> Default for PersistentQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PersistentQueue<T> {
    /// The empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            front: List::empty(),
            rear: List::empty(),
        }
    }

    /// Number of queued values.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.front.len + self.rear.len
    }

    /// Returns true if the queue holds no values.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The value the next `dequeue` would return.
    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        self.front.first()
    }

    /// Iterates front to back.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            front: self.front.iter(),
            rear: self.rear.iter().collect::<Vec<_>>(),
        }
    }
}

impl<T: Clone> PersistentQueue<T> {
    /// Returns a queue with `value` appended.
    #[must_use]
    pub fn enqueue(&self, value: T) -> Self {
        Self::balanced(self.front.clone(), self.rear.push(value))
    }

    /// Returns the front value and the queue without it, or `None` if empty.
    #[must_use]
    pub fn dequeue(&self) -> Option<(T, Self)> {
        let head = self.front.first()?.clone();
        Some((head, Self::balanced(self.front.rest(), self.rear.clone())))
    }

    fn balanced(front: List<T>, rear: List<T>) -> Self {
        if rear.len <= front.len {
            return Self { front, rear };
        }
        let mut tail = List::empty();
        for value in rear.iter() {
            tail = tail.push(value.clone());
        }
        let prefix: Vec<&T> = front.iter().collect();
        for value in prefix.into_iter().rev() {
            tail = tail.push(value.clone());
        }
        Self {
            front: tail,
            rear: List::empty(),
        }
    }
}

impl<T: Clone> FromIterator<T> for PersistentQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |queue, value| queue.enqueue(value))
    }
}

impl<T: fmt::Debug> fmt::Debug for PersistentQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Front-to-back iterator over a [`PersistentQueue`].
pub struct Iter<'a, T> {
    front: ListIter<'a, T>,
    rear: Vec<&'a T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if let Some(value) = self.front.next() {
            return Some(value);
        }
        // `rear` was collected newest-first; popping yields oldest-first.
        self.rear.pop()
    }
}

impl<'a, T> IntoIterator for &'a PersistentQueue<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}
