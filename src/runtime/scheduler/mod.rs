//! Work-stealing scheduler.
//!
//! Each worker owns a [`LocalQueue`] and shares one [`GlobalQueue`]. An idle
//! worker looks at its own deque, then the global queue, then steals half of
//! a random sibling's deque, and finally parks with a timeout so that work
//! pushed to a busy sibling is eventually picked up.

pub(crate) mod global_queue;
pub(crate) mod local_queue;
pub(crate) mod stealing;
pub(crate) mod worker;

pub(crate) use global_queue::GlobalQueue;
pub(crate) use local_queue::{LocalQueue, Stealer};
pub(crate) use worker::{Parker, Worker};
