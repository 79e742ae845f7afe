//! Queues used by the channel and the cancellation machinery.
//!
//! - [`LockFreeQueue`]: unbounded MPMC FIFO, mutated in place with CAS
//! - [`PersistentQueue`]: immutable FIFO, every operation returns a new queue

pub mod lock_free;
pub mod persistent;

pub use lock_free::LockFreeQueue;
pub use persistent::PersistentQueue;
