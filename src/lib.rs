//! Foldsync: exactly-once continuations, lock-free queues and fold-driven
//! stream combinators for Rust.
//!
//! # Overview
//!
//! Foldsync is a small kit of low-level async concurrency primitives. Every
//! suspension is an explicit continuation that must be resumed exactly once,
//! every queue and channel is either lock-free or a single atomically swapped
//! immutable snapshot, and every multi-producer combinator is a state machine
//! driven by one sequential fold.
//!
//! # Core Guarantees
//!
//! - **Exactly-once resume**: a [`Resumption`] delivers one result; a second attempt is an error
//! - **No silent leaks**: dropping a pending resumption or task is reported per [`LeakPolicy`]
//! - **Atomic lifecycles**: a [`Cancellable`] leaves `Running` exactly once, by CAS
//! - **No partial updates**: channel operations publish whole snapshots or retry
//! - **Bounded buffering**: a combinator holds at most one in-flight value per upstream
//! - **Nobody hangs**: cancelling a channel or fold resolves every waiting party
//!
//! # Module Structure
//!
//! - [`sync`]: Resumptions, cancellable tasks, leak policy, CAS-retry state
//! - [`queue`]: Lock-free MPMC queue and persistent FIFO queue
//! - [`channel`]: Rendezvous/buffered channel over one atomic snapshot
//! - [`fold`]: Single-consumer fold engine
//! - [`publisher`]: Push-based stream seam with demand
//! - [`combinator`]: Zip, select and merge
//! - [`runtime`]: Work-stealing task runtime and its configuration
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```ignore
//! use foldsync::{combinator::zip, Demand, Event, Publisher};
//!
//! let task = zip(Publisher::from_iter(0..3), Publisher::from_iter(['a', 'b', 'c']))
//!     .sink(|event| async move {
//!         if let Event::Value((n, c)) = event {
//!             println!("{n} {c}");
//!         }
//!         Ok(Demand::More)
//!     });
//! foldsync::runtime::block_on(task.value())?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(dead_code)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_inception)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod channel;
pub mod combinator;
pub mod error;
pub mod fold;
pub mod publisher;
pub mod queue;
pub mod runtime;
pub mod sync;
pub mod tracing_compat;
pub(crate) mod util;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-exports for convenient access to core types
pub use channel::{BufferingPolicy, Channel};
pub use combinator::{merge, select, zip, zip3, Either};
pub use error::{
    Completion, Error, ErrorCategory, ErrorKind, Recoverability, Result, ResultExt, WriteError,
};
pub use fold::{AsyncFold, Effect, Folder, FnFolder};
pub use publisher::{Demand, Downstream, Event, Publisher};
pub use queue::{LockFreeQueue, PersistentQueue};
pub use runtime::{Runtime, RuntimeBuilder, RuntimeConfig};
pub use sync::{
    pause, CancelHandle, CancelToken, Cancellable, LeakPolicy, Resumption, Status, Suspended,
    Uncancellable,
};
