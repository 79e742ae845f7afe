//! Exactly-once continuations and cancellable tasks.
//!
//! - [`Resumption`] / [`pause`]: single-fire continuations
//! - [`Cancellable`] / [`Uncancellable`]: spawned operations with an atomic lifecycle
//! - [`AtomicState`]: CAS-retry updates over immutable snapshots
//! - [`LeakPolicy`]: what happens when one of the above is dropped unresolved

pub mod atomic_state;
pub mod cancellable;
pub mod leak;
pub mod resumption;

pub use atomic_state::{AtomicState, Transition};
pub use cancellable::{CancelHandle, CancelToken, Cancellable, Status, StatusError, Uncancellable, Value};
pub use leak::{leaks_detected, LeakPolicy};
pub use resumption::{pause, pause_with, ResumeError, Resumption, Suspended};
