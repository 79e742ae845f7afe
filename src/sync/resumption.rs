//! Single-fire continuations.
//!
//! A [`Resumption`] is the fulfillment side of one suspended computation and
//! [`Suspended`] is the future that computation awaits. The pair behaves like
//! a oneshot whose sender must be used exactly once:
//!
//! - `resume`/`fail` flip `Waiting -> Resumed` with a CAS; the loser of a
//!   race gets [`ResumeError::AlreadyResumed`] and delivers nothing.
//! - Dropping a still-waiting resumption is a leak, handled per
//!   [`LeakPolicy`].
//!
//! [`pause`] is the suspension primitive the rest of the crate is built on.

use super::leak::{report_leak, LeakPolicy};
use crate::error::{Error, ErrorKind, Result};
use crossbeam_queue::ArrayQueue;
use futures_util::task::AtomicWaker;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

const WAITING: u8 = 0;
const RESUMED: u8 = 1;

/// Error returned when a resumption is resolved twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ResumeError {
    /// The resumption has already delivered a result.
    #[error("resumption already resumed")]
    AlreadyResumed,
}

impl From<ResumeError> for Error {
    fn from(e: ResumeError) -> Self {
        match e {
            ResumeError::AlreadyResumed => Self::new(ErrorKind::AlreadyResumed),
        }
    }
}

/// Result cell plus the waker of whoever awaits it. Shared with `Cancellable`.
///
/// Lock-free: the result travels through a one-element `ArrayQueue`, so
/// exactly one poller can pop it, and `taken` remembers that it did.
pub(crate) struct Slot<T> {
    result: ArrayQueue<Result<T>>,
    waker: AtomicWaker,
    taken: AtomicBool,
}

impl<T> Slot<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            result: ArrayQueue::new(1),
            waker: AtomicWaker::new(),
            taken: AtomicBool::new(false),
        })
    }

    /// Stores the result and wakes the waiter. The caller guarantees a single call.
    pub(crate) fn complete(&self, result: Result<T>) {
        if self.result.push(result).is_err() {
            debug_assert!(false, "slot completed twice");
        }
        self.waker.wake();
    }

    pub(crate) fn poll_take(&self, cx: &Context<'_>) -> Poll<Result<T>> {
        if let Some(result) = self.take() {
            return Poll::Ready(result);
        }
        if self.taken.load(Ordering::Acquire) {
            return Poll::Ready(Err(Error::new(ErrorKind::ResultTaken)));
        }
        // Register, then look again so a concurrent `complete` is not missed.
        self.waker.register(cx.waker());
        if let Some(result) = self.take() {
            return Poll::Ready(result);
        }
        if self.taken.load(Ordering::Acquire) {
            return Poll::Ready(Err(Error::new(ErrorKind::ResultTaken)));
        }
        Poll::Pending
    }

    pub(crate) fn is_complete(&self) -> bool {
        !self.result.is_empty() || self.taken.load(Ordering::Acquire)
    }

    fn take(&self) -> Option<Result<T>> {
        let result = self.result.pop()?;
        self.taken.store(true, Ordering::Release);
        // Another poller may have registered between our pop and the store.
        self.waker.wake();
        Some(result)
    }
}

/// The fulfillment side of a suspended computation.
///
/// Not `Clone`: whoever holds it owns the obligation to resolve it exactly
/// once. Resolution takes `&self`, so a resumption can sit inside shared
/// immutable snapshots and still be resolved by whichever party wins it.
#[must_use = "a resumption must be resumed or failed; dropping it is a leak"]
pub struct Resumption<T> {
    slot: Arc<Slot<T>>,
    status: AtomicU8,
    policy: LeakPolicy,
}

impl<T> Resumption<T> {
    /// Creates a resumption with the process default leak policy.
    pub fn new() -> (Self, Suspended<T>) {
        Self::with_policy(LeakPolicy::current_default())
    }

    /// Creates a resumption with an explicit leak policy.
    pub fn with_policy(policy: LeakPolicy) -> (Self, Suspended<T>) {
        let slot = Slot::new();
        let suspended = Suspended {
            slot: Arc::clone(&slot),
        };
        (
            Self {
                slot,
                status: AtomicU8::new(WAITING),
                policy,
            },
            suspended,
        )
    }

    /// Resumes the suspended party with a value.
    pub fn resume(&self, value: T) -> core::result::Result<(), ResumeError> {
        self.resume_with(Ok(value))
    }

    /// Resumes the suspended party with an error.
    pub fn fail(&self, error: Error) -> core::result::Result<(), ResumeError> {
        self.resume_with(Err(error))
    }

    /// Resumes the suspended party with a result.
    pub fn resume_with(&self, result: Result<T>) -> core::result::Result<(), ResumeError> {
        self.claim()?;
        self.slot.complete(result);
        Ok(())
    }

    /// Returns true once a result has been delivered (or the resumption retired).
    #[must_use]
    pub fn is_resumed(&self) -> bool {
        self.status.load(Ordering::Acquire) == RESUMED
    }

    /// The leak policy applied if this resumption is dropped unresolved.
    #[must_use]
    pub fn policy(&self) -> LeakPolicy {
        self.policy
    }

    /// Marks a resumption that was never handed to anyone as resolved.
    ///
    /// Its `Suspended` side must be dropped by the caller without awaiting.
    pub(crate) fn retire(&self) {
        let _ = self.claim();
    }

    fn claim(&self) -> core::result::Result<(), ResumeError> {
        self.status
            .compare_exchange(WAITING, RESUMED, Ordering::AcqRel, Ordering::Acquire)
            .map(drop)
            .map_err(|_| ResumeError::AlreadyResumed)
    }
}

impl<T> Drop for Resumption<T> {
    fn drop(&mut self) {
        if self.claim().is_err() {
            return;
        }
        report_leak(self.policy, "Resumption");
        self.slot.complete(Err(Error::new(ErrorKind::ResumptionLeaked)
            .with_message("resumption dropped without being resumed")));
    }
}

impl<T> fmt::Debug for Resumption<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resumption")
            .field("resumed", &self.is_resumed())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Future side of a [`Resumption`]. Resolves with whatever the resumption delivers.
#[must_use = "futures do nothing unless awaited"]
pub struct Suspended<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Suspended<T> {
    /// Returns true once the paired resumption has delivered a result.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.slot.is_complete()
    }
}

impl<T> Future for Suspended<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.slot.poll_take(cx)
    }
}

impl<T> fmt::Debug for Suspended<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suspended")
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Hands a fresh resumption to `body` and returns the future that resolves
/// when it is resumed.
///
/// `body` runs immediately, before the returned future is first polled.
pub fn pause<T, F>(body: F) -> Suspended<T>
where
    F: FnOnce(Resumption<T>),
{
    pause_with(LeakPolicy::current_default(), body)
}

/// [`pause`] with an explicit leak policy for the resumption.
pub fn pause_with<T, F>(policy: LeakPolicy, body: F) -> Suspended<T>
where
    F: FnOnce(Resumption<T>),
{
    let (resumption, suspended) = Resumption::with_policy(policy);
    body(resumption);
    suspended
}
