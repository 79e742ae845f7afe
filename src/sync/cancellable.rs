//! Task handles with an atomic lifecycle.
//!
//! A [`Cancellable`] owns one spawned operation. Its status moves exactly
//! once, by CAS, from `Running` to one of:
//!
//! - `Finished`: the operation completed on its own;
//! - `Cancelled`: someone called [`Cancellable::cancel`];
//! - `Released`: the owner gave up the handle without cancelling.
//!
//! Cancellation is cooperative. It flips the status, then runs the hooks the
//! operation registered through its [`CancelToken`]; the operation observes
//! it at its next [`CancelToken::checkpoint`] or through whatever a hook
//! unblocked. The operation is never dropped mid-flight.

use super::leak::{report_leak, LeakPolicy};
use super::resumption::Slot;
use crate::error::{Error, ErrorKind, Result};
use crate::queue::LockFreeQueue;
use crate::tracing_compat::debug;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

/// Lifecycle of a [`Cancellable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The operation is in flight.
    Running,
    /// The operation completed.
    Finished,
    /// The operation was cancelled.
    Cancelled,
    /// The handle was released; nobody will cancel or await it.
    Released,
}

impl Status {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::Finished => 1,
            Self::Cancelled => 2,
            Self::Released => 3,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            1 => Self::Finished,
            2 => Self::Cancelled,
            _ => Self::Released,
        }
    }
}

/// An illegal lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal status transition {from:?} -> {to:?}")]
pub struct StatusError {
    /// The status observed when the transition was attempted.
    pub from: Status,
    /// The requested status.
    pub to: Status,
}

impl From<StatusError> for Error {
    fn from(e: StatusError) -> Self {
        Self::new(ErrorKind::InvalidStateTransition).with_message(e.to_string())
    }
}

type Hook = Box<dyn FnOnce() + Send>;

/// State shared by the handle, its tokens and the running operation.
struct Control {
    status: AtomicU8,
    hooks: LockFreeQueue<Hook>,
}

impl Control {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            status: AtomicU8::new(Status::Running.as_u8()),
            hooks: LockFreeQueue::new(),
        })
    }

    fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::SeqCst))
    }

    fn transition(&self, to: Status) -> core::result::Result<(), StatusError> {
        self.status
            .compare_exchange(
                Status::Running.as_u8(),
                to.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(drop)
            .map_err(|raw| StatusError {
                from: Status::from_u8(raw),
                to,
            })
    }

    fn cancel(&self) -> core::result::Result<(), StatusError> {
        self.transition(Status::Cancelled)?;
        debug!("cancellable cancelled");
        self.run_hooks();
        Ok(())
    }

    fn run_hooks(&self) {
        for hook in self.hooks.drain() {
            hook();
        }
    }

    fn on_cancel(&self, hook: Hook) {
        self.hooks.enqueue(hook);
        // A cancel that raced with the enqueue may have drained before our
        // hook was visible; drain again so it still runs exactly once.
        if self.status() == Status::Cancelled {
            self.run_hooks();
        }
    }

    /// Marks completion. Hooks still queued can no longer matter and are
    /// dropped, unless a cancel won the CAS: that cancel owns the drain.
    fn finish(&self) {
        match self.transition(Status::Finished) {
            Err(StatusError {
                from: Status::Cancelled,
                ..
            }) => {}
            _ => self.hooks.drain().for_each(drop),
        }
    }
}

/// Publishes the operation's outcome exactly once.
///
/// Moved into the spawned task, so a runtime that drops the task before it
/// finishes still completes the slot with `ErrorKind::Shutdown`.
struct Completer<T> {
    control: Arc<Control>,
    slot: Arc<Slot<T>>,
    done: bool,
}

impl<T> Completer<T> {
    fn complete(mut self, result: Result<T>) {
        self.done = true;
        self.control.finish();
        self.slot.complete(result);
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        debug!("cancellable task dropped before completion");
        self.control.finish();
        self.slot.complete(Err(Error::new(ErrorKind::Shutdown)
            .with_message("the runtime dropped the task before it finished")));
    }
}

/// The operation's view of its own cancellation.
#[derive(Clone)]
pub struct CancelToken {
    control: Arc<Control>,
}

impl CancelToken {
    /// Returns true once the owning handle has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.control.status() == Status::Cancelled
    }

    /// `Err(Cancelled)` if cancellation has been requested.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::cancelled())
        } else {
            Ok(())
        }
    }

    /// Runs `hook` once when the handle is cancelled, or right away if it
    /// already was. Hooks run on the cancelling thread.
    pub fn on_cancel<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.control.on_cancel(Box::new(hook));
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("status", &self.control.status())
            .finish()
    }
}

/// A cloneable remote control for a [`Cancellable`].
#[derive(Clone)]
pub struct CancelHandle {
    control: Arc<Control>,
}

impl CancelHandle {
    /// Cancels the operation. Fails unless it is still running.
    pub fn cancel(&self) -> core::result::Result<(), StatusError> {
        self.control.cancel()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.control.status()
    }

    /// Returns true once cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status() == Status::Cancelled
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("status", &self.status())
            .finish()
    }
}

/// A spawned, cancellable operation producing `Result<T>`.
#[must_use = "a running Cancellable must be awaited, cancelled or released"]
pub struct Cancellable<T> {
    control: Arc<Control>,
    slot: Arc<Slot<T>>,
    policy: LeakPolicy,
}

impl<T: Send + 'static> Cancellable<T> {
    /// Spawns `op(token)` on the current runtime and returns its handle.
    pub fn new<F, Fut>(op: F) -> Self
    where
        F: FnOnce(CancelToken) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self::with_policy(LeakPolicy::current_default(), op)
    }

    /// [`Cancellable::new`] with an explicit leak policy.
    pub fn with_policy<F, Fut>(policy: LeakPolicy, op: F) -> Self
    where
        F: FnOnce(CancelToken) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let control = Control::new();
        let slot = Slot::new();
        let future = op(CancelToken {
            control: Arc::clone(&control),
        });
        let completer = Completer {
            control: Arc::clone(&control),
            slot: Arc::clone(&slot),
            done: false,
        };
        crate::runtime::spawn(async move {
            let result = CatchUnwind::new(future).await;
            completer.complete(result);
        });
        Self {
            control,
            slot,
            policy,
        }
    }

    /// Spawns an operation that ignores cancellation requests.
    pub fn spawn<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self::new(|_token| future)
    }
}

impl<T> Cancellable<T> {
    /// Waits for the operation's result. Only the first call gets it; later
    /// calls return `ResultTaken`.
    pub fn value(&self) -> Value<'_, T> {
        Value { slot: &self.slot }
    }

    /// Requests cancellation. Fails unless the operation is still running.
    pub fn cancel(&self) -> core::result::Result<(), StatusError> {
        self.control.cancel()
    }

    /// Gives up the handle without cancelling. Fails unless still running.
    pub fn release(&self) -> core::result::Result<(), StatusError> {
        self.control.transition(Status::Released)
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.control.status()
    }

    /// Returns true once cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status() == Status::Cancelled
    }

    /// Returns true once the operation completed on its own.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status() == Status::Finished
    }

    /// A cloneable handle that can cancel this operation from elsewhere.
    #[must_use]
    pub fn handle(&self) -> CancelHandle {
        CancelHandle {
            control: Arc::clone(&self.control),
        }
    }
}

impl<T> Drop for Cancellable<T> {
    fn drop(&mut self) {
        if self.control.status() != Status::Running {
            return;
        }
        report_leak(self.policy, "Cancellable");
        let _ = self.control.cancel();
    }
}

impl<T> fmt::Debug for Cancellable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancellable")
            .field("status", &self.status())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Future returned by [`Cancellable::value`].
#[must_use = "futures do nothing unless awaited"]
pub struct Value<'a, T> {
    slot: &'a Slot<T>,
}

impl<T> Future for Value<'_, T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<T>> {
        self.slot.poll_take(cx)
    }
}

/// A spawned operation that cannot be cancelled.
///
/// Used where work must run to completion, such as releasing waiters.
#[must_use = "a running Uncancellable must be awaited or released"]
pub struct Uncancellable<T> {
    inner: Cancellable<T>,
}

impl<T: Send + 'static> Uncancellable<T> {
    /// Spawns `future` on the current runtime.
    pub fn new<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            inner: Cancellable::spawn(future),
        }
    }
}

impl<T> Uncancellable<T> {
    /// Waits for the operation's result.
    pub fn value(&self) -> Value<'_, T> {
        self.inner.value()
    }

    /// Gives up the handle; the operation keeps running.
    pub fn release(&self) -> core::result::Result<(), StatusError> {
        self.inner.release()
    }

    /// Current status (never `Cancelled`).
    #[must_use]
    pub fn status(&self) -> Status {
        self.inner.status()
    }

    /// Returns true once the operation completed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

impl<T> Drop for Uncancellable<T> {
    fn drop(&mut self) {
        if self.inner.status() != Status::Running {
            return;
        }
        report_leak(self.inner.policy, "Uncancellable");
        let _ = self.inner.release();
    }
}

impl<T> fmt::Debug for Uncancellable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Uncancellable")
            .field("status", &self.status())
            .finish()
    }
}

/// Turns a panic inside the wrapped future into `ErrorKind::Panicked`.
struct CatchUnwind<F> {
    inner: Pin<Box<F>>,
}

impl<F> CatchUnwind<F> {
    fn new(inner: F) -> Self {
        Self {
            inner: Box::pin(inner),
        }
    }
}

impl<T, F: Future<Output = Result<T>>> Future for CatchUnwind<F> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<T>> {
        let inner = self.inner.as_mut();
        match catch_unwind(AssertUnwindSafe(|| inner.poll(cx))) {
            Ok(poll) => poll,
            Err(payload) => Poll::Ready(Err(Error::new(ErrorKind::Panicked)
                .with_message(panic_message(payload.as_ref())))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "task panicked".to_string())
}
