//! Type-erased spawned tasks and their wakers.

use super::Shared;
use crate::tracing_compat::{debug, error, trace};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Wake, Waker};

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub(crate) type TaskRef = Arc<Task>;

/// A spawned future plus its scheduling state.
///
/// `notified` is set while the task sits in a run queue, so any number of
/// wakes before the next poll enqueue it once.
pub(crate) struct Task {
    id: u64,
    future: Mutex<Option<BoxFuture>>,
    notified: AtomicBool,
    runtime: Weak<Shared>,
}

impl Task {
    pub(crate) fn new<F>(id: u64, future: F, runtime: Weak<Shared>) -> TaskRef
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Arc::new(Self {
            id,
            future: Mutex::new(Some(Box::pin(future))),
            notified: AtomicBool::new(true),
            runtime,
        })
    }

    /// A task with nothing to run and no runtime, for queue tests.
    #[cfg(test)]
    pub(crate) fn detached(id: u64) -> TaskRef {
        Arc::new(Self {
            id,
            future: Mutex::new(None),
            notified: AtomicBool::new(true),
            runtime: Weak::new(),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Polls the task once. A panic drops the future and is logged.
    pub(crate) fn run(self: &Arc<Self>) {
        let mut slot = self.future.lock();
        self.notified.store(false, Ordering::Release);
        let Some(future) = slot.as_mut() else {
            return;
        };
        let waker = Waker::from(Arc::clone(self));
        let mut cx = Context::from_waker(&waker);
        match catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx))) {
            Ok(Poll::Pending) if self.runtime_gone() => {
                debug!(task_id = self.id, "runtime shut down; abandoning pending task");
                *slot = None;
            }
            Ok(Poll::Pending) => {}
            Ok(Poll::Ready(())) => {
                trace!(task_id = self.id, "task completed");
                *slot = None;
            }
            Err(_) => {
                error!(task_id = self.id, "task panicked; dropping it");
                *slot = None;
            }
        }
    }

    /// Drops the future without polling it again.
    ///
    /// A task being polled right now keeps its future; `run` drops it once
    /// the poll returns and sees the runtime gone.
    pub(crate) fn abandon(&self) {
        let future = self.future.try_lock().and_then(|mut slot| slot.take());
        if future.is_some() {
            trace!(task_id = self.id, "task abandoned");
        }
        drop(future);
    }

    fn runtime_gone(&self) -> bool {
        self.runtime
            .upgrade()
            .map_or(true, |runtime| runtime.is_shutdown())
    }

    fn schedule(self: &Arc<Self>) {
        if self.notified.swap(true, Ordering::AcqRel) {
            return;
        }
        match self.runtime.upgrade() {
            Some(runtime) => runtime.schedule(Arc::clone(self)),
            None => self.abandon(),
        }
    }
}

impl Wake for Task {
    fn wake(self: Arc<Self>) {
        self.schedule();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.schedule();
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("notified", &self.notified.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
