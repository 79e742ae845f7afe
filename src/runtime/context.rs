//! Thread-local record of which runtime the current thread belongs to.

use super::scheduler::LocalQueue;
use super::Shared;
use std::cell::RefCell;
use std::sync::Arc;

struct WorkerSlot {
    runtime: Arc<Shared>,
    index: usize,
    local: LocalQueue,
}

thread_local! {
    static WORKER: RefCell<Option<WorkerSlot>> = const { RefCell::new(None) };
    static ENTERED: RefCell<Option<Arc<Shared>>> = const { RefCell::new(None) };
}

/// Clears the worker slot when the worker loop exits.
pub(crate) struct WorkerGuard(());

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        WORKER.with(|slot| slot.borrow_mut().take());
    }
}

pub(crate) fn enter_worker(runtime: &Arc<Shared>, index: usize, local: LocalQueue) -> WorkerGuard {
    WORKER.with(|slot| {
        *slot.borrow_mut() = Some(WorkerSlot {
            runtime: Arc::clone(runtime),
            index,
            local,
        });
    });
    WorkerGuard(())
}

/// Restores the previously entered runtime on drop.
pub(crate) struct EnterGuard {
    previous: Option<Arc<Shared>>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ENTERED.with(|slot| *slot.borrow_mut() = previous);
    }
}

pub(crate) fn enter(runtime: Arc<Shared>) -> EnterGuard {
    let previous = ENTERED.with(|slot| slot.borrow_mut().replace(runtime));
    EnterGuard { previous }
}

/// The runtime this thread works for, or the one it entered.
pub(crate) fn current() -> Option<Arc<Shared>> {
    WORKER
        .with(|slot| slot.borrow().as_ref().map(|w| Arc::clone(&w.runtime)))
        .or_else(|| ENTERED.with(|slot| slot.borrow().clone()))
}

/// The calling worker's index and deque, if it is a worker of `runtime`.
pub(crate) fn local_queue_for(runtime: &Arc<Shared>) -> Option<(usize, LocalQueue)> {
    WORKER.with(|slot| {
        slot.borrow()
            .as_ref()
            .filter(|w| Arc::ptr_eq(&w.runtime, runtime))
            .map(|w| (w.index, w.local.clone()))
    })
}
