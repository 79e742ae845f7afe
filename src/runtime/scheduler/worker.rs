//! Worker thread logic.

use crate::runtime::scheduler::local_queue::{LocalQueue, Stealer};
use crate::runtime::scheduler::stealing;
use crate::runtime::task::TaskRef;
use crate::runtime::{context, Shared};
use crate::tracing_compat::{debug, trace};
use crate::util::XorShift64;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Identifier for a scheduler worker.
pub(crate) type WorkerId = usize;

/// One worker thread's scheduling state.
pub(crate) struct Worker {
    id: WorkerId,
    local: LocalQueue,
    /// Every sibling's steal handle, excluding our own.
    stealers: Vec<Stealer>,
    shared: Arc<Shared>,
    rng: XorShift64,
}

impl Worker {
    pub(crate) fn new(id: WorkerId, local: LocalQueue, shared: Arc<Shared>) -> Self {
        let stealers = shared
            .stealers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != id)
            .map(|(_, s)| s.clone())
            .collect();
        Self {
            id,
            local,
            stealers,
            shared,
            rng: XorShift64::new(id as u64 + 1),
        }
    }

    /// Runs the scheduling loop until the runtime shuts down.
    pub(crate) fn run_loop(mut self) {
        if let Some(callback) = self.shared.config.on_thread_start.as_ref() {
            callback();
        }
        debug!(worker_id = self.id, "worker started");
        let _guard = context::enter_worker(&self.shared, self.id, self.local.clone());
        let parker = self.shared.parkers[self.id].clone();
        let park_timeout = self.shared.config.park_timeout;

        while !self.shared.shutdown.load(Ordering::Acquire) {
            if let Some(task) = self.next_task() {
                trace!(task_id = task.id(), worker_id = self.id, "executing task");
                task.run();
                continue;
            }
            parker.park_timeout(park_timeout);
        }

        while let Some(task) = self.local.pop() {
            task.abandon();
        }
        self.shared.abandon_queued();
        debug!(worker_id = self.id, "worker stopped");
        if let Some(callback) = self.shared.config.on_thread_stop.as_ref() {
            callback();
        }
    }

    /// Local (LIFO), then global, then a random sibling.
    fn next_task(&mut self) -> Option<TaskRef> {
        self.local
            .pop()
            .or_else(|| self.shared.global.pop())
            .or_else(|| stealing::steal_task(&self.stealers, &self.local, &mut self.rng))
    }
}

/// Parks an idle worker until notified or a timeout elapses.
#[derive(Debug, Clone, Default)]
pub(crate) struct Parker {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Parker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Consumes a pending notification, or waits for one up to `timeout`.
    pub(crate) fn park_timeout(&self, timeout: Duration) {
        let (lock, cvar) = &*self.inner;
        let mut notified = lock.lock();
        if !*notified {
            let _ = cvar.wait_for(&mut notified, timeout);
        }
        *notified = false;
    }

    pub(crate) fn unpark(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock() = true;
        cvar.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn unpark_before_park_is_not_lost() {
        let parker = Parker::new();
        parker.unpark();
        let start = Instant::now();
        parker.park_timeout(Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn park_times_out() {
        let parker = Parker::new();
        let start = Instant::now();
        parker.park_timeout(Duration::from_millis(5));
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn unpark_from_other_thread() {
        let parker = Parker::new();
        let remote = parker.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            remote.unpark();
        });
        let start = Instant::now();
        parker.park_timeout(Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().expect("join");
    }
}
