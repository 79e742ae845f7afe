//! Work-stealing task runtime.
//!
//! - [`config`]: Runtime configuration types
//! - [`builder`]: Runtime builder and handles
//! - [`env_config`]: Environment variable and TOML overrides
//! - `scheduler`: worker loop, local/global queues, stealing
//!
//! # Runtime Builder
//!
//! ```ignore
//! use foldsync::runtime::RuntimeBuilder;
//!
//! let runtime = RuntimeBuilder::new().worker_threads(4).build()?;
//! runtime.block_on(async { /* your async work */ });
//! ```
//!
//! ## Config File + Environment Overrides
//!
//! ```ignore
//! // Requires the `config-file` feature.
//! let runtime = RuntimeBuilder::from_toml("config/runtime.toml")?
//!     .with_env_overrides()?
//!     .build()?;
//! ```
//!
//! # Spawning
//!
//! [`spawn`] schedules onto the runtime the current thread belongs to (a
//! worker, or a thread inside [`Runtime::block_on`]). Anywhere else it uses a
//! process-wide default runtime that is built lazily from `FOLDSYNC_*`
//! environment variables.

pub mod builder;
pub mod config;
mod context;
pub mod env_config;
pub(crate) mod scheduler;
pub(crate) mod task;

pub use builder::{Runtime, RuntimeBuilder, RuntimeHandle};
pub use config::{ConfigError, RuntimeConfig};

use crate::tracing_compat::{trace, warn};
use scheduler::{GlobalQueue, Parker, Stealer};
use std::future::Future;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll, Wake, Waker};
use std::thread::Thread;
use task::{Task, TaskRef};

/// State shared by the runtime's workers, handles and tasks.
pub(crate) struct Shared {
    pub(crate) config: RuntimeConfig,
    pub(crate) global: GlobalQueue,
    pub(crate) stealers: Vec<Stealer>,
    pub(crate) parkers: Vec<Parker>,
    pub(crate) shutdown: AtomicBool,
    next_task_id: AtomicU64,
    next_unpark: AtomicUsize,
}

impl Shared {
    fn new(config: RuntimeConfig, stealers: Vec<Stealer>) -> Self {
        let parkers = (0..stealers.len()).map(|_| Parker::new()).collect();
        Self {
            config,
            global: GlobalQueue::new(),
            stealers,
            parkers,
            shutdown: AtomicBool::new(false),
            next_task_id: AtomicU64::new(0),
            next_unpark: AtomicUsize::new(0),
        }
    }

    pub(crate) fn spawn<F>(self: &Arc<Self>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        trace!(task_id = id, "task spawned");
        self.schedule(Task::new(id, future, Arc::downgrade(self)));
    }

    /// Queues a runnable task: on the current worker's deque when called from
    /// one of our workers, on the global queue otherwise.
    pub(crate) fn schedule(self: &Arc<Self>, task: TaskRef) {
        if self.is_shutdown() {
            warn!(task_id = task.id(), "runtime shut down; dropping task");
            task.abandon();
            return;
        }
        if let Some((me, local)) = context::local_queue_for(self) {
            local.push(task);
            self.unpark_one(Some(me));
        } else {
            self.global.push(task);
            self.unpark_one(None);
        }
    }

    fn unpark_one(&self, skip: Option<usize>) {
        let n = self.parkers.len();
        if n == 0 {
            return;
        }
        let mut idx = self.next_unpark.fetch_add(1, Ordering::Relaxed) % n;
        if Some(idx) == skip {
            if n == 1 {
                return;
            }
            idx = (idx + 1) % n;
        }
        self.parkers[idx].unpark();
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Drops every task still sitting in the global queue.
    pub(crate) fn abandon_queued(&self) {
        while let Some(task) = self.global.pop() {
            task.abandon();
        }
    }

    pub(crate) fn begin_shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        for parker in &self.parkers {
            parker.unpark();
        }
    }
}

static DEFAULT_RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// The lazily-built process-wide runtime used when no runtime is entered.
pub fn default_runtime() -> &'static Runtime {
    DEFAULT_RUNTIME.get_or_init(|| {
        let builder = RuntimeBuilder::new()
            .thread_name_prefix("foldsync-default")
            .with_env_overrides()
            .unwrap_or_else(|e| {
                warn!(error = %e, "ignoring invalid FOLDSYNC_* environment");
                RuntimeBuilder::new().thread_name_prefix("foldsync-default")
            });
        match builder.build() {
            Ok(runtime) => runtime,
            Err(e) => panic!("failed to start the default foldsync runtime: {e}"),
        }
    })
}

/// Spawns a future onto the current runtime (or the default runtime).
pub fn spawn<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match context::current() {
        Some(shared) => shared.spawn(future),
        None => default_runtime().handle().spawn(future),
    }
}

struct ThreadWaker {
    thread: Thread,
    notified: AtomicBool,
}

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.notified.store(true, Ordering::Release);
        self.thread.unpark();
    }
}

/// Drives `future` to completion on the calling thread.
///
/// Blocks the thread between polls; do not call it from inside a task.
pub fn block_on<F: Future>(future: F) -> F::Output {
    let signal = Arc::new(ThreadWaker {
        thread: std::thread::current(),
        notified: AtomicBool::new(false),
    });
    let waker = Waker::from(Arc::clone(&signal));
    let mut cx = Context::from_waker(&waker);
    let mut future = pin!(future);
    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return output;
        }
        while !signal.notified.swap(false, Ordering::AcqRel) {
            std::thread::park();
        }
    }
}
