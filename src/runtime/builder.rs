//! Runtime builder and handles.

use crate::error::{Error, ErrorKind};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::scheduler::{LocalQueue, Worker};
use crate::runtime::{block_on, context, Shared};
use crate::sync::LeakPolicy;
use crate::tracing_compat::{debug, error};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Builder for constructing a runtime with custom configuration.
#[derive(Clone)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
}

impl RuntimeBuilder {
    /// Create a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
        }
    }

    /// Single-worker runtime.
    #[must_use]
    pub fn current_thread() -> Self {
        Self::new().worker_threads(1)
    }

    /// Multi-threaded runtime with defaults.
    #[must_use]
    pub fn multi_thread() -> Self {
        Self::new()
    }

    /// Set the number of worker threads.
    #[must_use]
    pub fn worker_threads(mut self, n: usize) -> Self {
        self.config.worker_threads = n;
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub fn thread_stack_size(mut self, size: usize) -> Self {
        self.config.thread_stack_size = size;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Set how long an idle worker parks before re-checking for work.
    #[must_use]
    pub fn park_timeout(mut self, timeout: Duration) -> Self {
        self.config.park_timeout = timeout;
        self
    }

    /// Install `policy` as the process-wide leak policy when the runtime is built.
    #[must_use]
    pub fn leak_policy(mut self, policy: LeakPolicy) -> Self {
        self.config.leak_policy = Some(policy);
        self
    }

    /// Register a callback to run when a worker thread starts.
    #[must_use]
    pub fn on_thread_start<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.config.on_thread_start = Some(Arc::new(f));
        self
    }

    /// Register a callback to run when a worker thread stops.
    #[must_use]
    pub fn on_thread_stop<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.config.on_thread_stop = Some(Arc::new(f));
        self
    }

    /// Apply `FOLDSYNC_*` environment variables on top of the current settings.
    pub fn with_env_overrides(mut self) -> Result<Self, Error> {
        crate::runtime::env_config::apply_env_overrides(&mut self.config)?;
        Ok(self)
    }

    /// Start from a TOML document.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(toml: &str) -> Result<Self, Error> {
        let parsed = crate::runtime::env_config::parse_toml_str(toml)?;
        let mut builder = Self::new();
        crate::runtime::env_config::apply_toml_config(&mut builder.config, &parsed);
        Ok(builder)
    }

    /// Start from a TOML file.
    #[cfg(feature = "config-file")]
    pub fn from_toml(path: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        let parsed = crate::runtime::env_config::parse_toml_file(path.as_ref())?;
        let mut builder = Self::new();
        crate::runtime::env_config::apply_toml_config(&mut builder.config, &parsed);
        Ok(builder)
    }

    /// Returns the configuration built so far.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Build a runtime from this configuration.
    pub fn build(self) -> Result<Runtime, Error> {
        Runtime::with_config(self.config)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RuntimeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeBuilder")
            .field("config", &self.config)
            .finish()
    }
}

/// A running worker pool. Dropping the last clone shuts it down.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    shared: Arc<Shared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Runtime {
    /// Construct a runtime from the given configuration and start its workers.
    pub fn with_config(mut config: RuntimeConfig) -> Result<Self, Error> {
        config.normalize();
        if let Some(policy) = config.leak_policy {
            LeakPolicy::set_default(policy);
        }

        let locals: Vec<LocalQueue> = (0..config.worker_threads)
            .map(|_| LocalQueue::new())
            .collect();
        let stealers = locals.iter().map(LocalQueue::stealer).collect();
        let shared = Arc::new(Shared::new(config, stealers));

        let inner = RuntimeInner {
            shared: Arc::clone(&shared),
            threads: Mutex::new(Vec::with_capacity(locals.len())),
        };
        for (id, local) in locals.into_iter().enumerate() {
            let worker = Worker::new(id, local, Arc::clone(&shared));
            let spawned = std::thread::Builder::new()
                .name(format!("{}-{id}", shared.config.thread_name_prefix))
                .stack_size(shared.config.thread_stack_size)
                .spawn(move || worker.run_loop());
            match spawned {
                Ok(handle) => inner.threads.lock().push(handle),
                Err(e) => {
                    error!(worker_id = id, error = %e, "failed to spawn worker thread");
                    // Dropping `inner` stops the workers already started.
                    return Err(Error::new(ErrorKind::Internal)
                        .with_message("failed to spawn worker thread")
                        .with_source(e));
                }
            }
        }

        debug!(
            workers = shared.config.worker_threads,
            prefix = %shared.config.thread_name_prefix,
            "runtime started"
        );
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Returns a handle that can spawn tasks from anywhere.
    #[must_use]
    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            shared: Arc::clone(&self.inner.shared),
        }
    }

    /// Run a future to completion on the current thread. Tasks it spawns go
    /// to this runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        let _guard = context::enter(Arc::clone(&self.inner.shared));
        block_on(future)
    }

    /// Returns a reference to the runtime configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.shared.config
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", self.config())
            .field("queued", &self.inner.shared.global.len())
            .finish()
    }
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        self.shared.begin_shutdown();
        let current = std::thread::current().id();
        for handle in self.threads.lock().drain(..) {
            // A worker can hold the last handle; it cannot join itself.
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
        self.shared.abandon_queued();
        debug!("runtime stopped");
    }
}

/// Handle for spawning tasks onto a runtime. Does not keep the workers alive.
#[derive(Clone)]
pub struct RuntimeHandle {
    shared: Arc<Shared>,
}

impl RuntimeHandle {
    /// Spawns a detached task.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.shared.spawn(future);
    }

    /// Returns true once the runtime has been shut down.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shared.is_shutdown()
    }
}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
