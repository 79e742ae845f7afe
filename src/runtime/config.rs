//! Runtime configuration types.
//!
//! In most cases you should use [`RuntimeBuilder`](super::builder::RuntimeBuilder)
//! to construct a runtime rather than creating a [`RuntimeConfig`] directly.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `worker_threads` | available CPU parallelism |
//! | `thread_stack_size` | 2 MiB |
//! | `thread_name_prefix` | `"foldsync-worker"` |
//! | `park_timeout` | 10 ms |
//! | `leak_policy` | `None` (keep the process default, `Cancel` unless overridden) |

use crate::error::{Error, ErrorKind};
use crate::sync::LeakPolicy;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default worker name prefix.
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "foldsync-worker";
/// Default worker stack size.
pub const DEFAULT_THREAD_STACK_SIZE: usize = 2 * 1024 * 1024;
/// Default idle park timeout.
pub const DEFAULT_PARK_TIMEOUT: Duration = Duration::from_millis(10);

/// Callback run on worker thread start or stop.
pub type ThreadCallback = Arc<dyn Fn() + Send + Sync>;

/// Invalid configuration input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable held an unparseable value.
    #[error("invalid value for {var}: expected {expected}, got {value:?}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// What the variable should contain.
        expected: &'static str,
        /// The raw value found.
        value: String,
    },
    /// A TOML document did not parse.
    #[error("failed to parse TOML config: {0}")]
    Toml(String),
    /// A config file could not be read.
    #[error("failed to read config file {path}: {message}")]
    Read {
        /// File path.
        path: String,
        /// I/O error text.
        message: String,
    },
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::new(ErrorKind::InvalidConfig).with_message(e.to_string())
    }
}

/// Runtime configuration.
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Number of worker threads (default: available parallelism).
    pub worker_threads: usize,
    /// Stack size per worker thread (default: 2 MiB).
    pub thread_stack_size: usize,
    /// Name prefix for worker threads.
    pub thread_name_prefix: String,
    /// How long an idle worker sleeps before re-checking for work to steal.
    pub park_timeout: Duration,
    /// Process-wide leak policy installed when the runtime is built.
    pub leak_policy: Option<LeakPolicy>,
    /// Callback executed when a worker thread starts.
    pub on_thread_start: Option<ThreadCallback>,
    /// Callback executed when a worker thread stops.
    pub on_thread_stop: Option<ThreadCallback>,
}

impl RuntimeConfig {
    /// Normalize configuration values to safe defaults.
    pub fn normalize(&mut self) {
        if self.worker_threads == 0 {
            self.worker_threads = 1;
        }
        if self.thread_stack_size == 0 {
            self.thread_stack_size = DEFAULT_THREAD_STACK_SIZE;
        }
        if self.thread_name_prefix.is_empty() {
            self.thread_name_prefix = DEFAULT_THREAD_NAME_PREFIX.to_string();
        }
        if self.park_timeout.is_zero() {
            self.park_timeout = DEFAULT_PARK_TIMEOUT;
        }
    }

    pub(crate) fn default_worker_threads() -> usize {
        std::thread::available_parallelism()
            .map_or(1, std::num::NonZeroUsize::get)
            .max(1)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: Self::default_worker_threads(),
            thread_stack_size: DEFAULT_THREAD_STACK_SIZE,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
            park_timeout: DEFAULT_PARK_TIMEOUT,
            leak_policy: None,
            on_thread_start: None,
            on_thread_stop: None,
        }
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("worker_threads", &self.worker_threads)
            .field("thread_stack_size", &self.thread_stack_size)
            .field("thread_name_prefix", &self.thread_name_prefix)
            .field("park_timeout", &self.park_timeout)
            .field("leak_policy", &self.leak_policy)
            .field("on_thread_start", &self.on_thread_start.is_some())
            .field("on_thread_stop", &self.on_thread_stop.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn default_config_sane() {
        init_test("default_config_sane");
        let config = RuntimeConfig::default();
        crate::assert_with_log!(
            config.worker_threads >= 1,
            "worker_threads",
            true,
            config.worker_threads >= 1
        );
        crate::assert_with_log!(
            config.thread_stack_size == DEFAULT_THREAD_STACK_SIZE,
            "thread_stack_size",
            DEFAULT_THREAD_STACK_SIZE,
            config.thread_stack_size
        );
        crate::assert_with_log!(
            config.park_timeout == Duration::from_millis(10),
            "park_timeout",
            Duration::from_millis(10),
            config.park_timeout
        );
        assert!(config.leak_policy.is_none());
        crate::test_complete!("default_config_sane");
    }

    #[test]
    fn normalize_enforces_minimums() {
        init_test("normalize_enforces_minimums");
        let mut config = RuntimeConfig {
            worker_threads: 0,
            thread_stack_size: 0,
            thread_name_prefix: String::new(),
            park_timeout: Duration::ZERO,
            leak_policy: Some(LeakPolicy::Panic),
            on_thread_start: None,
            on_thread_stop: None,
        };
        config.normalize();
        crate::assert_with_log!(
            config.worker_threads == 1,
            "worker_threads",
            1,
            config.worker_threads
        );
        crate::assert_with_log!(
            config.thread_name_prefix == DEFAULT_THREAD_NAME_PREFIX,
            "thread_name_prefix",
            DEFAULT_THREAD_NAME_PREFIX,
            config.thread_name_prefix
        );
        assert_eq!(config.thread_stack_size, DEFAULT_THREAD_STACK_SIZE);
        assert_eq!(config.park_timeout, DEFAULT_PARK_TIMEOUT);
        assert_eq!(config.leak_policy, Some(LeakPolicy::Panic));
        crate::test_complete!("normalize_enforces_minimums");
    }

    #[test]
    fn config_error_maps_to_invalid_config() {
        init_test("config_error_maps_to_invalid_config");
        let err: Error = ConfigError::InvalidEnv {
            var: "FOLDSYNC_WORKER_THREADS",
            expected: "unsigned integer",
            value: "many".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        assert!(err.to_string().contains("FOLDSYNC_WORKER_THREADS"));
        crate::test_complete!("config_error_maps_to_invalid_config");
    }
}
