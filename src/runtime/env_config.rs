//! Environment variable and config file support for [`RuntimeBuilder`](super::builder::RuntimeBuilder).
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic**: builder methods applied after loading
//! 2. **Environment variables**: `FOLDSYNC_*`
//! 3. **Config file**: TOML (requires the `config-file` feature)
//! 4. **Defaults**: [`RuntimeConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `FOLDSYNC_WORKER_THREADS` | `usize` | `worker_threads` |
//! | `FOLDSYNC_THREAD_STACK_SIZE` | `usize` | `thread_stack_size` |
//! | `FOLDSYNC_THREAD_NAME_PREFIX` | `String` | `thread_name_prefix` |
//! | `FOLDSYNC_PARK_TIMEOUT_MS` | `u64` | `park_timeout` |
//! | `FOLDSYNC_LEAK_POLICY` | `panic`/`abort`/`cancel` | `leak_policy` |

use crate::runtime::config::{ConfigError, RuntimeConfig};
use crate::sync::leak::ENV_LEAK_POLICY;
use crate::sync::LeakPolicy;
use std::time::Duration;

/// Environment variable name for worker thread count.
pub const ENV_WORKER_THREADS: &str = "FOLDSYNC_WORKER_THREADS";
/// Environment variable name for thread stack size.
pub const ENV_THREAD_STACK_SIZE: &str = "FOLDSYNC_THREAD_STACK_SIZE";
/// Environment variable name for thread name prefix.
pub const ENV_THREAD_NAME_PREFIX: &str = "FOLDSYNC_THREAD_NAME_PREFIX";
/// Environment variable name for the idle park timeout in milliseconds.
pub const ENV_PARK_TIMEOUT_MS: &str = "FOLDSYNC_PARK_TIMEOUT_MS";

/// Apply environment variable overrides to a [`RuntimeConfig`].
///
/// Only variables that are set in the environment are applied.
/// Returns an error if a variable is set but contains an unparseable value.
pub fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<(), ConfigError> {
    if let Some(val) = read_env(ENV_WORKER_THREADS) {
        config.worker_threads = parse_usize(ENV_WORKER_THREADS, &val)?;
    }
    if let Some(val) = read_env(ENV_THREAD_STACK_SIZE) {
        config.thread_stack_size = parse_usize(ENV_THREAD_STACK_SIZE, &val)?;
    }
    if let Some(val) = read_env(ENV_THREAD_NAME_PREFIX) {
        config.thread_name_prefix = val;
    }
    if let Some(val) = read_env(ENV_PARK_TIMEOUT_MS) {
        config.park_timeout = Duration::from_millis(parse_u64(ENV_PARK_TIMEOUT_MS, &val)?);
    }
    if let Some(val) = read_env(ENV_LEAK_POLICY) {
        config.leak_policy = Some(parse_leak_policy(ENV_LEAK_POLICY, &val)?);
    }
    Ok(())
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn invalid(var: &'static str, expected: &'static str, val: &str) -> ConfigError {
    ConfigError::InvalidEnv {
        var,
        expected,
        value: val.to_string(),
    }
}

fn parse_usize(var: &'static str, val: &str) -> Result<usize, ConfigError> {
    val.trim()
        .parse::<usize>()
        .map_err(|_| invalid(var, "unsigned integer", val))
}

fn parse_u64(var: &'static str, val: &str) -> Result<u64, ConfigError> {
    val.trim()
        .parse::<u64>()
        .map_err(|_| invalid(var, "u64", val))
}

fn parse_leak_policy(var: &'static str, val: &str) -> Result<LeakPolicy, ConfigError> {
    LeakPolicy::parse(val).ok_or_else(|| invalid(var, "panic, abort or cancel", val))
}

// =========================================================================
// TOML config file support (feature-gated)
// =========================================================================

/// TOML-deserializable runtime configuration.
///
/// ```toml
/// [scheduler]
/// worker_threads = 4
/// thread_stack_size = 2097152
/// thread_name_prefix = "myapp-worker"
/// park_timeout_ms = 10
///
/// [sync]
/// leak_policy = "panic"
/// ```
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct RuntimeTomlConfig {
    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerToml,
    /// Continuation settings.
    #[serde(default)]
    pub sync: SyncToml,
}

/// Scheduler section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct SchedulerToml {
    /// Number of worker threads.
    pub worker_threads: Option<usize>,
    /// Stack size per worker thread in bytes.
    pub thread_stack_size: Option<usize>,
    /// Name prefix for worker threads.
    pub thread_name_prefix: Option<String>,
    /// Idle park timeout in milliseconds.
    pub park_timeout_ms: Option<u64>,
}

/// Sync section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct SyncToml {
    /// Leak policy for resumptions and cancellables.
    pub leak_policy: Option<LeakPolicy>,
}

/// Apply a parsed TOML config to a [`RuntimeConfig`].
///
/// Only fields that are `Some` in the TOML struct override the config.
#[cfg(feature = "config-file")]
pub fn apply_toml_config(config: &mut RuntimeConfig, toml: &RuntimeTomlConfig) {
    if let Some(v) = toml.scheduler.worker_threads {
        config.worker_threads = v;
    }
    if let Some(v) = toml.scheduler.thread_stack_size {
        config.thread_stack_size = v;
    }
    if let Some(ref v) = toml.scheduler.thread_name_prefix {
        config.thread_name_prefix.clone_from(v);
    }
    if let Some(v) = toml.scheduler.park_timeout_ms {
        config.park_timeout = Duration::from_millis(v);
    }
    if let Some(v) = toml.sync.leak_policy {
        config.leak_policy = Some(v);
    }
}

/// Parse a TOML string into a [`RuntimeTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_str(toml_str: &str) -> Result<RuntimeTomlConfig, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::Toml(e.to_string()))
}

/// Read and parse a TOML file into a [`RuntimeTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_file(path: &std::path::Path) -> Result<RuntimeTomlConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    parse_toml_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_VARS: [&str; 5] = [
        ENV_WORKER_THREADS,
        ENV_THREAD_STACK_SIZE,
        ENV_THREAD_NAME_PREFIX,
        ENV_PARK_TIMEOUT_MS,
        ENV_LEAK_POLICY,
    ];

    fn with_envs<F, R>(vars: &[(&str, &str)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = crate::test_utils::env_lock();
        for var in ALL_VARS {
            std::env::remove_var(var);
        }
        for (k, v) in vars {
            std::env::set_var(k, v);
        }
        let result = f();
        for (k, _) in vars {
            std::env::remove_var(k);
        }
        result
    }

    #[test]
    fn parse_helpers() {
        assert_eq!(parse_usize("T", " 8 ").expect("usize"), 8);
        assert!(parse_usize("T", "-1").is_err());
        assert_eq!(parse_u64("T", "25").expect("u64"), 25);
        assert_eq!(
            parse_leak_policy("T", "Abort").expect("policy"),
            LeakPolicy::Abort
        );
        let err = parse_leak_policy("T", "ignore").expect_err("bad policy");
        assert!(err.to_string().contains("panic, abort or cancel"));
    }

    #[test]
    fn no_vars_leaves_defaults() {
        let config = with_envs(&[], || {
            let mut config = RuntimeConfig::default();
            apply_env_overrides(&mut config).expect("apply");
            config
        });
        assert_eq!(config.thread_name_prefix, "foldsync-worker");
        assert!(config.leak_policy.is_none());
    }

    #[test]
    fn vars_override_every_field() {
        let config = with_envs(
            &[
                (ENV_WORKER_THREADS, "3"),
                (ENV_THREAD_STACK_SIZE, "65536"),
                (ENV_THREAD_NAME_PREFIX, "pool"),
                (ENV_PARK_TIMEOUT_MS, "2"),
                (ENV_LEAK_POLICY, "panic"),
            ],
            || {
                let mut config = RuntimeConfig::default();
                apply_env_overrides(&mut config).expect("apply");
                config
            },
        );
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.thread_stack_size, 65_536);
        assert_eq!(config.thread_name_prefix, "pool");
        assert_eq!(config.park_timeout, Duration::from_millis(2));
        assert_eq!(config.leak_policy, Some(LeakPolicy::Panic));
    }

    #[test]
    fn bad_value_is_reported() {
        let err = with_envs(&[(ENV_WORKER_THREADS, "lots")], || {
            let mut config = RuntimeConfig::default();
            apply_env_overrides(&mut config).expect_err("must fail")
        });
        assert_eq!(
            err,
            ConfigError::InvalidEnv {
                var: ENV_WORKER_THREADS,
                expected: "unsigned integer",
                value: "lots".into(),
            }
        );
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_overrides_present_fields_only() {
        let parsed = parse_toml_str(
            r#"
            [scheduler]
            worker_threads = 2
            park_timeout_ms = 5

            [sync]
            leak_policy = "cancel"
            "#,
        )
        .expect("parse");
        let mut config = RuntimeConfig::default();
        apply_toml_config(&mut config, &parsed);
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.park_timeout, Duration::from_millis(5));
        assert_eq!(config.leak_policy, Some(LeakPolicy::Cancel));
        assert_eq!(config.thread_name_prefix, "foldsync-worker");
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_syntax_error() {
        let err = parse_toml_str("[scheduler\nworker_threads = ").expect_err("bad toml");
        assert!(matches!(err, ConfigError::Toml(_)));
    }
}
