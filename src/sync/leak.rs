//! Leak detection for exactly-once continuations.
//!
//! A [`Resumption`](super::Resumption) or a running
//! [`Cancellable`](super::Cancellable) that is dropped without being resolved
//! is a leak. What happens next is governed by a [`LeakPolicy`]:
//!
//! | Policy   | Effect                                                         |
//! |----------|----------------------------------------------------------------|
//! | `Panic`  | Panic with diagnostics (falls back to `Cancel` while unwinding) |
//! | `Abort`  | Log and abort the process                                      |
//! | `Cancel` | Deliver a cancellation to whoever is waiting                   |
//!
//! Every leak is counted, whatever the policy, so tests can assert that a
//! pipeline resolved all of its continuations.

use crate::tracing_compat::{error, warn};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Environment variable consulted the first time the default policy is read.
pub const ENV_LEAK_POLICY: &str = "FOLDSYNC_LEAK_POLICY";

const UNSET: u8 = u8::MAX;

static DEFAULT_POLICY: AtomicU8 = AtomicU8::new(UNSET);
static LEAKS: AtomicU64 = AtomicU64::new(0);

/// How to respond when an unresolved continuation is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "config-file", derive(serde::Deserialize))]
#[cfg_attr(feature = "config-file", serde(rename_all = "lowercase"))]
pub enum LeakPolicy {
    /// Panic immediately with diagnostic details.
    Panic,
    /// Log the leak and abort the process.
    Abort,
    /// Resolve the waiting party with a cancellation.
    #[default]
    Cancel,
}

impl LeakPolicy {
    /// Parses a policy name (`panic`, `abort`, `cancel`; case-insensitive).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "panic" => Some(Self::Panic),
            "abort" => Some(Self::Abort),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }

    /// Returns the process-wide default policy.
    ///
    /// The first read consults [`ENV_LEAK_POLICY`]; unset or unparseable
    /// values fall back to [`LeakPolicy::Cancel`].
    #[must_use]
    pub fn current_default() -> Self {
        let raw = DEFAULT_POLICY.load(Ordering::Acquire);
        if let Some(policy) = Self::from_u8(raw) {
            return policy;
        }
        let from_env = std::env::var(ENV_LEAK_POLICY)
            .ok()
            .and_then(|v| Self::parse(&v))
            .unwrap_or_default();
        match DEFAULT_POLICY.compare_exchange(
            UNSET,
            from_env.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => from_env,
            Err(raced) => Self::from_u8(raced).unwrap_or(from_env),
        }
    }

    /// Overrides the process-wide default policy.
    pub fn set_default(policy: Self) {
        DEFAULT_POLICY.store(policy.as_u8(), Ordering::Release);
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Panic => 0,
            Self::Abort => 1,
            Self::Cancel => 2,
        }
    }

    const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Panic),
            1 => Some(Self::Abort),
            2 => Some(Self::Cancel),
            _ => None,
        }
    }
}

impl std::fmt::Display for LeakPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Panic => "panic",
            Self::Abort => "abort",
            Self::Cancel => "cancel",
        })
    }
}

/// Number of leaks observed by this process so far.
#[must_use]
pub fn leaks_detected() -> u64 {
    LEAKS.load(Ordering::SeqCst)
}

/// Records a leak and applies `policy`.
///
/// Returns normally only when the caller must deliver a cancellation: either
/// the policy is `Cancel`, or it is `Panic` and the thread is already
/// unwinding.
pub(crate) fn report_leak(policy: LeakPolicy, what: &'static str) {
    let total = LEAKS.fetch_add(1, Ordering::SeqCst) + 1;
    match policy {
        LeakPolicy::Cancel => {
            warn!(what, total, "unresolved continuation dropped; delivering cancellation");
        }
        LeakPolicy::Panic => {
            if std::thread::panicking() {
                error!(what, total, "continuation leaked while unwinding");
                return;
            }
            panic!(
                "CONTINUATION LEAKED: {what} was dropped without being resolved. \
                 Resume it, fail it, or cancel its owner before dropping it."
            );
        }
        LeakPolicy::Abort => {
            error!(what, total, "continuation leaked; aborting");
            std::process::abort();
        }
    }
}
