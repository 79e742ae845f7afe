//! Error types and completion signals for foldsync.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Stream termination is a [`Completion`], not an exception used for control flow
//! - Transient CAS contention is retried internally and never surfaces here
//! - Protocol violations (double resume, impossible reducer states) are caller
//!   bugs and fail fast instead of becoming runtime errors
//!
//! # Error Categories
//!
//! - **Cancellation**: a party was cancelled, or a pending continuation leaked
//! - **Completion**: the "done" signal travelling through a stream
//! - **Channel**: closed, full or would-block conditions
//! - **Protocol**: exactly-once and lifecycle contract violations
//! - **Runtime**: scheduler shutdown, task panics
//! - **Config**: invalid configuration values
//! - **User**: errors raised by application code

use core::fmt;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Cancellation ===
    /// Operation was cancelled.
    Cancelled,
    /// A pending resumption was dropped and the leak policy synthesized a cancellation.
    ResumptionLeaked,

    // === Completion ===
    /// The stream finished normally ("done").
    Finished,

    // === Channels ===
    /// Channel has been closed or cancelled.
    ChannelClosed,
    /// Channel buffer is at capacity.
    ChannelFull,
    /// A non-blocking operation found nothing to pair with.
    WouldBlock,

    // === Protocol ===
    /// A resumption was resumed more than once.
    AlreadyResumed,
    /// Illegal lifecycle transition.
    InvalidStateTransition,
    /// The result of a task has already been taken.
    ResultTaken,

    // === Runtime ===
    /// A task panicked while running.
    Panicked,
    /// The runtime has been shut down.
    Shutdown,

    // === Config ===
    /// A configuration value could not be parsed or is out of range.
    InvalidConfig,

    // === Internal / user ===
    /// Internal bug.
    Internal,
    /// User-provided error.
    User,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Cancelled | Self::ResumptionLeaked => ErrorCategory::Cancellation,
            Self::Finished => ErrorCategory::Completion,
            Self::ChannelClosed | Self::ChannelFull | Self::WouldBlock => ErrorCategory::Channel,
            Self::AlreadyResumed | Self::InvalidStateTransition | Self::ResultTaken => {
                ErrorCategory::Protocol
            }
            Self::Panicked | Self::Shutdown | Self::Internal => ErrorCategory::Runtime,
            Self::InvalidConfig => ErrorCategory::Config,
            Self::User => ErrorCategory::User,
        }
    }

    /// Returns the recoverability classification for this error kind.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        match self {
            Self::ChannelFull | Self::WouldBlock => Recoverability::Transient,
            Self::Cancelled
            | Self::ResumptionLeaked
            | Self::Finished
            | Self::ChannelClosed
            | Self::AlreadyResumed
            | Self::InvalidStateTransition
            | Self::ResultTaken
            | Self::Panicked
            | Self::Shutdown
            | Self::InvalidConfig => Recoverability::Permanent,
            Self::Internal | Self::User => Recoverability::Unknown,
        }
    }

    /// Returns true if this error is typically retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.recoverability(), Recoverability::Transient)
    }
}

/// Classification of error recoverability for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recoverability {
    /// Temporary condition that may clear on retry.
    Transient,
    /// Retrying will not help.
    Permanent,
    /// Depends on context the error kind alone cannot express.
    Unknown,
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Cancellation and leaked continuations.
    Cancellation,
    /// Normal stream termination.
    Completion,
    /// Channel state failures.
    Channel,
    /// Exactly-once and lifecycle contract violations.
    Protocol,
    /// Scheduler failures.
    Runtime,
    /// Configuration failures.
    Config,
    /// User-originated errors.
    User,
}

/// The main error type for foldsync operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// The cancellation error delivered to every pending party on cancel.
    #[must_use]
    pub const fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled)
    }

    /// The "done" signal.
    #[must_use]
    pub const fn finished() -> Self {
        Self::new(ErrorKind::Finished)
    }

    /// Creates a user error with a message.
    #[must_use]
    pub fn user(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::User).with_message(msg)
    }

    /// Creates an internal error (library bug).
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error represents cancellation (including leaks
    /// resolved by synthesizing a cancellation).
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind.category(), ErrorCategory::Cancellation)
    }

    /// Returns true if this error is the "done" signal.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self.kind, ErrorKind::Finished)
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns the recoverability classification.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        self.kind.recoverability()
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// How a stream, channel or fold terminated.
#[derive(Debug, Clone)]
pub enum Completion {
    /// Normal end of stream.
    Finished,
    /// Terminated by an error (including cancellation).
    Failure(Error),
}

impl Completion {
    /// Maps an error to a completion. The "done" signal maps to `Finished`.
    #[must_use]
    pub fn from_error(error: Error) -> Self {
        if error.is_finished() {
            Self::Finished
        } else {
            Self::Failure(error)
        }
    }

    /// Returns true for `Finished`.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Returns the failure, if any.
    #[must_use]
    pub const fn failure(&self) -> Option<&Error> {
        match self {
            Self::Finished => None,
            Self::Failure(e) => Some(e),
        }
    }

    /// The error every party still waiting on a terminated stream receives.
    #[must_use]
    pub fn error(&self) -> Error {
        match self {
            Self::Finished => Error::finished(),
            Self::Failure(e) => e.clone(),
        }
    }

    /// `Ok(())` for `Finished`, `Err` for a failure.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Finished => Ok(()),
            Self::Failure(e) => Err(e),
        }
    }
}

impl From<Error> for Completion {
    fn from(error: Error) -> Self {
        Self::from_error(error)
    }
}

/// A write that the channel refused. The value is handed back so that a value
/// owning a resumption can still be resolved by its producer.
pub struct WriteError<T> {
    error: Error,
    value: T,
}

impl<T> WriteError<T> {
    pub(crate) fn new(error: Error, value: T) -> Self {
        Self { error, value }
    }

    /// Why the write was refused.
    #[must_use]
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// Recovers the rejected value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Splits into the error and the rejected value.
    pub fn into_parts(self) -> (Error, T) {
        (self.error, self.value)
    }
}

impl<T> fmt::Debug for WriteError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for WriteError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "write rejected: {}", self.error)
    }
}

impl<T> std::error::Error for WriteError<T> {}

impl<T> From<WriteError<T>> for Error {
    fn from(e: WriteError<T>) -> Self {
        e.error
    }
}

/// Extension trait for adding context to Results.
#[allow(clippy::result_large_err)]
pub trait ResultExt<T> {
    /// Attach a context message on error.
    fn context(self, msg: impl Into<String>) -> Result<T>;
    /// Attach context message computed lazily on error.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_message(msg))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.into().with_message(f()))
    }
}

/// A specialized Result type for foldsync operations.
#[allow(clippy::result_large_err)]
pub type Result<T> = core::result::Result<T, Error>;
