//! A multi-producer multi-consumer channel built on one atomically swapped
//! snapshot.
//!
//! The whole channel is a single immutable [`state`] value: an optional
//! completion plus a queue of waiting readers and a queue of pending writers.
//! Every operation decides its transition purely from the current snapshot,
//! publishes it with one CAS through [`AtomicState`], and only then resumes
//! the parties the transition handed it. At most one of the two queues is
//! non-empty at any time.
//!
//! # Termination
//!
//! - [`Channel::close`] is graceful: readers already waiting fail with the
//!   completion, values already written stay readable, new writes fail.
//! - [`Channel::cancel`] is abrupt: both queues are drained, every waiting
//!   party is failed, and the undelivered values are returned to the caller.
//!   The cancel error replaces any earlier completion.
//!
//! # Example
//!
//! ```ignore
//! use foldsync::{BufferingPolicy, Channel};
//!
//! let channel = Channel::with_policy(BufferingPolicy::Oldest(16));
//! channel.try_write(1)?;
//! assert_eq!(channel.try_read()?, 1);
//! channel.finish();
//! ```

mod state;

pub use state::BufferingPolicy;

use crate::error::{Completion, Error, ErrorKind, Result, WriteError};
use crate::sync::{AtomicState, LeakPolicy, Resumption};
use crate::tracing_compat::trace;
use state::{ReadStep, State, WriteStep, Writer};
use std::fmt;
use std::sync::Arc;

/// A cloneable handle to a CAS-based channel.
pub struct Channel<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    state: AtomicState<State<T>>,
    policy: BufferingPolicy,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Channel<T> {
    /// An open channel with unbounded buffering.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(BufferingPolicy::Unbounded)
    }

    /// An open channel with the given buffering policy.
    #[must_use]
    pub fn with_policy(policy: BufferingPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicState::new(State::new()),
                policy,
            }),
        }
    }

    /// The buffering policy this channel was built with.
    #[must_use]
    pub fn policy(&self) -> BufferingPolicy {
        self.inner.policy
    }

    /// Writes `value` without waiting for a reader.
    ///
    /// Hands the value to a waiting reader if there is one, otherwise buffers
    /// it. Rejected values come back inside the [`WriteError`].
    pub fn try_write(&self, value: T) -> core::result::Result<(), WriteError<T>> {
        let writer = Writer::new(value, None);
        let step = self
            .inner
            .state
            .update(|state| state::write(state, &writer, self.inner.policy));
        match step {
            WriteStep::Rendezvous(reader) => {
                deliver(&reader, &writer);
                Ok(())
            }
            WriteStep::Queued => Ok(()),
            WriteStep::Full => Err(reject(&writer, Error::new(ErrorKind::ChannelFull))),
            WriteStep::Closed(completion) => Err(reject(&writer, completion.error())),
        }
    }

    /// Writes `value`.
    ///
    /// With `blocking` the call waits until a reader has taken the value.
    /// Otherwise it behaves like [`Channel::try_write`] and drops a rejected
    /// value. A blocking writer whose value is discarded by
    /// [`Channel::cancel`] fails with the cancel error.
    pub async fn write(&self, value: T, blocking: bool) -> Result<()> {
        if !blocking {
            return self.try_write(value).map_err(Error::from);
        }
        let (resumption, taken) = Resumption::with_policy(LeakPolicy::current_default());
        let writer = Writer::new(value, Some(resumption));
        let step = self
            .inner
            .state
            .update(|state| state::write(state, &writer, self.inner.policy));
        match step {
            WriteStep::Rendezvous(reader) => {
                writer.retire();
                deliver(&reader, &writer);
                Ok(())
            }
            WriteStep::Queued => taken.await,
            WriteStep::Full => {
                writer.retire();
                Err(Error::new(ErrorKind::ChannelFull))
            }
            WriteStep::Closed(completion) => {
                writer.retire();
                Err(completion.error())
            }
        }
    }

    /// Takes the oldest pending value without waiting.
    ///
    /// Fails with `WouldBlock` when the channel is open and empty, and with the
    /// completion's error once it is closed and drained.
    pub fn try_read(&self) -> Result<T> {
        let step = self.inner.state.update(|state| state::read(state, None));
        match step {
            ReadStep::Took(writer) => take(&writer),
            ReadStep::WouldBlock => Err(Error::new(ErrorKind::WouldBlock)),
            ReadStep::Closed(completion) => Err(completion.error()),
            ReadStep::Waiting => Err(Error::internal("non-blocking read was queued")),
        }
    }

    /// Reads the oldest pending value.
    ///
    /// With `blocking` the call waits for a writer. A pending read whose
    /// future is dropped still occupies its place in line; the value handed
    /// to it is lost.
    pub async fn read(&self, blocking: bool) -> Result<T> {
        if !blocking {
            return self.try_read();
        }
        let (resumption, delivered) = Resumption::with_policy(LeakPolicy::current_default());
        let reader = Arc::new(resumption);
        let step = self
            .inner
            .state
            .update(|state| state::read(state, Some(&reader)));
        match step {
            ReadStep::Waiting => delivered.await,
            ReadStep::Took(writer) => {
                reader.retire();
                take(&writer)
            }
            ReadStep::Closed(completion) => {
                reader.retire();
                Err(completion.error())
            }
            ReadStep::WouldBlock => {
                reader.retire();
                Err(Error::new(ErrorKind::WouldBlock))
            }
        }
    }

    /// Closes the channel gracefully with `completion`.
    ///
    /// Returns false if the channel was already closed or cancelled.
    pub fn close(&self, completion: Completion) -> bool {
        let readers = self
            .inner
            .state
            .update(|state| state::close(state, &completion));
        let Some(readers) = readers else {
            return false;
        };
        trace!(
            finished = completion.is_finished(),
            readers = readers.len(),
            "channel closed"
        );
        let error = completion.error();
        for reader in &readers {
            let _ = reader.fail(error.clone());
        }
        true
    }

    /// Closes the channel with [`Completion::Finished`].
    pub fn finish(&self) -> bool {
        self.close(Completion::Finished)
    }

    /// Terminates the channel abruptly.
    ///
    /// Every waiting reader and blocking writer fails with `error`; buffered
    /// and in-flight values are returned in FIFO order. The channel's
    /// completion becomes `Failure(error)`, even if it was already closed.
    pub fn cancel(&self, error: Error) -> Vec<T> {
        let failure = Completion::Failure(error.clone());
        let drained = self
            .inner
            .state
            .update(|state| state::cancel(state, &failure));
        trace!(
            readers = drained.readers.len(),
            writers = drained.writers.len(),
            "channel cancelled"
        );
        for reader in &drained.readers {
            let _ = reader.fail(error.clone());
        }
        let mut values = Vec::with_capacity(drained.writers.len());
        for writer in &drained.writers {
            values.extend(writer.value.take());
            if let Some(resumption) = &writer.resumption {
                let _ = resumption.fail(error.clone());
            }
        }
        values
    }

    /// How the channel terminated, if it has.
    #[must_use]
    pub fn completion(&self) -> Option<Completion> {
        self.inner.state.snapshot().completion.clone()
    }

    /// Returns true once closed or cancelled.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.snapshot().completion.is_some()
    }

    /// Values waiting to be read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.snapshot().writers.len()
    }

    /// Returns true if no value is waiting to be read.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Readers parked on an empty channel.
    #[must_use]
    pub fn waiting_readers(&self) -> usize {
        self.inner.state.snapshot().readers.len()
    }
}

/// Moves a writer's value to a reader that was just dequeued.
fn deliver<T>(reader: &Resumption<T>, writer: &Writer<T>) {
    match writer.value.take() {
        Some(value) => {
            let _ = reader.resume(value);
        }
        None => {
            let _ = reader.fail(Error::internal("writer value already taken"));
        }
    }
}

/// Takes a dequeued writer's value and releases it if it is blocking.
fn take<T>(writer: &Writer<T>) -> Result<T> {
    let value = writer.value.take();
    if let Some(resumption) = &writer.resumption {
        let _ = resumption.resume(());
    }
    value.ok_or_else(|| Error::internal("writer value already taken"))
}

fn reject<T>(writer: &Writer<T>, error: Error) -> WriteError<T> {
    match writer.value.take() {
        Some(value) => WriteError::new(error, value),
        // The writer was never published, so the cell still holds the value.
        None => unreachable!("unpublished writer lost its value"),
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.inner.state.snapshot();
        f.debug_struct("Channel")
            .field("policy", &self.inner.policy)
            .field("pending", &snapshot.writers.len())
            .field("waiting_readers", &snapshot.readers.len())
            .field("completion", &snapshot.completion)
            .finish()
    }
}
