//! Immutable channel snapshots and the pure decisions made over them.
//!
//! Every function here takes the current snapshot and returns a
//! [`Transition`]; none of them resumes anyone. The caller publishes the new
//! snapshot with one CAS and only then acts on the returned outcome, so a
//! retried decision never leaves a half-resolved party behind.

use crate::error::Completion;
use crate::queue::PersistentQueue;
use crate::sync::{Resumption, Transition};
use crate::util::TakeCell;
use std::sync::Arc;

/// How many values a channel buffers for absent readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferingPolicy {
    /// No limit.
    #[default]
    Unbounded,
    /// Keep at most `n` buffered values; further non-blocking writes are
    /// rejected and the values already buffered are kept.
    Oldest(usize),
}

impl BufferingPolicy {
    fn admits(self, buffered: usize) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Oldest(limit) => buffered < limit,
        }
    }
}

/// A queued write. Blocking writers carry the resumption they sleep on;
/// buffered values do not.
pub(crate) struct Writer<T> {
    pub(crate) resumption: Option<Resumption<()>>,
    pub(crate) value: TakeCell<T>,
}

impl<T> Writer<T> {
    pub(crate) fn new(value: T, resumption: Option<Resumption<()>>) -> Arc<Self> {
        Arc::new(Self {
            resumption,
            value: TakeCell::new(value),
        })
    }

    /// Marks an unpublished writer's resumption as settled.
    pub(crate) fn retire(&self) {
        if let Some(resumption) = &self.resumption {
            resumption.retire();
        }
    }
}

/// One immutable version of a channel.
///
/// Invariant: `readers` and `writers` are never both non-empty.
pub(crate) struct State<T> {
    pub(crate) completion: Option<Completion>,
    pub(crate) readers: PersistentQueue<Arc<Resumption<T>>>,
    pub(crate) writers: PersistentQueue<Arc<Writer<T>>>,
    /// Writers without a resumption, counted against the buffering policy.
    pub(crate) buffered: usize,
}

impl<T> State<T> {
    pub(crate) const fn new() -> Self {
        Self {
            completion: None,
            readers: PersistentQueue::new(),
            writers: PersistentQueue::new(),
            buffered: 0,
        }
    }
}

/// Outcome of a write decision.
pub(crate) enum WriteStep<T> {
    /// Hand the value straight to this waiting reader.
    Rendezvous(Arc<Resumption<T>>),
    /// The writer was queued.
    Queued,
    /// The buffer is at capacity.
    Full,
    /// The channel is closed.
    Closed(Completion),
}

pub(crate) fn write<T>(
    state: &State<T>,
    writer: &Arc<Writer<T>>,
    policy: BufferingPolicy,
) -> Transition<State<T>, WriteStep<T>> {
    if let Some(completion) = &state.completion {
        return Transition::Abort(WriteStep::Closed(completion.clone()));
    }
    if let Some((reader, readers)) = state.readers.dequeue() {
        let next = State {
            completion: None,
            readers,
            writers: state.writers.clone(),
            buffered: state.buffered,
        };
        return Transition::Commit(next, WriteStep::Rendezvous(reader));
    }
    let buffering = writer.resumption.is_none();
    if buffering && !policy.admits(state.buffered) {
        return Transition::Abort(WriteStep::Full);
    }
    let next = State {
        completion: None,
        readers: state.readers.clone(),
        writers: state.writers.enqueue(Arc::clone(writer)),
        buffered: state.buffered + usize::from(buffering),
    };
    Transition::Commit(next, WriteStep::Queued)
}

/// Outcome of a read decision.
pub(crate) enum ReadStep<T> {
    /// Take this writer's value (and resume it if it is blocking).
    Took(Arc<Writer<T>>),
    /// The reader was queued.
    Waiting,
    /// Nothing queued and the caller would not wait.
    WouldBlock,
    /// Nothing queued and the channel is closed.
    Closed(Completion),
}

/// `reader` is `None` for a non-blocking read.
pub(crate) fn read<T>(
    state: &State<T>,
    reader: Option<&Arc<Resumption<T>>>,
) -> Transition<State<T>, ReadStep<T>> {
    if let Some((writer, writers)) = state.writers.dequeue() {
        let buffered = state.buffered - usize::from(writer.resumption.is_none());
        let next = State {
            completion: state.completion.clone(),
            readers: state.readers.clone(),
            writers,
            buffered,
        };
        return Transition::Commit(next, ReadStep::Took(writer));
    }
    if let Some(completion) = &state.completion {
        return Transition::Abort(ReadStep::Closed(completion.clone()));
    }
    let Some(reader) = reader else {
        return Transition::Abort(ReadStep::WouldBlock);
    };
    let next = State {
        completion: None,
        readers: state.readers.enqueue(Arc::clone(reader)),
        writers: state.writers.clone(),
        buffered: state.buffered,
    };
    Transition::Commit(next, ReadStep::Waiting)
}

/// Graceful close: queued writers stay readable, waiting readers are returned
/// to be failed. `None` if the channel was already closed.
pub(crate) fn close<T>(
    state: &State<T>,
    completion: &Completion,
) -> Transition<State<T>, Option<PersistentQueue<Arc<Resumption<T>>>>> {
    if state.completion.is_some() {
        return Transition::Abort(None);
    }
    let next = State {
        completion: Some(completion.clone()),
        readers: PersistentQueue::new(),
        writers: state.writers.clone(),
        buffered: state.buffered,
    };
    Transition::Commit(next, Some(state.readers.clone()))
}

/// Parties removed by an abrupt cancel.
pub(crate) struct Drained<T> {
    pub(crate) readers: PersistentQueue<Arc<Resumption<T>>>,
    pub(crate) writers: PersistentQueue<Arc<Writer<T>>>,
}

/// Abrupt cancel: empties both queues and replaces any earlier completion.
pub(crate) fn cancel<T>(state: &State<T>, completion: &Completion) -> Transition<State<T>, Drained<T>> {
    let drained = Drained {
        readers: state.readers.clone(),
        writers: state.writers.clone(),
    };
    let next = State {
        completion: Some(completion.clone()),
        readers: PersistentQueue::new(),
        writers: PersistentQueue::new(),
        buffered: 0,
    };
    Transition::Commit(next, drained)
}
