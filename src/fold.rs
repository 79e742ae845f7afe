//! A single-consumer fold over a channel of actions.
//!
//! [`AsyncFold`] runs one logical consumer task. Producers write actions into
//! its [`Channel`]; the consumer applies them strictly in arrival order:
//!
//! ```text
//! initialize ─► loop { read ─► reduce ─► emit } ─► close ─► finalize ─► dispose*
//! ```
//!
//! The loop ends when `reduce` returns [`Effect::Completion`], when `emit`
//! fails, when the channel is closed, or when the fold is cancelled. After
//! that the channel is closed with the terminal [`Completion`], `finalize`
//! runs exactly once, and every action still queued is handed to `dispose`.
//! Actions written after the close are rejected back to their writers. Either
//! way, no producer's resumption is left unresolved.

use crate::channel::Channel;
use crate::error::{Completion, Error, Result, WriteError};
use crate::sync::{CancelHandle, CancelToken, Cancellable, Status, StatusError, Value};
use crate::tracing_compat::debug;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

/// What the fold does after a `reduce`.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Keep going: call `emit`, then read the next action.
    None,
    /// Stop with this completion.
    Completion(Completion),
}

/// The behavior plugged into an [`AsyncFold`].
///
/// All methods run on the consumer task, one at a time.
pub trait Folder: Send + 'static {
    /// The accumulated state; returned by [`AsyncFold::value`].
    type State: Send + 'static;
    /// The messages producers send.
    type Action: Send + 'static;

    /// Builds the initial state. Called once, before the first read.
    fn initialize(&mut self, channel: &Channel<Self::Action>) -> Self::State;

    /// Applies one action.
    fn reduce(&mut self, state: &mut Self::State, action: Self::Action) -> Effect;

    /// Delivers whatever `reduce` made ready. An error ends the fold; an
    /// error of kind `Finished` ends it as [`Completion::Finished`].
    fn emit(&mut self, state: &mut Self::State) -> impl Future<Output = Result<()>> + Send;

    /// Resolves an action that arrived after the fold terminated.
    fn dispose(&mut self, action: Self::Action, completion: &Completion);

    /// Releases whatever the state still holds. Called exactly once.
    fn finalize(&mut self, state: &mut Self::State, completion: &Completion);
}

/// A running fold: the consumer task plus the channel feeding it.
#[must_use = "a running fold must be awaited or cancelled"]
pub struct AsyncFold<S, A> {
    channel: Channel<A>,
    task: Cancellable<S>,
}

impl<S, A> AsyncFold<S, A>
where
    S: Send + 'static,
    A: Send + 'static,
{
    /// Spawns the consumer for `folder`, reading from `channel`.
    pub fn fold<F>(channel: Channel<A>, folder: F) -> Self
    where
        F: Folder<State = S, Action = A>,
    {
        let consumer = channel.clone();
        let task = Cancellable::new(move |token: CancelToken| {
            let on_cancel = consumer.clone();
            token.on_cancel(move || {
                on_cancel.close(Completion::Failure(Error::cancelled()));
            });
            run(consumer, folder, token)
        });
        Self { channel, task }
    }
}

impl<S, A> AsyncFold<S, A> {
    /// Waits for the final state.
    pub fn value(&self) -> Value<'_, S> {
        self.task.value()
    }

    /// Cancels the fold. Queued and later actions go to `dispose`.
    pub fn cancel(&self) -> core::result::Result<(), StatusError> {
        self.task.cancel()
    }

    /// Queues an action without waiting.
    pub fn send(&self, action: A) -> core::result::Result<(), WriteError<A>> {
        self.channel.try_write(action)
    }

    /// The channel producers write to.
    #[must_use]
    pub fn channel(&self) -> &Channel<A> {
        &self.channel
    }

    /// Lifecycle of the consumer task.
    #[must_use]
    pub fn status(&self) -> Status {
        self.task.status()
    }

    /// A cloneable handle that cancels the consumer from elsewhere.
    #[must_use]
    pub fn handle(&self) -> CancelHandle {
        self.task.handle()
    }
}

impl<S, A> fmt::Debug for AsyncFold<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFold")
            .field("status", &self.task.status())
            .field("channel", &self.channel)
            .finish()
    }
}

async fn run<F: Folder>(
    channel: Channel<F::Action>,
    mut folder: F,
    token: CancelToken,
) -> Result<F::State> {
    let mut state = folder.initialize(&channel);
    debug!(folder = std::any::type_name::<F>(), "fold started");

    let completion = loop {
        if let Err(e) = token.checkpoint() {
            break Completion::Failure(e);
        }
        let action = match channel.read(true).await {
            Ok(action) => action,
            Err(e) => break Completion::from_error(e),
        };
        if let Effect::Completion(completion) = folder.reduce(&mut state, action) {
            break completion;
        }
        if let Err(e) = folder.emit(&mut state).await {
            break Completion::from_error(e);
        }
    };

    channel.close(completion.clone());
    folder.finalize(&mut state, &completion);
    let mut disposed = 0_usize;
    while let Ok(action) = channel.try_read() {
        folder.dispose(action, &completion);
        disposed += 1;
    }
    debug!(
        folder = std::any::type_name::<F>(),
        finished = completion.is_finished(),
        disposed,
        "fold terminated"
    );
    Ok(state)
}

/// A [`Folder`] assembled from closures. Handy for one-off folds and tests.
pub struct FnFolder<S, A, I, R, D, Z> {
    initialize: Option<I>,
    reduce: R,
    dispose: D,
    finalize: Z,
    _types: PhantomData<fn(A) -> S>,
}

impl<S, A, I, R, D, Z> FnFolder<S, A, I, R, D, Z>
where
    I: FnOnce() -> S,
    R: FnMut(&mut S, A) -> Effect,
    D: FnMut(A, &Completion),
    Z: FnMut(&mut S, &Completion),
{
    /// A folder whose `emit` does nothing.
    pub fn new(initialize: I, reduce: R, dispose: D, finalize: Z) -> Self {
        Self {
            initialize: Some(initialize),
            reduce,
            dispose,
            finalize,
            _types: PhantomData,
        }
    }
}

impl<S, A, I, R, D, Z> Folder for FnFolder<S, A, I, R, D, Z>
where
    S: Send + 'static,
    A: Send + 'static,
    I: FnOnce() -> S + Send + 'static,
    R: FnMut(&mut S, A) -> Effect + Send + 'static,
    D: FnMut(A, &Completion) + Send + 'static,
    Z: FnMut(&mut S, &Completion) + Send + 'static,
{
    type State = S;
    type Action = A;

    fn initialize(&mut self, _channel: &Channel<A>) -> S {
        match self.initialize.take() {
            Some(initialize) => initialize(),
            None => unreachable!("fold initialized twice"),
        }
    }

    fn reduce(&mut self, state: &mut S, action: A) -> Effect {
        (self.reduce)(state, action)
    }

    async fn emit(&mut self, _state: &mut S) -> Result<()> {
        Ok(())
    }

    fn dispose(&mut self, action: A, completion: &Completion) {
        (self.dispose)(action, completion);
    }

    fn finalize(&mut self, state: &mut S, completion: &Completion) {
        (self.finalize)(state, completion);
    }
}
