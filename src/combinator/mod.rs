//! Multi-producer stream combinators built on [`AsyncFold`].
//!
//! - [`zip`]: pair values positionally across two (or three) publishers
//! - [`select`]: interleave two publishers of different types as [`Either`]
//! - [`merge`]: interleave any number of publishers of one type
//!
//! Every combinator has the same skeleton. Each upstream is subscribed with
//! a producer callback that turns an [`Event`] into an action carrying a
//! fresh `Resumption<Demand>` and writes it into the fold's channel; the
//! producer then sleeps until the fold resumes it. The fold's state machine
//! (`Current`) decides what to emit downstream and when to resume whom.
//! Because a producer sleeps while its action is in flight, the channel
//! never holds more than one action per upstream, and `Oldest(arity)` is
//! enough buffering.
//!
//! When the fold terminates, every resumption it still holds, every action
//! still queued, and every action written afterwards is resolved: with
//! [`Demand::Done`] after a normal finish, with the failure otherwise.

pub mod merge;
pub mod select;
pub mod zip;

pub use merge::{merge, merge_with_buffering};
pub use select::{select, select_with_buffering, Either};
pub use zip::{zip, zip3, zip_with_buffering};

use crate::channel::{BufferingPolicy, Channel};
use crate::error::{Completion, Error, Result};
use crate::fold::{AsyncFold, Folder};
use crate::publisher::{BoxFuture, Demand, Downstream, Event, Publisher};
use crate::sync::{pause, CancelHandle, CancelToken, Cancellable, Resumption};
use crate::tracing_compat::trace;
use std::sync::Arc;

/// An action whose producer can be released without the fold.
pub(crate) trait Reject: Send + 'static {
    /// Resolves the action's resumption the way [`settle`] would.
    fn reject(self, completion: &Completion);
}

/// Fold state shared by all combinators: the machine plus how it ended.
pub(crate) struct Machine<C> {
    pub(crate) current: C,
    pub(crate) completion: Option<Completion>,
    pub(crate) downstream_ended: bool,
}

impl<C> Machine<C> {
    pub(crate) const fn new(current: C) -> Self {
        Self {
            current,
            completion: None,
            downstream_ended: false,
        }
    }
}

/// Resolves a producer the fold no longer needs.
pub(crate) fn settle(resumption: &Resumption<Demand>, completion: &Completion) {
    let _ = match completion {
        Completion::Finished => resumption.resume(Demand::Done),
        Completion::Failure(error) => resumption.fail(error.clone()),
    };
}

pub(crate) fn cancel_upstreams(upstreams: &[CancelHandle]) {
    for upstream in upstreams {
        let _ = upstream.cancel();
    }
}

/// Pushes `value` downstream, then resumes the producers that supplied it
/// with the downstream's demand.
///
/// A `Done` demand ends the fold as finished; a downstream error ends it as
/// that failure. Either way the downstream has seen its last event.
pub(crate) async fn deliver<O, C>(
    downstream: &Downstream<O>,
    machine: &mut Machine<C>,
    value: O,
    producers: Vec<Resumption<Demand>>,
) -> Result<()> {
    match downstream(Event::Value(value)).await {
        Ok(Demand::More) => {
            for producer in &producers {
                let _ = producer.resume(Demand::More);
            }
            Ok(())
        }
        Ok(Demand::Done) => {
            machine.downstream_ended = true;
            for producer in &producers {
                let _ = producer.resume(Demand::Done);
            }
            Err(Error::finished())
        }
        Err(error) => {
            machine.downstream_ended = true;
            for producer in &producers {
                let _ = producer.fail(error.clone());
            }
            Err(error)
        }
    }
}

/// Subscribes `publisher` so that each event lands in `channel` as the
/// action `wrap` builds.
pub(crate) fn subscribe<T, A, W>(publisher: Publisher<T>, channel: &Channel<A>, wrap: W) -> Cancellable<Demand>
where
    T: Send + 'static,
    A: Reject,
    W: Fn(Event<T>, Resumption<Demand>) -> A + Send + Sync + 'static,
{
    let channel = channel.clone();
    publisher.subscribe(Arc::new(
        move |event: Event<T>| -> BoxFuture<'static, Result<Demand>> {
            let sent = pause(|resumption| {
                if let Err(rejected) = channel.try_write(wrap(event, resumption)) {
                    let (error, action) = rejected.into_parts();
                    action.reject(&Completion::from_error(error));
                }
            });
            Box::pin(sent)
        },
    ))
}

/// Runs a combinator: subscribes the upstreams, folds their actions, then
/// reports the end of the stream downstream.
///
/// Resolves with `Ok(Done)` after a normal finish and with the failure
/// otherwise. Cancelling it cancels the fold, which in turn cancels the
/// upstreams.
pub(crate) fn drive<A, C, O, S, F>(
    policy: BufferingPolicy,
    downstream: Downstream<O>,
    subscribe_all: S,
    folder: impl FnOnce(Downstream<O>, Vec<CancelHandle>) -> F + Send + 'static,
) -> Cancellable<Demand>
where
    A: Reject,
    C: Send + 'static,
    O: Send + 'static,
    S: FnOnce(&Channel<A>) -> Vec<Cancellable<Demand>> + Send + 'static,
    F: Folder<State = Machine<C>, Action = A>,
{
    Cancellable::new(move |token: CancelToken| async move {
        let channel = Channel::with_policy(policy);
        let upstreams = subscribe_all(&channel);
        let handles = upstreams.iter().map(Cancellable::handle).collect();
        let fold = AsyncFold::fold(channel, folder(Arc::clone(&downstream), handles));
        let fold_handle = fold.handle();
        token.on_cancel(move || {
            let _ = fold_handle.cancel();
        });

        let machine = match fold.value().await {
            Ok(machine) => machine,
            Err(error) => {
                for upstream in &upstreams {
                    let _ = upstream.cancel();
                    let _ = upstream.value().await;
                }
                return Err(error);
            }
        };
        let completion = machine.completion.unwrap_or(Completion::Finished);
        trace!(
            finished = completion.is_finished(),
            downstream_ended = machine.downstream_ended,
            upstreams = upstreams.len(),
            "combinator terminated"
        );

        let delivered = if machine.downstream_ended {
            Ok(Demand::Done)
        } else {
            downstream(Event::Completion(completion.clone())).await
        };
        for upstream in &upstreams {
            let _ = upstream.value().await;
        }
        delivered?;
        completion.into_result().map(|()| Demand::Done)
    })
}
