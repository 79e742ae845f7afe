//! Interleaving of any number of publishers.
//!
//! Values are forwarded in the order the fold receives them; nothing waits
//! for a partner. The merge finishes once every upstream has finished, and
//! the first upstream failure ends it immediately.

use super::{cancel_upstreams, deliver, drive, settle, subscribe, Machine, Reject};
use crate::channel::{BufferingPolicy, Channel};
use crate::error::{Completion, Error, Result};
use crate::fold::{Effect, Folder};
use crate::publisher::{Demand, Downstream, Event, Publisher};
use crate::sync::{CancelHandle, Resumption};
use crate::tracing_compat::trace;

/// A producer's message to the merge fold.
pub(crate) struct Action<T> {
    pub(crate) event: Event<T>,
    pub(crate) resumption: Resumption<Demand>,
}

impl<T> Action<T> {
    pub(crate) const fn new(event: Event<T>, resumption: Resumption<Demand>) -> Self {
        Self { event, resumption }
    }
}

impl<T: Send + 'static> Reject for Action<T> {
    fn reject(self, completion: &Completion) {
        settle(&self.resumption, completion);
    }
}

/// The forwarding state.
pub(crate) enum Current<T> {
    /// Waiting; `running` upstreams have not finished yet.
    Nothing { running: usize },
    /// One value ready to go downstream.
    Ready {
        value: T,
        producer: Resumption<Demand>,
        running: usize,
    },
    Finished,
    Errored(Error),
}

pub(crate) struct MergeFolder<T> {
    downstream: Downstream<T>,
    upstreams: Vec<CancelHandle>,
}

impl<T> MergeFolder<T> {
    pub(crate) fn new(downstream: Downstream<T>, upstreams: Vec<CancelHandle>) -> Self {
        Self {
            downstream,
            upstreams,
        }
    }
}

impl<T: Send + 'static> Folder for MergeFolder<T> {
    type State = Machine<Current<T>>;
    type Action = Action<T>;

    fn initialize(&mut self, _channel: &Channel<Action<T>>) -> Self::State {
        Machine::new(Current::Nothing {
            running: self.upstreams.len(),
        })
    }

    fn reduce(&mut self, state: &mut Self::State, action: Action<T>) -> Effect {
        let Current::Nothing { running } = state.current else {
            panic!("merge protocol violation: action received while not idle");
        };
        let Action { event, resumption } = action;
        match event {
            Event::Value(value) => {
                state.current = Current::Ready {
                    value,
                    producer: resumption,
                    running,
                };
                Effect::None
            }
            Event::Completion(Completion::Finished) => {
                let _ = resumption.resume(Demand::Done);
                let running = running.saturating_sub(1);
                trace!(running, "merge upstream finished");
                if running == 0 {
                    state.current = Current::Finished;
                    Effect::Completion(Completion::Finished)
                } else {
                    state.current = Current::Nothing { running };
                    Effect::None
                }
            }
            Event::Completion(Completion::Failure(error)) => {
                let _ = resumption.resume(Demand::Done);
                trace!(error = %error, "merge upstream failed");
                state.current = Current::Errored(error.clone());
                Effect::Completion(Completion::Failure(error))
            }
        }
    }

    async fn emit(&mut self, state: &mut Self::State) -> Result<()> {
        let Current::Ready { running, .. } = state.current else {
            return Ok(());
        };
        let Current::Ready {
            value, producer, ..
        } = std::mem::replace(&mut state.current, Current::Nothing { running })
        else {
            unreachable!("checked above");
        };
        deliver(&self.downstream, state, value, vec![producer]).await
    }

    fn dispose(&mut self, action: Action<T>, completion: &Completion) {
        settle(&action.resumption, completion);
    }

    fn finalize(&mut self, state: &mut Self::State, completion: &Completion) {
        let terminal = match completion {
            Completion::Finished => Current::Finished,
            Completion::Failure(error) => Current::Errored(error.clone()),
        };
        if let Current::Ready { producer, .. } = std::mem::replace(&mut state.current, terminal) {
            settle(&producer, completion);
        }
        state.completion = Some(completion.clone());
        cancel_upstreams(&self.upstreams);
    }
}

/// Forwards the values of every publisher as they arrive.
///
/// Buffers `Oldest(publishers.len())`.
pub fn merge<T: Send + 'static>(publishers: Vec<Publisher<T>>) -> Publisher<T> {
    let arity = publishers.len().max(1);
    merge_with_buffering(BufferingPolicy::Oldest(arity), publishers)
}

/// [`merge`] with an explicit buffering policy for the fold's channel.
pub fn merge_with_buffering<T: Send + 'static>(
    policy: BufferingPolicy,
    publishers: Vec<Publisher<T>>,
) -> Publisher<T> {
    if publishers.is_empty() {
        return Publisher::empty();
    }
    Publisher::new(move |downstream: Downstream<T>| {
        drive(
            policy,
            downstream,
            move |channel: &Channel<Action<T>>| {
                publishers
                    .into_iter()
                    .map(|publisher| subscribe(publisher, channel, Action::new))
                    .collect()
            },
            MergeFolder::new,
        )
    })
}
