//! Positional pairing of two publishers.
//!
//! The fold's `Current` walks
//!
//! ```text
//! Nothing ─► HasLeft | HasRight ─► HasBoth ─(emit)─► Nothing
//!    └──────────────┴──────────────────┴──► Finished | Errored
//! ```
//!
//! A producer holds at most one value in flight, so a value arriving on a
//! side that is already occupied is a protocol violation. A completion on
//! either side ends the zip: whatever the other side holds is released first.

use super::{cancel_upstreams, deliver, drive, settle, subscribe, Machine, Reject};
use crate::channel::{BufferingPolicy, Channel};
use crate::error::{Completion, Error, Result};
use crate::fold::{Effect, Folder};
use crate::publisher::{Demand, Downstream, Event, Publisher};
use crate::sync::{CancelHandle, Resumption};
use crate::tracing_compat::trace;

/// A producer's message to the zip fold.
pub(crate) enum Action<A, B> {
    Left(Event<A>, Resumption<Demand>),
    Right(Event<B>, Resumption<Demand>),
}

impl<A: Send + 'static, B: Send + 'static> Reject for Action<A, B> {
    fn reject(self, completion: &Completion) {
        let (Self::Left(_, resumption) | Self::Right(_, resumption)) = self;
        settle(&resumption, completion);
    }
}

/// The pairing state.
pub(crate) enum Current<A, B> {
    Nothing,
    HasLeft(A, Resumption<Demand>),
    HasRight(B, Resumption<Demand>),
    HasBoth(A, Resumption<Demand>, B, Resumption<Demand>),
    Finished,
    Errored(Error),
}

impl<A, B> Current<A, B> {
    const fn name(&self) -> &'static str {
        match self {
            Self::Nothing => "Nothing",
            Self::HasLeft(..) => "HasLeft",
            Self::HasRight(..) => "HasRight",
            Self::HasBoth(..) => "HasBoth",
            Self::Finished => "Finished",
            Self::Errored(_) => "Errored",
        }
    }

    fn terminal(completion: &Completion) -> Self {
        match completion {
            Completion::Finished => Self::Finished,
            Completion::Failure(error) => Self::Errored(error.clone()),
        }
    }

    /// Releases every resumption still held.
    fn settle(self, completion: &Completion) {
        match self {
            Self::HasLeft(_, r) | Self::HasRight(_, r) => settle(&r, completion),
            Self::HasBoth(_, left, _, right) => {
                settle(&left, completion);
                settle(&right, completion);
            }
            Self::Nothing | Self::Finished | Self::Errored(_) => {}
        }
    }
}

struct ZipFolder<A, B> {
    downstream: Downstream<(A, B)>,
    upstreams: Vec<CancelHandle>,
}

impl<A, B> ZipFolder<A, B> {
    /// A side completed: release the other side, then end the fold.
    fn complete(
        current: Current<A, B>,
        completion: Completion,
        sender: &Resumption<Demand>,
        state: &mut Machine<Current<A, B>>,
    ) -> Effect {
        let _ = sender.resume(Demand::Done);
        current.settle(&completion);
        state.current = Current::terminal(&completion);
        trace!(finished = completion.is_finished(), "zip upstream completed");
        Effect::Completion(completion)
    }
}

impl<A, B> Folder for ZipFolder<A, B>
where
    A: Send + 'static,
    B: Send + 'static,
{
    type State = Machine<Current<A, B>>;
    type Action = Action<A, B>;

    fn initialize(&mut self, _channel: &Channel<Self::Action>) -> Self::State {
        Machine::new(Current::Nothing)
    }

    fn reduce(&mut self, state: &mut Self::State, action: Self::Action) -> Effect {
        let current = std::mem::replace(&mut state.current, Current::Nothing);
        match (current, action) {
            (Current::Nothing, Action::Left(Event::Value(a), r)) => {
                state.current = Current::HasLeft(a, r);
                Effect::None
            }
            (Current::Nothing, Action::Right(Event::Value(b), r)) => {
                state.current = Current::HasRight(b, r);
                Effect::None
            }
            (Current::HasRight(b, rb), Action::Left(Event::Value(a), ra)) => {
                state.current = Current::HasBoth(a, ra, b, rb);
                Effect::None
            }
            (Current::HasLeft(a, ra), Action::Right(Event::Value(b), rb)) => {
                state.current = Current::HasBoth(a, ra, b, rb);
                Effect::None
            }
            (
                current @ (Current::Nothing | Current::HasRight(..)),
                Action::Left(Event::Completion(completion), r),
            )
            | (
                current @ (Current::Nothing | Current::HasLeft(..)),
                Action::Right(Event::Completion(completion), r),
            ) => Self::complete(current, completion, &r, state),
            (current, _) => {
                panic!("zip protocol violation: action received in state {}", current.name())
            }
        }
    }

    async fn emit(&mut self, state: &mut Self::State) -> Result<()> {
        if !matches!(state.current, Current::HasBoth(..)) {
            return Ok(());
        }
        let Current::HasBoth(a, ra, b, rb) = std::mem::replace(&mut state.current, Current::Nothing)
        else {
            unreachable!("checked above");
        };
        deliver(&self.downstream, state, (a, b), vec![ra, rb]).await
    }

    fn dispose(&mut self, action: Self::Action, completion: &Completion) {
        let (Action::Left(_, r) | Action::Right(_, r)) = action;
        settle(&r, completion);
    }

    fn finalize(&mut self, state: &mut Self::State, completion: &Completion) {
        let current = std::mem::replace(&mut state.current, Current::terminal(completion));
        current.settle(completion);
        state.completion = Some(completion.clone());
        cancel_upstreams(&self.upstreams);
    }
}

/// Pairs the i-th value of `left` with the i-th value of `right`.
///
/// Ends when either side ends. Buffers `Oldest(2)`.
pub fn zip<A, B>(left: Publisher<A>, right: Publisher<B>) -> Publisher<(A, B)>
where
    A: Send + 'static,
    B: Send + 'static,
{
    zip_with_buffering(BufferingPolicy::Oldest(2), left, right)
}

/// [`zip`] with an explicit buffering policy for the fold's channel.
pub fn zip_with_buffering<A, B>(
    policy: BufferingPolicy,
    left: Publisher<A>,
    right: Publisher<B>,
) -> Publisher<(A, B)>
where
    A: Send + 'static,
    B: Send + 'static,
{
    Publisher::new(move |downstream: Downstream<(A, B)>| {
        drive(
            policy,
            downstream,
            move |channel: &Channel<Action<A, B>>| {
                vec![
                    subscribe(left, channel, Action::Left),
                    subscribe(right, channel, Action::Right),
                ]
            },
            |downstream, upstreams| ZipFolder {
                downstream,
                upstreams,
            },
        )
    })
}

/// Pairs three publishers positionally.
pub fn zip3<A, B, C>(a: Publisher<A>, b: Publisher<B>, c: Publisher<C>) -> Publisher<(A, B, C)>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
{
    zip(zip(a, b), c).map(|((a, b), c)| (a, b, c))
}
