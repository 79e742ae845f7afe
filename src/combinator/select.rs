//! Interleaving of two publishers of different types.
//!
//! `select` runs the merge machine over two upstreams whose values are tagged
//! [`Either::Left`] or [`Either::Right`] as they are produced. A single ready
//! value is emitted on its own; there is no pairing. The select finishes
//! when both sides have finished and fails as soon as either side fails.

use super::merge::{Action, MergeFolder};
use super::{drive, subscribe};
use crate::channel::{BufferingPolicy, Channel};
use crate::publisher::{Demand, Downstream, Event, Publisher};
use crate::sync::Resumption;

/// A value from one of two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Either<A, B> {
    /// A value from the first publisher.
    Left(A),
    /// A value from the second publisher.
    Right(B),
}

impl<A, B> Either<A, B> {
    /// Returns true if this is the Left variant.
    pub const fn is_left(&self) -> bool {
        matches!(self, Self::Left(_))
    }

    /// Returns true if this is the Right variant.
    pub const fn is_right(&self) -> bool {
        matches!(self, Self::Right(_))
    }

    /// The left value, if any.
    pub fn left(self) -> Option<A> {
        match self {
            Self::Left(a) => Some(a),
            Self::Right(_) => None,
        }
    }

    /// The right value, if any.
    pub fn right(self) -> Option<B> {
        match self {
            Self::Left(_) => None,
            Self::Right(b) => Some(b),
        }
    }
}

/// Forwards the values of both publishers as they arrive.
///
/// Buffers `Oldest(2)`.
pub fn select<A, B>(left: Publisher<A>, right: Publisher<B>) -> Publisher<Either<A, B>>
where
    A: Send + 'static,
    B: Send + 'static,
{
    select_with_buffering(BufferingPolicy::Oldest(2), left, right)
}

/// [`select`] with an explicit buffering policy for the fold's channel.
pub fn select_with_buffering<A, B>(
    policy: BufferingPolicy,
    left: Publisher<A>,
    right: Publisher<B>,
) -> Publisher<Either<A, B>>
where
    A: Send + 'static,
    B: Send + 'static,
{
    Publisher::new(move |downstream: Downstream<Either<A, B>>| {
        drive(
            policy,
            downstream,
            move |channel: &Channel<Action<Either<A, B>>>| {
                vec![
                    subscribe(left, channel, |event: Event<A>, r: Resumption<Demand>| {
                        Action::new(event.map(Either::Left), r)
                    }),
                    subscribe(right, channel, |event: Event<B>, r: Resumption<Demand>| {
                        Action::new(event.map(Either::Right), r)
                    }),
                ]
            },
            MergeFolder::new,
        )
    })
}
