//! The push-based stream seam the combinators plug into.
//!
//! A [`Publisher`] is a deferred subscription: given a [`Downstream`]
//! callback it spawns one [`Cancellable`] that pushes [`Event`]s into the
//! callback, awaiting each call before producing the next value. That await
//! is the backpressure: a producer never has more than one event in flight.
//! The downstream answers every value with a [`Demand`]; `Done` or an error
//! stops the producer.

use crate::error::{Completion, Error, Result};
use crate::sync::{CancelToken, Cancellable};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One item pushed downstream.
#[derive(Debug, Clone)]
pub enum Event<T> {
    /// A value.
    Value(T),
    /// The end of the stream. Nothing follows it.
    Completion(Completion),
}

impl<T> Event<T> {
    /// Maps the value, keeping completions as they are.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Event<U> {
        match self {
            Self::Value(value) => Event::Value(f(value)),
            Self::Completion(completion) => Event::Completion(completion),
        }
    }
}

/// The downstream's answer to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Demand {
    /// Send the next value.
    More,
    /// Stop producing.
    Done,
}

/// The callback a publisher pushes events into.
pub type Downstream<T> = Arc<dyn Fn(Event<T>) -> BoxFuture<'static, Result<Demand>> + Send + Sync>;

type Setup<T> = Box<dyn FnOnce(Downstream<T>) -> Cancellable<Demand> + Send>;

/// A stream that starts producing when subscribed.
#[must_use = "publishers do nothing until subscribed"]
pub struct Publisher<T> {
    setup: Setup<T>,
}

impl<T: Send + 'static> Publisher<T> {
    /// Wraps a subscription function.
    pub fn new<F>(setup: F) -> Self
    where
        F: FnOnce(Downstream<T>) -> Cancellable<Demand> + Send + 'static,
    {
        Self {
            setup: Box::new(setup),
        }
    }

    /// Starts the stream, pushing into `downstream`.
    pub fn subscribe(self, downstream: Downstream<T>) -> Cancellable<Demand> {
        (self.setup)(downstream)
    }

    /// Starts the stream, pushing into an async closure.
    pub fn sink<F, Fut>(self, f: F) -> Cancellable<Demand>
    where
        F: Fn(Event<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Demand>> + Send + 'static,
    {
        self.subscribe(Arc::new(
            move |event: Event<T>| -> BoxFuture<'static, Result<Demand>> { Box::pin(f(event)) },
        ))
    }

    /// Emits every item of `iter`, then finishes.
    pub fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = T> + Send + 'static,
        I::IntoIter: Send,
    {
        Self::new(move |downstream: Downstream<T>| {
            Cancellable::new(move |token: CancelToken| async move {
                for value in iter {
                    token.checkpoint()?;
                    if downstream(Event::Value(value)).await? == Demand::Done {
                        return Ok(Demand::Done);
                    }
                }
                downstream(Event::Completion(Completion::Finished)).await
            })
        })
    }

    /// Emits one value, then finishes.
    pub fn just(value: T) -> Self {
        Self::from_iter(std::iter::once(value))
    }

    /// Finishes without emitting.
    pub fn empty() -> Self {
        Self::from_iter(std::iter::empty())
    }

    /// Fails without emitting.
    pub fn fail(error: Error) -> Self {
        Self::new(move |downstream: Downstream<T>| {
            Cancellable::spawn(async move {
                let demand = downstream(Event::Completion(Completion::Failure(error))).await?;
                Ok(demand)
            })
        })
    }

    /// Maps every value.
    pub(crate) fn map<U, F>(self, f: F) -> Publisher<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Publisher::new(move |downstream: Downstream<U>| {
            self.subscribe(Arc::new(move |event: Event<T>| {
                let f = Arc::clone(&f);
                downstream(event.map(move |value| f(value)))
            }))
        })
    }
}

impl<T> fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::runtime::block_on;
    use crate::test_utils::init_test_logging;
    use parking_lot::Mutex;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    fn collect<T: Send + 'static>(
        publisher: Publisher<T>,
        limit: usize,
    ) -> (Vec<T>, Option<Completion>, Result<Demand>) {
        let values = Arc::new(Mutex::new(Vec::new()));
        let completion = Arc::new(Mutex::new(None));
        let (v, c) = (Arc::clone(&values), Arc::clone(&completion));
        let task = publisher.sink(move |event| {
            let (v, c) = (Arc::clone(&v), Arc::clone(&c));
            async move {
                match event {
                    Event::Value(value) => {
                        let mut values = v.lock();
                        values.push(value);
                        Ok(if values.len() >= limit {
                            Demand::Done
                        } else {
                            Demand::More
                        })
                    }
                    Event::Completion(completion) => {
                        *c.lock() = Some(completion);
                        Ok(Demand::Done)
                    }
                }
            }
        });
        let result = block_on(task.value());
        let values = std::mem::take(&mut *values.lock());
        let completion = completion.lock().take();
        (values, completion, result)
    }

    #[test]
    fn from_iter_emits_then_finishes() {
        init_test("from_iter_emits_then_finishes");
        let (values, completion, result) = collect(Publisher::from_iter(0..5), usize::MAX);
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
        assert!(completion.is_some_and(|c| c.is_finished()));
        assert_eq!(result.expect("result"), Demand::Done);
        crate::test_complete!("from_iter_emits_then_finishes");
    }

    #[test]
    fn done_demand_stops_the_source() {
        init_test("done_demand_stops_the_source");
        let (values, completion, result) = collect(Publisher::from_iter(0..), 3);
        assert_eq!(values, vec![0, 1, 2]);
        assert!(completion.is_none());
        assert_eq!(result.expect("result"), Demand::Done);
        crate::test_complete!("done_demand_stops_the_source");
    }

    #[test]
    fn fail_and_empty_only_complete() {
        init_test("fail_and_empty_only_complete");
        let (values, completion, _) = collect(Publisher::<u8>::fail(Error::user("nope")), 10);
        assert!(values.is_empty());
        let error = completion.and_then(|c| c.failure().cloned()).expect("failure");
        assert_eq!(error.kind(), ErrorKind::User);

        let (values, completion, _) = collect(Publisher::<u8>::empty(), 10);
        assert!(values.is_empty());
        assert!(completion.is_some_and(|c| c.is_finished()));
        crate::test_complete!("fail_and_empty_only_complete");
    }

    #[test]
    fn map_transforms_values() {
        init_test("map_transforms_values");
        let (values, _, _) = collect(Publisher::just(20_u32).map(|v| v + 1), 10);
        assert_eq!(values, vec![21]);
        crate::test_complete!("map_transforms_values");
    }
}
