//! Combinators over several promises, plus already-settled constructors.
//!
//! Each combinator returns one synthetic promise and drives it from
//! continuations registered with [`Promise::then_catch`] on every input.
//! Those continuations only ever hold on to the synthetic promise's settling
//! handles, never to the inputs, so nothing here keeps an input alive.
//! Inputs that settle after the synthetic promise has been decided still run
//! to completion, their outcomes are simply ignored.

use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::outcome::AnyValue;
use crate::{AggregateError, Error, Outcome, Payload, Promise, Resolution};

const ALL_REJECTED: &str = "all promises were rejected";

/// An already resolved promise.
///
/// `value` is stored as it is: resolving with a `Promise` yields a promise
/// whose value is that promise. To follow another promise's outcome instead,
/// use [`Resolver::adopt`](crate::Resolver::adopt) or return the promise
/// from a `then` handler.
pub fn resolve<T: Payload>(value: T) -> Promise<T> {
    Promise::new(move |resolver, _| {
        resolver.resolve(value);
        Ok(())
    })
}

/// An already rejected promise.
pub fn reject<T: Payload>(reason: impl Into<Error>) -> Promise<T> {
    let reason = reason.into();
    Promise::new(move |_, _| Err(reason))
}

/// Settles like whichever input settles first.
///
/// With no inputs the returned promise never settles.
///
/// # Examples
///
/// ```
/// use settle::{race, Promise};
/// use std::{thread, time::Duration};
///
/// let delayed = |ms: u64, value: &'static str| {
///     Promise::new(move |resolve, _| {
///         thread::spawn(move || {
///             thread::sleep(Duration::from_millis(ms));
///             resolve.resolve(value);
///         });
///         Ok(())
///     })
/// };
/// let winner = race([delayed(200, "slow"), delayed(10, "fast")]);
/// assert_eq!(winner.wait().unwrap(), "fast");
/// ```
pub fn race<T, I>(promises: I) -> Promise<T>
where
    T: Payload,
    I: IntoIterator<Item = Promise<T>>,
{
    let promises: Vec<Promise<T>> = promises.into_iter().collect();
    Promise::new(move |resolver, rejector| {
        for promise in &promises {
            let resolver = resolver.clone();
            let rejector = rejector.clone();
            promise.then_catch(
                move |value| {
                    resolver.resolve(value);
                    Resolution::Value(())
                },
                move |reason| {
                    rejector.reject(reason);
                    Resolution::Value(())
                },
            );
        }
        Ok(())
    })
}

/// Per-input result slots, filled in whatever order the inputs settle.
///
/// Continuations record into the tally instead of holding on to the inputs,
/// so an input that never settles is not kept alive by its own continuation.
struct Tally<T> {
    slots: Vec<Option<T>>,
    remaining: usize,
}

impl<T> Tally<T> {
    fn shared(len: usize) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Tally {
            slots: (0..len).map(|_| None).collect(),
            remaining: len,
        }))
    }

    /// Record slot `index`; once every slot is filled, hand them all back in
    /// input order.
    fn fill(&mut self, index: usize, value: T) -> Option<Vec<T>> {
        self.slots[index] = Some(value);
        self.remaining -= 1;
        if self.remaining == 0 {
            Some(mem::take(&mut self.slots).into_iter().flatten().collect())
        } else {
            None
        }
    }
}

/// Resolves with every input's value, in input order, once all inputs have
/// resolved. Rejects with the first rejection to happen.
///
/// With no inputs the returned promise resolves with an empty vector.
pub fn all<T, I>(promises: I) -> Promise<Vec<T>>
where
    T: Payload,
    I: IntoIterator<Item = Promise<T>>,
{
    let promises: Vec<Promise<T>> = promises.into_iter().collect();
    Promise::new(move |resolver, rejector| {
        if promises.is_empty() {
            resolver.resolve(Vec::new());
            return Ok(());
        }
        let tally = Tally::shared(promises.len());
        for (index, promise) in promises.iter().enumerate() {
            let tally = Arc::clone(&tally);
            let resolver = resolver.clone();
            let rejector = rejector.clone();
            promise.then_catch(
                move |value| {
                    let complete = tally.lock().fill(index, value);
                    if let Some(values) = complete {
                        resolver.resolve(values);
                    }
                    Resolution::Value(())
                },
                move |reason| {
                    rejector.reject(reason);
                    Resolution::Value(())
                },
            );
        }
        Ok(())
    })
}

/// Resolves with the first input to resolve. Rejects only when every input
/// has rejected, with an [`AggregateError`] listing the rejections in input
/// order.
///
/// With no inputs the returned promise rejects straight away with an empty
/// aggregate.
pub fn any<T, I>(promises: I) -> Promise<T>
where
    T: Payload,
    I: IntoIterator<Item = Promise<T>>,
{
    let promises: Vec<Promise<T>> = promises.into_iter().collect();
    Promise::new(move |resolver, rejector| {
        if promises.is_empty() {
            rejector.reject(AggregateError::new(ALL_REJECTED, Vec::new()));
            return Ok(());
        }
        let tally = Tally::shared(promises.len());
        for (index, promise) in promises.iter().enumerate() {
            let tally = Arc::clone(&tally);
            let resolver = resolver.clone();
            let rejector = rejector.clone();
            promise.then_catch(
                move |value| {
                    resolver.resolve(value);
                    Resolution::Value(())
                },
                move |reason| {
                    let complete = tally.lock().fill(index, reason);
                    if let Some(reasons) = complete {
                        let members = reasons
                            .into_iter()
                            .map(Outcome::<AnyValue>::rejected)
                            .collect();
                        rejector.reject(AggregateError::new(ALL_REJECTED, members));
                    }
                    Resolution::Value(())
                },
            );
        }
        Ok(())
    })
}

/// Resolves once every input has settled, with one [`Outcome`] per input in
/// input order. Never rejects.
pub fn all_settled<T, I>(promises: I) -> Promise<Vec<Outcome<T>>>
where
    T: Payload,
    I: IntoIterator<Item = Promise<T>>,
{
    let promises: Vec<Promise<T>> = promises.into_iter().collect();
    Promise::new(move |resolver, _| {
        if promises.is_empty() {
            resolver.resolve(Vec::new());
            return Ok(());
        }
        let tally = Tally::shared(promises.len());
        for (index, promise) in promises.iter().enumerate() {
            let on_resolved = (Arc::clone(&tally), resolver.clone());
            let on_rejected = (Arc::clone(&tally), resolver.clone());
            promise.then_catch(
                move |value| {
                    let (tally, resolver) = on_resolved;
                    let complete = tally.lock().fill(index, Outcome::resolved(value));
                    if let Some(outcomes) = complete {
                        resolver.resolve(outcomes);
                    }
                    Resolution::Value(())
                },
                move |reason| {
                    let (tally, resolver) = on_rejected;
                    let complete = tally.lock().fill(index, Outcome::rejected(reason));
                    if let Some(outcomes) = complete {
                        resolver.resolve(outcomes);
                    }
                    Resolution::Value(())
                },
            );
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Status;
    use std::thread;
    use std::time::Duration;

    fn later<T: Payload>(ms: u64, result: Result<T, Error>) -> Promise<T> {
        Promise::new(move |resolve, reject| {
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(ms));
                match result {
                    Ok(value) => resolve.resolve(value),
                    Err(reason) => reject.reject(reason),
                };
            });
            Ok(())
        })
    }

    #[test]
    fn test_resolve_and_reject_are_settled() {
        let ok = resolve(1);
        assert_eq!(ok.status(), Status::Resolved);
        let err = reject::<i32>("E");
        assert_eq!(err.status(), Status::Rejected);
        assert_eq!(err.outcome().reason.map(|r| r.to_string()).as_deref(), Some("E"));
    }

    #[test]
    fn test_race_rejection_can_win() {
        let winner = race(vec![
            later(150, Ok(1)),
            later(10, Err(Error::msg("FAIL"))),
        ]);
        assert_eq!(winner.wait().unwrap_err().to_string(), "FAIL");
    }

    #[test]
    fn test_race_empty_stays_pending() {
        let never = race(Vec::<Promise<i32>>::new());
        thread::sleep(Duration::from_millis(20));
        assert_eq!(never.status(), Status::Pending);
    }

    #[test]
    fn test_all_empty_resolves() {
        let empty = all(Vec::<Promise<i32>>::new());
        assert_eq!(empty.wait().unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn test_all_keeps_input_order() {
        let values = all(vec![
            later(60, Ok(1)),
            later(30, Ok(2)),
            later(5, Ok(3)),
        ]);
        assert_eq!(values.wait().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_any_empty_rejects_with_empty_aggregate() {
        let none = any(Vec::<Promise<i32>>::new());
        let reason = none.wait().unwrap_err();
        let aggregate = reason.as_aggregate().expect("aggregate");
        assert!(aggregate.is_empty());
    }

    #[test]
    fn test_any_skips_rejections() {
        let first = any(vec![
            later(5, Err(Error::msg("a"))),
            later(40, Ok("late")),
            later(20, Ok("early")),
        ]);
        assert_eq!(first.wait().unwrap(), "early");
    }

    #[test]
    fn test_combinators_do_not_keep_unsettled_inputs_alive() {
        let combinators: Vec<fn(Vec<Promise<i32>>)> = vec![
            |inputs| drop(race(inputs)),
            |inputs| drop(all(inputs)),
            |inputs| drop(any(inputs)),
            |inputs| drop(all_settled(inputs)),
        ];
        for combine in combinators {
            let (promise, resolver, rejector) = Promise::<i32>::with_resolvers();
            let (other, other_resolver, _) = Promise::<i32>::with_resolvers();
            let input = Arc::downgrade(&promise.shared);
            let sibling = Arc::downgrade(&other.shared);
            combine(vec![promise, other]);
            drop((resolver, rejector, other_resolver));
            assert!(input.upgrade().is_none());
            assert!(sibling.upgrade().is_none());
        }
    }

    #[test]
    fn test_any_aggregate_records_reasons_in_input_order() {
        let reason = any(vec![
            later::<i32>(40, Err(Error::msg("slow"))),
            later(5, Err(Error::msg("fast"))),
        ])
        .wait()
        .unwrap_err();
        let aggregate = reason.as_aggregate().expect("aggregate");
        let reasons: Vec<String> = aggregate.reasons().iter().map(ToString::to_string).collect();
        assert_eq!(reasons, vec!["slow", "fast"]);
        assert!(aggregate
            .outcomes()
            .iter()
            .all(|outcome| outcome.status == Status::Rejected && outcome.value.is_none()));
        assert_eq!(reason.to_string(), "all promises were rejected: slow; fast");
    }

    #[test]
    fn test_all_settled_empty_resolves() {
        let empty = all_settled(Vec::<Promise<i32>>::new());
        assert!(empty.wait().unwrap().is_empty());
    }

    #[test]
    fn test_all_settled_reports_every_input() {
        let outcomes = all_settled(vec![
            later(40, Ok(1)),
            later(5, Err(Error::msg("E"))),
        ])
        .wait()
        .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].status, Status::Resolved);
        assert_eq!(outcomes[0].value, Some(1));
        assert!(outcomes[0].reason.is_none());
        assert_eq!(outcomes[1].status, Status::Rejected);
        assert!(outcomes[1].value.is_none());
        assert_eq!(outcomes[1].reason.as_ref().map(ToString::to_string).as_deref(), Some("E"));
    }
}
