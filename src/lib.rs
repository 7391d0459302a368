//! Promises that settle once and chain like JavaScript's.
//!
//! A [`Promise`] is created pending, either from an executor closure
//! ([`Promise::new`]) or together with its settling handles
//! ([`Promise::with_resolvers`]). It is resolved or rejected exactly once;
//! later attempts are ignored. Continuations registered with
//! [`then`](Promise::then), [`catch`](Promise::catch) and friends run on a
//! [`Scheduler`] once the promise settles, each producing a derived promise.
//!
//! ```
//! use settle::{all, resolve, Promise, Resolution};
//! use std::thread;
//!
//! let slow = Promise::new(|resolve, _| {
//!     thread::spawn(move || resolve.resolve(2));
//!     Ok(())
//! });
//! let sum = all([resolve(1), slow])
//!     .then(|values| Resolution::Value(values.iter().sum::<i32>()));
//! assert_eq!(sum.wait().unwrap(), 3);
//! ```
//!
//! Waiting is available three ways: [`Promise::wait`] blocks the thread,
//! `promise.await` (or [`Promise::settled`]) suspends a task, and chaining
//! never blocks at all.

pub mod chain;
pub mod combinator;
pub mod error;
pub mod outcome;
pub mod promise;
pub mod scheduler;

pub use chain::{IntoResolution, Resolution};
pub use combinator::{all, all_settled, any, race, reject, resolve};
pub use error::{AggregateError, ConfigError, ConfigResult, Error};
pub use outcome::{AnyValue, Outcome, Status};
pub use promise::{Promise, Rejector, Resolver, Settled};
pub use scheduler::{Scheduler, SchedulerConfig, Strategy};

/// Bound on the values a promise can carry. Every continuation gets its own
/// clone of the value, possibly on another thread.
pub trait Payload: Clone + Send + Sync + 'static {}

impl<T> Payload for T where T: Clone + Send + Sync + 'static {}
