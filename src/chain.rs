//! `then` / `catch` chaining.
//!
//! Every chaining call registers one continuation on the parent promise and
//! returns a derived promise. When the parent settles, the continuation
//! invokes the matching handler (or passes the outcome through) and settles
//! the derived promise from what the handler produced.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::outcome::AnyValue;
use crate::{Error, Payload, Promise};

/// What a handler wants done with the derived promise.
pub enum Resolution<T> {
    /// Resolve with this value.
    Value(T),
    /// Follow the outcome of another promise.
    Adopt(Promise<T>),
    /// Reject with this reason.
    Reject(Error),
}

impl<T> From<Result<T, Error>> for Resolution<T> {
    fn from(result: Result<T, Error>) -> Self {
        match result {
            Ok(value) => Resolution::Value(value),
            Err(reason) => Resolution::Reject(reason),
        }
    }
}

/// Anything a `then`/`catch` handler may return.
///
/// A `Result` rejects on `Err` and resolves on `Ok`; a `Promise` is adopted.
pub trait IntoResolution {
    type Value: Payload;

    fn into_resolution(self) -> Resolution<Self::Value>;
}

impl<T: Payload> IntoResolution for Resolution<T> {
    type Value = T;

    fn into_resolution(self) -> Resolution<T> {
        self
    }
}

impl<T: Payload> IntoResolution for Result<T, Error> {
    type Value = T;

    fn into_resolution(self) -> Resolution<T> {
        Resolution::from(self)
    }
}

impl<T: Payload> IntoResolution for Promise<T> {
    type Value = T;

    fn into_resolution(self) -> Resolution<T> {
        Resolution::Adopt(self)
    }
}

impl<T: Payload> Promise<T> {
    /// Transform the resolved value. A rejection passes through untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use settle::{resolve, Resolution};
    ///
    /// let doubled = resolve(5).then(|x| Resolution::Value(x * 2));
    /// assert_eq!(doubled.wait().unwrap(), 10);
    /// ```
    pub fn then<F, R>(&self, on_fulfilled: F) -> Promise<R::Value>
    where
        F: FnOnce(T) -> R + Send + 'static,
        R: IntoResolution,
    {
        self.chain(move |result| match result {
            Ok(value) => on_fulfilled(value).into_resolution(),
            Err(reason) => Resolution::Reject(reason),
        })
    }

    /// Handle both outcomes; exactly one of the handlers runs.
    pub fn then_catch<F, G, R>(&self, on_fulfilled: F, on_rejected: G) -> Promise<R::Value>
    where
        F: FnOnce(T) -> R + Send + 'static,
        G: FnOnce(Error) -> R + Send + 'static,
        R: IntoResolution,
    {
        self.chain(move |result| match result {
            Ok(value) => on_fulfilled(value).into_resolution(),
            Err(reason) => on_rejected(reason).into_resolution(),
        })
    }

    /// Recover from a rejection. A resolved value passes through untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use settle::{reject, Resolution};
    ///
    /// let recovered = reject::<i32>("E").catch(|_| Resolution::Value(42));
    /// assert_eq!(recovered.wait().unwrap(), 42);
    /// ```
    pub fn catch<G, R>(&self, on_rejected: G) -> Promise<T>
    where
        G: FnOnce(Error) -> R + Send + 'static,
        R: IntoResolution<Value = T>,
    {
        self.chain(move |result| match result {
            Ok(value) => Resolution::Value(value),
            Err(reason) => on_rejected(reason).into_resolution(),
        })
    }

    /// Run `on_settled` whatever the outcome, then pass the outcome on.
    pub fn finally<F>(&self, on_settled: F) -> Promise<T>
    where
        F: FnOnce() + Send + 'static,
    {
        self.chain(move |result| {
            on_settled();
            Resolution::from(result)
        })
    }

    /// The same outcome with the value boxed as [`AnyValue`], so promises of
    /// different types can be combined.
    pub fn erase(&self) -> Promise<AnyValue> {
        self.then(|value| Resolution::Value(Arc::new(value) as AnyValue))
    }

    fn chain<U, H>(&self, handler: H) -> Promise<U>
    where
        U: Payload,
        H: FnOnce(Result<T, Error>) -> Resolution<U> + Send + 'static,
    {
        let (derived, resolver, _) = Promise::with_resolvers_on(self.scheduler().clone());
        let derived_id = derived.id();
        self.subscribe(move |result| {
            // A panicking handler must not take the dispatching thread down
            // with it; whatever it panicked with becomes the rejection reason.
            let resolution = match panic::catch_unwind(AssertUnwindSafe(move || handler(result))) {
                Ok(resolution) => resolution,
                Err(payload) => {
                    let reason = Error::from_panic(payload);
                    tracing::debug!(promise = derived_id, %reason, "handler panicked");
                    Resolution::Reject(reason)
                }
            };
            resolver.settle(resolution);
        });
        derived
    }
}
