//! The settlement core: a value that is decided exactly once.
//!
//! A [`Promise`] starts pending and is moved to resolved or rejected by its
//! [`Resolver`] / [`Rejector`] handles. The whole state (status, value or
//! reason, registered continuations, parked wakers) lives behind one mutex,
//! so the transition and the hand-off of the continuations happen together.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use crate::chain::{IntoResolution, Resolution};
use crate::{Error, Outcome, Payload, Scheduler, Status};

type Continuation<T> = Box<dyn FnOnce(Result<T, Error>) + Send + 'static>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_WAITER: AtomicU64 = AtomicU64::new(1);

enum State<T> {
    Pending,
    /// Locked in to the outcome of another promise.
    Adopting,
    Settled(Result<T, Error>),
}

struct Inner<T> {
    state: State<T>,
    continuations: Vec<Continuation<T>>,
    /// Parked wakers, keyed by the [`Settled`] future that parked them.
    wakers: Vec<(u64, Waker)>,
}

/// Who is trying to settle the promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Handle,
    Adoption,
}

pub(crate) struct Shared<T> {
    id: u64,
    scheduler: Scheduler,
    inner: Mutex<Inner<T>>,
}

impl<T> Shared<T> {
    fn status(&self) -> Status {
        match &self.inner.lock().state {
            State::Pending | State::Adopting => Status::Pending,
            State::Settled(Ok(_)) => Status::Resolved,
            State::Settled(Err(_)) => Status::Rejected,
        }
    }

    fn forget_waker(&self, waiter: u64) {
        self.inner.lock().wakers.retain(|(key, _)| *key != waiter);
    }
}

impl<T: Payload> Shared<T> {
    fn new(scheduler: Scheduler) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            scheduler,
            inner: Mutex::new(Inner {
                state: State::Pending,
                continuations: Vec::new(),
                wakers: Vec::new(),
            }),
        }
    }

    fn outcome(&self) -> Outcome<T> {
        match &self.inner.lock().state {
            State::Settled(result) => Outcome::from_result(result),
            _ => Outcome::pending(),
        }
    }

    /// Move to the terminal state. Returns false when the call lost, either
    /// because the promise already settled or because it is adopting and the
    /// call did not come from the adopted promise.
    fn settle(&self, result: Result<T, Error>, source: Source) -> bool {
        let (continuations, wakers) = {
            let mut inner = self.inner.lock();
            match (&inner.state, source) {
                (State::Pending, _) | (State::Adopting, Source::Adoption) => {}
                _ => return false,
            }
            inner.state = State::Settled(result.clone());
            (
                mem::take(&mut inner.continuations),
                mem::take(&mut inner.wakers),
            )
        };

        tracing::trace!(
            promise = self.id,
            resolved = result.is_ok(),
            continuations = continuations.len(),
            "promise settled"
        );

        for continuation in continuations {
            let result = result.clone();
            self.scheduler
                .spawn(Box::new(move || continuation(result)));
        }
        for (_, waker) in wakers {
            waker.wake();
        }
        true
    }

    fn adopt(self: &Arc<Self>, other: &Promise<T>) -> bool {
        if Arc::ptr_eq(self, &other.shared) {
            let reason = Error::construction("a promise cannot adopt itself");
            return self.settle(Err(reason), Source::Handle);
        }
        {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, State::Pending) {
                return false;
            }
            inner.state = State::Adopting;
        }
        tracing::debug!(promise = self.id, adopted = other.shared.id, "adopting promise");
        let this = Arc::clone(self);
        other.shared.subscribe(Box::new(move |result| {
            this.settle(result, Source::Adoption);
        }));
        true
    }

    /// Register a continuation. If the promise has already settled the
    /// continuation is still dispatched through the scheduler, never run on
    /// the caller's stack.
    fn subscribe(&self, continuation: Continuation<T>) {
        let mut inner = self.inner.lock();
        let settled = match &inner.state {
            State::Settled(result) => Some(result.clone()),
            _ => None,
        };
        match settled {
            Some(result) => {
                drop(inner);
                self.scheduler
                    .spawn(Box::new(move || continuation(result)));
            }
            None => inner.continuations.push(continuation),
        }
    }

    /// Each waiter keeps at most one parked waker, the one from its latest
    /// poll.
    fn poll_settled(&self, waiter: u64, cx: &mut Context<'_>) -> Poll<Result<T, Error>> {
        let mut inner = self.inner.lock();
        if let State::Settled(result) = &inner.state {
            return Poll::Ready(result.clone());
        }
        match inner.wakers.iter_mut().find(|(key, _)| *key == waiter) {
            Some((_, waker)) => {
                if !waker.will_wake(cx.waker()) {
                    *waker = cx.waker().clone();
                }
            }
            None => inner.wakers.push((waiter, cx.waker().clone())),
        }
        Poll::Pending
    }
}

/// A value that settles exactly once, as resolved or rejected.
///
/// `Promise` is a shared handle: clones observe the same settlement.
///
/// # Examples
///
/// ```
/// use settle::Promise;
/// use std::{thread, time::Duration};
///
/// let promise = Promise::new(|resolve, _reject| {
///     thread::spawn(move || {
///         thread::sleep(Duration::from_millis(10));
///         resolve.resolve(String::from("🍓"));
///     });
///     Ok(())
/// });
/// assert_eq!(promise.wait().unwrap(), "🍓");
/// ```
pub struct Promise<T> {
    pub(crate) shared: Arc<Shared<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Payload> Promise<T> {
    /// Create a promise and run `executor` on the calling thread.
    ///
    /// The executor may hand its [`Resolver`] and [`Rejector`] to other
    /// threads. Returning `Err` rejects the promise with that reason; so does
    /// panicking, with [`Error::Panicked`].
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Resolver<T>, Rejector<T>) -> Result<(), Error>,
    {
        Self::with_scheduler(Scheduler::global(), executor)
    }

    /// Like [`new`](Self::new), but continuations of this promise and of
    /// every promise chained from it run on `scheduler`.
    pub fn with_scheduler<F>(scheduler: Scheduler, executor: F) -> Self
    where
        F: FnOnce(Resolver<T>, Rejector<T>) -> Result<(), Error>,
    {
        let (promise, resolver, rejector) = Self::with_resolvers_on(scheduler);
        let fallback = rejector.clone();
        match panic::catch_unwind(AssertUnwindSafe(move || executor(resolver, rejector))) {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                fallback.reject(reason);
            }
            Err(payload) => {
                let reason = Error::from_panic(payload);
                tracing::debug!(promise = promise.id(), %reason, "executor panicked");
                fallback.reject(reason);
            }
        }
        promise
    }

    /// A pending promise together with the handles that settle it.
    pub fn with_resolvers() -> (Self, Resolver<T>, Rejector<T>) {
        Self::with_resolvers_on(Scheduler::global())
    }

    pub fn with_resolvers_on(scheduler: Scheduler) -> (Self, Resolver<T>, Rejector<T>) {
        let shared = Arc::new(Shared::new(scheduler));
        tracing::trace!(promise = shared.id, "promise created");
        (
            Promise {
                shared: Arc::clone(&shared),
            },
            Resolver {
                shared: Arc::clone(&shared),
            },
            Rejector { shared },
        )
    }

    pub fn outcome(&self) -> Outcome<T> {
        self.shared.outcome()
    }

    /// Future that completes when this promise settles.
    pub fn settled(&self) -> Settled<T> {
        Settled::new(Arc::clone(&self.shared))
    }

    /// Block the current thread until the promise settles.
    pub fn wait(&self) -> Result<T, Error> {
        futures::executor::block_on(self.settled())
    }

    /// A construction failure that records this promise's current status.
    pub fn error<S: fmt::Display>(&self, message: S) -> Error {
        Error::construction(format!("{} (status: {})", message, self.status()))
    }

    /// Run `continuation` with the terminal result once the promise settles.
    pub(crate) fn subscribe<F>(&self, continuation: F)
    where
        F: FnOnce(Result<T, Error>) + Send + 'static,
    {
        self.shared.subscribe(Box::new(continuation));
    }
}

impl<T> Promise<T> {
    /// Process-unique identifier, used in log events.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn status(&self) -> Status {
        self.shared.status()
    }

    pub fn is_pending(&self) -> bool {
        self.status() == Status::Pending
    }

    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    /// The scheduler continuations of this promise are dispatched on.
    pub fn scheduler(&self) -> &Scheduler {
        &self.shared.scheduler
    }
}

impl<T: Payload> IntoFuture for Promise<T> {
    type Output = Result<T, Error>;
    type IntoFuture = Settled<T>;

    fn into_future(self) -> Self::IntoFuture {
        Settled::new(self.shared)
    }
}

impl<T: Payload + fmt::Debug> fmt::Display for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = self.outcome();
        let value = outcome
            .value
            .map(|v| format!("{:?}", v))
            .unwrap_or_else(|| "nil".to_string());
        let reason = outcome
            .reason
            .map(|r| r.to_string())
            .unwrap_or_else(|| "nil".to_string());
        write!(f, "<Promise: {}> ({}, {})", outcome.status, value, reason)
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.id())
            .field("status", &self.status())
            .finish()
    }
}

/// Handle that resolves a promise. Clones settle the same promise, and only
/// the first settling call across all handles has any effect.
pub struct Resolver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Payload> Resolver<T> {
    /// Resolve with `value`. Returns whether this call settled the promise.
    ///
    /// `value` is stored as it is, even when `T` is itself a `Promise`; use
    /// [`adopt`](Self::adopt) or [`settle`](Self::settle) to take on another
    /// promise's outcome instead.
    pub fn resolve(&self, value: T) -> bool {
        self.shared.settle(Ok(value), Source::Handle)
    }

    /// Lock the promise in to the eventual outcome of `promise`.
    ///
    /// Adoption goes as deep as the chain of adopted promises does. From this
    /// point on, other resolve and reject calls are ignored.
    pub fn adopt(&self, promise: &Promise<T>) -> bool {
        self.shared.adopt(promise)
    }

    /// Resolve, adopt or reject depending on what `resolution` is.
    pub fn settle<R>(&self, resolution: R) -> bool
    where
        R: IntoResolution<Value = T>,
    {
        match resolution.into_resolution() {
            Resolution::Value(value) => self.resolve(value),
            Resolution::Adopt(promise) => self.adopt(&promise),
            Resolution::Reject(reason) => self.shared.settle(Err(reason), Source::Handle),
        }
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").field("promise", &self.shared.id).finish()
    }
}

/// Handle that rejects a promise.
pub struct Rejector<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Rejector<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Payload> Rejector<T> {
    /// Reject with `reason`. Returns whether this call settled the promise.
    pub fn reject<E: Into<Error>>(&self, reason: E) -> bool {
        self.shared.settle(Err(reason.into()), Source::Handle)
    }
}

impl<T> fmt::Debug for Rejector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejector").field("promise", &self.shared.id).finish()
    }
}

/// Future returned by [`Promise::settled`]; yields the terminal result.
///
/// Dropping it before the promise settles takes its parked waker back out of
/// the promise.
pub struct Settled<T> {
    shared: Arc<Shared<T>>,
    waiter: u64,
}

impl<T> Settled<T> {
    fn new(shared: Arc<Shared<T>>) -> Self {
        Self {
            shared,
            waiter: NEXT_WAITER.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl<T: Payload> Future for Settled<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.shared.poll_settled(self.waiter, cx)
    }
}

impl<T> Drop for Settled<T> {
    fn drop(&mut self) {
        self.shared.forget_waker(self.waiter);
    }
}
