//! Promise status and point-in-time outcome snapshots.
//!
//! [`Outcome`] is what [`Promise::outcome`](crate::Promise::outcome) returns,
//! what [`all_settled`](crate::all_settled) reports per input, and what an
//! [`AggregateError`](crate::AggregateError) records for each member. Values
//! of different types are reported together as [`AnyValue`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::Error;

/// A type-erased promise value, used where promises of different value
/// types have to be reported together.
pub type AnyValue = Arc<dyn Any + Send + Sync>;

/// Where a promise is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Pending,
    Resolved,
    Rejected,
}

impl Status {
    pub fn is_settled(self) -> bool {
        !matches!(self, Status::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "Pending",
            Status::Resolved => "Resolved",
            Status::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a promise taken at query time.
///
/// At most one of `value` and `reason` is set, matching `status`. A snapshot
/// of a pending promise has neither.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub status: Status,
    pub value: Option<T>,
    pub reason: Option<Error>,
}

impl<T> Outcome<T> {
    pub fn pending() -> Self {
        Self {
            status: Status::Pending,
            value: None,
            reason: None,
        }
    }

    pub fn resolved(value: T) -> Self {
        Self {
            status: Status::Resolved,
            value: Some(value),
            reason: None,
        }
    }

    pub fn rejected(reason: Error) -> Self {
        Self {
            status: Status::Rejected,
            value: None,
            reason: Some(reason),
        }
    }

    pub(crate) fn from_result(result: &Result<T, Error>) -> Self
    where
        T: Clone,
    {
        match result {
            Ok(value) => Outcome::resolved(value.clone()),
            Err(reason) => Outcome::rejected(reason.clone()),
        }
    }

    /// The terminal result, or `None` while pending.
    pub fn into_result(self) -> Option<Result<T, Error>> {
        match (self.value, self.reason) {
            (Some(value), _) => Some(Ok(value)),
            (None, Some(reason)) => Some(Err(reason)),
            (None, None) => None,
        }
    }

    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        Outcome {
            status: self.status,
            value: self.value.map(f),
            reason: self.reason,
        }
    }
}
