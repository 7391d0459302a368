//! Rejection reasons and configuration errors.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::outcome::{AnyValue, Outcome};

/// The reason a promise was rejected.
///
/// Reasons are handed to every continuation of a promise, so they are cheap
/// to clone.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A plain description.
    #[error("{0}")]
    Message(String),

    /// Any other error value.
    #[error("{0}")]
    Custom(Arc<dyn std::error::Error + Send + Sync>),

    /// An executor or handler panicked.
    #[error("handler panicked: {message}")]
    Panicked { message: String },

    /// Every input of [`any`](crate::any) was rejected.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// Misuse of a promise, e.g. a promise adopting itself.
    #[error("Promise error: {0}")]
    Promise(String),
}

impl Error {
    /// A reason carrying only a description.
    pub fn msg<S: Into<String>>(message: S) -> Self {
        Error::Message(message.into())
    }

    /// Wrap an arbitrary error value.
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Custom(Arc::new(error))
    }

    pub(crate) fn construction<S: Into<String>>(message: S) -> Self {
        Error::Promise(message.into())
    }

    /// Turn a `catch_unwind` payload into a reason.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Error::Panicked { message }
    }

    /// Check if this reason came from a captured panic
    pub fn is_panic(&self) -> bool {
        matches!(self, Error::Panicked { .. })
    }

    pub fn as_aggregate(&self) -> Option<&AggregateError> {
        match self {
            Error::Aggregate(aggregate) => Some(aggregate),
            _ => None,
        }
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::msg(message)
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::Message(message)
    }
}

/// Rejection reason bundling the outcomes of several promises.
///
/// The member outcomes are recorded as each input settles, in input order.
/// The aggregate never refers back to the input promises themselves, and
/// clones share one copy of the outcomes.
#[derive(Clone)]
pub struct AggregateError {
    description: String,
    members: Arc<[Outcome<AnyValue>]>,
}

impl AggregateError {
    pub(crate) fn new<S: Into<String>>(description: S, members: Vec<Outcome<AnyValue>>) -> Self {
        Self {
            description: description.into(),
            members: members.into(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Number of member promises.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Outcome of every member promise, in input order.
    pub fn outcomes(&self) -> Vec<Outcome<AnyValue>> {
        self.members.to_vec()
    }

    /// Rejection reasons of the member promises, in input order.
    pub fn reasons(&self) -> Vec<Error> {
        self.members
            .iter()
            .filter_map(|outcome| outcome.reason.clone())
            .collect()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reasons: Vec<String> = self.reasons().iter().map(ToString::to_string).collect();
        write!(f, "{}: {}", self.description, reasons.join("; "))
    }
}

impl fmt::Debug for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateError")
            .field("description", &self.description)
            .field("members", &self.members.len())
            .finish()
    }
}

impl std::error::Error for AggregateError {}

/// Errors raised while configuring a [`Scheduler`](crate::Scheduler).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid pool size: {size} (must be > 0)")]
    InvalidPoolSize { size: usize },

    #[error("Invalid stack size: {size} (must be > 0)")]
    InvalidStackSize { size: usize },

    #[error("Thread name must not be empty")]
    EmptyThreadName,

    #[error("Failed to create thread pool: {0}")]
    PoolCreation(#[from] std::io::Error),

    #[error("Global scheduler is already installed")]
    GlobalAlreadySet,
}

/// Result type alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_display_is_bare() {
        assert_eq!(Error::msg("FAIL").to_string(), "FAIL");
        assert_eq!(Error::from("FAIL").to_string(), "FAIL");
        assert_eq!(
            Error::construction("bad state").to_string(),
            "Promise error: bad state"
        );
    }

    #[test]
    fn test_custom_error_keeps_display() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = Error::new(io);
        assert!(matches!(err, Error::Custom(_)));
        assert_eq!(err.to_string(), "disk on fire");
    }

    #[test]
    fn test_panic_payloads() {
        let err = Error::from_panic(Box::new("static str"));
        assert!(err.is_panic());
        assert_eq!(err.to_string(), "handler panicked: static str");

        let err = Error::from_panic(Box::new(String::from("owned")));
        assert_eq!(err.to_string(), "handler panicked: owned");

        let err = Error::from_panic(Box::new(17u8));
        assert_eq!(err.to_string(), "handler panicked: non-string panic payload");
    }

    #[test]
    fn test_empty_aggregate() {
        let aggregate = AggregateError::new("all promises were rejected", Vec::new());
        assert!(aggregate.is_empty());
        assert_eq!(aggregate.to_string(), "all promises were rejected: ");
        let err = Error::from(aggregate);
        assert!(err.as_aggregate().is_some());
        assert!(!err.is_panic());
    }

    #[test]
    fn test_config_error_messages() {
        assert_eq!(
            ConfigError::InvalidPoolSize { size: 0 }.to_string(),
            "Invalid pool size: 0 (must be > 0)"
        );
        assert_eq!(
            ConfigError::GlobalAlreadySet.to_string(),
            "Global scheduler is already installed"
        );
    }
}
