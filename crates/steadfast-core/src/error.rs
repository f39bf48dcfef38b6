//! Error kinds, the non-retryable marker, and failure classification.
//!
//! The driver never inspects the concrete type of a failure. Instead every
//! failure can report an [`ErrorKind`] tag through [`Classify`], and the driver
//! checks that tag against the kinds configured as non-retryable.
//!
//! # Examples
//!
//! ```rust
//! use steadfast_core::error::{Classify, ErrorKind, NonRetryableError};
//!
//! let err = NonRetryableError::new("token revoked");
//! assert_eq!(err.error_kind(), Some(ErrorKind::NON_RETRYABLE));
//! ```

use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Boxed error type accepted by [`TaggedError`] and classified by downcasting.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// A tag naming an error shape.
///
/// Kinds compare by name, so a kind built at configuration time matches the
/// same kind attached to a failure later on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorKind(Cow<'static, str>);

impl ErrorKind {
    /// The built-in "do not retry" kind carried by [`NonRetryableError`].
    pub const NON_RETRYABLE: ErrorKind = ErrorKind(Cow::Borrowed("non_retryable"));

    /// Create a kind from a static name.
    pub const fn new(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Create a kind from a runtime string, e.g. one read from a settings file.
    pub fn from_name(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// The tag name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reports the [`ErrorKind`] of a failure, if it carries one.
///
/// Failures without a kind are always retryable.
pub trait Classify {
    /// The kind tag of this failure.
    fn error_kind(&self) -> Option<ErrorKind>;

    /// Whether this failure matches any of `kinds`.
    fn matches_any(&self, kinds: &[ErrorKind]) -> bool {
        match self.error_kind() {
            Some(kind) => kinds.contains(&kind),
            None => false,
        }
    }
}

/// Marker error a unit of work returns to stop retrying immediately.
///
/// Use it for failures that will not heal on their own, such as rejected
/// credentials or malformed input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct NonRetryableError {
    message: String,
}

impl NonRetryableError {
    /// Create a marker with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The message the marker was created with.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Classify for NonRetryableError {
    fn error_kind(&self) -> Option<ErrorKind> {
        Some(ErrorKind::NON_RETRYABLE)
    }
}

/// An error tagged with a caller-defined [`ErrorKind`].
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {source}")]
pub struct TaggedError {
    kind: ErrorKind,
    #[source]
    source: BoxError,
}

impl TaggedError {
    /// Tag `source` with `kind`.
    pub fn new(kind: ErrorKind, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    /// The tag.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Unwrap into the underlying error.
    pub fn into_inner(self) -> BoxError {
        self.source
    }
}

impl Classify for TaggedError {
    fn error_kind(&self) -> Option<ErrorKind> {
        Some(self.kind.clone())
    }
}

/// A callback-style unit of work dropped its completion signal without
/// reporting an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unit of work dropped its completion signal without reporting an outcome")]
pub struct CompletionDropped;

impl Classify for CompletionDropped {
    fn error_kind(&self) -> Option<ErrorKind> {
        None
    }
}

impl Classify for std::io::Error {
    fn error_kind(&self) -> Option<ErrorKind> {
        None
    }
}

fn kind_of_dyn(err: &(dyn Error + 'static)) -> Option<ErrorKind> {
    if let Some(marker) = err.downcast_ref::<NonRetryableError>() {
        return marker.error_kind();
    }
    if let Some(tagged) = err.downcast_ref::<TaggedError>() {
        return tagged.error_kind();
    }
    None
}

impl Classify for BoxError {
    fn error_kind(&self) -> Option<ErrorKind> {
        kind_of_dyn(&**self)
    }
}

impl Classify for anyhow::Error {
    fn error_kind(&self) -> Option<ErrorKind> {
        if let Some(marker) = self.downcast_ref::<NonRetryableError>() {
            return marker.error_kind();
        }
        if let Some(tagged) = self.downcast_ref::<TaggedError>() {
            return tagged.error_kind();
        }
        None
    }
}

/// Errors raised while building a [`BackoffConfig`](crate::config::BackoffConfig).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required option was never set.
    #[error("missing required option `{0}`")]
    Missing(&'static str),

    /// `max_attempts` must allow at least the first attempt.
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    /// `max_delay` is below `min_delay`.
    #[error("max_delay ({max:?}) is less than min_delay ({min:?})")]
    InvalidDelayRange {
        /// Configured minimum delay.
        min: Duration,
        /// Configured maximum delay.
        max: Duration,
    },
}
