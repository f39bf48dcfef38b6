#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Retry with exponential backoff.
//!
//! This crate runs a caller-supplied unit of work until it succeeds, fails
//! with an error marked as non-retryable, or runs out of its attempt or
//! wall-clock budget:
//!
//! - **Delay model** via [`delay::compute_delay`]
//!   - Doubling delays from `min_delay`, capped at `max_delay`
//!   - Optional jitter scaling each delay by a factor in `[1, 2)`
//! - **Budgets** via [`budget::RetryBudget`]
//!   - Total attempt count
//!   - Optional window, checked against the start of the *next* attempt
//! - **Error classification** via [`error::Classify`] and [`error::ErrorKind`] tags
//! - **Two calling conventions** on one engine, [`driver::BackoffRunner`]
//!   - Future style: `run(|| async { ... })`
//!   - Callback style: `attempt(|completion| ..., |outcome| ...)`
//!
//! Time and randomness are injected ([`timer::Timer`],
//! [`delay::JitterSource`]), so sessions can be tested on a virtual clock.
//!
//! # Examples
//!
//! ```rust
//! use steadfast_core::prelude::*;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BackoffConfig::builder()
//!     .min_delay(Duration::from_millis(100))
//!     .max_delay(Duration::from_secs(10))
//!     .max_attempts(5)
//!     .use_jitter(true)
//!     .build()?;
//!
//! let runner = BackoffRunner::new(config);
//! let body = runner
//!     .run(|| async {
//!         // A failure tagged non-retryable stops immediately.
//!         Ok::<_, NonRetryableError>("response")
//!     })
//!     .await?;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! With the `tracing` feature enabled, the driver emits `debug` events for
//! failed attempts, scheduled retries and terminal decisions.

pub mod budget;
pub mod config;
pub mod delay;
pub mod driver;
pub mod error;
pub mod timer;

/// Convenient re-exports of commonly used items.
///
/// ```rust
/// use steadfast_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::budget::RetryBudget;
    pub use crate::config::{BackoffConfig, BackoffConfigBuilder, BackoffSettings};
    pub use crate::delay::{Backoff, JitterSource, compute_delay};
    pub use crate::driver::{BackoffRunner, Completion, SessionReport, SessionState};
    pub use crate::error::{
        BoxError, Classify, CompletionDropped, ConfigError, ErrorKind, NonRetryableError,
        TaggedError,
    };
    pub use crate::timer::{ManualTimer, Timer, TokioTimer};
}
