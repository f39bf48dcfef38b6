//! Attempt driver: runs a unit of work until it succeeds, fails with a
//! non-retryable error, or exhausts its budget.
//!
//! One engine backs two calling conventions:
//!
//! - [`BackoffRunner::run`] takes a closure returning a future and resolves to
//!   the terminal outcome.
//! - [`BackoffRunner::attempt`] hands the unit of work a one-shot
//!   [`Completion`] and reports the terminal outcome through a `done`
//!   callback.
//!
//! # Session lifecycle
//!
//! ```text
//! Idle -> Running -> Succeeded
//!                 -> Failed
//!                 -> RetryScheduled -> Running -> ...
//! ```
//!
//! A failure whose kind is configured as non-retryable goes straight to
//! `Failed` without computing a delay. Any other failure computes the next
//! delay and asks the budget whether an attempt after that delay is allowed.

use crate::budget::RetryBudget;
use crate::config::BackoffConfig;
use crate::delay::{JitterSource, ThreadRngJitter, compute_delay};
use crate::error::{Classify, CompletionDropped};
use crate::timer::{Timer, TokioTimer};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// State of a retry session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no attempt made yet.
    Idle,
    /// The unit of work is executing.
    Running,
    /// Waiting out the delay before the next attempt.
    RetryScheduled,
    /// The unit of work succeeded. Terminal.
    Succeeded,
    /// Retrying stopped with an error. Terminal.
    Failed,
}

impl SessionState {
    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, RetryScheduled)
                | (RetryScheduled, Running)
        )
    }
}

/// Per-call counters. Created when a session starts and dropped when it
/// settles.
#[derive(Debug)]
pub(crate) struct RetrySession {
    attempts_made: u32,
    started_at: Instant,
    state: SessionState,
    delays: Vec<Duration>,
}

impl RetrySession {
    pub(crate) fn new(started_at: Instant) -> Self {
        Self {
            attempts_made: 0,
            started_at,
            state: SessionState::Idle,
            delays: Vec::new(),
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal session transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    /// Enter `Running` and count the attempt about to be made.
    fn begin_attempt(&mut self) -> u32 {
        self.transition(SessionState::Running);
        self.attempts_made += 1;
        self.attempts_made
    }

    fn schedule_retry(&mut self, delay: Duration) {
        self.transition(SessionState::RetryScheduled);
        self.delays.push(delay);
    }

    fn settle<T, E>(mut self, outcome: Result<T, E>, now: Instant) -> SessionReport<T, E> {
        self.transition(if outcome.is_ok() {
            SessionState::Succeeded
        } else {
            SessionState::Failed
        });
        SessionReport {
            outcome,
            attempts: self.attempts_made,
            delays: self.delays,
            elapsed: now.saturating_duration_since(self.started_at),
        }
    }
}

/// Terminal outcome of a session plus what it took to get there.
#[derive(Debug)]
pub struct SessionReport<T, E> {
    /// The success payload, or the error from the last attempt.
    pub outcome: Result<T, E>,
    /// Number of times the unit of work was invoked.
    pub attempts: u32,
    /// Delays waited between attempts, in order.
    pub delays: Vec<Duration>,
    /// Time from session start to settlement, measured by the runner's timer.
    pub elapsed: Duration,
}

impl<T, E> SessionReport<T, E> {
    /// Discard the statistics and keep the outcome.
    pub fn into_result(self) -> Result<T, E> {
        self.outcome
    }
}

/// One-shot completion signal handed to a callback-style unit of work.
///
/// Consuming `self` guarantees at most one report per attempt. Dropping it
/// without reporting counts as a retryable failure ([`CompletionDropped`]).
pub struct Completion<T, E> {
    tx: oneshot::Sender<Result<T, E>>,
}

impl<T, E> Completion<T, E> {
    /// Report the outcome of this attempt.
    pub fn complete(self, outcome: Result<T, E>) {
        // The receiver is gone only if the session was aborted.
        let _ = self.tx.send(outcome);
    }

    /// Report success with `value`.
    pub fn succeed(self, value: T) {
        self.complete(Ok(value));
    }

    /// Report failure with `error`.
    pub fn fail(self, error: E) {
        self.complete(Err(error));
    }
}

impl<T, E> fmt::Debug for Completion<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Retry engine bound to one configuration, timer and jitter source.
///
/// Cloning is cheap; each call to [`run`](Self::run) or
/// [`attempt`](Self::attempt) starts an independent session.
///
/// # Examples
///
/// ```rust
/// use steadfast_core::prelude::*;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = BackoffConfig::builder()
///     .min_delay(Duration::from_millis(100))
///     .max_delay(Duration::from_secs(5))
///     .max_attempts(4)
///     .build()?;
///
/// let runner = BackoffRunner::new(config);
/// let value = runner
///     .run(|| async { Ok::<_, std::io::Error>(42) })
///     .await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BackoffRunner {
    config: Arc<BackoffConfig>,
    timer: Arc<dyn Timer>,
    jitter: Arc<dyn JitterSource>,
}

impl BackoffRunner {
    /// Create a runner on tokio's clock with thread-local jitter.
    pub fn new(config: BackoffConfig) -> Self {
        Self::builder(config).build()
    }

    /// Create a builder to inject a timer or jitter source.
    pub fn builder(config: BackoffConfig) -> BackoffRunnerBuilder {
        BackoffRunnerBuilder {
            config,
            timer: None,
            jitter: None,
        }
    }

    /// The configuration sessions run with.
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Delay to wait after `attempts_made` attempts.
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        let factor = if self.config.use_jitter() {
            self.jitter.factor()
        } else {
            1.0
        };
        compute_delay(
            attempts_made,
            self.config.min_delay(),
            self.config.max_delay(),
            factor,
        )
    }

    /// Run `operation` until it succeeds or retrying stops, returning the
    /// success value or the last error.
    pub async fn run<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        self.run_with_report(operation).await.into_result()
    }

    /// Like [`run`](Self::run), also reporting attempts, delays and elapsed
    /// time.
    pub async fn run_with_report<F, Fut, T, E>(&self, mut operation: F) -> SessionReport<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        let budget = RetryBudget::new(self.config.max_attempts(), self.config.max_duration());
        let mut session = RetrySession::new(self.timer.now());

        loop {
            let attempt = session.begin_attempt();

            let err = match operation().await {
                Ok(value) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(attempt, "attempt succeeded");
                    return session.settle(Ok(value), self.timer.now());
                }
                Err(err) => err,
            };

            if err.matches_any(self.config.non_retryable()) {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    attempt,
                    kind = ?err.error_kind(),
                    "non-retryable failure, giving up"
                );
                return session.settle(Err(err), self.timer.now());
            }

            let delay = self.delay_for(attempt);
            if !budget.should_retry(attempt, delay, session.started_at, self.timer.now()) {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    attempt,
                    max_attempts = self.config.max_attempts(),
                    ?delay,
                    "retry budget exhausted, giving up"
                );
                return session.settle(Err(err), self.timer.now());
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(
                attempt,
                max_attempts = self.config.max_attempts(),
                ?delay,
                "attempt failed, retry scheduled"
            );

            // Only the most recent error is ever reported.
            drop(err);
            session.schedule_retry(delay);
            self.timer.sleep(delay).await;
        }
    }

    /// Callback-style entry point.
    ///
    /// `work` is invoked once per attempt with a [`Completion`] it must
    /// signal, possibly from another task. `done` is called exactly once with
    /// the terminal outcome. The session runs as a spawned tokio task; abort
    /// the returned handle to cancel it, in which case `done` is never called.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use steadfast_core::prelude::*;
    /// use std::time::Duration;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let config = BackoffConfig::builder()
    ///     .min_delay(Duration::from_millis(1))
    ///     .max_delay(Duration::from_millis(10))
    ///     .max_attempts(3)
    ///     .build()
    ///     .unwrap();
    ///
    /// let (tx, rx) = tokio::sync::oneshot::channel();
    /// BackoffRunner::new(config).attempt(
    ///     |completion: Completion<&'static str, BoxError>| completion.succeed("done"),
    ///     move |outcome| {
    ///         let _ = tx.send(outcome);
    ///     },
    /// );
    ///
    /// assert_eq!(rx.await.unwrap().unwrap(), "done");
    /// # }
    /// ```
    pub fn attempt<W, D, T, E>(&self, mut work: W, done: D) -> JoinHandle<()>
    where
        W: FnMut(Completion<T, E>) + Send + 'static,
        D: FnOnce(Result<T, E>) + Send + 'static,
        T: Send + 'static,
        E: Classify + From<CompletionDropped> + Send + 'static,
    {
        let runner = self.clone();
        tokio::spawn(async move {
            let outcome = runner
                .run(move || {
                    let (tx, rx) = oneshot::channel();
                    work(Completion { tx });
                    async move {
                        rx.await
                            .unwrap_or_else(|_| Err(E::from(CompletionDropped)))
                    }
                })
                .await;
            done(outcome);
        })
    }
}

impl fmt::Debug for BackoffRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackoffRunner")
            .field("config", &self.config)
            .field("timer", &"<timer>")
            .field("jitter", &"<jitter>")
            .finish()
    }
}

/// Builder for [`BackoffRunner`].
pub struct BackoffRunnerBuilder {
    config: BackoffConfig,
    timer: Option<Arc<dyn Timer>>,
    jitter: Option<Arc<dyn JitterSource>>,
}

impl BackoffRunnerBuilder {
    /// Use `timer` for the clock and for waiting between attempts.
    ///
    /// Default: [`TokioTimer`]
    pub fn timer<T: Timer + 'static>(mut self, timer: Arc<T>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Use `jitter` for the random delay factor.
    ///
    /// Default: [`ThreadRngJitter`]
    pub fn jitter<J: JitterSource + 'static>(mut self, jitter: Arc<J>) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Build the runner.
    pub fn build(self) -> BackoffRunner {
        BackoffRunner {
            config: Arc::new(self.config),
            timer: self.timer.unwrap_or_else(|| Arc::new(TokioTimer) as Arc<dyn Timer>),
            jitter: self
                .jitter
                .unwrap_or_else(|| Arc::new(ThreadRngJitter) as Arc<dyn JitterSource>),
        }
    }
}

impl fmt::Debug for BackoffRunnerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackoffRunnerBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
