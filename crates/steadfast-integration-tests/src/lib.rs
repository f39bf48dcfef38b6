//! Integration tests and shared fixtures for the steadfast workspace
//!
//! The tests in `tests/` drive both calling conventions of
//! `steadfast_core::driver::BackoffRunner` against the same scripted units of
//! work and compare their outcomes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use steadfast_core::error::{BoxError, NonRetryableError};

/// How a scripted unit of work behaves on a given attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Fail with an ordinary, retryable error.
    Fail,
    /// Fail with the non-retryable marker.
    Stop,
    /// Succeed.
    Succeed,
}

/// A unit of work that follows a fixed script, repeating the last step once
/// the script runs out.
#[derive(Debug, Clone)]
pub struct Script {
    steps: Arc<Vec<Step>>,
    calls: Arc<AtomicU32>,
}

impl Script {
    /// Create a script. An empty script always succeeds.
    pub fn new(steps: impl Into<Vec<Step>>) -> Self {
        Self {
            steps: Arc::new(steps.into()),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Run the next step, returning the attempt number on success.
    pub fn next(&self) -> Result<u32, BoxError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let step = self
            .steps
            .get(call as usize - 1)
            .or(self.steps.last())
            .copied()
            .unwrap_or(Step::Succeed);

        match step {
            Step::Fail => Err(format!("attempt {call} failed").into()),
            Step::Stop => Err(Box::new(NonRetryableError::new(format!(
                "attempt {call} is not retryable"
            )))),
            Step::Succeed => Ok(call),
        }
    }

    /// Number of steps taken so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}
