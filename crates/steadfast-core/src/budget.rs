//! Attempt and duration budget.

use std::time::{Duration, Instant};

/// Decides whether another attempt is permitted after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    max_attempts: u32,
    max_duration: Option<Duration>,
}

impl RetryBudget {
    /// Create a budget of `max_attempts` total attempts and an optional
    /// wall-clock window.
    pub fn new(max_attempts: u32, max_duration: Option<Duration>) -> Self {
        Self {
            max_attempts,
            max_duration,
        }
    }

    /// The instant after which no attempt may start, if a window is set.
    pub fn deadline(&self, started_at: Instant) -> Option<Instant> {
        self.max_duration
            .and_then(|window| started_at.checked_add(window))
    }

    /// Whether another attempt may follow, given that the caller is about to
    /// wait `candidate_delay` before it.
    ///
    /// The window check uses the delay that will actually be waited: the
    /// attempt is refused when `now + candidate_delay` falls past the
    /// deadline, even if the deadline itself has not passed yet.
    pub fn should_retry(
        &self,
        attempts_made: u32,
        candidate_delay: Duration,
        started_at: Instant,
        now: Instant,
    ) -> bool {
        if attempts_made >= self.max_attempts {
            return false;
        }

        if self.max_duration.is_some() {
            let Some(deadline) = self.deadline(started_at) else {
                // Window too large to represent; it cannot be exceeded.
                return true;
            };
            match now.checked_add(candidate_delay) {
                Some(next_attempt) if next_attempt <= deadline => {}
                _ => return false,
            }
        }

        true
    }
}
