//! Timer capability used between attempts.
//!
//! The driver never touches a platform clock directly. It asks a [`Timer`]
//! for the current instant and to wait out a delay, so sessions can run
//! against tokio's clock in production and a virtual clock in tests.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Clock and sleep provider.
#[async_trait]
pub trait Timer: Send + Sync {
    /// The current instant.
    fn now(&self) -> Instant;

    /// Wait for `delay`.
    async fn sleep(&self, delay: Duration);
}

/// Timer backed by `tokio::time`.
///
/// Follows tokio's paused clock when the runtime was started with
/// `start_paused = true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

#[async_trait]
impl Timer for TokioTimer {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Virtual clock that never blocks.
///
/// `sleep` moves the clock forward by the requested delay and records it.
///
/// # Examples
///
/// ```rust
/// use steadfast_core::timer::{ManualTimer, Timer};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let timer = ManualTimer::new();
/// let start = timer.now();
/// timer.sleep(Duration::from_millis(250)).await;
///
/// assert_eq!(timer.now() - start, Duration::from_millis(250));
/// assert_eq!(timer.sleeps(), vec![Duration::from_millis(250)]);
/// # });
/// ```
#[derive(Debug)]
pub struct ManualTimer {
    origin: Instant,
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl ManualTimer {
    /// Create a virtual clock starting at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Move the clock forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        state.elapsed = state.elapsed.saturating_add(by);
    }

    /// Every delay passed to `sleep`, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    /// Virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ManualTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Timer for ManualTimer {
    fn now(&self) -> Instant {
        self.origin + self.lock().elapsed
    }

    async fn sleep(&self, delay: Duration) {
        let mut state = self.lock();
        state.elapsed = state.elapsed.saturating_add(delay);
        state.sleeps.push(delay);
    }
}
