//! Delay model: exponential backoff with optional jitter.
//!
//! For the `n`th delay (the number of attempts already made):
//!
//! ```text
//! base   = min_delay * 2^(n - 1)
//! factor = 1                      (jitter off)
//!        = uniform in [1, 2)      (jitter on)
//! delay  = min(round(base * factor), max_delay)
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

/// Compute the delay to wait after `n` attempts.
///
/// `factor` is the random multiplier, normally in `[1, 2)`; pass `1.0` for
/// the deterministic sequence. An `n` of 0 is treated as 1. The result is
/// always within `[min_delay, max_delay]`.
///
/// # Examples
///
/// ```rust
/// use steadfast_core::delay::compute_delay;
/// use std::time::Duration;
///
/// let min = Duration::from_millis(1000);
/// let max = Duration::from_millis(10_000);
///
/// assert_eq!(compute_delay(1, min, max, 1.0), Duration::from_millis(1000));
/// assert_eq!(compute_delay(4, min, max, 1.0), Duration::from_millis(8000));
/// assert_eq!(compute_delay(5, min, max, 1.0), Duration::from_millis(10_000));
/// ```
pub fn compute_delay(n: u32, min_delay: Duration, max_delay: Duration, factor: f64) -> Duration {
    let exponent = n.max(1) - 1;
    let base = min_delay.as_nanos() as f64 * 2f64.powi(exponent.min(i32::MAX as u32) as i32);
    let scaled = (base * factor.max(0.0)).round();
    let cap = max_delay.as_nanos() as f64;

    // Non-finite or over-cap values saturate to max_delay.
    if !scaled.is_finite() || scaled >= cap {
        return max_delay;
    }

    let delay = if scaled < u64::MAX as f64 {
        Duration::from_nanos(scaled as u64)
    } else {
        // Past u64 nanoseconds; whole seconds are as precise as f64 gets here.
        let secs = (scaled / 1e9).floor();
        if secs >= u64::MAX as f64 {
            return max_delay;
        }
        Duration::from_secs(secs as u64)
    };
    delay.max(min_delay).min(max_delay)
}

/// Source of the random jitter factor.
///
/// Injected into the runner so tests can pin the factor.
pub trait JitterSource: Send + Sync {
    /// A factor in `[1, 2)`.
    fn factor(&self) -> f64;
}

/// Jitter drawn from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn factor(&self) -> f64 {
        rand::thread_rng().gen_range(1.0..2.0)
    }
}

/// Reproducible jitter from a seeded RNG.
pub struct SeededJitter {
    rng: Mutex<StdRng>,
}

impl SeededJitter {
    /// Create a source seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl fmt::Debug for SeededJitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeededJitter").finish_non_exhaustive()
    }
}

impl JitterSource for SeededJitter {
    fn factor(&self) -> f64 {
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(1.0..2.0),
            Err(poisoned) => poisoned.into_inner().gen_range(1.0..2.0),
        }
    }
}

/// A constant factor, clamped into `[1, 2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedJitter(f64);

impl FixedJitter {
    /// Create a source that always returns `factor`.
    pub fn new(factor: f64) -> Self {
        let upper = 2.0 - f64::EPSILON;
        let factor = if factor.is_nan() { 1.0 } else { factor.clamp(1.0, upper) };
        Self(factor)
    }
}

impl JitterSource for FixedJitter {
    fn factor(&self) -> f64 {
        self.0
    }
}

/// A stateful cursor over the delay sequence.
///
/// Each call to [`next_delay`](Backoff::next_delay) counts one more retry and
/// returns the delay for it.
///
/// # Examples
///
/// ```rust
/// use steadfast_core::delay::Backoff;
/// use std::time::Duration;
///
/// let mut backoff = Backoff::new(Duration::from_millis(1000), Duration::from_millis(10_000));
/// let delays: Vec<_> = (0..6).map(|_| backoff.next_delay().as_millis()).collect();
/// assert_eq!(delays, [1000, 2000, 4000, 8000, 10_000, 10_000]);
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    min_delay: Duration,
    max_delay: Duration,
    use_jitter: bool,
    retries: u32,
}

impl Backoff {
    /// Create a cursor without jitter.
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
            use_jitter: false,
            retries: 0,
        }
    }

    /// Create a cursor with jitter enabled.
    pub fn with_jitter(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            use_jitter: true,
            ..Self::new(min_delay, max_delay)
        }
    }

    /// Count one more retry and return its delay, drawing jitter from the
    /// thread-local RNG.
    pub fn next_delay(&mut self) -> Duration {
        self.next_delay_with(&ThreadRngJitter)
    }

    /// Like [`next_delay`](Self::next_delay) with an explicit jitter source.
    pub fn next_delay_with(&mut self, jitter: &dyn JitterSource) -> Duration {
        self.retries = self.retries.saturating_add(1);
        let factor = if self.use_jitter { jitter.factor() } else { 1.0 };
        compute_delay(self.retries, self.min_delay, self.max_delay, factor)
    }

    /// Number of delays handed out so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Start the sequence over.
    pub fn reset(&mut self) {
        self.retries = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MIN: Duration = Duration::from_millis(1000);
    const MAX: Duration = Duration::from_millis(10_000);

    #[test]
    fn test_exponential_sequence_capped_at_max() {
        let delays: Vec<u128> = (1..=6)
            .map(|n| compute_delay(n, MIN, MAX, 1.0).as_millis())
            .collect();
        assert_eq!(delays, [1000, 2000, 4000, 8000, 10_000, 10_000]);
    }

    #[test]
    fn test_first_delay_is_min_delay() {
        assert_eq!(compute_delay(1, MIN, MAX, 1.0), MIN);
        assert_eq!(compute_delay(0, MIN, MAX, 1.0), MIN);
    }

    #[test]
    fn test_zero_min_delay_stays_zero() {
        for n in 1..10 {
            assert_eq!(compute_delay(n, Duration::ZERO, MAX, 1.9), Duration::ZERO);
        }
    }

    #[test]
    fn test_factor_scales_and_rounds() {
        assert_eq!(compute_delay(1, MIN, MAX, 1.5), Duration::from_millis(1500));
        assert_eq!(
            compute_delay(2, Duration::from_nanos(3), MAX, 1.25),
            Duration::from_nanos(8)
        );
    }

    #[test]
    fn test_huge_attempt_count_saturates() {
        assert_eq!(compute_delay(u32::MAX, MIN, MAX, 1.0), MAX);
        assert_eq!(compute_delay(2000, MIN, MAX, 1.99), MAX);
    }

    #[test]
    fn test_delays_beyond_u64_nanos_stay_in_range() {
        let year = Duration::from_secs(365 * 24 * 60 * 60);
        let min = year * 600;

        for n in 1..4 {
            for factor in [1.0, 1.5, 1.999] {
                let delay = compute_delay(n, min, Duration::MAX, factor);
                assert!(delay >= min, "n={n} factor={factor}: {delay:?} < {min:?}");
                assert!(delay <= Duration::MAX);
            }
        }
        assert!(compute_delay(2, min, Duration::MAX, 1.0) >= min * 2 - Duration::from_secs(1));
        assert_eq!(compute_delay(u32::MAX, min, Duration::MAX, 1.0), Duration::MAX);
    }

    #[test]
    fn test_factor_below_one_is_floored_at_min() {
        assert_eq!(compute_delay(1, MIN, MAX, 0.5), MIN);
    }

    #[test]
    fn test_cursor_counts_and_resets() {
        let mut backoff = Backoff::new(MIN, MAX);
        assert_eq!(backoff.next_delay(), MIN);
        assert_eq!(backoff.next_delay(), Duration::from_millis(2000));
        assert_eq!(backoff.retries(), 2);

        backoff.reset();
        assert_eq!(backoff.retries(), 0);
        assert_eq!(backoff.next_delay(), MIN);
    }

    #[test]
    fn test_cursor_with_pinned_jitter() {
        let mut backoff = Backoff::with_jitter(MIN, MAX);
        let unit = FixedJitter::new(1.0);
        let delays: Vec<u128> = (0..6)
            .map(|_| backoff.next_delay_with(&unit).as_millis())
            .collect();
        assert_eq!(delays, [1000, 2000, 4000, 8000, 10_000, 10_000]);

        let mut backoff = Backoff::with_jitter(MIN, MAX);
        let near_double = FixedJitter::new(1.999);
        assert_eq!(backoff.next_delay_with(&near_double), Duration::from_millis(1999));
        assert_eq!(backoff.next_delay_with(&near_double), Duration::from_millis(3998));
        assert_eq!(backoff.next_delay_with(&near_double), Duration::from_millis(7996));
        assert_eq!(backoff.next_delay_with(&near_double), MAX);
    }

    #[test]
    fn test_cursor_without_jitter_ignores_source() {
        let mut backoff = Backoff::new(MIN, MAX);
        assert_eq!(backoff.next_delay_with(&FixedJitter::new(1.9)), MIN);
    }

    #[test]
    fn test_fixed_jitter_is_clamped() {
        assert_eq!(FixedJitter::new(0.5).factor(), 1.0);
        assert!(FixedJitter::new(3.0).factor() < 2.0);
        assert_eq!(FixedJitter::new(f64::NAN).factor(), 1.0);
    }

    #[test]
    fn test_seeded_jitter_is_reproducible() {
        let a = SeededJitter::new(42);
        let b = SeededJitter::new(42);
        for _ in 0..16 {
            assert_eq!(a.factor(), b.factor());
        }
    }

    #[test]
    fn test_thread_rng_jitter_varies_within_range() {
        let factors: Vec<f64> = (0..32).map(|_| ThreadRngJitter.factor()).collect();
        assert!(factors.iter().all(|f| (1.0..2.0).contains(f)));
        assert!(factors.windows(2).any(|w| w[0] != w[1]));
    }

    proptest! {
        #[test]
        fn prop_unjittered_delay_matches_formula(
            n in 1u32..64,
            min_ms in 0u64..5_000,
            extra_ms in 0u64..100_000,
        ) {
            let min = Duration::from_millis(min_ms);
            let max = Duration::from_millis(min_ms + extra_ms);
            let expected = (min_ms as u128)
                .checked_mul(1u128 << (n - 1))
                .map(|ms| ms.min(max.as_millis()))
                .unwrap_or(max.as_millis());
            prop_assert_eq!(compute_delay(n, min, max, 1.0).as_millis(), expected);
        }

        #[test]
        fn prop_jittered_delay_is_bounded(
            n in 1u32..32,
            min_ms in 0u64..5_000,
            extra_ms in 0u64..100_000,
            factor in 1.0f64..2.0,
        ) {
            let min = Duration::from_millis(min_ms);
            let max = Duration::from_millis(min_ms + extra_ms);
            let delay = compute_delay(n, min, max, factor);
            let unjittered = compute_delay(n, min, max, 1.0);
            prop_assert!(delay <= max);
            prop_assert!(delay >= unjittered);
            prop_assert!(delay >= min);
        }
    }
}
