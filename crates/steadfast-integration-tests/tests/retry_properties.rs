//! End-to-end retry behaviour on tokio's paused clock
//!
//! These tests use the default `TokioTimer`, so every delay is a real
//! `tokio::time::sleep` that the paused runtime skips through.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use steadfast_core::prelude::*;
use tokio::time::Instant;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[tokio::test(start_paused = true)]
async fn test_first_try_success_incurs_no_delay() {
    let config = BackoffConfig::builder()
        .min_delay(ms(1000))
        .max_delay(ms(10_000))
        .max_attempts(5)
        .build()
        .unwrap();
    let runner = BackoffRunner::new(config);
    let start = Instant::now();

    let report = runner
        .run_with_report(|| async { Ok::<_, anyhow::Error>(("a", 1, true)) })
        .await;

    assert_eq!(report.outcome.unwrap(), ("a", 1, true));
    assert_eq!(report.attempts, 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_waits_for_both_delays() {
    let config = BackoffConfig::builder()
        .min_delay(ms(1000))
        .max_delay(ms(10_000))
        .max_attempts(3)
        .build()
        .unwrap();
    let runner = BackoffRunner::new(config);
    let calls = AtomicU32::new(0);
    let start = Instant::now();

    let result = runner
        .run(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err::<(), _>(anyhow::anyhow!("failure {n}")) }
        })
        .await;

    assert_eq!(result.unwrap_err().to_string(), "failure 3");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(start.elapsed() >= ms(3000));
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_anyhow_error_stops_immediately() {
    let config = BackoffConfig::builder()
        .min_delay(ms(1000))
        .max_delay(ms(10_000))
        .max_attempts(5)
        .build()
        .unwrap();
    let runner = BackoffRunner::new(config);
    let calls = AtomicU32::new(0);
    let start = Instant::now();

    let result = runner
        .run(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<(), _>(anyhow::Error::new(NonRetryableError::new("unauthorized")))
            }
        })
        .await;

    let err = result.unwrap_err();
    assert!(err.downcast_ref::<NonRetryableError>().is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_duration_budget_cuts_retries_short() {
    let config = BackoffConfig::builder()
        .min_delay(ms(10))
        .max_delay(ms(20))
        .max_attempts(5)
        .max_duration(ms(40))
        .build()
        .unwrap();
    let runner = BackoffRunner::new(config);
    let start = Instant::now();

    let report = runner
        .run_with_report(|| async { Err::<(), _>(std::io::Error::other("down")) })
        .await;

    assert!(report.attempts < 5);
    assert_eq!(report.attempts, 3);
    assert_eq!(report.delays, vec![ms(10), ms(20)]);
    assert!(start.elapsed() >= ms(30));
    assert!(start.elapsed() <= ms(40));
}

#[tokio::test(start_paused = true)]
async fn test_attempts_never_overlap() {
    let config = BackoffConfig::builder()
        .min_delay(ms(5))
        .max_delay(ms(50))
        .max_attempts(4)
        .build()
        .unwrap();
    let runner = BackoffRunner::new(config);
    let in_flight = Arc::new(AtomicU32::new(0));
    let max_seen = Arc::new(AtomicU32::new(0));

    let _ = runner
        .run(|| {
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(ms(100)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Err::<(), _>(std::io::Error::other("slow failure"))
            }
        })
        .await;

    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_independent_sessions_interleave() {
    let config = BackoffConfig::builder()
        .min_delay(ms(100))
        .max_delay(ms(100))
        .max_attempts(3)
        .build()
        .unwrap();
    let runner = BackoffRunner::new(config);

    let a_calls = AtomicU32::new(0);
    let b_calls = AtomicU32::new(0);

    let (a, b) = tokio::join!(
        runner.run(|| {
            a_calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(std::io::Error::other("a")) }
        }),
        runner.run(|| {
            let n = b_calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(std::io::Error::other("b"))
                } else {
                    Ok("b done")
                }
            }
        }),
    );

    assert!(a.is_err());
    assert_eq!(b.unwrap(), "b done");
    assert_eq!(a_calls.load(Ordering::SeqCst), 3);
    assert_eq!(b_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_settings_drive_a_session() {
    let settings: BackoffSettings = serde_json::from_value(serde_json::json!({
        "min_delay_ms": 50,
        "max_delay_ms": 500,
        "max_attempts": 2,
        "non_retryable": ["auth"],
    }))
    .unwrap();
    let runner = BackoffRunner::new(BackoffConfig::try_from(settings).unwrap());
    let calls = AtomicU32::new(0);

    // The marker kind was replaced by "auth", so the marker is retried.
    let result = runner
        .run(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(NonRetryableError::new("retried anyway")) }
        })
        .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
