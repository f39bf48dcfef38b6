//! Example: retrying an unreliable operation with `BackoffRunner`
//!
//! This example demonstrates:
//! 1. Future-style retry with exponential backoff
//! 2. Stopping early with `NonRetryableError` and custom kinds
//! 3. Callback-style retry with a completion signal
//! 4. A wall-clock budget cutting retries short
//!
//! Run with:
//! ```bash
//! cargo run -p steadfast-core --example retry_example
//! ```

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use steadfast_core::prelude::*;

/// A simulated service that fails the first few calls
struct FlakyService {
    calls: Arc<AtomicU32>,
    fail_count: u32,
}

impl FlakyService {
    fn new(fail_count: u32) -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            fail_count,
        }
    }

    async fn call(&self) -> Result<String, std::io::Error> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if call <= self.fail_count {
            println!("  Attempt {call}: FAILED (transient)");
            Err(std::io::Error::other(format!("transient failure #{call}")))
        } else {
            println!("  Attempt {call}: SUCCESS");
            Ok("service response".to_string())
        }
    }

    fn total_calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

fn config(attempts: u32) -> Result<BackoffConfig, ConfigError> {
    BackoffConfig::builder()
        .min_delay(Duration::from_millis(100))
        .max_delay(Duration::from_secs(2))
        .max_attempts(attempts)
        .build()
}

/// Example 1: future-style retry
async fn example_future_style() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 1: Future-Style Retry ===\n");

    let runner = BackoffRunner::new(config(4)?);
    let service = FlakyService::new(2);
    let start = Instant::now();

    let result = runner.run(|| service.call()).await?;

    println!("\nResult: {result}");
    println!("Total attempts: {}", service.total_calls());
    println!("Total time: {:?}", start.elapsed());
    println!("Expected delays: 100ms + 200ms = ~300ms");

    Ok(())
}

/// Example 2: non-retryable failures
async fn example_non_retryable() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 2: Non-Retryable Failures ===\n");

    let auth = ErrorKind::new("auth");
    let cfg = BackoffConfig::builder()
        .min_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(100))
        .max_attempts(5)
        .non_retryable_kind(auth.clone())
        .build()?;
    let runner = BackoffRunner::new(cfg);

    println!("Marker error (should NOT retry)");
    let calls = AtomicU32::new(0);
    let result = runner
        .run(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(NonRetryableError::new("malformed request")) }
        })
        .await;
    println!("  -> {:?} after {} call(s)", result, calls.load(Ordering::SeqCst));

    println!("\nCustom `auth` kind (should NOT retry)");
    calls.store(0, Ordering::SeqCst);
    let result = runner
        .run(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            let auth = auth.clone();
            async move { Err::<(), BoxError>(Box::new(TaggedError::new(auth, "token expired"))) }
        })
        .await;
    println!(
        "  -> {} after {} call(s)",
        result.unwrap_err(),
        calls.load(Ordering::SeqCst)
    );

    Ok(())
}

/// Example 3: callback-style retry
async fn example_callback_style() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 3: Callback-Style Retry ===\n");

    let runner = BackoffRunner::new(config(3)?);
    let calls = Arc::new(AtomicU32::new(0));
    let (tx, rx) = tokio::sync::oneshot::channel();

    let work_calls = Arc::clone(&calls);
    runner.attempt(
        move |completion: Completion<u32, BoxError>| {
            let call = work_calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                if call < 2 {
                    println!("  Attempt {call}: reporting failure");
                    completion.fail(format!("socket closed on attempt {call}").into());
                } else {
                    println!("  Attempt {call}: reporting success");
                    completion.succeed(call);
                }
            });
        },
        move |outcome| {
            let _ = tx.send(outcome);
        },
    );

    match rx.await? {
        Ok(call) => println!("\nSucceeded on attempt {call}"),
        Err(err) => println!("\nGave up: {err}"),
    }

    Ok(())
}

/// Example 4: duration budget
async fn example_duration_budget() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 4: Duration Budget ===\n");

    let cfg = BackoffConfig::builder()
        .min_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(20))
        .max_attempts(5)
        .max_duration(Duration::from_millis(40))
        .build()?;
    let runner = BackoffRunner::new(cfg);

    let report = runner
        .run_with_report(|| async { Err::<(), _>(std::io::Error::other("still down")) })
        .await;

    println!("Attempts: {} of 5 allowed", report.attempts);
    println!("Delays: {:?}", report.delays);
    println!("Elapsed: {:?}", report.elapsed);

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    println!("==============================================");
    println!("   Steadfast: Retry Examples");
    println!("==============================================");

    example_future_style().await?;
    example_non_retryable().await?;
    example_callback_style().await?;
    example_duration_budget().await?;

    println!("\n==============================================");
    println!("   All examples completed successfully!");
    println!("==============================================\n");

    Ok(())
}
