//! Integration tests for the token bucket
//!
//! Exercises the async `acquire` path against tokio's paused clock so refill
//! and withhold waits are measured in virtual time.

use std::sync::Arc;
use std::time::Duration;

use callgate_common::resilience::{TokenBucket, TokenBucketConfig, TokioClock};
use tokio::time::Instant;

fn tokio_bucket(capacity: u64, refill: u64, interval: Duration) -> TokenBucket<TokioClock> {
    let config = TokenBucketConfig::builder()
        .capacity(capacity)
        .refill_amount(refill)
        .refill_interval(interval)
        .build()
        .expect("valid config");
    TokenBucket::from_config_with_clock(config, TokioClock).expect("valid bucket")
}

/// Validates that `acquire` sleeps until the next refill boundary once the
/// burst capacity is spent.
///
/// # Test Steps
/// 1. Drain a bucket of 2 tokens refilled 1 per second
/// 2. Acquire a third token
/// 3. Confirm the wait lasted one refill interval of virtual time
#[tokio::test(start_paused = true)]
async fn test_acquire_waits_for_refill() {
    let bucket = tokio_bucket(2, 1, Duration::from_secs(1));
    let start = Instant::now();

    bucket.acquire().await;
    bucket.acquire().await;
    assert_eq!(start.elapsed(), Duration::ZERO);

    bucket.acquire().await;
    let waited = start.elapsed();
    assert!(waited >= Duration::from_secs(1), "waited {waited:?}");
    assert!(waited < Duration::from_millis(1100), "waited {waited:?}");
}

/// Validates that a withhold window delays `acquire` even with tokens left.
///
/// # Test Steps
/// 1. Withhold a full bucket for 5 seconds
/// 2. Acquire a token
/// 3. Confirm the grant happened no earlier than the deadline
#[tokio::test(start_paused = true)]
async fn test_acquire_respects_withhold() {
    let bucket = tokio_bucket(10, 10, Duration::from_secs(1));
    let start = Instant::now();

    bucket.withhold_for(Duration::from_secs(5));
    bucket.acquire().await;

    let waited = start.elapsed();
    assert!(waited >= Duration::from_secs(5), "waited {waited:?}");
    assert!(waited < Duration::from_millis(5100), "waited {waited:?}");
    assert_eq!(bucket.available_tokens(), 9);
}

/// Validates that concurrent waiters sharing one bucket are granted no more
/// tokens than the bucket produces.
#[tokio::test(start_paused = true)]
async fn test_concurrent_acquire_is_bounded_by_refill_rate() {
    let bucket = Arc::new(tokio_bucket(3, 3, Duration::from_secs(1)));
    let start = Instant::now();

    let handles: Vec<_> = (0..9)
        .map(|_| {
            let bucket = Arc::clone(&bucket);
            tokio::spawn(async move {
                bucket.acquire().await;
                start.elapsed()
            })
        })
        .collect();

    let mut grants = Vec::new();
    for handle in handles {
        grants.push(handle.await.expect("task completed"));
    }

    let immediate = grants.iter().filter(|d| **d < Duration::from_secs(1)).count();
    let within_two = grants.iter().filter(|d| **d < Duration::from_secs(2)).count();
    assert_eq!(immediate, 3);
    assert_eq!(within_two, 6);
    assert!(grants.iter().all(|d| *d < Duration::from_secs(3)));
}

/// Validates that a pending `acquire` is woken by the timer rather than by
/// polling, and completes once the refill boundary passes.
#[tokio::test(start_paused = true)]
async fn test_acquire_is_pending_until_refill() {
    let bucket = tokio_bucket(1, 1, Duration::from_millis(500));
    assert!(bucket.try_acquire(1));

    let mut waiter = tokio_test::task::spawn(bucket.acquire());
    tokio_test::assert_pending!(waiter.poll());

    tokio::time::advance(Duration::from_millis(400)).await;
    tokio_test::assert_pending!(waiter.poll());

    tokio::time::advance(Duration::from_millis(110)).await;
    assert!(waiter.is_woken());
    tokio_test::assert_ready!(waiter.poll());
}
