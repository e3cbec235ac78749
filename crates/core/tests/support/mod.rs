//! Shared helpers for `callgate-core` integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use callgate_core::{Inspect, RateLimiter};
use tracing_subscriber::{fmt, EnvFilter};

static TRACING: Once = Once::new();

/// Install a test subscriber once; `RUST_LOG` controls verbosity
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

/// Limiter that always grants and records what it was asked
#[derive(Debug, Default)]
pub struct RecordingLimiter {
    grants: AtomicUsize,
    withholds: Mutex<Vec<Duration>>,
}

impl RecordingLimiter {
    pub fn grants(&self) -> usize {
        self.grants.load(Ordering::SeqCst)
    }

    pub fn withholds(&self) -> Vec<Duration> {
        self.withholds.lock().unwrap().clone()
    }
}

#[async_trait]
impl RateLimiter for RecordingLimiter {
    async fn acquire(&self) {
        self.grants.fetch_add(1, Ordering::SeqCst);
    }

    fn try_acquire(&self) -> bool {
        self.grants.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn withhold_for(&self, duration: Duration) {
        self.withholds.lock().unwrap().push(duration);
    }
}

/// Operation error without any status information
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transient failure on attempt {attempt}")]
pub struct TransientError {
    pub attempt: u32,
}

impl Inspect for TransientError {}

/// Assert that `start.elapsed()` is `expected`, allowing for timer rounding
#[track_caller]
pub fn assert_elapsed(start: tokio::time::Instant, expected: Duration) {
    let elapsed = start.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(50),
        "expected ~{expected:?}, elapsed {elapsed:?}"
    );
}
