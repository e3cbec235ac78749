//! Resilience primitives shared by the callgate crates
//!
//! - **[`Clock`]**: time abstraction with system, tokio-backed and mock
//!   implementations
//! - **[`TokenBucket`]**: burst-tolerant rate limiter with a withhold window
//!   for server-mandated pauses
//!
//! The orchestration engine in `callgate-core` consumes the token bucket
//! through its own limiter port, so any other limiter can stand in for it.

pub mod clock;
pub mod rate_limiter;

pub use clock::{Clock, MockClock, SystemClock, TokioClock};
pub use rate_limiter::{TokenBucket, TokenBucketConfig, TokenBucketConfigBuilder, MAX_WITHHOLD};
