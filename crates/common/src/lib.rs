//! Shared primitives for the callgate crates.
//!
//! # Contents
//!
//! - [`error`]: the `CommonError` enum for configuration failures
//! - [`resilience`]: the `Clock` abstraction and the built-in token bucket
//! - [`utils`]: serde helpers shared by configuration types
//!
//! Nothing in this crate knows about call orchestration; the engine lives in
//! `callgate-core` and consumes these pieces through its own ports.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod error;
pub mod resilience;
pub mod utils;

// Re-export commonly used types and traits for convenience
// ------------------------
pub use error::{CommonError, CommonResult};
pub use resilience::{
    Clock, MockClock, SystemClock, TokenBucket, TokenBucketConfig, TokenBucketConfigBuilder,
    TokioClock, MAX_WITHHOLD,
};
pub use utils::serde::duration_millis;
