//! Retry policy: options, delay computation and the attempt loop

pub mod delay;
pub mod engine;
pub mod options;

pub use delay::{parse_retry_after, DelayCalculator, RetryDelay, MAX_RETRY_AFTER};
pub use engine::RetryEngine;
pub use options::{RetryOptions, RetryOptionsBuilder};
