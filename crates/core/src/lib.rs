//! # Callgate Core
//!
//! Client-side call orchestration: bounded concurrency, rate gating and
//! classification-driven retries around any async operation.
//!
//! ```text
//! submit ──> AdmissionQueue ──> RetryEngine ─┬─> RateGate::admit
//!            (FIFO, ≤ N)                     ├─> operation()
//!                                            ├─> Classifier ──> Verdict
//!                                            └─> DelayCalculator ──> sleep
//! ```
//!
//! ## Architecture Principles
//! - Collaborators sit behind ports: [`RateLimiter`] and [`Classifier`]
//! - Errors from the wrapped operation are returned untouched
//! - Time comes from `callgate-common`'s `Clock` or the tokio timer, so every
//!   wait is testable in virtual time

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod admission;
pub mod caller;
pub mod classification;
pub mod config;
pub mod error;
pub mod gate;
pub mod retry;

pub use admission::{AdmissionQueue, AdmissionSlot};
pub use caller::{Caller, CallerBuilder, CallerMetrics};
pub use classification::{
    is_client_error, is_rate_limited, status_codes, Classifier, FnClassifier, Inspect,
    StatusClassifier, Verdict,
};
pub use config::{CallerConfig, TokenBucketOptions, WINDOW_PADDING};
pub use error::{ConfigError, ConfigResult, HttpStatusError};
pub use gate::{RateGate, RateLimiter, Unlimited};
pub use retry::{DelayCalculator, RetryDelay, RetryEngine, RetryOptions, MAX_RETRY_AFTER};
