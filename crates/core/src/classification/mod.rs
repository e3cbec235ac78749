//! Outcome classification
//!
//! A [`Classifier`] looks at a resolved value or an error and returns a
//! [`Verdict`]: is it a rate-limit rejection, and is it a client-side failure
//! that must not be retried. The retry engine only ever talks to this trait.
//!
//! [`StatusClassifier`] is the default. It scans the outcome's status-like
//! locations (see [`inspect`]) and flags 429 as rate limited and any code in
//! `[400, 500)` as a client error. Protocols that signal throttling
//! differently (gRPC `RESOURCE_EXHAUSTED`, SDK error enums) plug in their own
//! implementation, or wrap two closures in a [`FnClassifier`].

pub mod inspect;

use std::borrow::Cow;
use std::fmt;

use reqwest::header::HeaderMap;

pub use inspect::{Inspect, RawStatus, StatusCandidate, StatusLocation, STATUS_LOCATIONS};

/// Status code signalling a rate-limit rejection
pub const RATE_LIMITED_STATUS: i64 = 429;

/// Result of classifying one outcome
///
/// The two flags are independent. When both are set, `rate_limited` wins and
/// the outcome is retried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verdict {
    pub rate_limited: bool,
    pub dont_retry: bool,
}

impl Verdict {
    /// Neither rate limited nor a client error
    pub const UNCLASSIFIED: Self = Self { rate_limited: false, dont_retry: false };

    pub fn rate_limited() -> Self {
        Self { rate_limited: true, dont_retry: false }
    }

    pub fn dont_retry() -> Self {
        Self { rate_limited: false, dont_retry: true }
    }

    /// Whether a failed attempt with this verdict ends the call
    pub fn is_terminal(&self) -> bool {
        self.dont_retry && !self.rate_limited
    }
}

/// Decides retry eligibility for resolved values of `T` and errors of `E`
pub trait Classifier<T, E>: Send + Sync {
    fn identify_result(&self, value: &T) -> Verdict;

    fn identify_error(&self, error: &E) -> Verdict;

    /// Headers to read a `Retry-After` hint from on a rate-limited value
    fn result_headers<'a>(&self, _value: &'a T) -> Option<Cow<'a, HeaderMap>> {
        None
    }

    /// Headers to read a `Retry-After` hint from on a retryable error
    fn error_headers<'a>(&self, _error: &'a E) -> Option<Cow<'a, HeaderMap>> {
        None
    }
}

/// Status-code classifier used by default
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusClassifier;

impl StatusClassifier {
    pub fn classify<V: Inspect + ?Sized>(&self, value: &V) -> Verdict {
        let codes = status_codes(value);
        Verdict {
            rate_limited: codes.iter().any(|code| *code == RATE_LIMITED_STATUS),
            dont_retry: codes.iter().any(|code| is_client_status(*code)),
        }
    }
}

impl<T, E> Classifier<T, E> for StatusClassifier
where
    T: Inspect,
    E: Inspect,
{
    fn identify_result(&self, value: &T) -> Verdict {
        self.classify(value)
    }

    fn identify_error(&self, error: &E) -> Verdict {
        self.classify(error)
    }

    fn result_headers<'a>(&self, value: &'a T) -> Option<Cow<'a, HeaderMap>> {
        value.headers()
    }

    fn error_headers<'a>(&self, error: &'a E) -> Option<Cow<'a, HeaderMap>> {
        error.headers()
    }
}

/// Classifier built from two closures
///
/// Carries no header access, so retries use the backoff formula only.
pub struct FnClassifier<R, F> {
    on_result: R,
    on_error: F,
}

impl<R, F> FnClassifier<R, F> {
    pub fn new(on_result: R, on_error: F) -> Self {
        Self { on_result, on_error }
    }
}

impl<R, F> fmt::Debug for FnClassifier<R, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnClassifier").finish_non_exhaustive()
    }
}

impl<T, E, R, F> Classifier<T, E> for FnClassifier<R, F>
where
    R: Fn(&T) -> Verdict + Send + Sync,
    F: Fn(&E) -> Verdict + Send + Sync,
{
    fn identify_result(&self, value: &T) -> Verdict {
        (self.on_result)(value)
    }

    fn identify_error(&self, error: &E) -> Verdict {
        (self.on_error)(error)
    }
}

fn is_client_status(code: i64) -> bool {
    (400..500).contains(&code)
}

/// Integer status codes found on `value`, in scan order
pub fn status_codes<V: Inspect + ?Sized>(value: &V) -> Vec<i64> {
    value.status_candidates().iter().filter_map(|c| c.value.coerce()).collect()
}

/// Whether any status on `value` falls in `[400, 500)`
pub fn is_client_error<V: Inspect + ?Sized>(value: &V) -> bool {
    status_codes(value).into_iter().any(is_client_status)
}

/// Whether any status on `value` equals 429
pub fn is_rate_limited<V: Inspect + ?Sized>(value: &V) -> bool {
    status_codes(value).contains(&RATE_LIMITED_STATUS)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::error::HttpStatusError;

    fn verdict(value: &Value) -> Verdict {
        <StatusClassifier as Classifier<Value, Value>>::identify_result(&StatusClassifier, value)
    }

    /// Validates `StatusClassifier` behavior for the rate-limited status
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms 429 sets both flags and the verdict is not terminal.
    #[test]
    fn test_rate_limited_takes_precedence() {
        let v = verdict(&json!({ "status": 429 }));
        assert!(v.rate_limited);
        assert!(v.dont_retry);
        assert!(!v.is_terminal());
    }

    #[test]
    fn test_client_error_is_terminal() {
        let v = verdict(&json!({ "statusCode": "404" }));
        assert_eq!(v, Verdict::dont_retry());
        assert!(v.is_terminal());
    }

    #[test]
    fn test_server_error_and_missing_status_are_unclassified() {
        assert_eq!(verdict(&json!({ "status": 503 })), Verdict::UNCLASSIFIED);
        assert_eq!(verdict(&json!({ "message": "boom" })), Verdict::UNCLASSIFIED);
        assert_eq!(verdict(&json!({ "code": "ETIMEDOUT" })), Verdict::UNCLASSIFIED);
    }

    /// Validates `StatusClassifier` behavior for the independent candidates
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms a 429 in one location and a 200 in another still flags
    ///   rate limiting.
    #[test]
    fn test_candidates_are_checked_independently() {
        let value = json!({ "status": 200, "response": { "status": 429 } });
        assert!(verdict(&value).rate_limited);
        assert_eq!(status_codes(&value), vec![200, 429]);
    }

    #[test]
    fn test_boundaries() {
        assert!(!is_client_error(&json!({ "status": 399 })));
        assert!(is_client_error(&json!({ "status": 400 })));
        assert!(is_client_error(&json!({ "status": 499 })));
        assert!(!is_client_error(&json!({ "status": 500 })));
        assert!(is_rate_limited(&json!({ "code": 429.0 })));
    }

    #[test]
    fn test_status_classifier_forwards_headers() {
        let err = HttpStatusError::new(429).with_header("Retry-After", "3");
        let classifier = StatusClassifier;
        let headers =
            <StatusClassifier as Classifier<Value, HttpStatusError>>::error_headers(&classifier, &err);
        assert_eq!(headers.unwrap().get("retry-after").unwrap(), "3");
    }

    #[test]
    fn test_fn_classifier() {
        let classifier = FnClassifier::new(
            |value: &String| {
                if value == "slow down" {
                    Verdict::rate_limited()
                } else {
                    Verdict::UNCLASSIFIED
                }
            },
            |error: &std::io::Error| {
                if error.kind() == std::io::ErrorKind::PermissionDenied {
                    Verdict::dont_retry()
                } else {
                    Verdict::UNCLASSIFIED
                }
            },
        );
        let classifier: &dyn Classifier<String, std::io::Error> = &classifier;

        assert!(classifier.identify_result(&"slow down".to_string()).rate_limited);
        assert!(classifier
            .identify_error(&std::io::Error::from(std::io::ErrorKind::PermissionDenied))
            .is_terminal());
        assert!(classifier.result_headers(&"ok".to_string()).is_none());
    }
}
