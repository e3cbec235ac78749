//! Wait computation between attempts
//!
//! A server-supplied `Retry-After` header wins over the backoff formula.
//! Either way the wait handed back to the engine never exceeds `max_delay`.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use callgate_common::{Clock, SystemClock};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use tracing::debug;

use super::options::RetryOptions;

/// Upper bound on a parsed `Retry-After` hint
///
/// Larger values, whether as seconds or as a far-future date, are read as
/// this bound so one bad header cannot stall a shared limiter indefinitely.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60 * 60);

/// Obsolete HTTP-date forms: RFC 850 and asctime
const OBSOLETE_DATE_FORMATS: [&str; 2] = ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"];

/// Wait before the next attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDelay {
    /// How long the engine sleeps, clamped to `[0, max_delay]`
    pub wait: Duration,
    /// The server's own hint, unclamped, when one was parsed
    pub server_hint: Option<Duration>,
}

/// Computes [`RetryDelay`]s from retry options and optional headers
#[derive(Clone)]
pub struct DelayCalculator {
    options: RetryOptions,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for DelayCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayCalculator").field("options", &self.options).finish_non_exhaustive()
    }
}

impl DelayCalculator {
    pub fn new(options: RetryOptions) -> Self {
        Self::with_clock(options, Arc::new(SystemClock))
    }

    /// Use `clock` as the wall clock for `Retry-After` dates
    pub fn with_clock(options: RetryOptions, clock: Arc<dyn Clock>) -> Self {
        Self { options, clock }
    }

    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    /// `min_delay × factor^(attempts_completed − 1)`, capped at `max_delay`
    pub fn backoff(&self, attempts_completed: u32) -> Duration {
        let max = self.options.max_delay;
        let exponent = i32::try_from(attempts_completed.saturating_sub(1)).unwrap_or(i32::MAX);
        let millis = self.options.min_delay.as_millis() as f64 * self.options.backoff_factor.powi(exponent);

        if !millis.is_finite() || millis >= max.as_millis() as f64 {
            return max;
        }
        Duration::from_millis(millis.max(0.0).round() as u64).min(max)
    }

    /// Delay after `attempts_completed` attempts, honouring `Retry-After`
    pub fn next_delay(&self, attempts_completed: u32, headers: Option<&HeaderMap>) -> RetryDelay {
        let hint = headers.and_then(|headers| self.server_hint(headers));

        match hint {
            Some(hint) => {
                let wait = hint.min(self.options.max_delay);
                debug!(
                    hint_ms = hint.as_millis() as u64,
                    wait_ms = wait.as_millis() as u64,
                    "Using Retry-After hint"
                );
                RetryDelay { wait, server_hint: Some(hint) }
            }
            None => RetryDelay { wait: self.backoff(attempts_completed), server_hint: None },
        }
    }

    fn server_hint(&self, headers: &HeaderMap) -> Option<Duration> {
        let raw = headers.get(RETRY_AFTER)?;
        let parsed = raw.to_str().ok().and_then(|value| parse_retry_after(value, self.clock.system_time()));
        if parsed.is_none() {
            debug!(value = ?raw, "Ignoring unparseable Retry-After header");
        }
        parsed
    }
}

/// Parse a `Retry-After` value as seconds or as an HTTP date
///
/// Dates are accepted in the IMF-fixdate / RFC 2822 form
/// (`Wed, 21 Oct 2015 07:28:00 GMT`) and in the obsolete RFC 850
/// (`Wednesday, 21-Oct-15 07:28:00 GMT`) and asctime
/// (`Wed Oct 21 07:28:00 2015`) forms. Negative seconds and dates in the past
/// both mean "no wait"; results are capped at [`MAX_RETRY_AFTER`]. Anything
/// else returns `None`.
pub fn parse_retry_after(value: &str, now: SystemTime) -> Option<Duration> {
    let value = value.trim();

    if let Some(seconds) = parse_delta_seconds(value) {
        return Some(Duration::from_secs(seconds).min(MAX_RETRY_AFTER));
    }

    let target = parse_http_date(value)?;
    let now: DateTime<Utc> = now.into();
    Some((target - now).to_std().unwrap_or(Duration::ZERO).min(MAX_RETRY_AFTER))
}

/// Whole seconds, saturating on values too large for `u64`
fn parse_delta_seconds(value: &str) -> Option<u64> {
    let (negative, digits) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if negative {
        return Some(0);
    }
    Some(digits.parse::<u64>().unwrap_or(u64::MAX))
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }
    OBSOLETE_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use callgate_common::MockClock;
    use reqwest::header::HeaderValue;

    use super::*;

    fn headers(retry_after: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_str(retry_after).unwrap());
        headers
    }

    /// 2015-10-21T07:28:00Z
    fn date_clock(offset: Duration) -> Arc<dyn Clock> {
        let clock =
            MockClock::with_system_time(SystemTime::UNIX_EPOCH + Duration::from_secs(1_445_412_480));
        clock.advance(offset);
        Arc::new(clock)
    }

    /// Validates `DelayCalculator::backoff` behavior for the default options
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the 1000/2000/4000/8000 ms progression.
    /// - Confirms the fifth wait is capped at 10000 ms.
    #[test]
    fn test_default_backoff_progression() {
        let calc = DelayCalculator::new(RetryOptions::default());
        let waits: Vec<u128> = (1..=6).map(|n| calc.backoff(n).as_millis()).collect();
        assert_eq!(waits, vec![1000, 2000, 4000, 8000, 10_000, 10_000]);
    }

    #[test]
    fn test_backoff_saturates_on_huge_attempt_counts() {
        let calc = DelayCalculator::new(RetryOptions::default());
        assert_eq!(calc.backoff(u32::MAX), Duration::from_secs(10));
        assert_eq!(calc.backoff(0), Duration::from_secs(1));
    }

    #[test]
    fn test_fractional_factor() {
        let options = RetryOptions { backoff_factor: 1.5, ..RetryOptions::default() };
        let calc = DelayCalculator::new(options);
        assert_eq!(calc.backoff(2), Duration::from_millis(1500));
        assert_eq!(calc.backoff(3), Duration::from_millis(2250));
    }

    #[test]
    fn test_retry_after_seconds() {
        let calc = DelayCalculator::new(RetryOptions::default());
        let delay = calc.next_delay(1, Some(&headers("5")));
        assert_eq!(
            delay,
            RetryDelay { wait: Duration::from_secs(5), server_hint: Some(Duration::from_secs(5)) }
        );
    }

    /// Validates `DelayCalculator::next_delay` behavior for a hint longer
    /// than `max_delay`.
    ///
    /// Assertions:
    /// - Confirms the wait is clamped while the server hint is kept whole.
    #[test]
    fn test_retry_after_is_clamped_but_hint_kept() {
        let calc = DelayCalculator::new(RetryOptions::default());
        let delay = calc.next_delay(1, Some(&headers("120")));
        assert_eq!(delay.wait, Duration::from_secs(10));
        assert_eq!(delay.server_hint, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_retry_after_http_date() {
        let calc = DelayCalculator::with_clock(RetryOptions::default(), date_clock(Duration::ZERO));
        let delay = calc.next_delay(1, Some(&headers("Wed, 21 Oct 2015 07:28:03 GMT")));
        assert_eq!(delay.wait, Duration::from_secs(3));
        assert_eq!(delay.server_hint, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_retry_after_date_in_past_is_zero() {
        let calc =
            DelayCalculator::with_clock(RetryOptions::default(), date_clock(Duration::from_secs(60)));
        let delay = calc.next_delay(2, Some(&headers("Wed, 21 Oct 2015 07:28:00 GMT")));
        assert_eq!(delay.wait, Duration::ZERO);
        assert_eq!(delay.server_hint, Some(Duration::ZERO));
    }

    #[test]
    fn test_unparseable_retry_after_falls_back_to_backoff() {
        let calc = DelayCalculator::new(RetryOptions::default());
        for value in ["soon", "1.5", ""] {
            let delay = calc.next_delay(3, Some(&headers(value)));
            assert_eq!(delay, RetryDelay { wait: Duration::from_secs(4), server_hint: None });
        }
        assert_eq!(calc.next_delay(2, None).wait, Duration::from_secs(2));
    }

    #[test]
    fn test_parse_retry_after_negative_seconds() {
        assert_eq!(parse_retry_after("-3", SystemTime::now()), Some(Duration::ZERO));
        assert_eq!(parse_retry_after(" 7 ", SystemTime::now()), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after("-", SystemTime::now()), None);
        assert_eq!(parse_retry_after("+5", SystemTime::now()), None);
    }

    /// Validates `DelayCalculator::next_delay` behavior for oversized
    /// second counts.
    ///
    /// Assertions:
    /// - Ensures `i64::MAX`, values past `u64::MAX` and very large counts
    ///   neither panic nor fall back to backoff.
    /// - Confirms the hint is capped at `MAX_RETRY_AFTER` and the wait at
    ///   `max_delay`.
    #[test]
    fn test_huge_retry_after_seconds_are_capped() {
        let calc = DelayCalculator::new(RetryOptions::default());
        for value in ["9223372036854775807", "99999999999999999", "123456789012345678901234567890"] {
            let delay = calc.next_delay(1, Some(&headers(value)));
            assert_eq!(
                delay,
                RetryDelay { wait: Duration::from_secs(10), server_hint: Some(MAX_RETRY_AFTER) },
                "Retry-After: {value}"
            );
        }
    }

    #[test]
    fn test_far_future_retry_after_date_is_capped() {
        let calc = DelayCalculator::with_clock(RetryOptions::default(), date_clock(Duration::ZERO));
        let delay = calc.next_delay(1, Some(&headers("Fri, 31 Dec 9999 23:59:59 GMT")));
        assert_eq!(delay.wait, Duration::from_secs(10));
        assert_eq!(delay.server_hint, Some(MAX_RETRY_AFTER));
    }

    /// Validates `parse_retry_after` behavior for the obsolete HTTP-date
    /// forms.
    ///
    /// Assertions:
    /// - Confirms RFC 850 and asctime dates resolve like the IMF-fixdate.
    #[test]
    fn test_obsolete_http_date_forms() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_445_412_480);
        for value in [
            "Wed, 21 Oct 2015 07:28:03 GMT",
            "Wednesday, 21-Oct-15 07:28:03 GMT",
            "Wed Oct 21 07:28:03 2015",
        ] {
            assert_eq!(parse_retry_after(value, now), Some(Duration::from_secs(3)), "{value}");
        }
        assert_eq!(parse_retry_after("Wed Oct  7 07:28:00 2015", now), Some(Duration::ZERO));
    }
}
