//! Token bucket rate limiter
//!
//! Allows bursts up to a maximum capacity and refills a fixed number of tokens
//! every interval. On top of the classic algorithm the bucket can be told to
//! *withhold* grants until a deadline, which is how a server-mandated
//! `Retry-After` pause is propagated to every caller sharing the bucket.
//!
//! The token counter is lock-free; the refill timestamp and withhold deadline
//! sit behind short-lived `RwLock`s.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::{Clock, SystemClock};
use crate::error::{CommonError, CommonResult};

/// Lower bound for a single wait inside [`TokenBucket::acquire`]
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Longest window [`TokenBucket::withhold_for`] honours; longer requests are
/// shortened to it
pub const MAX_WITHHOLD: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for token bucket rate limiter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBucketConfig {
    /// Maximum number of tokens the bucket can hold
    pub capacity: u64,
    /// Number of tokens to refill per interval
    pub refill_amount: u64,
    /// Time interval for token refill
    pub refill_interval: Duration,
    /// Tokens available at construction; defaults to `capacity`
    pub initial_tokens: Option<u64>,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_amount: 10,
            refill_interval: Duration::from_secs(1),
            initial_tokens: None,
        }
    }
}

impl TokenBucketConfig {
    /// Create a new configuration builder
    pub fn builder() -> TokenBucketConfigBuilder {
        TokenBucketConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> CommonResult<()> {
        if self.capacity == 0 {
            return Err(CommonError::config_field("capacity", "must be greater than 0"));
        }
        if self.refill_amount == 0 {
            return Err(CommonError::config_field("refill_amount", "must be greater than 0"));
        }
        if self.refill_interval.is_zero() {
            return Err(CommonError::config_field(
                "refill_interval",
                "must be greater than zero",
            ));
        }
        if let Some(initial) = self.initial_tokens {
            if initial > self.capacity {
                return Err(CommonError::validation_with_value(
                    "initial_tokens",
                    format!("must not exceed capacity ({})", self.capacity),
                    initial.to_string(),
                ));
            }
        }
        Ok(())
    }

    fn starting_tokens(&self) -> u64 {
        self.initial_tokens.unwrap_or(self.capacity)
    }
}

/// Builder for TokenBucketConfig
#[derive(Debug, Default)]
pub struct TokenBucketConfigBuilder {
    config: TokenBucketConfig,
}

impl TokenBucketConfigBuilder {
    pub fn new() -> Self {
        Self { config: TokenBucketConfig::default() }
    }

    pub fn capacity(mut self, capacity: u64) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn refill_amount(mut self, amount: u64) -> Self {
        self.config.refill_amount = amount;
        self
    }

    pub fn refill_interval(mut self, interval: Duration) -> Self {
        self.config.refill_interval = interval;
        self
    }

    pub fn initial_tokens(mut self, tokens: u64) -> Self {
        self.config.initial_tokens = Some(tokens);
        self
    }

    pub fn build(self) -> CommonResult<TokenBucketConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Token bucket rate limiter
///
/// Cloning a bucket yields a handle onto the same token pool.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use callgate_common::resilience::TokenBucket;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let limiter = TokenBucket::new(10, 5, Duration::from_secs(1))?;
///
/// if limiter.try_acquire(3) {
///     println!("Request allowed");
/// }
///
/// // A server asked us to back off: nobody gets a token for two seconds.
/// limiter.withhold_for(Duration::from_secs(2));
/// assert!(!limiter.try_acquire(1));
/// # Ok(())
/// # }
/// ```
pub struct TokenBucket<C: Clock = SystemClock> {
    config: TokenBucketConfig,
    tokens: Arc<AtomicU64>,
    last_refill: Arc<RwLock<Instant>>,
    withheld_until: Arc<RwLock<Option<Instant>>>,
    clock: Arc<C>,
}

impl<C: Clock> TokenBucket<C> {
    /// Create a new token bucket with custom clock
    pub fn with_clock(
        capacity: u64,
        refill_amount: u64,
        refill_interval: Duration,
        clock: C,
    ) -> CommonResult<Self> {
        let config =
            TokenBucketConfig { capacity, refill_amount, refill_interval, initial_tokens: None };
        Self::from_config_with_clock(config, clock)
    }

    /// Create a token bucket from a validated configuration and a clock
    pub fn from_config_with_clock(config: TokenBucketConfig, clock: C) -> CommonResult<Self> {
        config.validate()?;

        Ok(Self {
            tokens: Arc::new(AtomicU64::new(config.starting_tokens())),
            last_refill: Arc::new(RwLock::new(clock.now())),
            withheld_until: Arc::new(RwLock::new(None)),
            clock: Arc::new(clock),
            config,
        })
    }

    /// The configuration this bucket was built from
    pub fn config(&self) -> &TokenBucketConfig {
        &self.config
    }

    fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
        match lock.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Token bucket lock poisoned");
                poisoned.into_inner()
            }
        }
    }

    fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
        match lock.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Token bucket lock poisoned");
                poisoned.into_inner()
            }
        }
    }

    /// Refill tokens based on elapsed time
    ///
    /// `last_refill` advances by whole intervals only, so partial progress
    /// towards the next refill is kept.
    fn refill(&self, now: Instant) {
        let mut last_refill = Self::write_lock(&self.last_refill);

        let elapsed = now.saturating_duration_since(*last_refill);
        let interval_nanos = self.config.refill_interval.as_nanos();
        let refills = elapsed.as_nanos() / interval_nanos;

        if refills == 0 {
            return;
        }

        let tokens_to_add =
            u64::try_from(refills).unwrap_or(u64::MAX).saturating_mul(self.config.refill_amount);
        let capacity = self.config.capacity;
        let previous = self
            .tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(tokens_to_add).min(capacity))
            })
            .unwrap_or_else(|current| current);

        let advanced = u64::try_from(refills * interval_nanos).unwrap_or(u64::MAX);
        *last_refill += Duration::from_nanos(advanced);

        trace!(
            tokens_added = tokens_to_add,
            available = previous.saturating_add(tokens_to_add).min(capacity),
            "Refilled token bucket"
        );
    }

    /// Remaining withhold time at `now`, clearing an expired deadline
    fn withhold_remaining(&self, now: Instant) -> Option<Duration> {
        let deadline = *Self::read_lock(&self.withheld_until);
        match deadline {
            Some(until) if until > now => Some(until - now),
            Some(_) => {
                let mut guard = Self::write_lock(&self.withheld_until);
                if guard.is_some_and(|until| until <= now) {
                    *guard = None;
                }
                None
            }
            None => None,
        }
    }

    /// Try to acquire the specified number of tokens
    ///
    /// Returns `true` if tokens were acquired, `false` if not enough tokens
    /// are available or the bucket is currently withholding grants.
    pub fn try_acquire(&self, tokens: u64) -> bool {
        let now = self.clock.now();

        if let Some(remaining) = self.withhold_remaining(now) {
            debug!(remaining_ms = remaining.as_millis() as u64, "Rate limit: grants withheld");
            return false;
        }

        self.refill(now);

        let mut current = self.tokens.load(Ordering::Acquire);

        loop {
            if current < tokens {
                debug!(available = current, requested = tokens, "Rate limit: insufficient tokens");
                return false;
            }

            let new_value = current - tokens;
            match self.tokens.compare_exchange_weak(
                current,
                new_value,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    trace!(acquired = tokens, remaining = new_value, "Acquired tokens");
                    return true;
                }
                Err(actual) => {
                    current = actual;
                }
            }
        }
    }

    /// Refuse every grant until `duration` has elapsed
    ///
    /// An existing later deadline is kept; a shorter request never shortens
    /// an active withhold. Requests longer than [`MAX_WITHHOLD`] are capped.
    pub fn withhold_for(&self, duration: Duration) {
        let now = self.clock.now();
        if duration > MAX_WITHHOLD {
            warn!(
                requested_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                "Withhold request capped"
            );
        }
        let duration = duration.min(MAX_WITHHOLD);
        let Some(until) = now.checked_add(duration) else {
            warn!("Withhold deadline out of range, ignoring request");
            return;
        };
        let mut guard = Self::write_lock(&self.withheld_until);

        let deadline = match *guard {
            Some(existing) if existing >= until => existing,
            _ => until,
        };
        *guard = Some(deadline);

        debug!(withhold_ms = duration.as_millis() as u64, "Token bucket withholding grants");
    }

    /// Whether grants are currently withheld
    pub fn is_withheld(&self) -> bool {
        self.withhold_remaining(self.clock.now()).is_some()
    }

    /// Time until a single token could be granted
    ///
    /// Zero when a token is available right now. Otherwise the larger of the
    /// remaining withhold window and the time to the next refill boundary.
    pub fn time_until_available(&self) -> Duration {
        let now = self.clock.now();
        let withheld = self.withhold_remaining(now).unwrap_or(Duration::ZERO);

        self.refill(now);
        let refill_wait = if self.tokens.load(Ordering::Acquire) > 0 {
            Duration::ZERO
        } else {
            let last_refill = *Self::read_lock(&self.last_refill);
            (last_refill + self.config.refill_interval).saturating_duration_since(now)
        };

        withheld.max(refill_wait)
    }

    /// Wait until one token is granted, then consume it
    ///
    /// Sleeps on the tokio timer until the next refill boundary or the end of
    /// the withhold window, whichever is later, instead of polling. The clock
    /// must advance with tokio time ([`SystemClock`] or
    /// [`TokioClock`](super::TokioClock)).
    pub async fn acquire(&self) {
        loop {
            if self.try_acquire(1) {
                return;
            }
            let wait = self.time_until_available().max(MIN_WAIT);
            trace!(wait_ms = wait.as_millis() as u64, "Waiting for token");
            tokio::time::sleep(wait).await;
        }
    }

    /// Get the current number of available tokens
    pub fn available_tokens(&self) -> u64 {
        self.refill(self.clock.now());
        self.tokens.load(Ordering::Acquire)
    }

    /// Reset the limiter to full capacity and lift any withhold
    pub fn reset(&self) {
        self.tokens.store(self.config.capacity, Ordering::Release);
        *Self::write_lock(&self.last_refill) = self.clock.now();
        *Self::write_lock(&self.withheld_until) = None;
    }
}

impl TokenBucket<SystemClock> {
    /// Create a new token bucket with system clock
    pub fn new(capacity: u64, refill_amount: u64, refill_interval: Duration) -> CommonResult<Self> {
        Self::with_clock(capacity, refill_amount, refill_interval, SystemClock)
    }

    /// Create a token bucket from a configuration with system clock
    pub fn from_config(config: TokenBucketConfig) -> CommonResult<Self> {
        Self::from_config_with_clock(config, SystemClock)
    }
}

impl<C: Clock> Clone for TokenBucket<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            tokens: Arc::clone(&self.tokens),
            last_refill: Arc::clone(&self.last_refill),
            withheld_until: Arc::clone(&self.withheld_until),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<C: Clock> std::fmt::Debug for TokenBucket<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("config", &self.config)
            .field("tokens", &self.tokens.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
