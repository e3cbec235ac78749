//! Retry options

use std::time::Duration;

use callgate_common::duration_millis;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// How often and how patiently a call is retried
///
/// Durations are written in milliseconds in configuration files:
///
/// ```toml
/// max_retries = 3
/// min_delay_ms = 1000
/// max_delay_ms = 10000
/// backoff_factor = 2.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    /// Retries after the first attempt; a call makes at most
    /// `max_retries + 1` attempts
    pub max_retries: u32,
    /// Backoff delay after the first failed attempt
    #[serde(rename = "min_delay_ms", with = "duration_millis")]
    pub min_delay: Duration,
    /// Upper bound for any single wait between attempts
    #[serde(rename = "max_delay_ms", with = "duration_millis")]
    pub max_delay: Duration,
    /// Multiplier applied per completed attempt
    pub backoff_factor: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_factor: 2.0,
        }
    }
}

impl RetryOptions {
    pub fn builder() -> RetryOptionsBuilder {
        RetryOptionsBuilder::default()
    }

    /// Total attempts allowed, the first one included
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_delay < self.min_delay {
            return Err(ConfigError::invalid(
                "retry.max_delay_ms",
                format!(
                    "{} ms is below min_delay_ms ({} ms)",
                    self.max_delay.as_millis(),
                    self.min_delay.as_millis()
                ),
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor <= 0.0 {
            return Err(ConfigError::invalid(
                "retry.backoff_factor",
                format!("must be a positive finite number, got {}", self.backoff_factor),
            ));
        }
        Ok(())
    }
}

/// Builder for [`RetryOptions`]
#[derive(Debug, Default)]
pub struct RetryOptionsBuilder {
    options: RetryOptions,
}

impl RetryOptionsBuilder {
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.options.max_retries = retries;
        self
    }

    pub fn min_delay(mut self, delay: Duration) -> Self {
        self.options.min_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.options.max_delay = delay;
        self
    }

    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.options.backoff_factor = factor;
        self
    }

    pub fn build(self) -> ConfigResult<RetryOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}
