//! Caller configuration
//!
//! ```toml
//! concurrency = 5
//!
//! [token_bucket]
//! capacity = 10
//! fill_per_window = 10
//! window_ms = 1000
//!
//! [retry]
//! max_retries = 3
//! min_delay_ms = 1000
//! max_delay_ms = 10000
//! backoff_factor = 2.0
//! ```
//!
//! Every field is optional; missing ones take the defaults shown above.

use std::path::Path;
use std::time::Duration;

use callgate_common::{duration_millis, TokenBucketConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::retry::RetryOptions;

/// Added to the token-bucket window when the built-in bucket is constructed
pub const WINDOW_PADDING: Duration = Duration::from_millis(10);

/// Built-in token bucket settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenBucketOptions {
    /// Burst size
    pub capacity: u64,
    /// Tokens added every window
    pub fill_per_window: u64,
    #[serde(rename = "window_ms", with = "duration_millis")]
    pub window: Duration,
    /// Tokens available at start; defaults to `capacity`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_tokens: Option<u64>,
}

impl Default for TokenBucketOptions {
    fn default() -> Self {
        Self {
            capacity: 10,
            fill_per_window: 10,
            window: Duration::from_millis(1000),
            initial_tokens: None,
        }
    }
}

impl TokenBucketOptions {
    /// Bucket configuration with the window padded by [`WINDOW_PADDING`]
    pub fn to_bucket_config(&self) -> TokenBucketConfig {
        TokenBucketConfig {
            capacity: self.capacity,
            refill_amount: self.fill_per_window,
            refill_interval: self.window + WINDOW_PADDING,
            initial_tokens: self.initial_tokens,
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.window.is_zero() {
            return Err(ConfigError::invalid("token_bucket.window_ms", "must be greater than 0"));
        }
        self.to_bucket_config().validate()?;
        Ok(())
    }
}

/// Everything needed to build a [`Caller`](crate::Caller)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallerConfig {
    pub token_bucket: TokenBucketOptions,
    pub retry: RetryOptions,
    /// Calls allowed to run at once, retries included
    pub concurrency: usize,
}

impl Default for CallerConfig {
    fn default() -> Self {
        Self {
            token_bucket: TokenBucketOptions::default(),
            retry: RetryOptions::default(),
            concurrency: 5,
        }
    }
}

impl CallerConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.concurrency == 0 {
            return Err(ConfigError::invalid("concurrency", "must be at least 1"));
        }
        self.token_bucket.validate()?;
        self.retry.validate()?;
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading caller configuration");
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}
