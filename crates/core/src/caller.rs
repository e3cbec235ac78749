//! The public engine: admission, rate gating and retries behind one call
//!
//! ```rust,no_run
//! use callgate_core::{Caller, CallerConfig, HttpStatusError};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let caller = Caller::new(CallerConfig::default())?;
//! let client = reqwest::Client::new();
//!
//! let response = caller
//!     .submit(|| {
//!         let request = client.get("https://api.example.com/items").send();
//!         async move {
//!             let response = request.await.map_err(|_| HttpStatusError::new(0))?;
//!             HttpStatusError::check(response).await
//!         }
//!     })
//!     .await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use callgate_common::{Clock, TokenBucket, TokioClock};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::admission::AdmissionQueue;
use crate::classification::{self, Classifier, Inspect, StatusClassifier};
use crate::config::{CallerConfig, TokenBucketOptions};
use crate::error::{ConfigError, ConfigResult};
use crate::gate::{RateGate, RateLimiter};
use crate::retry::{DelayCalculator, RetryEngine, RetryOptions};

/// Point-in-time view of a caller's admission state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallerMetrics {
    pub running: usize,
    pub queued: usize,
    pub limit: usize,
}

/// Runs operations with bounded concurrency, rate gating and retries
///
/// State is per instance: two callers never share a queue or a limiter
/// unless one is injected into both through [`CallerBuilder::limiter`].
#[derive(Debug)]
pub struct Caller<C = StatusClassifier> {
    admission: AdmissionQueue,
    engine: RetryEngine,
    classifier: C,
}

impl Caller<StatusClassifier> {
    /// Build a caller with the built-in token bucket and status classifier
    pub fn new(config: CallerConfig) -> ConfigResult<Self> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> CallerBuilder<StatusClassifier> {
        CallerBuilder::new()
    }
}

impl<C> Caller<C> {
    /// Run `operation` once admitted, retrying as classified
    ///
    /// The operation is invoked once per attempt. Its error, or its last
    /// resolved value, comes back unchanged.
    #[instrument(skip_all, fields(limit = self.admission.limit()))]
    pub async fn submit<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        C: Classifier<T, E>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _slot = self.admission.acquire().await;
        debug!(
            running = self.admission.running(),
            queued = self.admission.queued(),
            "Call admitted"
        );
        self.engine.run(&self.classifier, operation).await
    }

    pub fn metrics(&self) -> CallerMetrics {
        CallerMetrics {
            running: self.admission.running(),
            queued: self.admission.queued(),
            limit: self.admission.limit(),
        }
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn retry_options(&self) -> &RetryOptions {
        self.engine.delays().options()
    }

    /// Integer status codes found on `value`
    pub fn status_codes<V: Inspect + ?Sized>(&self, value: &V) -> Vec<i64> {
        classification::status_codes(value)
    }

    pub fn is_client_error<V: Inspect + ?Sized>(&self, value: &V) -> bool {
        classification::is_client_error(value)
    }

    pub fn is_rate_limited<V: Inspect + ?Sized>(&self, value: &V) -> bool {
        classification::is_rate_limited(value)
    }
}

/// Builder for [`Caller`] with injectable collaborators
pub struct CallerBuilder<C> {
    config: CallerConfig,
    classifier: C,
    limiter: Option<Arc<dyn RateLimiter>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CallerBuilder<StatusClassifier> {
    pub fn new() -> Self {
        Self { config: CallerConfig::default(), classifier: StatusClassifier, limiter: None, clock: None }
    }
}

impl Default for CallerBuilder<StatusClassifier> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> CallerBuilder<C> {
    pub fn config(mut self, config: CallerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn retry(mut self, options: RetryOptions) -> Self {
        self.config.retry = options;
        self
    }

    pub fn token_bucket(mut self, options: TokenBucketOptions) -> Self {
        self.config.token_bucket = options;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    /// Replace the built-in token bucket
    pub fn limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Wall clock used to resolve `Retry-After` dates
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn classifier<K>(self, classifier: K) -> CallerBuilder<K> {
        CallerBuilder { config: self.config, classifier, limiter: self.limiter, clock: self.clock }
    }

    pub fn build(self) -> ConfigResult<Caller<C>> {
        self.config.validate()?;

        let limit = NonZeroUsize::new(self.config.concurrency)
            .ok_or_else(|| ConfigError::invalid("concurrency", "must be at least 1"))?;

        let limiter = match self.limiter {
            Some(limiter) => limiter,
            None => {
                let bucket = TokenBucket::from_config_with_clock(
                    self.config.token_bucket.to_bucket_config(),
                    TokioClock,
                )?;
                Arc::new(bucket) as Arc<dyn RateLimiter>
            }
        };

        let delays = match self.clock {
            Some(clock) => DelayCalculator::with_clock(self.config.retry, clock),
            None => DelayCalculator::new(self.config.retry),
        };

        debug!(concurrency = limit.get(), "Caller built");

        Ok(Caller {
            admission: AdmissionQueue::new(limit),
            engine: RetryEngine::new(delays, RateGate::new(limiter)),
            classifier: self.classifier,
        })
    }
}
