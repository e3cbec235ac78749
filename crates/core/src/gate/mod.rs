//! Rate gate
//!
//! Every attempt, retries included, passes through the gate before the
//! operation runs. The gate owns no rate-limiting math; it forwards to a
//! [`RateLimiter`] port. [`TokenBucket`] from `callgate-common` implements the
//! port and is what [`Caller::new`](crate::Caller::new) wires in.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use callgate_common::{Clock, TokenBucket};
use tracing::trace;

/// Rate limiter capability consumed by the engine
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Resolve once one unit has been consumed
    async fn acquire(&self);

    /// Consume one unit if available, without waiting
    fn try_acquire(&self) -> bool;

    /// Grant nothing until `duration` has elapsed
    fn withhold_for(&self, duration: Duration);
}

#[async_trait]
impl<C: Clock> RateLimiter for TokenBucket<C> {
    async fn acquire(&self) {
        TokenBucket::acquire(self).await;
    }

    fn try_acquire(&self) -> bool {
        TokenBucket::try_acquire(self, 1)
    }

    fn withhold_for(&self, duration: Duration) {
        TokenBucket::withhold_for(self, duration);
    }
}

/// Limiter that grants immediately and ignores withhold requests
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

#[async_trait]
impl RateLimiter for Unlimited {
    async fn acquire(&self) {}

    fn try_acquire(&self) -> bool {
        true
    }

    fn withhold_for(&self, _duration: Duration) {}
}

/// Adapter between the retry engine and a [`RateLimiter`]
#[derive(Clone)]
pub struct RateGate {
    limiter: Arc<dyn RateLimiter>,
}

impl std::fmt::Debug for RateGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGate").finish_non_exhaustive()
    }
}

impl RateGate {
    pub fn new(limiter: Arc<dyn RateLimiter>) -> Self {
        Self { limiter }
    }

    pub fn unlimited() -> Self {
        Self::new(Arc::new(Unlimited))
    }

    /// Wait for the limiter to grant one unit
    pub async fn admit(&self) {
        self.limiter.acquire().await;
        trace!("Rate gate admitted attempt");
    }

    /// Forward a server-mandated pause to the limiter
    pub fn withhold_for(&self, duration: Duration) {
        self.limiter.withhold_for(duration);
    }
}
