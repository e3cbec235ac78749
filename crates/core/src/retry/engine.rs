//! Attempt loop
//!
//! ```text
//! Attempting(n) --resolved, not rate limited------------> Succeeded
//!               --resolved, rate limited----------------> RetryScheduled(n)
//!               --rejected, client error (not 429)------> FailedTerminal
//!               --rejected, anything else---------------> RetryScheduled(n)
//! Attempting(max) --resolved--------> returned unclassified
//!                 --rejected--------> Exhausted
//! RetryScheduled(n) --sleep--> Attempting(n + 1)
//! ```
//!
//! Outcomes are handed back exactly as the operation produced them.

use std::future::Future;

use tracing::{debug, info, warn};

use super::delay::{DelayCalculator, RetryDelay};
use crate::classification::Classifier;
use crate::gate::RateGate;

/// What to do after a non-final attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Succeeded,
    FailedTerminal,
    RetryScheduled(RetryDelay),
}

/// Drives attempts through the rate gate, classifier and delay calculator
#[derive(Debug, Clone)]
pub struct RetryEngine {
    delays: DelayCalculator,
    gate: RateGate,
}

impl RetryEngine {
    pub fn new(delays: DelayCalculator, gate: RateGate) -> Self {
        Self { delays, gate }
    }

    pub fn delays(&self) -> &DelayCalculator {
        &self.delays
    }

    /// Run `operation` until it succeeds, fails terminally, or runs out of
    /// attempts
    pub async fn run<T, E, C, F, Fut>(&self, classifier: &C, mut operation: F) -> Result<T, E>
    where
        C: Classifier<T, E> + ?Sized,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.delays.options().max_attempts();
        let mut attempt: u32 = 1;

        loop {
            let delay = {
                self.gate.admit().await;
                debug!(attempt, max_attempts, "Starting attempt");
                let outcome = operation().await;

                if attempt >= max_attempts {
                    match &outcome {
                        Ok(_) => debug!(attempt, "Final attempt resolved"),
                        Err(_) => warn!(attempt, "Retries exhausted"),
                    }
                    return outcome;
                }

                match self.step(classifier, &outcome, attempt) {
                    Step::Succeeded | Step::FailedTerminal => return outcome,
                    Step::RetryScheduled(delay) => delay,
                }
            };

            if let Some(hint) = delay.server_hint {
                self.gate.withhold_for(hint);
            }
            tokio::time::sleep(delay.wait).await;
            attempt += 1;
        }
    }

    fn step<T, E, C>(&self, classifier: &C, outcome: &Result<T, E>, attempt: u32) -> Step
    where
        C: Classifier<T, E> + ?Sized,
    {
        match outcome {
            Ok(value) => {
                let verdict = classifier.identify_result(value);
                if !verdict.rate_limited {
                    debug!(attempt, "Attempt succeeded");
                    return Step::Succeeded;
                }

                let headers = classifier.result_headers(value);
                let delay = self.delays.next_delay(attempt, headers.as_deref());
                info!(
                    attempt,
                    rate_limited = true,
                    delay_ms = delay.wait.as_millis() as u64,
                    "Resolved value was rate limited, retrying"
                );
                Step::RetryScheduled(delay)
            }
            Err(error) => {
                let verdict = classifier.identify_error(error);
                if verdict.is_terminal() {
                    warn!(attempt, dont_retry = true, "Client error, not retrying");
                    return Step::FailedTerminal;
                }

                let headers = classifier.error_headers(error);
                let delay = self.delays.next_delay(attempt, headers.as_deref());
                warn!(
                    attempt,
                    rate_limited = verdict.rate_limited,
                    delay_ms = delay.wait.as_millis() as u64,
                    "Attempt failed, retrying"
                );
                Step::RetryScheduled(delay)
            }
        }
    }
}
