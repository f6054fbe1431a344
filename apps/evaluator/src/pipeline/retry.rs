//! Retry/Backoff Controller.
//!
//! One policy object replaces the per-script retry loops: attempts are
//! bounded by `max_attempts`, and only failure kinds the policy marks
//! retryable are retried, with capped exponential backoff
//! (`min(cap, base * 2^(attempt-1))`, i.e. 5s, 10s, 20s, 30s, ...).

use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::evaluation_client::{Evaluator, Failure, FailureKind};
use crate::models::{EvaluationOutcome, WorkItem};
use crate::pipeline::governor::RateGovernor;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5000);
pub const DEFAULT_CAP_DELAY: Duration = Duration::from_millis(30_000);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub cap_delay: Duration,
    retryable: Vec<FailureKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            cap_delay: DEFAULT_CAP_DELAY,
            retryable: vec![FailureKind::RateLimited],
        }
    }
}

/// How a retried evaluation ended.
#[derive(Debug)]
pub enum RetryResult {
    Evaluated(EvaluationOutcome),
    /// A non-retryable failure; no further attempts were made.
    Failed(Failure),
    /// Every attempt failed with a retryable failure.
    Exhausted(Failure),
}

#[derive(Debug)]
pub struct RetryReport {
    pub result: RetryResult,
    pub attempts: u32,
    /// Number of 429 responses seen across all attempts.
    pub rate_limited: u32,
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Timeouts are terminal unless the caller opts in here.
    pub fn retry_timeouts(mut self, enabled: bool) -> Self {
        self.retryable.retain(|k| *k != FailureKind::Timeout);
        if enabled {
            self.retryable.push(FailureKind::Timeout);
        }
        self
    }

    pub fn is_retryable(&self, kind: FailureKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// Sleep after failed attempt number `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.cap_delay)
    }

    /// Evaluates `item`, retrying retryable failures. Attempts are strictly
    /// sequential, so at most one request for the item is ever in flight.
    /// Every request and every 429 is reported to `governor`.
    pub async fn with_retry(
        &self,
        evaluator: &dyn Evaluator,
        item: &WorkItem,
        model_id: &str,
        governor: &mut RateGovernor,
    ) -> RetryReport {
        let mut rate_limited = 0;
        let mut attempt = 1;

        loop {
            governor.record_request(Instant::now());
            info!(
                "Rate limit status: {} requests/minute, total: {}, rate limits: {}",
                governor.requests_in_last_minute(),
                governor.total_requests(),
                governor.rate_limit_hits()
            );

            let failure = match evaluator.evaluate(item, model_id).await {
                Ok(outcome) => {
                    return RetryReport {
                        result: RetryResult::Evaluated(outcome),
                        attempts: attempt,
                        rate_limited,
                    }
                }
                Err(failure) => failure,
            };

            if failure.is_rate_limited() {
                rate_limited += 1;
                governor.record_rate_limit();
                if let Some(hints) = &failure.hints {
                    warn!(
                        "Rate limit info: limit={:?} remaining={:?} reset={:?} retry_after={:?}s",
                        hints.limit, hints.remaining, hints.reset, hints.retry_after_secs
                    );
                }
            }

            if !self.is_retryable(failure.kind) {
                error!("Evaluation of answer {} failed: {failure}", item.answer_id);
                return RetryReport {
                    result: RetryResult::Failed(failure),
                    attempts: attempt,
                    rate_limited,
                };
            }

            if attempt >= self.max_attempts {
                error!(
                    "Evaluation of answer {} failed after {attempt} attempts: {failure}",
                    item.answer_id
                );
                return RetryReport {
                    result: RetryResult::Exhausted(failure),
                    attempts: attempt,
                    rate_limited,
                };
            }

            let delay = self.backoff_delay(attempt);
            warn!(
                "{} for answer {}. Retrying in {}ms (attempt {}/{})...",
                failure.kind,
                item.answer_id,
                delay.as_millis(),
                attempt + 1,
                self.max_attempts
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
