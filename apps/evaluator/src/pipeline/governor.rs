//! Rate Governor — advisory request pacing.
//!
//! Tracks request timestamps over a sliding one-minute window for reporting,
//! and grows the inter-item delay once the run has seen a rate-limit error.
//! It never blocks or queues requests itself; the batch driver sleeps for
//! whatever `next_delay` returns.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_BASELINE_DELAY: Duration = Duration::from_millis(3000);
pub const MAX_DELAY: Duration = Duration::from_millis(30_000);
pub const DELAY_GROWTH_FACTOR: f64 = 1.5;
const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct RateGovernor {
    baseline: Duration,
    recent: VecDeque<Instant>,
    total_requests: u64,
    rate_limit_hits: u64,
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::new(DEFAULT_BASELINE_DELAY)
    }
}

impl RateGovernor {
    pub fn new(baseline: Duration) -> Self {
        Self {
            baseline,
            recent: VecDeque::new(),
            total_requests: 0,
            rate_limit_hits: 0,
        }
    }

    pub fn baseline(&self) -> Duration {
        self.baseline
    }

    pub fn record_request(&mut self, at: Instant) {
        self.recent.push_back(at);
        self.total_requests += 1;
    }

    pub fn record_rate_limit(&mut self) {
        self.rate_limit_hits += 1;
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn rate_limit_hits(&self) -> u64 {
        self.rate_limit_hits
    }

    pub fn requests_in_last_minute(&mut self) -> usize {
        self.requests_in_window(Instant::now())
    }

    /// Drops timestamps at least a minute older than `now`, then counts the rest.
    pub fn requests_in_window(&mut self, now: Instant) -> usize {
        while let Some(&oldest) = self.recent.front() {
            if now.saturating_duration_since(oldest) >= WINDOW {
                self.recent.pop_front();
            } else {
                break;
            }
        }
        self.recent.len()
    }

    /// Delay before the next item. Once a rate limit has been hit in this
    /// run, each call grows `current` by 1.5x up to `MAX_DELAY`; otherwise
    /// the delay stays at the baseline.
    pub fn next_delay(&self, current: Duration, rate_limit_hit: bool) -> Duration {
        if rate_limit_hit {
            current.mul_f64(DELAY_GROWTH_FACTOR).min(MAX_DELAY)
        } else {
            self.baseline
        }
    }
}
