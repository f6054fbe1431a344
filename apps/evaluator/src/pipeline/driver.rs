//! Batch Driver — one sequential evaluation run over a scope.
//!
//! A run validates its request, loads the work items together with the
//! existing-evaluation index (or clears it for a forced redo), skips or
//! evaluates and persists each item in turn, then applies the error-rate gate.
//!
//! Item-level failures never abort the loop. Only the summary gate, a
//! configuration error or a failure to load work fails the run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::evaluation_client::{Evaluator, FailureKind};
use crate::models::{ExistingEvaluation, RunScope, WorkItem};
use crate::pipeline::governor::{RateGovernor, DEFAULT_BASELINE_DELAY};
use crate::pipeline::retry::{RetryPolicy, RetryResult};
use crate::pipeline::sink::ResultSink;
use crate::store::{EvaluationStore, StoreError};

/// Runs above this error rate are hard failures.
pub const MAX_ERROR_RATE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// Answers that already have an evaluation are never re-submitted.
    SkipExisting,
    /// Stored evaluations in scope are cleared first, then everything is re-evaluated.
    ForceRedo,
}

impl ResumeMode {
    pub fn from_force_redo(force_redo: bool) -> Self {
        if force_redo {
            ResumeMode::ForceRedo
        } else {
            ResumeMode::SkipExisting
        }
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load work: {0}")]
    Store(#[from] StoreError),
}

/// Per-run counters. Lives only as long as the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStatistics {
    pub total_items: u64,
    pub processed: u64,
    /// Items not submitted: already evaluated plus incomplete.
    pub skipped: u64,
    /// Subset of `skipped` lacking question or answer text.
    pub incomplete: u64,
    pub errors: u64,
    /// 429 responses, counted per response rather than per item.
    pub rate_limit_errors: u64,
    /// Items that failed for any reason other than rate-limit exhaustion.
    pub other_errors: u64,
    pub requests: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum RunVerdict {
    Succeeded,
    /// Nothing was processed and at least one item failed.
    AllFailed,
    HighErrorRate(f64),
}

impl RunVerdict {
    pub fn is_failure(&self) -> bool {
        !matches!(self, RunVerdict::Succeeded)
    }
}

impl RunStatistics {
    /// `errors / (processed + errors)`, or 0 when nothing was attempted.
    pub fn error_rate(&self) -> f64 {
        let attempted = self.processed + self.errors;
        if attempted == 0 {
            0.0
        } else {
            self.errors as f64 / attempted as f64
        }
    }

    pub fn verdict(&self) -> RunVerdict {
        if self.processed == 0 && self.errors > 0 {
            return RunVerdict::AllFailed;
        }
        let rate = self.error_rate();
        if rate > MAX_ERROR_RATE {
            RunVerdict::HighErrorRate(rate)
        } else {
            RunVerdict::Succeeded
        }
    }
}

#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub model_id: String,
    pub retry: RetryPolicy,
    /// Baseline pause between two evaluations.
    pub base_delay: Duration,
}

impl DriverSettings {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            retry: RetryPolicy::default(),
            base_delay: DEFAULT_BASELINE_DELAY,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub scope: String,
    pub model_id: String,
    pub stats: RunStatistics,
    pub verdict: RunVerdict,
    pub requests_last_minute: usize,
    pub base_delay_ms: u128,
}

impl RunReport {
    pub fn is_failure(&self) -> bool {
        self.verdict.is_failure()
    }

    pub fn log_summary(&self) {
        let s = &self.stats;
        info!("Evaluation summary for {} (model {}):", self.scope, self.model_id);
        info!("  Newly processed: {}", s.processed);
        info!("  Previously evaluated: {}", s.skipped - s.incomplete);
        info!("  Skipped incomplete: {}", s.incomplete);
        info!("  Errors: {}", s.errors);
        info!("  Error rate: {:.1}%", self.stats.error_rate() * 100.0);
        info!("API request statistics:");
        info!("  Total requests: {}", s.requests);
        info!("  Successful: {}", s.processed);
        info!("  Rate limit errors: {}", s.rate_limit_errors);
        info!("  Other errors: {}", s.other_errors);
        info!("  Final requests/minute: {}", self.requests_last_minute);

        if s.rate_limit_errors > 0 {
            warn!(
                "Encountered {} rate limit errors. Consider increasing RATE_LIMIT_DELAY (current: {}ms) or using a model with higher limits.",
                s.rate_limit_errors, self.base_delay_ms
            );
        }

        match self.verdict {
            RunVerdict::Succeeded => {}
            RunVerdict::AllFailed => error!("FAILED: All evaluations failed"),
            RunVerdict::HighErrorRate(rate) => {
                error!("FAILED: High error rate: {:.1}%", rate * 100.0)
            }
        }
    }
}

pub struct BatchDriver {
    store: Arc<dyn EvaluationStore>,
    evaluator: Arc<dyn Evaluator>,
    sink: ResultSink,
    settings: DriverSettings,
}

impl BatchDriver {
    pub fn new(
        store: Arc<dyn EvaluationStore>,
        evaluator: Arc<dyn Evaluator>,
        sink: ResultSink,
        settings: DriverSettings,
    ) -> Self {
        Self {
            store,
            evaluator,
            sink,
            settings,
        }
    }

    pub async fn run(&self, scope: &RunScope, mode: ResumeMode) -> Result<RunReport, DriverError> {
        // Validate the run request
        if self.settings.model_id.trim().is_empty() {
            return Err(DriverError::Config("model id must not be empty".to_string()));
        }
        if mode == ResumeMode::ForceRedo && *scope == RunScope::Pending {
            return Err(DriverError::Config(
                "force redo needs an interview or position scope".to_string(),
            ));
        }
        info!("Starting evaluation for {scope}");
        info!("Using model: {}", self.settings.model_id);
        match mode {
            ResumeMode::SkipExisting => info!("Resume mode: ENABLED (skip existing)"),
            ResumeMode::ForceRedo => info!("Resume mode: DISABLED (force redo)"),
        }

        // Load work and the existing-evaluation index
        let existing = match mode {
            ResumeMode::SkipExisting => self.store.existing_evaluations(scope).await?,
            ResumeMode::ForceRedo => {
                let cleared = self.store.clear_evaluations(scope).await?;
                info!("Force redo: cleared {cleared} evaluations for re-processing");
                HashMap::new()
            }
        };
        let work = self.store.fetch_work(scope).await?;
        info!(
            "Found {} question-answer pairs, {} already evaluated",
            work.len(),
            existing.len()
        );
        if work.is_empty() {
            warn!("No question-answer pairs found for {scope}");
        }

        // Evaluate items one at a time
        let mut stats = RunStatistics {
            total_items: work.len() as u64,
            ..RunStatistics::default()
        };
        let mut governor = RateGovernor::new(self.settings.base_delay);
        self.item_loop(&work, &existing, &mut stats, &mut governor)
            .await;

        // Apply the error-rate gate
        let verdict = stats.verdict();
        Ok(RunReport {
            scope: scope.to_string(),
            model_id: self.settings.model_id.clone(),
            stats,
            verdict,
            requests_last_minute: governor.requests_in_last_minute(),
            base_delay_ms: self.settings.base_delay.as_millis(),
        })
    }

    async fn item_loop(
        &self,
        work: &[WorkItem],
        existing: &HashMap<String, ExistingEvaluation>,
        stats: &mut RunStatistics,
        governor: &mut RateGovernor,
    ) {
        let mut delay = governor.baseline();
        let mut submitted_any = false;

        for item in work {
            if let Some(prior) = existing.get(&item.answer_id) {
                info!(
                    "Skipping already evaluated answer {} (evaluated at {:?})",
                    item.answer_id, prior.evaluation_timestamp
                );
                stats.skipped += 1;
                continue;
            }

            if !item.is_complete() {
                warn!("Skipping incomplete Q&A: answer_id {}", item.answer_id);
                stats.skipped += 1;
                stats.incomplete += 1;
                continue;
            }
            let question = item.question_text().unwrap_or_default();

            // Pacing only ever sits between two submissions.
            if submitted_any {
                delay = governor.next_delay(delay, governor.rate_limit_hits() > 0);
                info!("Waiting {}ms before next request...", delay.as_millis());
                tokio::time::sleep(delay).await;
            }
            submitted_any = true;

            info!(
                "Evaluating answer {} ({}/{}) for question: \"{question}\"",
                item.answer_id,
                stats.processed + stats.skipped + stats.errors + 1,
                stats.total_items
            );

            let report = self
                .settings
                .retry
                .with_retry(
                    self.evaluator.as_ref(),
                    item,
                    &self.settings.model_id,
                    governor,
                )
                .await;
            stats.requests += u64::from(report.attempts);
            stats.rate_limit_errors += u64::from(report.rate_limited);

            match report.result {
                RetryResult::Evaluated(outcome) => {
                    match self.sink.persist(item, &question, &outcome).await {
                        Ok(()) => {
                            info!(
                                "Stored evaluation for answer {}: addressing={} specificity={} openness={}",
                                item.answer_id,
                                outcome.scores.addressing,
                                outcome.scores.specificity,
                                outcome.scores.openness
                            );
                            stats.processed += 1;
                        }
                        Err(e) => {
                            error!("Failed to store evaluation for answer {}: {e}", item.answer_id);
                            stats.errors += 1;
                            stats.other_errors += 1;
                        }
                    }
                }
                RetryResult::Failed(failure) | RetryResult::Exhausted(failure) => {
                    stats.errors += 1;
                    if failure.kind != FailureKind::RateLimited {
                        stats.other_errors += 1;
                    }
                }
            }
        }
    }
}
