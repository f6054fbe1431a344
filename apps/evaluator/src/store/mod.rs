//! Work source and result store.
//!
//! `EvaluationStore` is the seam between the pipeline and the datamart:
//! - reading work items for a scope, in the order the datamart returns them
//! - the existing-evaluation index used for resume
//! - idempotent upserts keyed by `answer_id`
//! - clearing evaluations for a forced redo
//! - aggregate evaluation statistics
//!
//! `TranscriptStore` is the write side the Hireflix sync feeds: interviews,
//! questions and transcripts, plus the last-sync marker.
//!
//! `PgEvaluationStore` is the production backend. `MemoryEvaluationStore`
//! (tests only) satisfies the same contract in memory.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    EvaluationOutcome, EvaluationStats, ExistingEvaluation, RunScope, SyncedInterview, WorkItem,
};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgEvaluationStore;

/// Transcripts shorter than this are left out of the pending sweep.
pub const MIN_PENDING_TRANSCRIPT_CHARS: i32 = 20;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unsupported scope: {0}")]
    UnsupportedScope(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait EvaluationStore: Send + Sync {
    /// Work items for `scope`, in source order.
    async fn fetch_work(&self, scope: &RunScope) -> StoreResult<Vec<WorkItem>>;

    /// Answers in `scope` that already have a stored evaluation.
    async fn existing_evaluations(
        &self,
        scope: &RunScope,
    ) -> StoreResult<HashMap<String, ExistingEvaluation>>;

    /// Deletes stored evaluations in `scope`; returns the number removed.
    /// Only interview and position scopes can be cleared.
    async fn clear_evaluations(&self, scope: &RunScope) -> StoreResult<u64>;

    /// Inserts or overwrites the single evaluation row for `answer_id`.
    async fn upsert_evaluation(
        &self,
        answer_id: &str,
        interview_id: &str,
        question_id: &str,
        outcome: &EvaluationOutcome,
    ) -> StoreResult<()>;

    /// Answer/evaluation counts, for one position or the whole datamart.
    async fn evaluation_stats(&self, position_id: Option<&str>) -> StoreResult<EvaluationStats>;
}

#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// When the last incremental sync that saved anything started.
    async fn last_sync(&self) -> StoreResult<Option<DateTime<Utc>>>;

    async fn record_sync(&self, at: DateTime<Utc>) -> StoreResult<()>;

    /// Upserts the interview, its questions and its answers in one
    /// transaction. Rows are keyed by their Hireflix ids.
    async fn save_interview(&self, interview: &SyncedInterview) -> StoreResult<()>;
}
