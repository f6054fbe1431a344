use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, info};

use super::{
    EvaluationStore, StoreError, StoreResult, TranscriptStore, MIN_PENDING_TRANSCRIPT_CHARS,
};
use crate::models::{
    EvaluationOutcome, EvaluationStats, ExistingEvaluation, RunScope, SyncedInterview, WorkItem,
};

/// Row id of the transcript sync marker in `sync_metadata`.
const TRANSCRIPT_SYNC_ID: &str = "hireflix_transcript_sync";

const WORK_ITEM_COLUMNS: &str = r#"
    dm.answer_id::text AS answer_id,
    dm.interview_id::text AS interview_id,
    dm.question_id::text AS question_id,
    dm.question_title,
    dm.question_description,
    dm.transcription_text AS answer_text,
    dm.candidate_email
"#;

const EXISTING_COLUMNS: &str = r#"
    eval.answer_id::text AS answer_id,
    eval.gpt_model,
    eval.evaluation_timestamp::timestamptz AS evaluation_timestamp
"#;

/// Postgres-backed store over `interview_answers_datamart` and
/// `ai_evaluation_results`.
#[derive(Clone)]
pub struct PgEvaluationStore {
    pool: PgPool,
}

impl PgEvaluationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EvaluationStore for PgEvaluationStore {
    async fn fetch_work(&self, scope: &RunScope) -> StoreResult<Vec<WorkItem>> {
        let items = match scope {
            RunScope::Interview(interview_id) => {
                sqlx::query_as::<_, WorkItem>(&format!(
                    r#"
                    SELECT {WORK_ITEM_COLUMNS}
                    FROM interview_answers_datamart dm
                    WHERE dm.interview_id::text = $1
                    ORDER BY dm.question_order
                    "#
                ))
                .bind(interview_id)
                .fetch_all(&self.pool)
                .await?
            }
            RunScope::Position(position_id) => {
                sqlx::query_as::<_, WorkItem>(&format!(
                    r#"
                    SELECT {WORK_ITEM_COLUMNS}
                    FROM interview_answers_datamart dm
                    WHERE dm.position_id::text = $1
                    ORDER BY dm.interview_id, dm.question_order
                    "#
                ))
                .bind(position_id)
                .fetch_all(&self.pool)
                .await?
            }
            RunScope::Pending => {
                sqlx::query_as::<_, WorkItem>(&format!(
                    r#"
                    SELECT {WORK_ITEM_COLUMNS}
                    FROM interview_answers_datamart dm
                    LEFT JOIN ai_evaluation_results eval ON dm.answer_id::text = eval.answer_id
                    WHERE eval.answer_id IS NULL
                      AND dm.transcription_text IS NOT NULL
                      AND LENGTH(dm.transcription_text) >= $1
                    ORDER BY dm.interview_id, dm.question_order
                    "#
                ))
                .bind(MIN_PENDING_TRANSCRIPT_CHARS)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(items)
    }

    async fn existing_evaluations(
        &self,
        scope: &RunScope,
    ) -> StoreResult<HashMap<String, ExistingEvaluation>> {
        let rows = match scope {
            RunScope::Interview(interview_id) => {
                sqlx::query_as::<_, ExistingEvaluation>(&format!(
                    r#"
                    SELECT {EXISTING_COLUMNS}
                    FROM ai_evaluation_results eval
                    WHERE eval.answer_id IN (
                        SELECT answer_id::text FROM interview_answers_datamart
                        WHERE interview_id::text = $1
                    )
                    "#
                ))
                .bind(interview_id)
                .fetch_all(&self.pool)
                .await?
            }
            RunScope::Position(position_id) => {
                sqlx::query_as::<_, ExistingEvaluation>(&format!(
                    r#"
                    SELECT {EXISTING_COLUMNS}
                    FROM ai_evaluation_results eval
                    WHERE eval.answer_id IN (
                        SELECT answer_id::text FROM interview_answers_datamart
                        WHERE position_id::text = $1
                    )
                    "#
                ))
                .bind(position_id)
                .fetch_all(&self.pool)
                .await?
            }
            // The pending query already excludes evaluated answers.
            RunScope::Pending => Vec::new(),
        };
        Ok(rows
            .into_iter()
            .map(|row| (row.answer_id.clone(), row))
            .collect())
    }

    async fn clear_evaluations(&self, scope: &RunScope) -> StoreResult<u64> {
        let result = match scope {
            RunScope::Interview(interview_id) => {
                sqlx::query(
                    r#"
                    DELETE FROM ai_evaluation_results
                    WHERE answer_id IN (
                        SELECT answer_id::text FROM interview_answers_datamart
                        WHERE interview_id::text = $1
                    )
                    "#,
                )
                .bind(interview_id)
                .execute(&self.pool)
                .await?
            }
            RunScope::Position(position_id) => {
                sqlx::query(
                    r#"
                    DELETE FROM ai_evaluation_results
                    WHERE answer_id IN (
                        SELECT answer_id::text FROM interview_answers_datamart
                        WHERE position_id::text = $1
                    )
                    "#,
                )
                .bind(position_id)
                .execute(&self.pool)
                .await?
            }
            RunScope::Pending => {
                return Err(StoreError::UnsupportedScope(
                    "either a position or an interview must be given to clear evaluations"
                        .to_string(),
                ))
            }
        };
        info!("Cleared {} evaluations for {scope}", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn upsert_evaluation(
        &self,
        answer_id: &str,
        interview_id: &str,
        question_id: &str,
        outcome: &EvaluationOutcome,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ai_evaluation_results (
                answer_id, interview_id, question_id,
                evaluation_addressing, evaluation_be_specific, evaluation_openness,
                evaluation_summary, gpt_model, evaluation_prompt_version,
                evaluation_timestamp, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            ON CONFLICT (answer_id)
            DO UPDATE SET
                interview_id = EXCLUDED.interview_id,
                question_id = EXCLUDED.question_id,
                evaluation_addressing = EXCLUDED.evaluation_addressing,
                evaluation_be_specific = EXCLUDED.evaluation_be_specific,
                evaluation_openness = EXCLUDED.evaluation_openness,
                evaluation_summary = EXCLUDED.evaluation_summary,
                gpt_model = EXCLUDED.gpt_model,
                evaluation_prompt_version = EXCLUDED.evaluation_prompt_version,
                evaluation_timestamp = EXCLUDED.evaluation_timestamp,
                updated_at = NOW()
            "#,
        )
        .bind(answer_id)
        .bind(interview_id)
        .bind(question_id)
        .bind(i32::from(outcome.scores.addressing))
        .bind(i32::from(outcome.scores.specificity))
        .bind(i32::from(outcome.scores.openness))
        .bind(&outcome.summary)
        .bind(&outcome.model_used)
        .bind(&outcome.prompt_version)
        .bind(outcome.timestamp)
        .execute(&self.pool)
        .await?;

        info!("Stored evaluation for answer {answer_id} (interview {interview_id}, question {question_id})");
        Ok(())
    }

    async fn evaluation_stats(&self, position_id: Option<&str>) -> StoreResult<EvaluationStats> {
        Ok(sqlx::query_as::<_, EvaluationStats>(
            r#"
            SELECT
                COUNT(dm.answer_id) AS total_answers,
                COUNT(eval.answer_id) AS evaluated_answers,
                COUNT(dm.answer_id) - COUNT(eval.answer_id) AS pending_answers,
                COUNT(DISTINCT eval.gpt_model) AS models_used,
                COUNT(DISTINCT eval.evaluation_prompt_version) AS prompt_versions_used
            FROM interview_answers_datamart dm
            LEFT JOIN ai_evaluation_results eval ON dm.answer_id::text = eval.answer_id
            WHERE $1::text IS NULL OR dm.position_id::text = $1
            "#,
        )
        .bind(position_id)
        .fetch_one(&self.pool)
        .await?)
    }
}

#[async_trait]
impl TranscriptStore for PgEvaluationStore {
    async fn last_sync(&self) -> StoreResult<Option<DateTime<Utc>>> {
        let row: Option<Option<DateTime<Utc>>> = sqlx::query_scalar(
            "SELECT last_sync_timestamp FROM sync_metadata WHERE id = $1",
        )
        .bind(TRANSCRIPT_SYNC_ID)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.flatten())
    }

    async fn record_sync(&self, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_metadata (id, last_sync_timestamp, updated_at)
            VALUES ($1, $2, $2)
            ON CONFLICT (id)
            DO UPDATE SET last_sync_timestamp = $2, updated_at = $2
            "#,
        )
        .bind(TRANSCRIPT_SYNC_ID)
        .bind(at)
        .execute(&self.pool)
        .await?;
        info!("Updated last sync timestamp to {}", at.to_rfc3339());
        Ok(())
    }

    async fn save_interview(&self, interview: &SyncedInterview) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO interviews (
                id, candidate_email, candidate_first_name, candidate_last_name,
                position_id, status, updated_at
            ) VALUES ($1, $2, $3, $4, $5, 'completed', NOW())
            ON CONFLICT (id)
            DO UPDATE SET
                candidate_email = COALESCE(EXCLUDED.candidate_email, interviews.candidate_email),
                candidate_first_name = COALESCE(EXCLUDED.candidate_first_name, interviews.candidate_first_name),
                candidate_last_name = COALESCE(EXCLUDED.candidate_last_name, interviews.candidate_last_name),
                position_id = EXCLUDED.position_id,
                status = EXCLUDED.status,
                updated_at = NOW()
            "#,
        )
        .bind(&interview.interview_id)
        .bind(&interview.candidate.email)
        .bind(&interview.candidate.first_name)
        .bind(&interview.candidate.last_name)
        .bind(&interview.position_id)
        .execute(&mut *tx)
        .await?;

        for question in &interview.questions {
            sqlx::query(
                r#"
                INSERT INTO interview_questions (id, interview_id, title, description, question_order)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id)
                DO UPDATE SET
                    title = EXCLUDED.title,
                    description = EXCLUDED.description,
                    question_order = EXCLUDED.question_order
                "#,
            )
            .bind(&question.question_id)
            .bind(&interview.interview_id)
            .bind(&question.title)
            .bind(&question.description)
            .bind(question.order)
            .execute(&mut *tx)
            .await?;

            let Some(answer) = &question.answer else {
                continue;
            };
            sqlx::query(
                r#"
                INSERT INTO interview_answers (
                    id, question_id, interview_id, video_url,
                    transcription_text, transcription_language, transcription_words, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
                ON CONFLICT (id)
                DO UPDATE SET
                    video_url = EXCLUDED.video_url,
                    transcription_text = EXCLUDED.transcription_text,
                    transcription_language = EXCLUDED.transcription_language,
                    transcription_words = EXCLUDED.transcription_words,
                    updated_at = NOW()
                "#,
            )
            .bind(&answer.answer_id)
            .bind(&question.question_id)
            .bind(&interview.interview_id)
            .bind(&answer.video_url)
            .bind(&answer.transcript)
            .bind(&answer.language)
            .bind(answer.words.as_ref().map(Json))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            "Saved interview {} ({} questions)",
            interview.interview_id,
            interview.questions.len()
        );
        Ok(())
    }
}
