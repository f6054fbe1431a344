//! Result Sink — persists one evaluation and writes its audit backup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::models::{EvaluationOutcome, WorkItem};
use crate::store::{EvaluationStore, StoreResult};

pub struct ResultSink {
    store: Arc<dyn EvaluationStore>,
    backup_dir: Option<PathBuf>,
}

impl ResultSink {
    pub fn new(store: Arc<dyn EvaluationStore>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            backup_dir: Some(backup_dir.into()),
        }
    }

    pub fn without_backups(store: Arc<dyn EvaluationStore>) -> Self {
        Self {
            store,
            backup_dir: None,
        }
    }

    pub fn backup_dir(&self) -> Option<&Path> {
        self.backup_dir.as_deref()
    }

    /// Upserts the outcome keyed by `answer_id` (last write wins), then writes
    /// the backup file. A failed backup is logged and otherwise ignored.
    pub async fn persist(
        &self,
        item: &WorkItem,
        question: &str,
        outcome: &EvaluationOutcome,
    ) -> StoreResult<()> {
        self.store
            .upsert_evaluation(&item.answer_id, &item.interview_id, &item.question_id, outcome)
            .await?;

        if let Some(dir) = &self.backup_dir {
            match write_backup(dir, item, question, outcome).await {
                Ok(path) => info!("Saved evaluation backup: {}", path.display()),
                Err(e) => warn!(
                    "Failed to write evaluation backup for answer {}: {e}",
                    item.answer_id
                ),
            }
        }
        Ok(())
    }
}

/// Full response payload plus the identifiers and the original question and
/// answer text.
pub fn backup_payload(item: &WorkItem, question: &str, outcome: &EvaluationOutcome) -> Value {
    let mut payload = match &outcome.raw {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    let extra = json!({
        "answer_id": item.answer_id,
        "interview_id": item.interview_id,
        "question_id": item.question_id,
        "question": question,
        "answer": item.answer_text,
        "model_used": outcome.model_used,
        "prompt_version": outcome.prompt_version,
        "scores": outcome.scores,
        "summary": outcome.summary,
        "evaluated_at": outcome.timestamp,
    });
    if let Value::Object(extra) = extra {
        payload.extend(extra);
    }
    Value::Object(payload)
}

async fn write_backup(
    dir: &Path,
    item: &WorkItem,
    question: &str,
    outcome: &EvaluationOutcome,
) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let filename = format!(
        "evaluation_{}_{}_{}.json",
        file_safe(&item.interview_id),
        file_safe(&item.answer_id),
        Utc::now().timestamp_millis()
    );
    let path = dir.join(filename);
    let body = serde_json::to_vec_pretty(&backup_payload(item, question, outcome))?;
    tokio::fs::write(&path, body).await?;
    Ok(path)
}

fn file_safe(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
