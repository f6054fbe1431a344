//! In-memory `EvaluationStore` for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    EvaluationStore, StoreError, StoreResult, TranscriptStore, MIN_PENDING_TRANSCRIPT_CHARS,
};
use crate::models::{
    EvaluationOutcome, EvaluationStats, ExistingEvaluation, RunScope, SyncedInterview, WorkItem,
};

#[derive(Debug, Clone)]
pub struct StoredEvaluation {
    pub interview_id: String,
    pub question_id: String,
    pub outcome: EvaluationOutcome,
}

/// Work rows are `(position_id, item)` in source order; evaluations are keyed
/// by `answer_id`, so the one-row-per-answer invariant holds by construction.
#[derive(Debug, Default)]
pub struct MemoryEvaluationStore {
    work: Mutex<Vec<(String, WorkItem)>>,
    evaluations: Mutex<HashMap<String, StoredEvaluation>>,
    upserts: Mutex<u64>,
    fail_upserts: Mutex<HashSet<String>>,
    interviews: Mutex<HashMap<String, SyncedInterview>>,
    last_sync: Mutex<Option<DateTime<Utc>>>,
    fail_saves: Mutex<HashSet<String>>,
}

impl MemoryEvaluationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_work(position_id: &str, items: Vec<WorkItem>) -> Self {
        let store = Self::new();
        store.add_work(position_id, items);
        store
    }

    pub fn add_work(&self, position_id: &str, items: Vec<WorkItem>) {
        let mut work = self.work.lock().unwrap();
        work.extend(items.into_iter().map(|i| (position_id.to_string(), i)));
    }

    /// Makes every upsert for `answer_id` fail with a database error.
    pub fn fail_upserts_for(&self, answer_id: &str) {
        self.fail_upserts
            .lock()
            .unwrap()
            .insert(answer_id.to_string());
    }

    pub fn evaluation(&self, answer_id: &str) -> Option<StoredEvaluation> {
        self.evaluations.lock().unwrap().get(answer_id).cloned()
    }

    pub fn evaluation_count(&self) -> usize {
        self.evaluations.lock().unwrap().len()
    }

    pub fn upsert_count(&self) -> u64 {
        *self.upserts.lock().unwrap()
    }

    /// Makes `save_interview` fail for `interview_id`.
    pub fn fail_saves_for(&self, interview_id: &str) {
        self.fail_saves
            .lock()
            .unwrap()
            .insert(interview_id.to_string());
    }

    pub fn interview(&self, interview_id: &str) -> Option<SyncedInterview> {
        self.interviews.lock().unwrap().get(interview_id).cloned()
    }

    pub fn interview_count(&self) -> usize {
        self.interviews.lock().unwrap().len()
    }

    fn in_scope(&self, scope: &RunScope) -> Vec<WorkItem> {
        let work = self.work.lock().unwrap();
        let evaluations = self.evaluations.lock().unwrap();
        work.iter()
            .filter(|(position_id, item)| match scope {
                RunScope::Interview(id) => &item.interview_id == id,
                RunScope::Position(id) => position_id == id,
                RunScope::Pending => {
                    !evaluations.contains_key(&item.answer_id)
                        && item
                            .answer_text
                            .as_deref()
                            .is_some_and(|t| t.chars().count() >= MIN_PENDING_TRANSCRIPT_CHARS as usize)
                }
            })
            .map(|(_, item)| item.clone())
            .collect()
    }
}

#[async_trait]
impl EvaluationStore for MemoryEvaluationStore {
    async fn fetch_work(&self, scope: &RunScope) -> StoreResult<Vec<WorkItem>> {
        Ok(self.in_scope(scope))
    }

    async fn existing_evaluations(
        &self,
        scope: &RunScope,
    ) -> StoreResult<HashMap<String, ExistingEvaluation>> {
        let answer_ids: HashSet<String> = match scope {
            RunScope::Pending => return Ok(HashMap::new()),
            _ => self.in_scope(scope).into_iter().map(|i| i.answer_id).collect(),
        };
        let evaluations = self.evaluations.lock().unwrap();
        Ok(evaluations
            .iter()
            .filter(|(answer_id, _)| answer_ids.contains(*answer_id))
            .map(|(answer_id, stored)| {
                (
                    answer_id.clone(),
                    ExistingEvaluation {
                        answer_id: answer_id.clone(),
                        gpt_model: Some(stored.outcome.model_used.clone()),
                        evaluation_timestamp: Some(stored.outcome.timestamp),
                    },
                )
            })
            .collect())
    }

    async fn clear_evaluations(&self, scope: &RunScope) -> StoreResult<u64> {
        if *scope == RunScope::Pending {
            return Err(StoreError::UnsupportedScope(
                "either a position or an interview must be given to clear evaluations".to_string(),
            ));
        }
        let answer_ids: HashSet<String> =
            self.in_scope(scope).into_iter().map(|i| i.answer_id).collect();
        let mut evaluations = self.evaluations.lock().unwrap();
        let before = evaluations.len();
        evaluations.retain(|answer_id, _| !answer_ids.contains(answer_id));
        Ok((before - evaluations.len()) as u64)
    }

    async fn upsert_evaluation(
        &self,
        answer_id: &str,
        interview_id: &str,
        question_id: &str,
        outcome: &EvaluationOutcome,
    ) -> StoreResult<()> {
        if self.fail_upserts.lock().unwrap().contains(answer_id) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        *self.upserts.lock().unwrap() += 1;
        self.evaluations.lock().unwrap().insert(
            answer_id.to_string(),
            StoredEvaluation {
                interview_id: interview_id.to_string(),
                question_id: question_id.to_string(),
                outcome: outcome.clone(),
            },
        );
        Ok(())
    }

    async fn evaluation_stats(&self, position_id: Option<&str>) -> StoreResult<EvaluationStats> {
        let work = self.work.lock().unwrap();
        let evaluations = self.evaluations.lock().unwrap();
        let answers: Vec<&WorkItem> = work
            .iter()
            .filter(|(p, _)| position_id.map_or(true, |id| p == id))
            .map(|(_, item)| item)
            .collect();
        let evaluated: Vec<&StoredEvaluation> = answers
            .iter()
            .filter_map(|item| evaluations.get(&item.answer_id))
            .collect();
        let models: HashSet<&str> = evaluated
            .iter()
            .map(|e| e.outcome.model_used.as_str())
            .collect();
        let prompt_versions: HashSet<&str> = evaluated
            .iter()
            .map(|e| e.outcome.prompt_version.as_str())
            .collect();
        Ok(EvaluationStats {
            total_answers: answers.len() as i64,
            evaluated_answers: evaluated.len() as i64,
            pending_answers: (answers.len() - evaluated.len()) as i64,
            models_used: models.len() as i64,
            prompt_versions_used: prompt_versions.len() as i64,
        })
    }
}

/// Mirrors the datamart view: one row per answer, joined to its question
/// and the interview's candidate.
fn datamart_rows(interview: &SyncedInterview) -> Vec<WorkItem> {
    interview
        .questions
        .iter()
        .filter_map(|question| {
            question.answer.as_ref().map(|answer| WorkItem {
                answer_id: answer.answer_id.clone(),
                interview_id: interview.interview_id.clone(),
                question_id: question.question_id.clone(),
                question_title: question.title.clone(),
                question_description: question.description.clone(),
                answer_text: answer.transcript.clone(),
                candidate_email: interview.candidate.email.clone(),
            })
        })
        .collect()
}

#[async_trait]
impl TranscriptStore for MemoryEvaluationStore {
    async fn last_sync(&self) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(*self.last_sync.lock().unwrap())
    }

    async fn record_sync(&self, at: DateTime<Utc>) -> StoreResult<()> {
        *self.last_sync.lock().unwrap() = Some(at);
        Ok(())
    }

    async fn save_interview(&self, interview: &SyncedInterview) -> StoreResult<()> {
        if self.fail_saves.lock().unwrap().contains(&interview.interview_id) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        let rows = datamart_rows(interview);
        let mut work = self.work.lock().unwrap();
        for row in rows {
            match work.iter_mut().find(|(_, w)| w.answer_id == row.answer_id) {
                Some(existing) => *existing = (interview.position_id.clone(), row),
                None => work.push((interview.position_id.clone(), row)),
            }
        }
        self.interviews
            .lock()
            .unwrap()
            .insert(interview.interview_id.clone(), interview.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::models::Scores;

    fn item(answer_id: &str, interview_id: &str) -> WorkItem {
        WorkItem {
            answer_id: answer_id.to_string(),
            interview_id: interview_id.to_string(),
            question_id: format!("q-{answer_id}"),
            question_title: Some("Why this role?".to_string()),
            question_description: None,
            answer_text: Some("Because I enjoy building reliable systems.".to_string()),
            candidate_email: None,
        }
    }

    fn outcome(answer_id: &str, addressing: u8, model: &str) -> EvaluationOutcome {
        EvaluationOutcome {
            answer_id: answer_id.to_string(),
            scores: Scores {
                addressing,
                specificity: 5,
                openness: 5,
            },
            summary: "fine".to_string(),
            model_used: model.to_string(),
            prompt_version: "1.0".to_string(),
            timestamp: Utc::now(),
            raw: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_upsert_twice_keeps_one_row_with_latest_values() {
        let store = MemoryEvaluationStore::with_work("p1", vec![item("a1", "i1")]);
        store
            .upsert_evaluation("a1", "i1", "q-a1", &outcome("a1", 3, "m1"))
            .await
            .unwrap();
        store
            .upsert_evaluation("a1", "i1", "q-a1", &outcome("a1", 9, "m2"))
            .await
            .unwrap();

        assert_eq!(store.upsert_count(), 2);
        assert_eq!(store.evaluation_count(), 1);
        let stored = store.evaluation("a1").unwrap();
        assert_eq!(stored.outcome.scores.addressing, 9);
        assert_eq!(stored.outcome.model_used, "m2");
    }

    #[tokio::test]
    async fn test_clear_evaluations_by_interview() {
        let store =
            MemoryEvaluationStore::with_work("p1", vec![item("a1", "i1"), item("a2", "i2")]);
        for (a, i) in [("a1", "i1"), ("a2", "i2")] {
            store
                .upsert_evaluation(a, i, "q", &outcome(a, 5, "m"))
                .await
                .unwrap();
        }

        let removed = store
            .clear_evaluations(&RunScope::Interview("i1".to_string()))
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(store.evaluation("a1").is_none());
        assert!(store.evaluation("a2").is_some());
    }

    #[tokio::test]
    async fn test_clear_pending_scope_rejected() {
        let store = MemoryEvaluationStore::new();
        let result = store.clear_evaluations(&RunScope::Pending).await;
        assert!(matches!(result, Err(StoreError::UnsupportedScope(_))));
    }

    #[tokio::test]
    async fn test_evaluation_stats_by_position() {
        let store = MemoryEvaluationStore::with_work("p1", vec![item("a1", "i1"), item("a2", "i1")]);
        store.add_work("p2", vec![item("b1", "i9")]);
        store
            .upsert_evaluation("a1", "i1", "q", &outcome("a1", 5, "m"))
            .await
            .unwrap();

        let stats = store.evaluation_stats(Some("p1")).await.unwrap();
        assert_eq!(stats.total_answers, 2);
        assert_eq!(stats.evaluated_answers, 1);
        assert_eq!(stats.pending_answers, 1);
        assert_eq!(stats.models_used, 1);

        let all = store.evaluation_stats(None).await.unwrap();
        assert_eq!(all.total_answers, 3);
        assert_eq!(all.pending_answers, 2);
    }

    fn synced(interview_id: &str, transcript: &str) -> SyncedInterview {
        use crate::models::{CandidateInfo, SyncedAnswer, SyncedQuestion};
        SyncedInterview {
            interview_id: interview_id.to_string(),
            position_id: "p1".to_string(),
            candidate: CandidateInfo::default(),
            questions: vec![SyncedQuestion {
                question_id: format!("{interview_id}-q1"),
                title: Some("Tell us about yourself".to_string()),
                description: None,
                order: 1,
                answer: Some(SyncedAnswer {
                    answer_id: format!("{interview_id}-a1"),
                    video_url: None,
                    transcript: Some(transcript.to_string()),
                    language: None,
                    words: None,
                }),
            }],
        }
    }

    #[tokio::test]
    async fn test_saved_interview_becomes_work_and_resave_replaces_it() {
        let store = MemoryEvaluationStore::new();
        store
            .save_interview(&synced("i1", "First take of a long enough answer."))
            .await
            .unwrap();
        store
            .save_interview(&synced("i1", "Second take of a long enough answer."))
            .await
            .unwrap();

        let work = store
            .fetch_work(&RunScope::Position("p1".to_string()))
            .await
            .unwrap();
        assert_eq!(work.len(), 1);
        assert_eq!(
            work[0].answer_text.as_deref(),
            Some("Second take of a long enough answer.")
        );
        assert_eq!(store.interview_count(), 1);
    }

    #[tokio::test]
    async fn test_interview_index_ignores_evaluations_outside_its_answers() {
        let store = MemoryEvaluationStore::with_work("p1", vec![item("a1", "i1")]);
        store
            .upsert_evaluation("a1", "i1", "q", &outcome("a1", 5, "m"))
            .await
            .unwrap();
        store
            .upsert_evaluation("stray", "i1", "q", &outcome("stray", 5, "m"))
            .await
            .unwrap();

        let index = store
            .existing_evaluations(&RunScope::Interview("i1".to_string()))
            .await
            .unwrap();
        assert_eq!(index.keys().collect::<Vec<_>>(), vec!["a1"]);
    }

    #[tokio::test]
    async fn test_sync_marker_round_trip() {
        let store = MemoryEvaluationStore::new();
        assert_eq!(store.last_sync().await.unwrap(), None);
        let at = Utc.timestamp_opt(1_753_833_600, 0).unwrap();
        store.record_sync(at).await.unwrap();
        assert_eq!(store.last_sync().await.unwrap(), Some(at));
    }
}
