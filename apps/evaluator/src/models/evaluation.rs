use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// The slice of interviews a single run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunScope {
    Interview(String),
    Position(String),
    /// Every answer with a usable transcript and no stored evaluation.
    Pending,
}

impl std::fmt::Display for RunScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunScope::Interview(id) => write!(f, "interview {id}"),
            RunScope::Position(id) => write!(f, "position {id}"),
            RunScope::Pending => write!(f, "all pending answers"),
        }
    }
}

/// One question/answer pair read from the interview datamart.
/// Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkItem {
    pub answer_id: String,
    pub interview_id: String,
    pub question_id: String,
    pub question_title: Option<String>,
    pub question_description: Option<String>,
    pub answer_text: Option<String>,
    pub candidate_email: Option<String>,
}

impl WorkItem {
    /// Question sent for evaluation: `"<title>: <description>"` when a
    /// description exists, otherwise the bare title.
    pub fn question_text(&self) -> Option<String> {
        let title = non_blank(self.question_title.as_deref())?;
        Some(match non_blank(self.question_description.as_deref()) {
            Some(description) => format!("{title}: {description}"),
            None => title.to_string(),
        })
    }

    /// The raw transcript, if anything is left of it after cleaning.
    pub fn answer_text(&self) -> Option<&str> {
        self.answer_text
            .as_deref()
            .filter(|text| !clean_transcript(text).is_empty())
    }

    /// Both the question title and a non-empty transcript are present.
    pub fn is_complete(&self) -> bool {
        self.question_text().is_some() && self.answer_text().is_some()
    }
}

/// Replaces control characters with spaces, collapses whitespace and trims.
pub fn clean_transcript(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c.is_ascii_control())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Scores returned by the evaluator, each in `1..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    pub addressing: u8,
    pub specificity: u8,
    pub openness: u8,
}

/// A successful evaluation of one answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationOutcome {
    pub answer_id: String,
    pub scores: Scores,
    pub summary: String,
    pub model_used: String,
    pub prompt_version: String,
    pub timestamp: DateTime<Utc>,
    /// Full response body as received, kept for the backup file.
    #[serde(skip)]
    pub raw: Value,
}

/// Metadata of an evaluation already stored for an answer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExistingEvaluation {
    pub answer_id: String,
    pub gpt_model: Option<String>,
    pub evaluation_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EvaluationStats {
    pub total_answers: i64,
    pub evaluated_answers: i64,
    pub pending_answers: i64,
    pub models_used: i64,
    pub prompt_versions_used: i64,
}
