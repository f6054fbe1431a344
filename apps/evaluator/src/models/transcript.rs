use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Candidate details carried from the Hireflix interview listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateInfo {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// A completed interview as written to the transcript tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncedInterview {
    pub interview_id: String,
    pub position_id: String,
    pub candidate: CandidateInfo,
    /// In interview order; `order` starts at 1.
    pub questions: Vec<SyncedQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncedQuestion {
    pub question_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub order: i32,
    pub answer: Option<SyncedAnswer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncedAnswer {
    pub answer_id: String,
    pub video_url: Option<String>,
    pub transcript: Option<String>,
    pub language: Option<String>,
    /// Word timings as returned by Hireflix, stored verbatim.
    pub words: Option<Value>,
}

impl SyncedInterview {
    pub fn answers_with_transcripts(&self) -> usize {
        self.questions
            .iter()
            .filter_map(|q| q.answer.as_ref())
            .filter(|a| a.transcript.as_deref().is_some_and(|t| !t.trim().is_empty()))
            .count()
    }
}
