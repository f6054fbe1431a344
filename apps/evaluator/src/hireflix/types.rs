//! Shapes of the Hireflix GraphQL responses used by the transcript sync.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Position {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub archived: Option<bool>,
}

impl Position {
    pub fn is_archived(&self) -> bool {
        self.archived.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HireflixCandidate {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewSummary {
    pub id: String,
    pub status: Option<String>,
    #[serde(default, deserialize_with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    pub candidate: Option<HireflixCandidate>,
}

impl InterviewSummary {
    pub fn is_completed(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("completed"))
    }

    /// Last time Hireflix reports the interview changed.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(self.created_at)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InterviewDetail {
    pub id: String,
    #[serde(default)]
    pub questions: Vec<QuestionDetail>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuestionDetail {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub answer: Option<AnswerDetail>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnswerDetail {
    pub id: String,
    pub url: Option<String>,
    pub transcription: Option<Transcription>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcription {
    pub language_code: Option<String>,
    pub text: Option<String>,
    pub words: Option<Value>,
}

/// Hireflix timestamps arrive either as epoch milliseconds or as RFC 3339 text.
fn timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Fractional(f64),
        Text(String),
    }

    let parsed = match Option::<Raw>::deserialize(deserializer)? {
        None => None,
        Some(Raw::Millis(ms)) => Utc.timestamp_millis_opt(ms).single(),
        Some(Raw::Fractional(ms)) => Utc.timestamp_millis_opt(ms as i64).single(),
        Some(Raw::Text(text)) => match text.parse::<i64>() {
            Ok(ms) => Utc.timestamp_millis_opt(ms).single(),
            Err(_) => DateTime::parse_from_rfc3339(&text)
                .map(|t| t.with_timezone(&Utc))
                .ok(),
        },
    };
    Ok(parsed)
}
