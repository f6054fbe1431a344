//! Wire format of the evaluation endpoint and answer text preparation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Failure, FailureKind};
use crate::models::{clean_transcript, EvaluationOutcome, Scores, WorkItem};

/// Prompt version assumed when the endpoint does not report one.
pub const DEFAULT_PROMPT_VERSION: &str = "1.0";
/// Longer transcripts are cut to keep requests under provider token limits.
pub const MAX_ANSWER_CHARS: usize = 4000;
const TRUNCATION_MARKER: &str = "... [truncated]";

#[derive(Debug, Serialize)]
pub struct EvaluateRequest<'a> {
    pub candidate_id: &'a str,
    pub interview_id: &'a str,
    pub question: String,
    pub answer: String,
    pub gpt_model: &'a str,
}

impl<'a> EvaluateRequest<'a> {
    pub fn from_work_item(item: &'a WorkItem, model_id: &'a str) -> Result<Self, Failure> {
        let question = item.question_text().ok_or_else(|| {
            Failure::new(
                FailureKind::InvalidRequest,
                format!("answer {} has no question text", item.answer_id),
            )
        })?;
        let answer = item
            .answer_text()
            .map(prepare_answer_text)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| {
                Failure::new(
                    FailureKind::InvalidRequest,
                    format!("answer {} has no transcript", item.answer_id),
                )
            })?;

        Ok(Self {
            candidate_id: item.candidate_email.as_deref().unwrap_or_default(),
            interview_id: &item.interview_id,
            question,
            answer,
            gpt_model: model_id,
        })
    }
}

#[derive(Debug, Deserialize)]
struct EvaluateResponse {
    evaluation: Option<serde_json::Map<String, Value>>,
    model_used: Option<String>,
    prompt_version: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

/// Parses a 2xx body into an outcome. Any missing or out-of-range field is
/// a `MalformedResponse`.
pub fn parse_evaluation(
    answer_id: &str,
    requested_model: &str,
    body: &str,
) -> Result<EvaluationOutcome, Failure> {
    let raw: Value = serde_json::from_str(body)
        .map_err(|e| malformed(format!("response is not JSON: {e}")))?;
    let response: EvaluateResponse = serde_json::from_value(raw.clone())
        .map_err(|e| malformed(format!("unexpected response shape: {e}")))?;
    let evaluation = response
        .evaluation
        .ok_or_else(|| malformed("response has no `evaluation` object"))?;

    let scores = Scores {
        addressing: score(&evaluation, "addressing")?,
        specificity: score(&evaluation, "be_specific")?,
        openness: score(&evaluation, "openness")?,
    };
    let summary = evaluation
        .get("short_summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| malformed("missing `short_summary`"))?
        .to_string();

    Ok(EvaluationOutcome {
        answer_id: answer_id.to_string(),
        scores,
        summary,
        model_used: response
            .model_used
            .unwrap_or_else(|| requested_model.to_string()),
        prompt_version: response
            .prompt_version
            .unwrap_or_else(|| DEFAULT_PROMPT_VERSION.to_string()),
        timestamp: response.timestamp.unwrap_or_else(Utc::now),
        raw,
    })
}

fn score(evaluation: &serde_json::Map<String, Value>, field: &str) -> Result<u8, Failure> {
    let value = evaluation
        .get(field)
        .ok_or_else(|| malformed(format!("missing `{field}`")))?;
    // Some models answer 7.0 instead of 7.
    let number = value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        .ok_or_else(|| malformed(format!("`{field}` is not an integer: {value}")))?;
    match u8::try_from(number) {
        Ok(n) if (1..=10).contains(&n) => Ok(n),
        _ => Err(malformed(format!("`{field}` out of range 1-10: {number}"))),
    }
}

fn malformed(message: impl Into<String>) -> Failure {
    Failure::new(FailureKind::MalformedResponse, message)
}

/// Cleans the transcript and truncates it to `MAX_ANSWER_CHARS` characters.
pub fn prepare_answer_text(text: &str) -> String {
    let cleaned = clean_transcript(text);
    if cleaned.chars().count() <= MAX_ANSWER_CHARS {
        return cleaned;
    }
    let mut truncated: String = cleaned.chars().take(MAX_ANSWER_CHARS).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
