//! Evaluation Client — the single point of entry for calls to the remote
//! "evaluate one answer" endpoint.
//!
//! One call, one answer. Retrying is the caller's decision (see
//! `pipeline::retry`); this module only classifies what went wrong.
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::models::{EvaluationOutcome, WorkItem};

pub mod payload;

use payload::{parse_evaluation, EvaluateRequest};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Failure taxonomy for a single evaluation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// HTTP 429 from the endpoint.
    RateLimited,
    Timeout,
    /// 2xx body that is not a valid evaluation.
    MalformedResponse,
    /// Connection failure or any other non-2xx status.
    Transport,
    /// The work item cannot be sent (empty question or answer).
    InvalidRequest,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            FailureKind::RateLimited => "RATE_LIMITED",
            FailureKind::Timeout => "TIMEOUT",
            FailureKind::MalformedResponse => "MALFORMED_RESPONSE",
            FailureKind::Transport => "TRANSPORT_ERROR",
            FailureKind::InvalidRequest => "INVALID_REQUEST",
        };
        f.write_str(tag)
    }
}

/// Quota headers the endpoint may attach to a 429.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitHints {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub reset: Option<DateTime<Utc>>,
    pub retry_after_secs: Option<u64>,
}

impl RateLimitHints {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let number = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
        };
        let hints = RateLimitHints {
            limit: number("x-ratelimit-limit"),
            remaining: number("x-ratelimit-remaining"),
            reset: number("x-ratelimit-reset")
                .and_then(|secs| i64::try_from(secs).ok())
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
            retry_after_secs: number("retry-after"),
        };
        (hints != RateLimitHints::default()).then_some(hints)
    }
}

#[derive(Debug, Clone)]
pub struct Failure {
    pub kind: FailureKind,
    pub status: Option<u16>,
    pub message: String,
    pub hints: Option<RateLimitHints>,
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {status}): {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for Failure {}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            hints: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == FailureKind::RateLimited
    }
}

/// Anything that can evaluate one answer with a given model.
///
/// The batch driver holds an `Arc<dyn Evaluator>`; tests swap in scripted fakes.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, item: &WorkItem, model_id: &str)
        -> Result<EvaluationOutcome, Failure>;
}

/// HTTP client for the evaluation cloud function. POSTs a JSON body.
#[derive(Clone)]
pub struct EvaluationClient {
    client: Client,
    endpoint: String,
}

impl EvaluationClient {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build HTTP client"),
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Evaluator for EvaluationClient {
    async fn evaluate(
        &self,
        item: &WorkItem,
        model_id: &str,
    ) -> Result<EvaluationOutcome, Failure> {
        let request = EvaluateRequest::from_work_item(item, model_id)?;

        debug!(
            "POST {} for answer {} (model {model_id})",
            self.endpoint, item.answer_id
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let hints = RateLimitHints::from_headers(response.headers());
            let body = response.text().await.unwrap_or_default();
            warn!("Evaluation endpoint rate limited answer {}: {body}", item.answer_id);
            return Err(Failure {
                hints,
                ..Failure::new(FailureKind::RateLimited, body).with_status(status.as_u16())
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Failure::new(FailureKind::Transport, body).with_status(status.as_u16()));
        }

        let body = response.text().await.map_err(classify_transport_error)?;
        parse_evaluation(&item.answer_id, model_id, &body)
    }
}

fn classify_transport_error(e: reqwest::Error) -> Failure {
    let kind = if e.is_timeout() {
        FailureKind::Timeout
    } else {
        FailureKind::Transport
    };
    let failure = Failure::new(kind, e.to_string());
    match e.status() {
        Some(status) => failure.with_status(status.as_u16()),
        None => failure,
    }
}
