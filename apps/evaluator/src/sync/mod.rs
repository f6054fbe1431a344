//! Copies completed Hireflix interviews (questions, answers, transcripts)
//! into the transcript tables behind `interview_answers_datamart`.
//!
//! Incremental by default: only interviews whose last activity is newer than
//! the stored sync marker are fetched, and the marker moves to the start time
//! of a run that synced something without failures.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::hireflix::types::{InterviewDetail, InterviewSummary};
use crate::hireflix::{HireflixClient, HireflixError};
use crate::models::{CandidateInfo, SyncedAnswer, SyncedInterview, SyncedQuestion};
use crate::store::{StoreError, TranscriptStore};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("hireflix: {0}")]
    Hireflix(#[from] HireflixError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("no positions to sync")]
    NoPositions,

    #[error("interview {0} not found")]
    InterviewNotFound(String),
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Explicit position ids; when empty, positions are discovered.
    pub positions: Vec<String>,
    /// Ignore and keep the sync marker.
    pub full: bool,
    /// Include archived positions during discovery.
    pub include_archived: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncFailure {
    pub interview_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub positions: usize,
    pub synced: usize,
    pub transcripts: usize,
    pub failed: Vec<SyncFailure>,
    /// Marker the run filtered on.
    pub since: Option<DateTime<Utc>>,
    /// Marker written by this run, if any.
    pub recorded: Option<DateTime<Utc>>,
}

impl SyncReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn log_summary(&self) {
        info!("=== Transcript sync summary ===");
        info!("Positions: {}", self.positions);
        info!("Interviews synced: {}", self.synced);
        info!("Answers with transcripts: {}", self.transcripts);
        info!("Failed: {}", self.failed.len());
        if let Some(at) = self.recorded {
            info!("Sync marker: {}", at.to_rfc3339());
        }
        for failure in &self.failed {
            warn!("  {}: {}", failure.interview_id, failure.reason);
        }
    }
}

pub struct TranscriptSync {
    client: HireflixClient,
    store: Arc<dyn TranscriptStore>,
}

impl TranscriptSync {
    pub fn new(client: HireflixClient, store: Arc<dyn TranscriptStore>) -> Self {
        Self { client, store }
    }

    pub async fn run(&self, options: &SyncOptions) -> Result<SyncReport, SyncError> {
        let started_at = Utc::now();
        let since = if options.full {
            info!("Full sync: processing every completed interview");
            None
        } else {
            self.store.last_sync().await?
        };
        match since {
            Some(at) => info!("Syncing interviews updated since {}", at.to_rfc3339()),
            None if !options.full => info!("No previous sync found, syncing everything"),
            None => {}
        }

        let positions = self.resolve_positions(options).await?;
        let mut report = SyncReport {
            positions: positions.len(),
            since,
            ..SyncReport::default()
        };

        for position_id in &positions {
            let interviews = match self.client.position_interviews(position_id).await {
                Ok(Some(interviews)) => interviews,
                Ok(None) => {
                    warn!("Position {position_id} not found, skipping");
                    continue;
                }
                Err(e) => {
                    warn!("Could not list interviews of position {position_id}: {e}");
                    continue;
                }
            };

            let due: Vec<InterviewSummary> = interviews
                .into_iter()
                .filter(|i| i.is_completed() && is_due(i, since))
                .collect();
            info!("Position {position_id}: {} interviews to sync", due.len());

            for summary in &due {
                match self.sync_interview(position_id, summary).await {
                    Ok(transcripts) => {
                        report.synced += 1;
                        report.transcripts += transcripts;
                    }
                    Err(e) => {
                        error!("Interview {} failed: {e}", summary.id);
                        report.failed.push(SyncFailure {
                            interview_id: summary.id.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        if report.synced > 0 && !options.full {
            if report.has_failures() {
                warn!("Sync marker left unchanged; failed interviews are retried next run");
            } else {
                self.store.record_sync(started_at).await?;
                report.recorded = Some(started_at);
            }
        }

        Ok(report)
    }

    async fn resolve_positions(&self, options: &SyncOptions) -> Result<Vec<String>, SyncError> {
        let explicit: Vec<String> = options
            .positions
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        if !explicit.is_empty() {
            return Ok(explicit);
        }

        let discovered = self.client.positions().await?;
        let total = discovered.len();
        let positions: Vec<String> = discovered
            .into_iter()
            .filter(|p| options.include_archived || !p.is_archived())
            .map(|p| p.id)
            .collect();
        info!("Discovered {} of {total} positions", positions.len());

        if positions.is_empty() {
            return Err(SyncError::NoPositions);
        }
        Ok(positions)
    }

    /// Fetches and saves one interview; returns its transcript count.
    async fn sync_interview(
        &self,
        position_id: &str,
        summary: &InterviewSummary,
    ) -> Result<usize, SyncError> {
        let detail = self
            .client
            .interview(&summary.id)
            .await?
            .ok_or_else(|| SyncError::InterviewNotFound(summary.id.clone()))?;

        let interview = to_synced(position_id, summary, detail);
        self.store.save_interview(&interview).await?;

        let transcripts = interview.answers_with_transcripts();
        info!(
            "Saved interview {}: {} questions, {transcripts} transcripts",
            interview.interview_id,
            interview.questions.len()
        );
        Ok(transcripts)
    }
}

/// Interviews without any timestamp are always synced.
fn is_due(summary: &InterviewSummary, since: Option<DateTime<Utc>>) -> bool {
    match (since, summary.last_activity()) {
        (Some(since), Some(activity)) => activity > since,
        _ => true,
    }
}

fn to_synced(
    position_id: &str,
    summary: &InterviewSummary,
    detail: InterviewDetail,
) -> SyncedInterview {
    let candidate = summary
        .candidate
        .as_ref()
        .map(|c| CandidateInfo {
            email: c.email.clone(),
            first_name: c.first_name.clone(),
            last_name: c.last_name.clone(),
        })
        .unwrap_or_default();

    let questions = detail
        .questions
        .into_iter()
        .enumerate()
        .map(|(i, question)| SyncedQuestion {
            question_id: question.id,
            title: question.title,
            description: question.description,
            order: i as i32 + 1,
            answer: question.answer.map(|answer| {
                let transcription = answer.transcription.unwrap_or_default();
                SyncedAnswer {
                    answer_id: answer.id,
                    video_url: answer.url,
                    transcript: transcription.text,
                    language: transcription.language_code,
                    words: transcription.words,
                }
            }),
        })
        .collect();

    SyncedInterview {
        interview_id: detail.id,
        position_id: position_id.to_string(),
        candidate,
        questions,
    }
}
