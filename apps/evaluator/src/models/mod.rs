pub mod evaluation;
pub mod transcript;

pub use evaluation::{
    clean_transcript, EvaluationOutcome, EvaluationStats, ExistingEvaluation, RunScope, Scores,
    WorkItem,
};
pub use transcript::{CandidateInfo, SyncedAnswer, SyncedInterview, SyncedQuestion};
