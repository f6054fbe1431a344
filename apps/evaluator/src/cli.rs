use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "evaluator", version, about = "Batch evaluation of recorded interview answers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate every answer of one interview.
    Interview {
        interview_id: String,
        /// Model identifier; defaults to DEFAULT_MODEL.
        #[arg(long)]
        model: Option<String>,
        /// Clear stored evaluations for the interview and evaluate everything again.
        #[arg(long, default_value_t = false)]
        force_redo: bool,
    },
    /// Evaluate every answer of every interview in a position.
    Position {
        position_id: String,
        /// Skip answers that already have an evaluation.
        #[arg(long, action = ArgAction::Set, default_value_t = true)]
        skip_evaluated: bool,
        #[arg(long)]
        model: Option<String>,
    },
    /// Evaluate every answer that has a transcript but no evaluation.
    RetryFailed {
        #[arg(long)]
        model: Option<String>,
    },
    /// Print evaluation coverage counts.
    Stats {
        #[arg(long)]
        position_id: Option<String>,
    },
    /// Copy completed Hireflix interviews and transcripts into the datamart.
    Sync {
        /// Positions to sync; discovered from Hireflix when omitted.
        positions: Vec<String>,
        /// Ignore the last-sync marker and sync every completed interview.
        #[arg(long, env = "FORCE_FULL_SYNC")]
        full: bool,
        /// Include archived positions when discovering.
        #[arg(long)]
        include_archived: bool,
    },
    /// Run the HTTP service (health, candidate invites, stats).
    Serve,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interview_flags() {
        let cli = Cli::parse_from(["evaluator", "interview", "int-1", "--force-redo"]);
        match cli.command {
            Commands::Interview {
                interview_id,
                model,
                force_redo,
            } => {
                assert_eq!(interview_id, "int-1");
                assert!(model.is_none());
                assert!(force_redo);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_position_skip_evaluated_defaults_true() {
        let cli = Cli::parse_from(["evaluator", "position", "pos-1"]);
        assert!(matches!(
            cli.command,
            Commands::Position { skip_evaluated: true, .. }
        ));

        let cli = Cli::parse_from([
            "evaluator",
            "position",
            "pos-1",
            "--skip-evaluated",
            "false",
            "--model",
            "openai/gpt-4o",
        ]);
        match cli.command {
            Commands::Position {
                skip_evaluated,
                model,
                ..
            } => {
                assert!(!skip_evaluated);
                assert_eq!(model.as_deref(), Some("openai/gpt-4o"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_retry_failed_and_stats() {
        let cli = Cli::parse_from(["evaluator", "retry-failed"]);
        assert!(matches!(cli.command, Commands::RetryFailed { model: None }));

        let cli = Cli::parse_from(["evaluator", "stats", "--position-id", "pos-9"]);
        assert!(matches!(
            cli.command,
            Commands::Stats { position_id: Some(ref p) } if p == "pos-9"
        ));
    }

    #[test]
    fn test_missing_interview_id_is_rejected() {
        assert!(Cli::try_parse_from(["evaluator", "interview"]).is_err());
    }

    #[test]
    fn test_sync_positions_and_flags() {
        let cli = Cli::parse_from(["evaluator", "sync", "pos-1", "pos-2", "--include-archived"]);
        match cli.command {
            Commands::Sync {
                positions,
                full,
                include_archived,
            } => {
                assert_eq!(positions, vec!["pos-1", "pos-2"]);
                assert!(!full);
                assert!(include_archived);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::parse_from(["evaluator", "sync", "--full"]);
        assert!(matches!(
            cli.command,
            Commands::Sync { ref positions, full: true, .. } if positions.is_empty()
        ));
    }
}
