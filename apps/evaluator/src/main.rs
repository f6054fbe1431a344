mod cli;
mod config;
mod db;
mod errors;
mod evaluation_client;
mod hireflix;
mod models;
mod pipeline;
mod routes;
mod state;
mod store;
mod sync;

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::db::{create_pool, run_migrations};
use crate::evaluation_client::EvaluationClient;
use crate::hireflix::HireflixClient;
use crate::models::RunScope;
use crate::pipeline::{BatchDriver, DriverSettings, ResultSink, ResumeMode, RetryPolicy};
use crate::routes::build_router;
use crate::state::{AppState, Invites};
use crate::store::{EvaluationStore, PgEvaluationStore};
use crate::sync::{SyncOptions, TranscriptSync};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load configuration first (also loads .env, which clap reads for env
    // defaults); required values are checked per command
    let config = Config::from_env()?;
    let cli = Cli::parse();

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting evaluator v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Interview {
            interview_id,
            model,
            force_redo,
        } => {
            let scope = RunScope::Interview(interview_id);
            evaluate(&config, scope, model, ResumeMode::from_force_redo(force_redo)).await
        }
        Commands::Position {
            position_id,
            skip_evaluated,
            model,
        } => {
            let scope = RunScope::Position(position_id);
            evaluate(&config, scope, model, ResumeMode::from_force_redo(!skip_evaluated)).await
        }
        Commands::RetryFailed { model } => {
            evaluate(&config, RunScope::Pending, model, ResumeMode::SkipExisting).await
        }
        Commands::Stats { position_id } => {
            let store = connect_store(&config).await?;
            let stats = store.evaluation_stats(position_id.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Sync {
            positions,
            full,
            include_archived,
        } => {
            let options = SyncOptions {
                positions,
                full,
                include_archived,
            };
            sync_transcripts(&config, &options).await
        }
        Commands::Serve => {
            serve(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn connect_store(config: &Config) -> Result<Arc<PgEvaluationStore>> {
    let pool = create_pool(config.database_url()?).await?;
    run_migrations(&pool).await?;
    Ok(Arc::new(PgEvaluationStore::new(pool)))
}

/// Runs one batch over `scope`; exit code 1 on a configuration error or a
/// failed run.
async fn evaluate(
    config: &Config,
    scope: RunScope,
    model: Option<String>,
    mode: ResumeMode,
) -> Result<ExitCode> {
    let endpoint = match config.evaluation_url() {
        Ok(url) => url.to_string(),
        Err(e) => {
            error!("{e:#}");
            return Ok(ExitCode::FAILURE);
        }
    };
    let store = match connect_store(config).await {
        Ok(store) => store,
        Err(e) => {
            error!("Database unavailable: {e:#}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let evaluator = Arc::new(EvaluationClient::new(endpoint, config.evaluation_timeout()));
    info!("Evaluation endpoint: {}", evaluator.endpoint());
    let sink = ResultSink::new(store.clone(), config.results_dir.clone());
    if let Some(dir) = sink.backup_dir() {
        info!("Evaluation backups go to {}", dir.display());
    }

    let mut settings = DriverSettings::new(model.unwrap_or_else(|| config.default_model.clone()));
    settings.base_delay = config.rate_limit_delay();
    settings.retry = RetryPolicy::default()
        .with_max_attempts(config.max_attempts)
        .retry_timeouts(config.retry_on_timeout);

    let driver = BatchDriver::new(store.clone(), evaluator, sink, settings);
    let report = match driver.run(&scope, mode).await {
        Ok(report) => report,
        Err(e) => {
            error!("Evaluation run aborted: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };
    report.log_summary();

    if let RunScope::Position(position_id) = &scope {
        match store.evaluation_stats(Some(position_id)).await {
            Ok(stats) => info!(
                "Position statistics: {} answers, {} evaluated, {} pending, {} models, {} prompt versions",
                stats.total_answers,
                stats.evaluated_answers,
                stats.pending_answers,
                stats.models_used,
                stats.prompt_versions_used
            ),
            Err(e) => warn!("Could not load position statistics: {e}"),
        }
    }

    Ok(if report.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Exit code 1 when any interview failed to sync.
async fn sync_transcripts(config: &Config, options: &SyncOptions) -> Result<ExitCode> {
    let api_key = match config.hireflix_api_key() {
        Ok(key) => key,
        Err(e) => {
            error!("{e:#}");
            return Ok(ExitCode::FAILURE);
        }
    };
    let store = connect_store(config).await?;

    let sync = TranscriptSync::new(HireflixClient::new(api_key), store);
    let report = match sync.run(options).await {
        Ok(report) => report,
        Err(e) => {
            error!("Transcript sync aborted: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };
    report.log_summary();

    Ok(if report.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn serve(config: &Config) -> Result<()> {
    let store: Arc<dyn EvaluationStore> = connect_store(config).await?;

    let invites = match config.hireflix() {
        Ok((api_key, position_id)) => {
            info!("Hireflix client initialized (position: {position_id})");
            Some(Invites {
                client: Arc::new(HireflixClient::new(api_key)),
                position_id: position_id.to_string(),
            })
        }
        Err(e) => {
            warn!("Candidate invites disabled: {e}");
            None
        }
    };

    let state = AppState { store, invites };

    let app = build_router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
