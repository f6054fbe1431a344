use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::evaluation_client::DEFAULT_TIMEOUT;

pub const DEFAULT_MODEL: &str = "google/gemini-1.5-flash";

/// Application configuration loaded from environment variables.
///
/// Settings a command cannot run without are checked by the accessor the
/// command calls (`database_url`, `evaluation_url`, `hireflix`), so a missing
/// variable fails the process before any work is loaded.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub evaluation_url: Option<String>,
    pub rate_limit_delay_ms: u64,
    pub evaluation_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_on_timeout: bool,
    pub results_dir: PathBuf,
    pub default_model: String,
    pub hireflix_api_key: Option<String>,
    pub hireflix_position_id: Option<String>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let optional = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        Ok(Config {
            database_url: optional("DATABASE_URL"),
            evaluation_url: optional("CLOUD_FUNCTION_URL"),
            rate_limit_delay_ms: parse_or(&optional, "RATE_LIMIT_DELAY", 3000)?,
            evaluation_timeout_secs: parse_or(
                &optional,
                "EVALUATION_TIMEOUT_SECS",
                DEFAULT_TIMEOUT.as_secs(),
            )?,
            max_attempts: parse_or(&optional, "MAX_ATTEMPTS", 3)?,
            retry_on_timeout: parse_or(&optional, "RETRY_ON_TIMEOUT", false)?,
            results_dir: optional("RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./evaluation-results")),
            default_model: optional("DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            hireflix_api_key: optional("HIREFLIX_API_KEY"),
            hireflix_position_id: optional("HIREFLIX_POSITION_ID"),
            port: parse_or(&optional, "PORT", 8080)?,
            rust_log: optional("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn database_url(&self) -> Result<&str> {
        require(&self.database_url, "DATABASE_URL")
    }

    /// The evaluation endpoint; must be an http(s) URL.
    pub fn evaluation_url(&self) -> Result<&str> {
        let url = require(&self.evaluation_url, "CLOUD_FUNCTION_URL")?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("CLOUD_FUNCTION_URL must start with http:// or https://");
        }
        Ok(url)
    }

    /// Hireflix API key alone, for the transcript sync.
    pub fn hireflix_api_key(&self) -> Result<&str> {
        require(&self.hireflix_api_key, "HIREFLIX_API_KEY")
    }

    /// Hireflix API key and the position candidates are invited into.
    pub fn hireflix(&self) -> Result<(&str, &str)> {
        Ok((
            require(&self.hireflix_api_key, "HIREFLIX_API_KEY")?,
            require(&self.hireflix_position_id, "HIREFLIX_POSITION_ID")?,
        ))
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_secs(self.evaluation_timeout_secs)
    }
}

fn require<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
    value
        .as_deref()
        .with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        None => Ok(default),
    }
}
