use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::airtable::{self, AirtableConfig};
use crate::notify::resend::{self, ResendConfig};
use crate::sync::alert::DEFAULT_FAILURE_THRESHOLD;
use crate::sync::sink::{DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE};

const DEFAULT_TABLE: &str = "客戶互動";

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub airtable_api_url: String,
    pub airtable_api_key: String,
    pub airtable_base_id: String,
    pub airtable_table: String,
    pub airtable_page_size: u32,
    pub batch_size: usize,
    pub sync_interval_secs: u64,
    pub http_timeout_secs: u64,
    pub db_acquire_timeout_secs: u64,
    pub alert_failure_threshold: usize,
    pub resend_api_key: Option<String>,
    pub email_alert_from: String,
    pub email_alert_to: Option<String>,
    pub field_map_path: Option<PathBuf>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let config = Config {
            database_url: require_env("DATABASE_URL")?,
            airtable_api_url: env_or("AIRTABLE_API_URL", airtable::DEFAULT_API_URL),
            airtable_api_key: require_env("AIRTABLE_API_KEY")?,
            airtable_base_id: require_env("AIRTABLE_BASE_ID")?,
            airtable_table: env_or("AIRTABLE_TABLE", DEFAULT_TABLE),
            airtable_page_size: parse_env("AIRTABLE_PAGE_SIZE", airtable::MAX_PAGE_SIZE)?,
            batch_size: parse_env("SYNC_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            sync_interval_secs: parse_env("SYNC_INTERVAL_SECS", 2 * 60 * 60)?,
            http_timeout_secs: parse_env("HTTP_TIMEOUT_SECS", 30)?,
            db_acquire_timeout_secs: parse_env("DB_ACQUIRE_TIMEOUT_SECS", 30)?,
            alert_failure_threshold: parse_env(
                "ALERT_FAILURE_THRESHOLD",
                DEFAULT_FAILURE_THRESHOLD,
            )?,
            resend_api_key: optional_env("RESEND_API_KEY"),
            email_alert_from: env_or("EMAIL_ALERT_FROM", "noreply@example.com"),
            email_alert_to: optional_env("EMAIL_ALERT_TO"),
            field_map_path: optional_env("FIELD_MAP_PATH").map(PathBuf::from),
            port: parse_env("PORT", 8080)?,
            rust_log: env_or("RUST_LOG", "info"),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            bail!("SYNC_BATCH_SIZE must be between 1 and {MAX_BATCH_SIZE}");
        }
        if self.sync_interval_secs == 0 {
            bail!("SYNC_INTERVAL_SECS must be at least 1");
        }
        if self.alert_failure_threshold == 0 {
            bail!("ALERT_FAILURE_THRESHOLD must be at least 1");
        }
        if !(1..=airtable::MAX_PAGE_SIZE).contains(&self.airtable_page_size) {
            bail!(
                "AIRTABLE_PAGE_SIZE must be between 1 and {}",
                airtable::MAX_PAGE_SIZE
            );
        }
        Ok(())
    }

    pub fn airtable(&self) -> AirtableConfig {
        AirtableConfig {
            api_url: self.airtable_api_url.clone(),
            api_key: self.airtable_api_key.clone(),
            base_id: self.airtable_base_id.clone(),
            table: self.airtable_table.clone(),
            page_size: self.airtable_page_size,
            timeout_secs: self.http_timeout_secs,
        }
    }

    /// `None` when e-mail alerts are not fully configured.
    pub fn resend(&self) -> Option<ResendConfig> {
        Some(ResendConfig {
            api_url: resend::DEFAULT_API_URL.to_string(),
            api_key: self.resend_api_key.clone()?,
            from: self.email_alert_from.clone(),
            to: self.email_alert_to.clone()?,
            timeout_secs: self.http_timeout_secs,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    optional_env(key).unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
