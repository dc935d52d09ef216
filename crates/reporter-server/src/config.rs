use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DEV_TOKEN_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelegramMode {
    Polling,
    Webhook,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub report_dir: PathBuf,
    pub token_secret: String,
    pub rate_limit_calls: usize,
    pub rate_limit_period: Duration,
    pub dispatch_timeout: Duration,
    pub url_analysis_timeout: Duration,
    pub telegram_bot_token: String,
    pub telegram_api_base: String,
    pub telegram_mode: TelegramMode,
    /// Expected `X-Telegram-Bot-Api-Secret-Token` on webhook calls.
    pub webhook_secret: Option<String>,
    pub translate_url: Option<String>,
    pub translate_api_key: Option<String>,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let telegram_mode = match or("REPORTER_TELEGRAM_MODE", "polling").to_lowercase().as_str() {
            "polling" => TelegramMode::Polling,
            "webhook" => TelegramMode::Webhook,
            other => {
                return Err(ConfigError::Invalid {
                    name: "REPORTER_TELEGRAM_MODE",
                    value: other.to_string(),
                });
            }
        };

        Ok(Self {
            db_path: PathBuf::from(or("REPORTER_DB_PATH", "reporter.db")),
            report_dir: PathBuf::from(or("REPORTER_REPORT_DIR", "reports")),
            token_secret: or("REPORTER_TOKEN_SECRET", DEV_TOKEN_SECRET),
            rate_limit_calls: number(&lookup, "REPORTER_RATE_LIMIT_CALLS", 5)?,
            rate_limit_period: Duration::from_secs(number(
                &lookup,
                "REPORTER_RATE_LIMIT_PERIOD_SECS",
                60,
            )?),
            dispatch_timeout: Duration::from_secs(number(
                &lookup,
                "REPORTER_DISPATCH_TIMEOUT_SECS",
                10,
            )?),
            url_analysis_timeout: Duration::from_secs(number(
                &lookup,
                "REPORTER_URL_ANALYSIS_TIMEOUT_SECS",
                10,
            )?),
            telegram_bot_token: var("REPORTER_TELEGRAM_BOT_TOKEN")
                .ok_or(ConfigError::Missing("REPORTER_TELEGRAM_BOT_TOKEN"))?,
            telegram_api_base: or("REPORTER_TELEGRAM_API_BASE", "https://api.telegram.org"),
            telegram_mode,
            webhook_secret: var("REPORTER_WEBHOOK_SECRET"),
            translate_url: var("REPORTER_TRANSLATE_URL"),
            translate_api_key: var("REPORTER_TRANSLATE_API_KEY"),
            host: or("REPORTER_HOST", "0.0.0.0"),
            port: number(&lookup, "REPORTER_PORT", 3000)?,
        })
    }
}

fn number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name).map(|v| v.trim().to_string()) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid { name, value: v }),
    }
}
