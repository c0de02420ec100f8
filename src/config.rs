use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub transaction_timeout_ms: u64,
    pub scoring_timeout_ms: u64,
    /// Program and arguments of the external scoring procedure, whitespace separated.
    pub scoring_command: Option<String>,
    pub work_rate_window_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            transaction_timeout_ms: 30_000,
            scoring_timeout_ms: 5_000,
            scoring_command: None,
            work_rate_window_days: 30,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            transaction_timeout_ms: parse_or_default(
                "TRANSACTION_TIMEOUT_MS",
                defaults.transaction_timeout_ms,
            )?,
            scoring_timeout_ms: parse_or_default("SCORING_TIMEOUT_MS", defaults.scoring_timeout_ms)?,
            scoring_command: env::var("SCORING_COMMAND")
                .ok()
                .filter(|raw| !raw.trim().is_empty()),
            work_rate_window_days: parse_or_default(
                "WORK_RATE_WINDOW_DAYS",
                defaults.work_rate_window_days,
            )?,
        };

        if config.event_buffer_size == 0 {
            return Err(AppError::Internal(
                "invalid EVENT_BUFFER_SIZE: must be > 0".to_string(),
            ));
        }
        if config.work_rate_window_days <= 0 {
            return Err(AppError::Internal(
                "invalid WORK_RATE_WINDOW_DAYS: must be > 0".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }

    pub fn scoring_timeout(&self) -> Duration {
        Duration::from_millis(self.scoring_timeout_ms)
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
