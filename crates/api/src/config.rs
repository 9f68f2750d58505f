//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json`
/// - `DATABASE_URL`: PostgreSQL URL; the log is kept in memory when unset
/// - `MONITOR_CHECK_INTERVAL_MS`, `ROLLBACK_MAX_RETRIES`
/// - `OUTBOX_POLL_INTERVAL_MS`, `OUTBOX_BATCH_SIZE`
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub monitor_check_interval_ms: u64,
    pub rollback_max_retries: u32,
    pub outbox_poll_interval_ms: u64,
    pub outbox_batch_size: usize,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match std::env::var("LOG_FORMAT") {
                Ok(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            monitor_check_interval_ms: env_or(
                "MONITOR_CHECK_INTERVAL_MS",
                defaults.monitor_check_interval_ms,
            ),
            rollback_max_retries: env_or("ROLLBACK_MAX_RETRIES", defaults.rollback_max_retries),
            outbox_poll_interval_ms: env_or(
                "OUTBOX_POLL_INTERVAL_MS",
                defaults.outbox_poll_interval_ms,
            ),
            outbox_batch_size: env_or("OUTBOX_BATCH_SIZE", defaults.outbox_batch_size),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn monitor_check_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_check_interval_ms)
    }

    pub fn outbox_poll_interval(&self) -> Duration {
        Duration::from_millis(self.outbox_poll_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            monitor_check_interval_ms: 1000,
            rollback_max_retries: 5,
            outbox_poll_interval_ms: 500,
            outbox_batch_size: 100,
        }
    }
}
