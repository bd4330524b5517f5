//! Application configuration loaded from environment variables.

use std::time::Duration;

use pipeline::RelayConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` — Postgres connection string; in-memory store when unset
/// - `OUTBOX_POLL_MS` — relay polling interval (default: `500`)
/// - `OUTBOX_BATCH_SIZE` — relay batch size (default: `50`)
/// - `OUTBOX_MAX_ATTEMPTS` — publish attempt cap (default: `10`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub outbox_poll_ms: u64,
    pub outbox_batch_size: usize,
    pub outbox_max_attempts: i32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            outbox_poll_ms: std::env::var("OUTBOX_POLL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            outbox_batch_size: std::env::var("OUTBOX_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
            outbox_max_attempts: std::env::var("OUTBOX_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the outbox relay configuration.
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            poll_interval: Duration::from_millis(self.outbox_poll_ms),
            batch_size: self.outbox_batch_size,
            max_attempts: self.outbox_max_attempts,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            outbox_poll_ms: 500,
            outbox_batch_size: 50,
            outbox_max_attempts: 10,
        }
    }
}
