//! Runtime configuration, loaded from environment variables.
//!
//! Every knob except `DATABASE_URL` has a default. Unparseable values fall
//! back to the default rather than failing startup.

use std::time::Duration;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;
const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 256;
const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

/// Process-level settings used once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
}

impl ServerConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `DATABASE_URL` is unset or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;
        Ok(Self {
            port: env_parse("PORT", DEFAULT_PORT),
            database_url,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
        })
    }
}

/// Tuning knobs for the websocket layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// Liveness sweep period.
    pub heartbeat_interval: Duration,
    /// Per-connection outbound frame queue. Frames beyond this are dropped.
    pub outbound_queue_capacity: usize,
    /// Largest accepted inbound text frame, in bytes.
    pub max_frame_bytes: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl RealtimeConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let heartbeat_secs = env_parse("WS_HEARTBEAT_INTERVAL_SECS", DEFAULT_HEARTBEAT_INTERVAL_SECS).max(1);
        Self {
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            outbound_queue_capacity: env_parse("WS_OUTBOUND_QUEUE_CAPACITY", DEFAULT_OUTBOUND_QUEUE_CAPACITY).max(1),
            max_frame_bytes: env_parse("WS_MAX_FRAME_BYTES", DEFAULT_MAX_FRAME_BYTES),
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
