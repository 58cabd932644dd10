use serde::Deserialize;
use std::{path::Path, time::Duration};
use thiserror::Error;
use tokio::fs;

use crate::gateway::GatewayTarget;
use crate::pool::{PoolConfig, RetryConfig};

// -----------------------------------------------------------------------------
// ----- Settings --------------------------------------------------------------

/// Typed view of the optional `ibpool.toml` settings file. Every field has a
/// default, so a missing file or an empty document is a valid configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub gateway: GatewayTarget,
    pub pool: PoolConfig,
    pub retry: RetryConfig,
}

// -----------------------------------------------------------------------------
// ----- Settings: Static ------------------------------------------------------

impl Settings {
    pub async fn load(path: Option<&Path>) -> Result<Settings, SettingsError> {
        let Some(path) = path else {
            return Ok(Settings::default());
        };

        let raw = fs::read_to_string(path).await.map_err(|e| SettingsError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Settings, SettingsError> {
        let doc: SettingsFile =
            toml::from_str(raw).map_err(|e| SettingsError::Toml { source: e })?;

        let settings = Settings {
            gateway: GatewayTarget {
                host: doc.gateway.host,
                port: doc.gateway.port,
                connect_timeout: Duration::from_secs(doc.gateway.connect_timeout_secs),
            },
            pool: PoolConfig {
                capacity: doc.pool.capacity,
                client_id_base: doc.pool.client_id_base,
                client_id_spread: doc.pool.client_id_spread,
                heartbeat_interval: Duration::from_secs(doc.pool.heartbeat_interval_secs),
                stale_after: Duration::from_secs(doc.pool.stale_after_secs),
            },
            retry: RetryConfig {
                max_attempts: doc.retry.max_attempts,
                initial_delay: Duration::from_millis(doc.retry.initial_delay_ms),
                max_delay: Duration::from_millis(doc.retry.max_delay_ms),
                multiplier: doc.retry.backoff_multiplier,
                jitter_factor: doc.retry.jitter_factor,
            },
        };

        settings.validate()?;
        Ok(settings)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::parse("").expect("built-in defaults must validate")
    }
}

// -----------------------------------------------------------------------------
// ----- Settings: Private -----------------------------------------------------

impl Settings {
    fn validate(&self) -> Result<(), SettingsError> {
        if self.pool.capacity == 0 {
            return Err(SettingsError::Invalid("pool.capacity must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(SettingsError::Invalid("retry.max_attempts must be at least 1"));
        }
        if self.retry.multiplier < 1.0 {
            return Err(SettingsError::Invalid(
                "retry.backoff_multiplier must be >= 1.0",
            ));
        }
        if !(0.0..1.0).contains(&self.retry.jitter_factor) {
            return Err(SettingsError::Invalid(
                "retry.jitter_factor must be in [0.0, 1.0)",
            ));
        }
        if self.pool.heartbeat_interval.is_zero() {
            return Err(SettingsError::Invalid(
                "pool.heartbeat_interval_secs must be nonzero",
            ));
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: On-disk format ----------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    gateway: GatewayFileEntry,
    #[serde(default)]
    pool: PoolFileEntry,
    #[serde(default)]
    retry: RetryFileEntry,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GatewayFileEntry {
    host: String,
    port: u16,
    connect_timeout_secs: u64,
}

impl Default for GatewayFileEntry {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4002,
            connect_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct PoolFileEntry {
    capacity: usize,
    client_id_base: i32,
    client_id_spread: u16,
    heartbeat_interval_secs: u64,
    stale_after_secs: u64,
}

impl Default for PoolFileEntry {
    fn default() -> Self {
        Self {
            capacity: 5,
            client_id_base: 1,
            client_id_spread: 4,
            heartbeat_interval_secs: 30,
            stale_after_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RetryFileEntry {
    max_attempts: u32,
    initial_delay_ms: u64,
    max_delay_ms: u64,
    backoff_multiplier: f64,
    jitter_factor: f64,
}

impl Default for RetryFileEntry {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("read error for {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("toml parse error: {source}")]
    Toml { source: toml::de::Error },

    #[error("invalid settings: {0}")]
    Invalid(&'static str),
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
