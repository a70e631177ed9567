//! Configuration for the RFID Flow service

use chrono_tz::Tz;
use rfidflow_db::{DbOptions, DistributorStations};
use rfidflow_protocol::defaults::{
    DEFAULT_BIND_ADDR, DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_LOCK_WAIT_MS, DEFAULT_MAX_CONNECTIONS,
    DEFAULT_TIMEZONE,
};
use rfidflow_protocol::{parse_timezone, paths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Main configuration, as read from `rfidflow.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub database: DatabaseSection,

    #[serde(default)]
    pub rotation: RotationSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Listen address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Shared token required on `/api` routes; unset leaves them open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// Path to the SQLite database
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Bound on waiting for a per-asset lock; 0 waits forever
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationSection {
    /// Exactly four station names, in rotation order
    #[serde(default = "default_stations")]
    pub stations: Vec<String>,

    /// IANA timezone that defines "today"
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Filter directive (`RUST_LOG` syntax); `RUST_LOG` itself still wins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Also write a daily rolling log file
    #[serde(default)]
    pub file: bool,

    /// Directory for the log file; defaults to `$RFIDFLOW_HOME/logs`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

fn default_bind() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

fn default_database_path() -> PathBuf {
    paths::default_db_path()
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_lock_wait_ms() -> u64 {
    DEFAULT_LOCK_WAIT_MS
}

fn default_stations() -> Vec<String> {
    DistributorStations::default().into()
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            ingest_token: None,
        }
    }
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
            lock_wait_ms: default_lock_wait_ms(),
        }
    }
}

impl Default for RotationSection {
    fn default() -> Self {
        Self {
            stations: default_stations(),
            timezone: default_timezone(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ServiceConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else the default config file when it exists,
    /// else built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = paths::default_config_path();
                if default_path.exists() {
                    Self::load(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Reject values that parse but cannot be used.
    pub fn validate(&self) -> Result<()> {
        self.timezone()?;
        self.stations()?;
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz> {
        parse_timezone(&self.rotation.timezone).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn stations(&self) -> Result<DistributorStations> {
        DistributorStations::new(self.rotation.stations.clone())
            .map_err(|e| ConfigError::Invalid(format!("rotation.stations: {}", e)))
    }

    /// Token required on `/api` routes, ignoring a blank value.
    pub fn ingest_token(&self) -> Option<&str> {
        self.server
            .ingest_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Options for opening the database.
    pub fn db_options(&self) -> Result<DbOptions> {
        let lock_wait = match self.database.lock_wait_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        Ok(DbOptions {
            max_connections: self.database.max_connections,
            busy_timeout: Duration::from_millis(self.database.busy_timeout_ms),
            lock_wait,
            timezone: self.timezone()?,
            stations: self.stations()?,
        })
    }

    /// Directory for the daily log file, when file logging is on.
    pub fn log_dir(&self) -> Option<PathBuf> {
        if !self.logging.file {
            return None;
        }
        Some(
            self.logging
                .dir
                .clone()
                .unwrap_or_else(paths::default_logs_dir),
        )
    }
}
