//! RFID Flow ingestion server
//!
//! axum service in front of [`rfidflow_db::RfidFlowDb`]: reading and barcode
//! ingestion for scanners, asset lookup, dashboard statistics and metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{ConfigError, ServiceConfig};
pub use error::ApiError;
pub use server::{build_router, serve};
pub use state::AppState;

use std::path::PathBuf;

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Config file (defaults to ~/.rfidflow/rfidflow.toml when present)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Listen address, overrides [server] bind
    #[arg(long, env = "RFIDFLOW_BIND")]
    pub bind: Option<String>,

    /// SQLite database path, overrides [database] path
    #[arg(long, env = "RFIDFLOW_DATABASE")]
    pub database: Option<PathBuf>,

    /// Shared token for /api routes, overrides [server] ingest_token
    #[arg(long, env = "RFIDFLOW_INGEST_TOKEN", hide_env_values = true)]
    pub ingest_token: Option<String>,
}

impl ServeArgs {
    /// Load the config file and apply command-line overrides.
    pub fn resolve(&self) -> config::Result<ServiceConfig> {
        let mut config = ServiceConfig::load_or_default(self.config.as_deref())?;
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
        if let Some(path) = &self.database {
            config.database.path = path.clone();
        }
        if let Some(token) = &self.ingest_token {
            config.server.ingest_token = Some(token.clone());
        }
        Ok(config)
    }
}
