//! Shared setup for commands that work on the database.

use anyhow::{Context, Result};
use rfidflow_db::{Asset, RfidFlowDb};
use rfidflow_server::ServiceConfig;
use tracing::debug;

/// Open the configured database.
pub async fn open_db(config: &ServiceConfig) -> Result<RfidFlowDb> {
    let path = &config.database.path;
    debug!(path = %path.display(), "Opening database");
    RfidFlowDb::open(path, config.db_options()?)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))
}

/// Look up an asset by tag, deleted or not.
pub async fn require_asset(db: &RfidFlowDb, tag: &str) -> Result<Asset> {
    db.find_asset_by_tag(tag)
        .await?
        .with_context(|| format!("No asset with tag '{}'", tag.trim()))
}
