//! Audit command - show the audit trail of one cylinder or of all

use anyhow::Result;
use rfidflow_db::RfidFlowDb;

use crate::cli::context::require_asset;
use crate::cli::output::{action_color, format_datetime, or_dash, print_json, print_table_colored};

pub async fn run(db: &RfidFlowDb, tag: Option<&str>, limit: usize, json: bool) -> Result<()> {
    let entries = match tag {
        Some(tag) => {
            let asset = require_asset(db, tag).await?;
            let mut entries = db.list_audit(asset.id, None).await?;
            // Keep the newest `limit`, still oldest first
            let skip = entries.len().saturating_sub(limit);
            entries.drain(..skip);
            entries
        }
        None => {
            let mut entries = db.list_recent_audit(limit).await?;
            entries.reverse();
            entries
        }
    };

    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No audit entries.");
        return Ok(());
    }

    let tz = db.options().timezone;
    let rows = entries
        .iter()
        .map(|e| {
            vec![
                (e.id.to_string(), None),
                (format_datetime(e.at, tz), None),
                (e.asset_id.to_string(), None),
                (e.action.to_string(), Some(action_color(e.action))),
                (or_dash(e.actor.as_deref()), None),
                (e.description.clone(), None),
            ]
        })
        .collect();
    print_table_colored(&["ID", "AT", "ASSET", "ACTION", "ACTOR", "DESCRIPTION"], rows);
    Ok(())
}
