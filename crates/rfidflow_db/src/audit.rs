//! Audit trail operations

use crate::error::{DbError, Result};
use crate::metrics::METRICS;
use crate::types::*;
use crate::RfidFlowDb;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use tracing::warn;

/// An audit entry about to be written.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub asset_id: i64,
    pub action: AuditAction,
    pub actor: Option<String>,
    pub description: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

impl NewAuditEntry {
    pub fn new(asset_id: i64, action: AuditAction, description: impl Into<String>) -> Self {
        Self {
            asset_id,
            action,
            actor: None,
            description: description.into(),
            before: None,
            after: None,
        }
    }

    pub fn actor(mut self, actor: Option<&str>) -> Self {
        self.actor = actor.map(str::to_string);
        self
    }

    pub fn snapshots(mut self, before: Option<Value>, after: Option<Value>) -> Self {
        self.before = before;
        self.after = after;
        self
    }
}

/// Append an entry on an open connection (usually inside a transaction).
pub(crate) async fn insert_entry(conn: &mut SqliteConnection, entry: &NewAuditEntry) -> Result<i64> {
    let before = entry.before.as_ref().map(serde_json::to_string).transpose()?;
    let after = entry.after.as_ref().map(serde_json::to_string).transpose()?;

    let result = sqlx::query(
        r#"
        INSERT INTO audit_entries (asset_id, action, actor, at, description, before_json, after_json)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.asset_id)
    .bind(entry.action.as_str())
    .bind(entry.actor.as_deref())
    .bind(RfidFlowDb::now_millis())
    .bind(&entry.description)
    .bind(before)
    .bind(after)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

impl RfidFlowDb {
    // ========================================================================
    // Audit Trail
    // ========================================================================

    /// Append an audit entry in its own statement.
    pub async fn append_audit(&self, entry: &NewAuditEntry) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        insert_entry(&mut *conn, entry).await
    }

    /// Append an audit entry after the primary write has committed.
    ///
    /// Failures are logged and counted, never returned.
    pub(crate) async fn append_audit_best_effort(&self, entry: NewAuditEntry) {
        if let Err(err) = self.append_audit(&entry).await {
            METRICS.inc_audit_write_failures();
            warn!(
                asset_id = entry.asset_id,
                action = %entry.action,
                error = %err,
                "Failed to write audit entry"
            );
        }
    }

    /// Audit entries of one asset, oldest first.
    pub async fn list_audit(&self, asset_id: i64, limit: Option<usize>) -> Result<Vec<AuditEntry>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = sqlx::query(
            "SELECT * FROM audit_entries WHERE asset_id = ? ORDER BY id ASC LIMIT ?",
        )
        .bind(asset_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_audit_entry).collect()
    }

    /// Most recent audit entries across all assets, newest first.
    pub async fn list_recent_audit(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query("SELECT * FROM audit_entries ORDER BY id DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_audit_entry).collect()
    }

    /// Number of audit entries of one kind for an asset.
    pub async fn count_audit(&self, asset_id: i64, action: AuditAction) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM audit_entries WHERE asset_id = ? AND action = ?",
        )
        .bind(asset_id)
        .bind(action.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }
}

fn row_to_audit_entry(row: &SqliteRow) -> Result<AuditEntry> {
    let action_str: String = row.try_get("action")?;
    let action = AuditAction::parse(&action_str)
        .ok_or_else(|| DbError::invalid_state(format!("Unknown audit action: {}", action_str)))?;

    let before: Option<String> = row.try_get("before_json")?;
    let after: Option<String> = row.try_get("after_json")?;

    Ok(AuditEntry {
        id: row.try_get("id")?,
        asset_id: row.try_get("asset_id")?,
        action,
        actor: row.try_get("actor")?,
        at: RfidFlowDb::millis_to_datetime(row.try_get("at")?),
        description: row.try_get("description")?,
        before: before.as_deref().map(serde_json::from_str::<Value>).transpose()?,
        after: after.as_deref().map(serde_json::from_str::<Value>).transpose()?,
    })
}
