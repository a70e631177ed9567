//! Tag registry: upsert-on-scan lookup of assets by tag.

use crate::error::{DbError, Result};
use crate::metrics::METRICS;
use crate::types::*;
use crate::RfidFlowDb;
use tracing::info;

/// Trim and validate a tag: non-empty and at most [`MAX_TAG_LEN`] characters.
pub fn normalize_tag(raw: &str) -> Result<String> {
    let tag = raw.trim();
    if tag.is_empty() {
        return Err(DbError::validation("tag is required"));
    }
    if tag.chars().count() > MAX_TAG_LEN {
        return Err(DbError::validation(format!(
            "tag longer than {} characters",
            MAX_TAG_LEN
        )));
    }
    Ok(tag.to_string())
}

/// Trimmed value, or `None` when absent or blank.
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl RfidFlowDb {
    /// Return the asset for `tag`, creating it with defaults on first sight.
    ///
    /// Concurrent first sightings insert one row; exactly one caller gets
    /// `created = true`. No audit entry is written here.
    pub async fn get_or_create_by_tag(&self, tag: &str) -> Result<(Asset, bool)> {
        let new = NewAsset::with_defaults(normalize_tag(tag)?);
        let now = Self::now_millis();

        let result = sqlx::query(
            r#"
            INSERT INTO assets (tag, status, requalification_status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(tag) DO NOTHING
            "#,
        )
        .bind(&new.tag)
        .bind(new.status.as_str())
        .bind(RequalificationStatus::default().as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let created = result.rows_affected() == 1;

        let asset = self
            .find_asset_by_tag(&new.tag)
            .await?
            .ok_or_else(|| DbError::not_found(format!("asset with tag {}", new.tag)))?;

        if created {
            METRICS.inc_assets_created();
            info!(asset_id = asset.id, tag = %asset.tag, "Asset registered on first sight");
        }

        Ok((asset, created))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbOptions;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag("  E2001234 \n").unwrap(), "E2001234");
        assert!(matches!(normalize_tag("   "), Err(DbError::Validation(_))));
        assert!(normalize_tag(&"A".repeat(MAX_TAG_LEN)).is_ok());
        assert!(normalize_tag(&"A".repeat(MAX_TAG_LEN + 1)).is_err());
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some(" ana ")), Some("ana".to_string()));
        assert_eq!(non_blank(Some("  ")), None);
        assert_eq!(non_blank(None), None);
    }

    #[tokio::test]
    async fn test_create_then_find() {
        let db = RfidFlowDb::open_memory(DbOptions::default()).await.unwrap();

        let (first, created) = db.get_or_create_by_tag("E200NEW").await.unwrap();
        assert!(created);
        assert_eq!(first.status, AssetStatus::Active);
        assert_eq!(first.requalification_status, RequalificationStatus::Pending);
        assert_eq!(first.rotation, RotationState::default());
        assert_eq!(first.reading_count, 0);

        let (second, created) = db.get_or_create_by_tag(" E200NEW ").await.unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);

        // Registry creation leaves no audit entry
        assert!(db.list_audit(first.id, None).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_sightings_create_one_row() {
        let tmp = TempDir::new().unwrap();
        let db = Arc::new(
            RfidFlowDb::open(tmp.path().join("registry.db"), DbOptions::default())
                .await
                .unwrap(),
        );

        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = Arc::clone(&db);
            handles.push(tokio::spawn(async move {
                db.get_or_create_by_tag("E200RACE").await.unwrap()
            }));
        }

        let mut ids = Vec::new();
        let mut created = 0;
        for handle in handles {
            let (asset, was_created) = handle.await.unwrap();
            ids.push(asset.id);
            if was_created {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert!(ids.iter().all(|id| *id == ids[0]));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM assets WHERE tag = 'E200RACE'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
