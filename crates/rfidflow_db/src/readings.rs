//! Reading ingestion and history.

use crate::error::{DbError, Result};
use crate::metrics::METRICS;
use crate::registry::{non_blank, normalize_tag};
use crate::rotation::{apply_step, audit_step};
use crate::types::*;
use crate::RfidFlowDb;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Longest accepted free-text field on a reading.
const MAX_FIELD_LEN: usize = 500;

impl RfidFlowDb {
    /// Ingest one scan.
    ///
    /// Registry upsert, then under the asset's lock a single transaction that
    /// bumps the reading counter, appends the reading, advances the rotation
    /// and writes the `reading` audit entry.
    pub async fn ingest_reading(&self, reading: NewReading) -> Result<IngestOutcome> {
        let result = self.ingest_reading_inner(reading).await;
        if let Err(err) = &result {
            METRICS.inc_ingest_errors();
            match err {
                DbError::Validation(_) | DbError::InvalidState(_) => {
                    debug!(error = %err, "Reading rejected")
                }
                _ => warn!(error = %err, "Reading ingestion failed"),
            }
        }
        result
    }

    async fn ingest_reading_inner(&self, reading: NewReading) -> Result<IngestOutcome> {
        let tag = normalize_tag(&reading.tag)?;
        let operator = bounded("operator", reading.operator.as_deref())?;
        let location = bounded("location", reading.location.as_deref())?;
        let note = bounded("note", reading.note.as_deref())?;
        let reader_id = bounded("reader id", reading.reader_id.as_deref())?;
        let actor = non_blank(reading.actor.as_deref());

        let (asset, created) = self.get_or_create_by_tag(&tag).await?;
        if asset.deleted {
            return Err(DbError::invalid_state(format!(
                "asset {} ({}) is deleted",
                asset.id, asset.tag
            )));
        }

        let guard = self.locks.acquire(asset.id, self.options.lock_wait).await?;
        let started = Instant::now();
        let read_at = Self::now_millis();

        let mut tx = self.pool.begin().await?;

        // First statement is a write: the transaction holds the database write lock from here on
        let touched = sqlx::query(
            "UPDATE assets SET reading_count = reading_count + 1, updated_at = ? WHERE id = ?",
        )
        .bind(read_at)
        .bind(asset.id)
        .execute(&mut *tx)
        .await?;
        if touched.rows_affected() == 0 {
            return Err(DbError::not_found(format!("asset {}", asset.id)));
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO readings (asset_id, read_at, source, operator, location, note, rssi, antenna, reader_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(asset.id)
        .bind(read_at)
        .bind(reading.source.as_str())
        .bind(&operator)
        .bind(&location)
        .bind(&note)
        .bind(reading.rssi)
        .bind(reading.antenna)
        .bind(&reader_id)
        .execute(&mut *tx)
        .await?;
        let reading_id = inserted.last_insert_rowid();

        let transition = apply_step(&mut *tx, asset.id, &self.options.stations, self.today()).await?;
        audit_step(&mut *tx, asset.id, actor.as_deref(), &transition).await?;

        tx.commit().await?;
        drop(guard);

        METRICS.record_ingest_time(started);
        METRICS.inc_readings_ingested();
        METRICS.inc_rotation_advances();

        let asset = self
            .get_asset(asset.id)
            .await?
            .ok_or_else(|| DbError::not_found(format!("asset {}", asset.id)))?;

        info!(
            asset_id = asset.id,
            tag = %asset.tag,
            reading_id,
            created,
            ordinal = ?transition.after.ordinal,
            "Reading ingested"
        );

        Ok(IngestOutcome {
            reading: Reading {
                id: reading_id,
                asset_id: asset.id,
                read_at: Self::millis_to_datetime(read_at),
                source: reading.source,
                operator,
                location,
                note,
                rssi: reading.rssi,
                antenna: reading.antenna,
                reader_id,
            },
            asset,
            created,
            transition,
        })
    }

    /// Readings of one asset, newest first.
    pub async fn list_readings(&self, asset_id: i64, limit: Option<usize>) -> Result<Vec<Reading>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = sqlx::query(
            "SELECT * FROM readings WHERE asset_id = ? ORDER BY read_at DESC, id DESC LIMIT ?",
        )
        .bind(asset_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_reading).collect()
    }

    /// Most recent readings across all assets, newest first, optionally of one source.
    pub async fn list_recent_readings(
        &self,
        source: Option<ReadingSource>,
        limit: usize,
    ) -> Result<Vec<TaggedReading>> {
        let rows = sqlx::query(
            r#"
            SELECT r.*, a.tag AS tag
            FROM readings r JOIN assets a ON a.id = r.asset_id
            WHERE (?1 IS NULL OR r.source = ?1)
            ORDER BY r.read_at DESC, r.id DESC
            LIMIT ?2
            "#,
        )
        .bind(source.map(|s| s.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(TaggedReading {
                    tag: row.try_get("tag")?,
                    reading: row_to_reading(row)?,
                })
            })
            .collect()
    }

    /// Total number of readings of one asset.
    pub async fn count_readings(&self, asset_id: i64) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM readings WHERE asset_id = ?")
            .bind(asset_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

fn bounded(field: &str, value: Option<&str>) -> Result<Option<String>> {
    let value = non_blank(value);
    if let Some(v) = &value {
        if v.chars().count() > MAX_FIELD_LEN {
            return Err(DbError::validation(format!(
                "{} longer than {} characters",
                field, MAX_FIELD_LEN
            )));
        }
    }
    Ok(value)
}

fn row_to_reading(row: &SqliteRow) -> Result<Reading> {
    let source_str: String = row.try_get("source")?;
    let source = ReadingSource::parse(&source_str)
        .ok_or_else(|| DbError::invalid_state(format!("Unknown reading source: {}", source_str)))?;

    Ok(Reading {
        id: row.try_get("id")?,
        asset_id: row.try_get("asset_id")?,
        read_at: RfidFlowDb::millis_to_datetime(row.try_get("read_at")?),
        source,
        operator: row.try_get("operator")?,
        location: row.try_get("location")?,
        note: row.try_get("note")?,
        rssi: row.try_get("rssi")?,
        antenna: row.try_get("antenna")?,
        reader_id: row.try_get("reader_id")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbOptions;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn db() -> RfidFlowDb {
        RfidFlowDb::open_memory(DbOptions::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_first_and_second_reading() {
        let db = db().await;
        let today = db.today();

        let first = db.ingest_reading(NewReading::new("E2001234")).await.unwrap();
        assert!(first.created);
        assert_eq!(first.asset.reading_count, 1);
        assert_eq!(first.asset.rotation.ordinal, Some(0));
        assert_eq!(first.asset.rotation.last_distributor.as_deref(), Some("Distributor 1"));
        assert_eq!(first.asset.rotation.last_date, Some(today));
        assert_eq!(first.asset.rotation.previous_distributor, None);

        let second = db.ingest_reading(NewReading::new("E2001234")).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.asset.id, first.asset.id);
        assert_eq!(second.asset.reading_count, 2);
        assert_eq!(second.asset.rotation.ordinal, Some(1));
        assert_eq!(second.asset.rotation.last_distributor.as_deref(), Some("Distributor 2"));
        assert_eq!(
            second.asset.rotation.previous_distributor.as_deref(),
            Some("Distributor 1")
        );
        assert_eq!(second.asset.rotation.previous_date, Some(today));
        assert_eq!(second.transition.before, first.transition.after);
    }

    #[tokio::test]
    async fn test_reading_metadata_is_cleaned() {
        let db = db().await;
        let outcome = db
            .ingest_reading(NewReading {
                operator: Some("  Carlos ".into()),
                location: Some("   ".into()),
                note: Some("Leitura normal".into()),
                rssi: Some(-61),
                antenna: Some(2),
                reader_id: Some("READER-01".into()),
                ..NewReading::new("E200META")
            })
            .await
            .unwrap();

        let stored = db.list_readings(outcome.asset.id, None).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, outcome.reading.id);
        assert_eq!(stored[0].operator.as_deref(), Some("Carlos"));
        assert_eq!(stored[0].location, None);
        assert_eq!(stored[0].rssi, Some(-61));
        assert_eq!(stored[0].antenna, Some(2));
        assert_eq!(stored[0].source, ReadingSource::Rfid);
    }

    #[tokio::test]
    async fn test_invalid_tag_rejected_without_side_effects() {
        let db = db().await;
        assert!(matches!(
            db.ingest_reading(NewReading::new("   ")).await,
            Err(DbError::Validation(_))
        ));
        assert!(matches!(
            db.ingest_reading(NewReading::new("F".repeat(MAX_TAG_LEN + 1))).await,
            Err(DbError::Validation(_))
        ));

        let all = db
            .list_assets(&AssetFilter {
                include_deleted: true,
                ..AssetFilter::default()
            })
            .await
            .unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_note_rejected() {
        let db = db().await;
        let err = db
            .ingest_reading(NewReading {
                note: Some("x".repeat(MAX_FIELD_LEN + 1)),
                ..NewReading::new("E200NOTE")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }

    #[tokio::test]
    async fn test_deleted_asset_rejects_readings() {
        let db = db().await;
        let first = db.ingest_reading(NewReading::new("E200DEL")).await.unwrap();
        db.soft_delete_asset(first.asset.id, Some("admin"), "retired")
            .await
            .unwrap();

        let err = db.ingest_reading(NewReading::new("E200DEL")).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidState(_)));

        let reloaded = db.get_asset(first.asset.id).await.unwrap().unwrap();
        assert_eq!(reloaded.reading_count, 1);
        assert_eq!(db.count_readings(first.asset.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_each_reading_writes_one_consistent_audit_entry() {
        let db = db().await;
        let mut last = None;
        for _ in 0..6 {
            last = Some(
                db.ingest_reading(NewReading {
                    actor: Some("gate-1".into()),
                    ..NewReading::new("E200AUD")
                })
                .await
                .unwrap(),
            );
        }
        let asset_id = last.unwrap().asset.id;

        let entries = db.list_audit(asset_id, None).await.unwrap();
        assert_eq!(entries.len(), 6);
        for entry in &entries {
            assert_eq!(entry.action, AuditAction::Reading);
            assert_eq!(entry.actor.as_deref(), Some("gate-1"));

            let before: RotationState =
                serde_json::from_value(entry.before.clone().unwrap()).unwrap();
            let after: RotationState =
                serde_json::from_value(entry.after.clone().unwrap()).unwrap();
            let expected = before.ordinal.map(|o| (o + 1) % 4).unwrap_or(0);
            assert_eq!(after.ordinal, Some(expected));
        }
    }

    #[tokio::test]
    async fn test_history_is_newest_first() {
        let db = db().await;
        for source in [ReadingSource::Rfid, ReadingSource::Barcode, ReadingSource::Manual] {
            db.ingest_reading(NewReading {
                source,
                ..NewReading::new("E200HIST")
            })
            .await
            .unwrap();
        }
        let asset = db.find_asset_by_tag("E200HIST").await.unwrap().unwrap();

        let recent = db.list_readings(asset.id, Some(2)).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].source, ReadingSource::Manual);
        assert_eq!(recent[1].source, ReadingSource::Barcode);
    }

    #[tokio::test]
    async fn test_recent_readings_by_source() {
        let db = db().await;
        db.ingest_reading(NewReading::new("E200RF")).await.unwrap();
        db.ingest_reading(NewReading {
            source: ReadingSource::Barcode,
            ..NewReading::new("7891234567895")
        })
        .await
        .unwrap();

        let all = db.list_recent_readings(None, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].tag, "7891234567895");

        let barcodes = db
            .list_recent_readings(Some(ReadingSource::Barcode), 10)
            .await
            .unwrap();
        assert_eq!(barcodes.len(), 1);
        assert_eq!(barcodes[0].reading.source, ReadingSource::Barcode);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_readings_on_one_asset() {
        const N: usize = 25;

        let tmp = TempDir::new().unwrap();
        let db = Arc::new(
            RfidFlowDb::open(tmp.path().join("concurrent.db"), DbOptions::default())
                .await
                .unwrap(),
        );

        let mut handles = Vec::new();
        for _ in 0..N {
            let db = Arc::clone(&db);
            handles.push(tokio::spawn(async move {
                db.ingest_reading(NewReading::new("E200HOT")).await.unwrap()
            }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().created {
                created += 1;
            }
        }
        assert_eq!(created, 1);

        let asset = db.find_asset_by_tag("E200HOT").await.unwrap().unwrap();
        assert_eq!(asset.reading_count, N as i64);
        assert_eq!(asset.rotation.ordinal, Some(((N - 1) % 4) as u8));
        assert_eq!(db.count_readings(asset.id).await.unwrap(), N as u64);
        assert_eq!(
            db.count_audit(asset.id, AuditAction::Reading).await.unwrap(),
            N as u64
        );
    }
}
