//! Two database handles on one file stand in for two server processes: they
//! share no in-process locks, so only SQLite's write lock serializes them.

use std::sync::Arc;
use std::time::Duration;

use rfidflow_db::{AuditAction, DbOptions, NewReading, RfidFlowDb};
use tempfile::TempDir;

async fn open_pair(tmp: &TempDir) -> (Arc<RfidFlowDb>, Arc<RfidFlowDb>) {
    let path = tmp.path().join("shared.db");
    let a = RfidFlowDb::open(&path, DbOptions::default()).await.unwrap();
    let b = RfidFlowDb::open(&path, DbOptions::default()).await.unwrap();
    (Arc::new(a), Arc::new(b))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_handles_never_lose_a_rotation_step() {
    const PER_HANDLE: usize = 12;

    let tmp = TempDir::new().unwrap();
    let (a, b) = open_pair(&tmp).await;

    let mut handles = Vec::new();
    for db in [&a, &b] {
        for _ in 0..PER_HANDLE {
            let db = Arc::clone(db);
            handles.push(tokio::spawn(async move {
                db.ingest_reading(NewReading::new("E200SHARED")).await.unwrap()
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let total = PER_HANDLE * 2;
    let asset = a.find_asset_by_tag("E200SHARED").await.unwrap().unwrap();
    assert_eq!(asset.reading_count, total as i64);
    assert_eq!(asset.rotation.ordinal, Some(((total - 1) % 4) as u8));
    assert_eq!(
        b.count_audit(asset.id, AuditAction::Reading).await.unwrap(),
        total as u64
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_open_write_transaction_blocks_ingestion_until_commit() {
    let tmp = TempDir::new().unwrap();
    let (a, b) = open_pair(&tmp).await;

    let first = a.ingest_reading(NewReading::new("E200WAIT")).await.unwrap();

    // Hold the database write lock from the other handle
    let mut tx = b.pool().begin().await.unwrap();
    sqlx::query("UPDATE assets SET updated_at = updated_at WHERE id = ?")
        .bind(first.asset.id)
        .execute(&mut *tx)
        .await
        .unwrap();

    let a_ingest = Arc::clone(&a);
    let mut pending = tokio::spawn(async move {
        a_ingest
            .ingest_reading(NewReading::new("E200WAIT"))
            .await
            .unwrap()
    });

    let early = tokio::time::timeout(Duration::from_millis(100), &mut pending).await;
    assert!(early.is_err(), "ingestion should wait for the open write transaction");

    tx.commit().await.unwrap();
    let second = pending.await.unwrap();

    assert_eq!(second.asset.reading_count, 2);
    assert_eq!(second.asset.rotation.ordinal, Some(1));
    assert_eq!(
        second.asset.rotation.previous_distributor.as_deref(),
        Some("Distributor 1")
    );
}
