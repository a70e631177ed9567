//! Distributor rotation.
//!
//! Each reading moves a cylinder to the next of four distributor stations.
//! The ordinal starts out null; the first step sets it to 0 and later steps
//! advance it modulo 4, shifting the current "last" pair into "previous".
//!
//! [`advance`] is the pure transition. The database side applies it under the
//! per-asset lock inside the caller's transaction, together with exactly one
//! `reading` audit entry.

use chrono::NaiveDate;
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;
use tracing::info;

use crate::audit::{insert_entry, NewAuditEntry};
use crate::error::{DbError, Result};
use crate::metrics::METRICS;
use crate::types::*;
use crate::RfidFlowDb;

/// Compute the rotation state after one reading on `today`.
pub fn advance(state: &RotationState, stations: &DistributorStations, today: NaiveDate) -> RotationState {
    match state.ordinal {
        None => RotationState {
            ordinal: Some(0),
            last_distributor: Some(stations.name(0).to_string()),
            last_date: Some(today),
            previous_distributor: state.previous_distributor.clone(),
            previous_date: state.previous_date,
        },
        Some(current) => {
            let next = (current % DistributorStations::COUNT + 1) % DistributorStations::COUNT;
            RotationState {
                ordinal: Some(next),
                last_distributor: Some(stations.name(next).to_string()),
                last_date: Some(today),
                previous_distributor: state.last_distributor.clone(),
                previous_date: state.last_date,
            }
        }
    }
}

/// Human-readable summary of a transition, stored as the audit description.
pub fn describe(transition: &RotationTransition) -> String {
    let to = transition
        .after
        .last_distributor
        .as_deref()
        .unwrap_or("-");
    match (transition.before.ordinal, transition.before.last_distributor.as_deref()) {
        (None, _) => format!("Reading registered; rotation started at {}", to),
        (Some(_), Some(from)) => format!("Reading registered; rotation {} -> {}", from, to),
        (Some(_), None) => format!("Reading registered; rotation advanced to {}", to),
    }
}

/// Apply one rotation step to `asset_id` on an open connection.
///
/// The caller must hold the asset's lock and an open write transaction.
pub(crate) async fn apply_step(
    conn: &mut SqliteConnection,
    asset_id: i64,
    stations: &DistributorStations,
    today: NaiveDate,
) -> Result<RotationTransition> {
    let row = sqlx::query(
        r#"
        SELECT deleted, rotation_ordinal, last_distributor, last_distributor_date,
               previous_distributor, previous_distributor_date
        FROM assets WHERE id = ?
        "#,
    )
    .bind(asset_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::not_found(format!("asset {}", asset_id)))?;

    if row.try_get::<bool, _>("deleted")? {
        return Err(DbError::invalid_state(format!("asset {} is deleted", asset_id)));
    }

    let ordinal: Option<i64> = row.try_get("rotation_ordinal")?;
    let before = RotationState {
        ordinal: ordinal.map(|o| o.rem_euclid(i64::from(DistributorStations::COUNT)) as u8),
        last_distributor: row.try_get("last_distributor")?,
        last_date: row.try_get("last_distributor_date")?,
        previous_distributor: row.try_get("previous_distributor")?,
        previous_date: row.try_get("previous_distributor_date")?,
    };
    let after = advance(&before, stations, today);

    sqlx::query(
        r#"
        UPDATE assets SET
            rotation_ordinal = ?,
            last_distributor = ?,
            last_distributor_date = ?,
            previous_distributor = ?,
            previous_distributor_date = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(after.ordinal.map(i64::from))
    .bind(&after.last_distributor)
    .bind(after.last_date)
    .bind(&after.previous_distributor)
    .bind(after.previous_date)
    .bind(RfidFlowDb::now_millis())
    .bind(asset_id)
    .execute(&mut *conn)
    .await?;

    Ok(RotationTransition { before, after })
}

/// Write the `reading` audit entry for a transition on the same connection.
pub(crate) async fn audit_step(
    conn: &mut SqliteConnection,
    asset_id: i64,
    actor: Option<&str>,
    transition: &RotationTransition,
) -> Result<i64> {
    let entry = NewAuditEntry::new(asset_id, AuditAction::Reading, describe(transition))
        .actor(actor)
        .snapshots(
            Some(serde_json::to_value(&transition.before)?),
            Some(serde_json::to_value(&transition.after)?),
        );
    insert_entry(conn, &entry).await
}

impl RfidFlowDb {
    /// Advance an asset's rotation by one step without recording a reading.
    pub async fn advance_distributor(
        &self,
        asset_id: i64,
        actor: Option<&str>,
    ) -> Result<RotationTransition> {
        let _guard = self.locks.acquire(asset_id, self.options.lock_wait).await?;

        let mut tx = self.pool.begin().await?;

        // Write first so the transaction holds the database write lock throughout
        let touched = sqlx::query("UPDATE assets SET updated_at = ? WHERE id = ?")
            .bind(Self::now_millis())
            .bind(asset_id)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(DbError::not_found(format!("asset {}", asset_id)));
        }

        let transition = apply_step(&mut *tx, asset_id, &self.options.stations, self.today()).await?;
        audit_step(&mut *tx, asset_id, actor, &transition).await?;
        tx.commit().await?;

        METRICS.inc_rotation_advances();
        info!(
            asset_id,
            ordinal = ?transition.after.ordinal,
            distributor = ?transition.after.last_distributor,
            "Distributor rotation advanced"
        );

        Ok(transition)
    }
}
