//! Asset administration: lookup, create, edit, soft delete, restore, search
//! and requalification upkeep.
//!
//! Primary writes commit first; their audit entries follow best-effort.

use crate::audit::NewAuditEntry;
use crate::error::{DbError, Result};
use crate::registry::{non_blank, normalize_tag};
use crate::types::*;
use crate::RfidFlowDb;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::sqlite::{Sqlite, SqliteConnection, SqliteRow};
use sqlx::{QueryBuilder, Row};
use tracing::info;

impl RfidFlowDb {
    // ========================================================================
    // Lookup
    // ========================================================================

    /// Get an asset by id, deleted or not.
    pub async fn get_asset(&self, id: i64) -> Result<Option<Asset>> {
        let row = sqlx::query("SELECT * FROM assets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_asset).transpose()
    }

    /// Get an asset by its exact (trimmed) tag, deleted or not.
    pub async fn find_asset_by_tag(&self, tag: &str) -> Result<Option<Asset>> {
        let row = sqlx::query("SELECT * FROM assets WHERE tag = ?")
            .bind(tag.trim())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_asset).transpose()
    }

    /// List assets matching a filter, most recently updated first.
    pub async fn list_assets(&self, filter: &AssetFilter) -> Result<Vec<Asset>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM assets WHERE 1=1");

        if !filter.include_deleted {
            qb.push(" AND deleted = 0");
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(requal) = filter.requalification {
            qb.push(" AND requalification_status = ")
                .push_bind(requal.as_str());
        }
        if let Some(query) = non_blank(filter.query.as_deref()) {
            let pattern = format!("%{}%", query.to_lowercase());
            qb.push(" AND (lower(tag) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR lower(coalesce(serial_number, '')) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR lower(coalesce(manufacturer, '')) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR lower(coalesce(customer, '')) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR lower(coalesce(location, '')) LIKE ")
                .push_bind(pattern)
                .push(")");
        }

        qb.push(" ORDER BY updated_at DESC, id DESC");

        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_asset).collect()
    }

    // ========================================================================
    // Administration
    // ========================================================================

    /// Create an asset explicitly (audit `create`).
    pub async fn create_asset(&self, new: NewAsset, actor: Option<&str>) -> Result<Asset> {
        let tag = normalize_tag(&new.tag)?;
        let serial = non_blank(new.serial_number.as_deref());
        let manufacturer = non_blank(new.manufacturer.as_deref());
        check_weight("tare weight", new.tare_weight_kg)?;
        check_weight("capacity", new.capacity_kg)?;
        check_manufacture_year(new.manufacture_year)?;
        let requal = RequalificationStatus::classify(new.next_requalification, self.today());
        let now = Self::now_millis();

        let result = sqlx::query(
            r#"
            INSERT INTO assets (
                tag, serial_number, manufacturer, tare_weight_kg,
                capacity_kg, manufacture_year, inmetro_certificate, customer, location,
                status, last_requalification, next_requalification, requalification_status,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tag)
        .bind(&serial)
        .bind(&manufacturer)
        .bind(new.tare_weight_kg)
        .bind(new.capacity_kg)
        .bind(new.manufacture_year)
        .bind(non_blank(new.inmetro_certificate.as_deref()))
        .bind(non_blank(new.customer.as_deref()))
        .bind(non_blank(new.location.as_deref()))
        .bind(new.status.as_str())
        .bind(new.last_requalification)
        .bind(new.next_requalification)
        .bind(requal.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| DbError::from_unique(e, |msg| duplicate_message(msg, &tag, serial.as_deref())))?;

        let asset = self.require_asset(result.last_insert_rowid()).await?;
        info!(asset_id = asset.id, tag = %asset.tag, "Asset created");

        self.append_audit_best_effort(
            NewAuditEntry::new(asset.id, AuditAction::Create, format!("Asset {} created", asset.tag))
                .actor(actor)
                .snapshots(None, Some(serde_json::to_value(&asset)?)),
        )
        .await;

        Ok(asset)
    }

    /// Apply a partial edit (audit `edit` with the changed fields only).
    ///
    /// Runs under the asset's lock so it never interleaves with a rotation step.
    pub async fn update_asset(&self, id: i64, edit: AssetEdit, actor: Option<&str>) -> Result<Asset> {
        let _guard = self.locks.acquire(id, self.options.lock_wait).await?;
        let mut tx = self.pool.begin().await?;

        // Write first so the transaction holds the database write lock before reading
        let touched = sqlx::query("UPDATE assets SET updated_at = updated_at WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(DbError::not_found(format!("asset {}", id)));
        }

        let row = sqlx::query("SELECT * FROM assets WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        let current = row_to_asset(&row)?;
        if current.deleted {
            return Err(DbError::invalid_state(format!(
                "asset {} is deleted; restore it before editing",
                id
            )));
        }

        let mut updated = current.clone();
        let mut changes = Changes::default();

        if let Some(tag) = edit.tag {
            changes.apply("tag", &mut updated.tag, Some(normalize_tag(&tag)?))?;
        }
        changes.apply(
            "serialNumber",
            &mut updated.serial_number,
            edit.serial_number.map(|v| non_blank(v.as_deref())),
        )?;
        changes.apply(
            "manufacturer",
            &mut updated.manufacturer,
            edit.manufacturer.map(|v| non_blank(v.as_deref())),
        )?;
        if let Some(tare) = edit.tare_weight_kg {
            check_weight("tare weight", tare)?;
            changes.apply("tareWeightKg", &mut updated.tare_weight_kg, Some(tare))?;
        }
        if let Some(capacity) = edit.capacity_kg {
            check_weight("capacity", capacity)?;
            changes.apply("capacityKg", &mut updated.capacity_kg, Some(capacity))?;
        }
        if let Some(year) = edit.manufacture_year {
            check_manufacture_year(year)?;
            changes.apply("manufactureYear", &mut updated.manufacture_year, Some(year))?;
        }
        changes.apply(
            "inmetroCertificate",
            &mut updated.inmetro_certificate,
            edit.inmetro_certificate.map(|v| non_blank(v.as_deref())),
        )?;
        changes.apply(
            "customer",
            &mut updated.customer,
            edit.customer.map(|v| non_blank(v.as_deref())),
        )?;
        changes.apply(
            "location",
            &mut updated.location,
            edit.location.map(|v| non_blank(v.as_deref())),
        )?;
        changes.apply("status", &mut updated.status, edit.status)?;
        changes.apply(
            "lastRequalification",
            &mut updated.last_requalification,
            edit.last_requalification,
        )?;
        changes.apply(
            "nextRequalification",
            &mut updated.next_requalification,
            edit.next_requalification,
        )?;
        changes.apply(
            "lastDistributor",
            &mut updated.rotation.last_distributor,
            edit.last_distributor.map(|v| non_blank(v.as_deref())),
        )?;
        changes.apply("lastDate", &mut updated.rotation.last_date, edit.last_date)?;
        changes.apply(
            "previousDistributor",
            &mut updated.rotation.previous_distributor,
            edit.previous_distributor.map(|v| non_blank(v.as_deref())),
        )?;
        changes.apply(
            "previousDate",
            &mut updated.rotation.previous_date,
            edit.previous_date,
        )?;

        let requal = updated.requalification_on(self.today());
        changes.apply(
            "requalificationStatus",
            &mut updated.requalification_status,
            Some(requal),
        )?;

        if changes.is_empty() {
            tx.rollback().await?;
            return Ok(current);
        }

        sqlx::query(
            r#"
            UPDATE assets SET
                tag = ?,
                serial_number = ?,
                manufacturer = ?,
                tare_weight_kg = ?,
                capacity_kg = ?,
                manufacture_year = ?,
                inmetro_certificate = ?,
                customer = ?,
                location = ?,
                status = ?,
                last_requalification = ?,
                next_requalification = ?,
                requalification_status = ?,
                last_distributor = ?,
                last_distributor_date = ?,
                previous_distributor = ?,
                previous_distributor_date = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&updated.tag)
        .bind(&updated.serial_number)
        .bind(&updated.manufacturer)
        .bind(updated.tare_weight_kg)
        .bind(updated.capacity_kg)
        .bind(updated.manufacture_year)
        .bind(&updated.inmetro_certificate)
        .bind(&updated.customer)
        .bind(&updated.location)
        .bind(updated.status.as_str())
        .bind(updated.last_requalification)
        .bind(updated.next_requalification)
        .bind(updated.requalification_status.as_str())
        .bind(&updated.rotation.last_distributor)
        .bind(updated.rotation.last_date)
        .bind(&updated.rotation.previous_distributor)
        .bind(updated.rotation.previous_date)
        .bind(Self::now_millis())
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            DbError::from_unique(e, |msg| {
                duplicate_message(msg, &updated.tag, updated.serial_number.as_deref())
            })
        })?;

        tx.commit().await?;

        let asset = self.require_asset(id).await?;
        let fields: Vec<&str> = changes.after.keys().map(String::as_str).collect();
        info!(asset_id = id, fields = ?fields, "Asset edited");

        let description = format!("Asset {} edited: {}", asset.tag, fields.join(", "));
        self.append_audit_best_effort(
            NewAuditEntry::new(id, AuditAction::Edit, description)
                .actor(actor)
                .snapshots(
                    Some(Value::Object(changes.before)),
                    Some(Value::Object(changes.after)),
                ),
        )
        .await;

        Ok(asset)
    }

    /// Soft delete an asset (audit `delete`).
    pub async fn soft_delete_asset(
        &self,
        id: i64,
        actor: Option<&str>,
        reason: &str,
    ) -> Result<Asset> {
        let now = Self::now_millis();
        let result = sqlx::query(
            r#"
            UPDATE assets SET
                deleted = 1, deleted_at = ?, deleted_by = ?, deletion_reason = ?, updated_at = ?
            WHERE id = ? AND deleted = 0
            "#,
        )
        .bind(now)
        .bind(actor)
        .bind(non_blank(Some(reason)))
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(match self.get_asset(id).await? {
                Some(_) => DbError::invalid_state(format!("asset {} is already deleted", id)),
                None => DbError::not_found(format!("asset {}", id)),
            });
        }

        let asset = self.require_asset(id).await?;
        info!(asset_id = id, tag = %asset.tag, "Asset soft-deleted");

        let description = match asset.deletion_reason.as_deref() {
            Some(reason) => format!("Asset {} deleted: {}", asset.tag, reason),
            None => format!("Asset {} deleted", asset.tag),
        };
        self.append_audit_best_effort(
            NewAuditEntry::new(id, AuditAction::Delete, description)
                .actor(actor)
                .snapshots(
                    Some(serde_json::json!({ "deleted": false })),
                    Some(serde_json::json!({
                        "deleted": true,
                        "deletionReason": asset.deletion_reason,
                    })),
                ),
        )
        .await;

        Ok(asset)
    }

    /// Restore a soft-deleted asset, clearing its deletion metadata (audit `restore`).
    pub async fn restore_asset(&self, id: i64, actor: Option<&str>) -> Result<Asset> {
        let previous = self
            .get_asset(id)
            .await?
            .ok_or_else(|| DbError::not_found(format!("asset {}", id)))?;

        let result = sqlx::query(
            r#"
            UPDATE assets SET
                deleted = 0, deleted_at = NULL, deleted_by = NULL, deletion_reason = NULL, updated_at = ?
            WHERE id = ? AND deleted = 1
            "#,
        )
        .bind(Self::now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::invalid_state(format!("asset {} is not deleted", id)));
        }

        let asset = self.require_asset(id).await?;
        info!(asset_id = id, tag = %asset.tag, "Asset restored");

        self.append_audit_best_effort(
            NewAuditEntry::new(id, AuditAction::Restore, format!("Asset {} restored", asset.tag))
                .actor(actor)
                .snapshots(
                    Some(serde_json::json!({
                        "deleted": true,
                        "deletionReason": previous.deletion_reason,
                        "deletedBy": previous.deleted_by,
                    })),
                    Some(serde_json::json!({ "deleted": false })),
                ),
        )
        .await;

        Ok(asset)
    }

    /// Recompute the stored requalification status of every live asset.
    ///
    /// Returns the number of assets whose status changed.
    pub async fn refresh_requalification_status(&self) -> Result<u64> {
        let today = self.today();
        let rows = sqlx::query(
            "SELECT id, next_requalification, requalification_status FROM assets WHERE deleted = 0",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut tx = self.pool.begin().await?;
        let mut changed = 0u64;

        for row in &rows {
            let id: i64 = row.try_get("id")?;
            let next_due = row.try_get("next_requalification")?;
            let stored: String = row.try_get("requalification_status")?;

            let fresh = RequalificationStatus::classify(next_due, today);
            if fresh.as_str() != stored
                && store_requalification_status(&mut *tx, id, next_due, fresh).await?
            {
                changed += 1;
            }
        }

        tx.commit().await?;
        info!(checked = rows.len(), changed, %today, "Requalification status refreshed");

        Ok(changed)
    }

    async fn require_asset(&self, id: i64) -> Result<Asset> {
        self.get_asset(id)
            .await?
            .ok_or_else(|| DbError::not_found(format!("asset {}", id)))
    }
}

pub(crate) fn row_to_asset(row: &SqliteRow) -> Result<Asset> {
    let status_str: String = row.try_get("status")?;
    let status = AssetStatus::parse(&status_str)
        .ok_or_else(|| DbError::invalid_state(format!("Unknown asset status: {}", status_str)))?;

    let requal_str: String = row.try_get("requalification_status")?;
    let requalification_status = RequalificationStatus::parse(&requal_str).ok_or_else(|| {
        DbError::invalid_state(format!("Unknown requalification status: {}", requal_str))
    })?;

    let ordinal: Option<i64> = row.try_get("rotation_ordinal")?;
    let ordinal = ordinal
        .map(|o| {
            u8::try_from(o)
                .ok()
                .filter(|o| *o < DistributorStations::COUNT)
                .ok_or_else(|| DbError::invalid_state(format!("Invalid rotation ordinal: {}", o)))
        })
        .transpose()?;

    let deleted_at: Option<i64> = row.try_get("deleted_at")?;

    Ok(Asset {
        id: row.try_get("id")?,
        tag: row.try_get("tag")?,
        serial_number: row.try_get("serial_number")?,
        manufacturer: row.try_get("manufacturer")?,
        tare_weight_kg: row.try_get("tare_weight_kg")?,
        capacity_kg: row.try_get("capacity_kg")?,
        manufacture_year: row.try_get("manufacture_year")?,
        inmetro_certificate: row.try_get("inmetro_certificate")?,
        customer: row.try_get("customer")?,
        location: row.try_get("location")?,
        status,
        last_requalification: row.try_get("last_requalification")?,
        next_requalification: row.try_get("next_requalification")?,
        requalification_status,
        rotation: RotationState {
            ordinal,
            last_distributor: row.try_get("last_distributor")?,
            last_date: row.try_get("last_distributor_date")?,
            previous_distributor: row.try_get("previous_distributor")?,
            previous_date: row.try_get("previous_distributor_date")?,
        },
        reading_count: row.try_get("reading_count")?,
        deleted: row.try_get("deleted")?,
        deleted_at: deleted_at.map(RfidFlowDb::millis_to_datetime),
        deleted_by: row.try_get("deleted_by")?,
        deletion_reason: row.try_get("deletion_reason")?,
        created_at: RfidFlowDb::millis_to_datetime(row.try_get("created_at")?),
        updated_at: RfidFlowDb::millis_to_datetime(row.try_get("updated_at")?),
    })
}

/// Store a status computed from `based_on`, unless the due date has changed
/// since it was read. Returns whether the row was updated.
async fn store_requalification_status(
    conn: &mut SqliteConnection,
    id: i64,
    based_on: Option<NaiveDate>,
    status: RequalificationStatus,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE assets SET requalification_status = ?
        WHERE id = ? AND deleted = 0 AND next_requalification IS ?
        "#,
    )
    .bind(status.as_str())
    .bind(id)
    .bind(based_on)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn check_weight(field: &str, kg: Option<f64>) -> Result<()> {
    match kg {
        Some(kg) if !kg.is_finite() || kg < 0.0 => Err(DbError::validation(format!(
            "{} must be a non-negative number, got {}",
            field, kg
        ))),
        _ => Ok(()),
    }
}

fn check_manufacture_year(year: Option<i32>) -> Result<()> {
    match year {
        Some(y) if !(1900..=2100).contains(&y) => Err(DbError::validation(
            format!("manufacture year out of range: {}", y),
        )),
        _ => Ok(()),
    }
}

fn duplicate_message(db_message: &str, tag: &str, serial: Option<&str>) -> String {
    if db_message.contains("serial_number") {
        format!("serial number {} already registered", serial.unwrap_or("-"))
    } else {
        format!("tag {} already registered", tag)
    }
}

/// Before/after values of the fields an edit actually changed.
#[derive(Default)]
struct Changes {
    before: Map<String, Value>,
    after: Map<String, Value>,
}

impl Changes {
    fn apply<T: Serialize + PartialEq>(
        &mut self,
        field: &str,
        slot: &mut T,
        value: Option<T>,
    ) -> Result<()> {
        if let Some(value) = value {
            if *slot != value {
                self.before.insert(field.to_string(), serde_json::to_value(&*slot)?);
                self.after.insert(field.to_string(), serde_json::to_value(&value)?);
                *slot = value;
            }
        }
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.after.is_empty()
    }
}
