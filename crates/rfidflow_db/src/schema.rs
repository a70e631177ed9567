//! Database schema creation for all RFID Flow tables.
//!
//! All CREATE TABLE statements live here - single source of truth.
//!
//! Timestamps are milliseconds since the Unix epoch (INTEGER); calendar
//! dates are `YYYY-MM-DD` TEXT.

use crate::error::Result;
use crate::RfidFlowDb;
use tracing::info;

impl RfidFlowDb {
    /// Ensure all tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        self.create_asset_tables().await?;
        self.create_reading_tables().await?;
        self.create_audit_tables().await?;

        info!("Database schema verified");
        Ok(())
    }

    /// Create the asset registry
    async fn create_asset_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS assets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tag TEXT NOT NULL UNIQUE CHECK (length(tag) BETWEEN 1 AND 200),
                serial_number TEXT UNIQUE,
                manufacturer TEXT,
                tare_weight_kg REAL,
                capacity_kg REAL,
                manufacture_year INTEGER,
                inmetro_certificate TEXT,
                customer TEXT,
                location TEXT,
                status TEXT NOT NULL DEFAULT 'active'
                    CHECK (status IN ('active', 'inactive', 'maintenance')),
                last_requalification TEXT,
                next_requalification TEXT,
                requalification_status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (requalification_status IN ('up_to_date', 'due_soon', 'overdue', 'pending')),
                rotation_ordinal INTEGER CHECK (rotation_ordinal BETWEEN 0 AND 3),
                last_distributor TEXT,
                last_distributor_date TEXT,
                previous_distributor TEXT,
                previous_distributor_date TEXT,
                reading_count INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0,
                deleted_at INTEGER,
                deleted_by TEXT,
                deletion_reason TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_assets_live ON assets(deleted, status)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_assets_next_requal ON assets(next_requalification)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Create the reading log
    async fn create_reading_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                asset_id INTEGER NOT NULL REFERENCES assets(id),
                read_at INTEGER NOT NULL,
                source TEXT NOT NULL DEFAULT 'rfid'
                    CHECK (source IN ('rfid', 'barcode', 'manual')),
                operator TEXT,
                location TEXT,
                note TEXT,
                rssi INTEGER,
                antenna INTEGER,
                reader_id TEXT
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_readings_asset ON readings(asset_id, read_at DESC)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_readings_read_at ON readings(read_at)")
            .execute(&self.pool)
            .await?;

        // Readings are immutable once written
        sqlx::query(
            r#"CREATE TRIGGER IF NOT EXISTS readings_append_only_update
               BEFORE UPDATE ON readings
               BEGIN SELECT RAISE(ABORT, 'readings are append-only'); END"#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"CREATE TRIGGER IF NOT EXISTS readings_append_only_delete
               BEFORE DELETE ON readings
               BEGIN SELECT RAISE(ABORT, 'readings are append-only'); END"#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Create the audit trail
    async fn create_audit_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS audit_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                asset_id INTEGER NOT NULL REFERENCES assets(id),
                action TEXT NOT NULL
                    CHECK (action IN ('create', 'edit', 'delete', 'restore', 'reading')),
                actor TEXT,
                at INTEGER NOT NULL,
                description TEXT NOT NULL,
                before_json TEXT,
                after_json TEXT
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_asset ON audit_entries(asset_id, id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"CREATE TRIGGER IF NOT EXISTS audit_append_only_update
               BEFORE UPDATE ON audit_entries
               BEGIN SELECT RAISE(ABORT, 'audit entries are append-only'); END"#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"CREATE TRIGGER IF NOT EXISTS audit_append_only_delete
               BEFORE DELETE ON audit_entries
               BEGIN SELECT RAISE(ABORT, 'audit entries are append-only'); END"#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
