//! Types for all RFID Flow database entities.
//!
//! These types are the single source of truth. The HTTP server and the CLI
//! both read and write through them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DbError, Result};

/// Longest accepted tag string (RFID EPC hex or barcode payload).
pub const MAX_TAG_LEN: usize = 200;

/// Days before the due date at which requalification counts as "due soon".
pub const REQUALIFICATION_WARNING_DAYS: i64 = 90;

// ============================================================================
// Asset Types
// ============================================================================

/// Lifecycle status of a cylinder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    #[default]
    Active,
    Inactive,
    Maintenance,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Maintenance => "maintenance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "maintenance" => Some(Self::Maintenance),
            _ => None,
        }
    }
}

impl std::fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Requalification standing of a cylinder relative to a reference date
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequalificationStatus {
    UpToDate,
    DueSoon,
    Overdue,
    /// No next-due date recorded
    #[default]
    Pending,
}

impl RequalificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpToDate => "up_to_date",
            Self::DueSoon => "due_soon",
            Self::Overdue => "overdue",
            Self::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "up_to_date" => Some(Self::UpToDate),
            "due_soon" => Some(Self::DueSoon),
            "overdue" => Some(Self::Overdue),
            "pending" => Some(Self::Pending),
            _ => None,
        }
    }

    /// Classify a next-due date against `today`.
    ///
    /// Overdue only once the due date has passed; due today is still due soon.
    pub fn classify(next_due: Option<NaiveDate>, today: NaiveDate) -> Self {
        match next_due {
            None => Self::Pending,
            Some(due) if due < today => Self::Overdue,
            Some(due) if (due - today).num_days() <= REQUALIFICATION_WARNING_DAYS => Self::DueSoon,
            Some(_) => Self::UpToDate,
        }
    }
}

impl std::fmt::Display for RequalificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The four distributor stations a cylinder cycles through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct DistributorStations([String; 4]);

impl DistributorStations {
    pub const COUNT: u8 = 4;

    pub fn new(names: Vec<String>) -> Result<Self> {
        let names: [String; 4] = names.try_into().map_err(|v: Vec<String>| {
            DbError::validation(format!(
                "exactly {} distributor stations required, got {}",
                Self::COUNT,
                v.len()
            ))
        })?;
        if let Some(blank) = names.iter().position(|n| n.trim().is_empty()) {
            return Err(DbError::validation(format!(
                "distributor station {} has an empty name",
                blank + 1
            )));
        }
        Ok(Self(names))
    }

    /// Station name for a rotation ordinal (taken modulo 4).
    pub fn name(&self, ordinal: u8) -> &str {
        &self.0[usize::from(ordinal % Self::COUNT)]
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }
}

impl Default for DistributorStations {
    fn default() -> Self {
        Self(std::array::from_fn(|i| format!("Distributor {}", i + 1)))
    }
}

impl TryFrom<Vec<String>> for DistributorStations {
    type Error = DbError;

    fn try_from(value: Vec<String>) -> Result<Self> {
        Self::new(value)
    }
}

impl From<DistributorStations> for Vec<String> {
    fn from(value: DistributorStations) -> Self {
        value.0.into()
    }
}

/// Distributor rotation fields of an asset.
///
/// Also the shape of the before/after snapshots stored with `reading` audit
/// entries; dates serialize as `YYYY-MM-DD` or null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationState {
    pub ordinal: Option<u8>,
    pub last_distributor: Option<String>,
    pub last_date: Option<NaiveDate>,
    pub previous_distributor: Option<String>,
    pub previous_date: Option<NaiveDate>,
}

/// One applied rotation step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationTransition {
    pub before: RotationState,
    pub after: RotationState,
}

/// A tracked gas cylinder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: i64,
    pub tag: String,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub tare_weight_kg: Option<f64>,
    /// Nominal gas capacity in kg (13, 20, 45...)
    pub capacity_kg: Option<f64>,
    pub manufacture_year: Option<i32>,
    pub inmetro_certificate: Option<String>,
    /// Customer or company holding the cylinder
    pub customer: Option<String>,
    /// Address or place where the cylinder currently is
    pub location: Option<String>,
    pub status: AssetStatus,
    pub last_requalification: Option<NaiveDate>,
    pub next_requalification: Option<NaiveDate>,
    pub requalification_status: RequalificationStatus,
    pub rotation: RotationState,
    pub reading_count: i64,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub deletion_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    /// Serial number or the `-` placeholder used on the wire.
    pub fn serial_or_placeholder(&self) -> &str {
        self.serial_number.as_deref().unwrap_or("-")
    }

    /// Days until the next requalification (negative when overdue).
    pub fn days_until_requalification(&self, today: NaiveDate) -> Option<i64> {
        self.next_requalification.map(|due| (due - today).num_days())
    }

    pub fn requalification_on(&self, today: NaiveDate) -> RequalificationStatus {
        RequalificationStatus::classify(self.next_requalification, today)
    }
}

/// Field values for a new asset.
#[derive(Debug, Clone, Default)]
pub struct NewAsset {
    pub tag: String,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub tare_weight_kg: Option<f64>,
    pub capacity_kg: Option<f64>,
    pub manufacture_year: Option<i32>,
    pub inmetro_certificate: Option<String>,
    pub customer: Option<String>,
    pub location: Option<String>,
    pub status: AssetStatus,
    pub last_requalification: Option<NaiveDate>,
    pub next_requalification: Option<NaiveDate>,
}

impl NewAsset {
    /// The record the tag registry creates on first sight of a tag.
    pub fn with_defaults(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }
}

/// Partial update of an asset. `None` leaves a field unchanged; for nullable
/// columns `Some(None)` clears the value.
#[derive(Debug, Clone, Default)]
pub struct AssetEdit {
    pub tag: Option<String>,
    pub serial_number: Option<Option<String>>,
    pub manufacturer: Option<Option<String>>,
    pub tare_weight_kg: Option<Option<f64>>,
    pub capacity_kg: Option<Option<f64>>,
    pub manufacture_year: Option<Option<i32>>,
    pub inmetro_certificate: Option<Option<String>>,
    pub customer: Option<Option<String>>,
    pub location: Option<Option<String>>,
    pub status: Option<AssetStatus>,
    pub last_requalification: Option<Option<NaiveDate>>,
    pub next_requalification: Option<Option<NaiveDate>>,
    pub last_distributor: Option<Option<String>>,
    pub last_date: Option<Option<NaiveDate>>,
    pub previous_distributor: Option<Option<String>>,
    pub previous_date: Option<Option<NaiveDate>>,
}

impl AssetEdit {
    pub fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.serial_number.is_none()
            && self.manufacturer.is_none()
            && self.tare_weight_kg.is_none()
            && self.capacity_kg.is_none()
            && self.manufacture_year.is_none()
            && self.inmetro_certificate.is_none()
            && self.customer.is_none()
            && self.location.is_none()
            && self.status.is_none()
            && self.last_requalification.is_none()
            && self.next_requalification.is_none()
            && self.last_distributor.is_none()
            && self.last_date.is_none()
            && self.previous_distributor.is_none()
            && self.previous_date.is_none()
    }
}

// ============================================================================
// Reading Types
// ============================================================================

/// Where a reading came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingSource {
    #[default]
    Rfid,
    Barcode,
    Manual,
}

impl ReadingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rfid => "rfid",
            Self::Barcode => "barcode",
            Self::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "rfid" => Some(Self::Rfid),
            "barcode" => Some(Self::Barcode),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReadingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One scan event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub id: i64,
    pub asset_id: i64,
    pub read_at: DateTime<Utc>,
    pub source: ReadingSource,
    pub operator: Option<String>,
    pub location: Option<String>,
    pub note: Option<String>,
    pub rssi: Option<i32>,
    pub antenna: Option<i32>,
    pub reader_id: Option<String>,
}

/// A reading together with its asset's tag
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggedReading {
    pub tag: String,
    #[serde(flatten)]
    pub reading: Reading,
}

/// A scan to ingest
#[derive(Debug, Clone, Default)]
pub struct NewReading {
    pub tag: String,
    pub source: ReadingSource,
    pub operator: Option<String>,
    pub location: Option<String>,
    pub note: Option<String>,
    pub rssi: Option<i32>,
    pub antenna: Option<i32>,
    pub reader_id: Option<String>,
    /// Authenticated user behind the scan, if any
    pub actor: Option<String>,
}

impl NewReading {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }
}

/// Result of ingesting one reading
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// Asset state after the rotation step
    pub asset: Asset,
    /// Whether the tag was seen for the first time
    pub created: bool,
    pub reading: Reading,
    pub transition: RotationTransition,
}

// ============================================================================
// Audit Types
// ============================================================================

/// Kind of audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Edit,
    Delete,
    Restore,
    Reading,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Restore => "restore",
            Self::Reading => "reading",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "create" => Some(Self::Create),
            "edit" => Some(Self::Edit),
            "delete" => Some(Self::Delete),
            "restore" => Some(Self::Restore),
            "reading" => Some(Self::Reading),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: i64,
    pub asset_id: i64,
    pub action: AuditAction,
    pub actor: Option<String>,
    pub at: DateTime<Utc>,
    pub description: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
}

// ============================================================================
// Filter and Stats Types
// ============================================================================

/// Filter for listing assets
#[derive(Debug, Clone, Default)]
pub struct AssetFilter {
    /// Case-insensitive substring over tag, serial number and manufacturer
    pub query: Option<String>,
    pub status: Option<AssetStatus>,
    pub requalification: Option<RequalificationStatus>,
    pub include_deleted: bool,
    pub limit: Option<usize>,
}

/// Readings recorded on one calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyReadings {
    pub date: NaiveDate,
    pub total: u64,
}

/// Live assets per requalification bucket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequalificationCounts {
    pub overdue: u64,
    pub due_soon: u64,
    pub up_to_date: u64,
    pub pending: u64,
}

/// Dashboard statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub live_assets: u64,
    pub readings_today: u64,
    /// Oldest first, ending today
    pub readings_last_7_days: Vec<DailyReadings>,
    pub requalification: RequalificationCounts,
}
