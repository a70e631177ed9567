//! Asset commands - list, inspect and administer cylinders

use anyhow::{Context, Result};
use chrono::NaiveDate;
use comfy_table::Color;
use rfidflow_db::{
    rotation, Asset, AssetEdit, AssetFilter, AssetStatus, NewAsset, RequalificationStatus,
    RfidFlowDb,
};
use serde::Serialize;
use std::str::FromStr;

use crate::cli::context::require_asset;
use crate::cli::output::{
    format_date, format_datetime, or_dash, print_json, print_table, print_table_colored,
    requalification_color, status_color,
};

#[derive(Debug, Clone, clap::Subcommand)]
pub enum AssetAction {
    /// List cylinders
    List {
        /// Case-insensitive search over tag, serial number, manufacturer,
        /// customer and location
        #[arg(short = 'q', long)]
        query: Option<String>,

        /// active, inactive or maintenance
        #[arg(long, value_parser = parse_status)]
        status: Option<AssetStatus>,

        /// overdue, due_soon, up_to_date or pending
        #[arg(long, value_parser = parse_requalification)]
        requal: Option<RequalificationStatus>,

        /// Include soft-deleted cylinders
        #[arg(long)]
        include_deleted: bool,

        #[arg(short = 'n', long, default_value = "100")]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Show one cylinder with its recent readings
    Show {
        tag: String,

        /// Number of readings to show
        #[arg(short = 'n', long, default_value = "10")]
        readings: usize,

        #[arg(long)]
        json: bool,
    },

    /// Register a cylinder ahead of its first scan
    Create {
        tag: String,

        #[arg(long)]
        serial: Option<String>,

        #[arg(long)]
        manufacturer: Option<String>,

        /// Tare weight in kg
        #[arg(long)]
        tare: Option<f64>,

        /// Gas capacity in kg
        #[arg(long)]
        capacity: Option<f64>,

        #[arg(long)]
        year: Option<i32>,

        /// INMETRO certificate number
        #[arg(long)]
        inmetro: Option<String>,

        #[arg(long)]
        customer: Option<String>,

        #[arg(long)]
        location: Option<String>,

        #[arg(long, default_value = "active", value_parser = parse_status)]
        status: AssetStatus,

        /// Last requalification date (YYYY-MM-DD)
        #[arg(long)]
        last_requal: Option<NaiveDate>,

        /// Next requalification due date (YYYY-MM-DD)
        #[arg(long)]
        next_requal: Option<NaiveDate>,

        #[arg(long)]
        actor: Option<String>,
    },

    /// Edit a cylinder; pass an empty string to clear a field
    Edit {
        tag: String,

        /// Replace the tag
        #[arg(long)]
        new_tag: Option<String>,

        #[arg(long)]
        serial: Option<String>,

        #[arg(long)]
        manufacturer: Option<String>,

        #[arg(long)]
        tare: Option<String>,

        #[arg(long)]
        capacity: Option<String>,

        #[arg(long)]
        year: Option<String>,

        #[arg(long)]
        inmetro: Option<String>,

        #[arg(long)]
        customer: Option<String>,

        #[arg(long)]
        location: Option<String>,

        #[arg(long, value_parser = parse_status)]
        status: Option<AssetStatus>,

        #[arg(long)]
        last_requal: Option<String>,

        #[arg(long)]
        next_requal: Option<String>,

        #[arg(long)]
        last_distributor: Option<String>,

        #[arg(long)]
        last_date: Option<String>,

        #[arg(long)]
        previous_distributor: Option<String>,

        #[arg(long)]
        previous_date: Option<String>,

        #[arg(long)]
        actor: Option<String>,
    },

    /// Soft delete a cylinder
    Delete {
        tag: String,

        #[arg(long)]
        reason: String,

        #[arg(long)]
        actor: Option<String>,
    },

    /// Undo a soft delete
    Restore {
        tag: String,

        #[arg(long)]
        actor: Option<String>,
    },
}

pub fn parse_status(s: &str) -> std::result::Result<AssetStatus, String> {
    AssetStatus::parse(s)
        .ok_or_else(|| format!("unknown status '{}' (active, inactive, maintenance)", s))
}

pub fn parse_requalification(s: &str) -> std::result::Result<RequalificationStatus, String> {
    RequalificationStatus::parse(s).ok_or_else(|| {
        format!(
            "unknown requalification status '{}' (overdue, due_soon, up_to_date, pending)",
            s
        )
    })
}

pub async fn run(db: &RfidFlowDb, action: AssetAction) -> Result<()> {
    match action {
        AssetAction::List {
            query,
            status,
            requal,
            include_deleted,
            limit,
            json,
        } => {
            let filter = AssetFilter {
                query,
                status,
                requalification: requal,
                include_deleted,
                limit: Some(limit),
            };
            list(db, &filter, json).await
        }
        AssetAction::Show {
            tag,
            readings,
            json,
        } => show(db, &tag, readings, json).await,
        AssetAction::Create {
            tag,
            serial,
            manufacturer,
            tare,
            capacity,
            year,
            inmetro,
            customer,
            location,
            status,
            last_requal,
            next_requal,
            actor,
        } => {
            let asset = db
                .create_asset(
                    NewAsset {
                        tag,
                        serial_number: serial,
                        manufacturer,
                        tare_weight_kg: tare,
                        capacity_kg: capacity,
                        manufacture_year: year,
                        inmetro_certificate: inmetro,
                        customer,
                        location,
                        status,
                        last_requalification: last_requal,
                        next_requalification: next_requal,
                    },
                    actor.as_deref(),
                )
                .await?;
            println!("Created cylinder {} (id {})", asset.tag, asset.id);
            Ok(())
        }
        AssetAction::Edit {
            tag,
            new_tag,
            serial,
            manufacturer,
            tare,
            capacity,
            year,
            inmetro,
            customer,
            location,
            status,
            last_requal,
            next_requal,
            last_distributor,
            last_date,
            previous_distributor,
            previous_date,
            actor,
        } => {
            let asset = require_asset(db, &tag).await?;
            let edit = AssetEdit {
                tag: new_tag,
                serial_number: clearable(serial),
                manufacturer: clearable(manufacturer),
                tare_weight_kg: clearable_parsed(tare, "tare")?,
                capacity_kg: clearable_parsed(capacity, "capacity")?,
                manufacture_year: clearable_parsed(year, "year")?,
                inmetro_certificate: clearable(inmetro),
                customer: clearable(customer),
                location: clearable(location),
                status,
                last_requalification: clearable_parsed(last_requal, "last requalification")?,
                next_requalification: clearable_parsed(next_requal, "next requalification")?,
                last_distributor: clearable(last_distributor),
                last_date: clearable_parsed(last_date, "last date")?,
                previous_distributor: clearable(previous_distributor),
                previous_date: clearable_parsed(previous_date, "previous date")?,
            };
            if edit.is_empty() {
                anyhow::bail!("Nothing to change; pass at least one field option");
            }
            let updated = db.update_asset(asset.id, edit, actor.as_deref()).await?;
            println!("Updated cylinder {} (id {})", updated.tag, updated.id);
            Ok(())
        }
        AssetAction::Delete { tag, reason, actor } => {
            let asset = require_asset(db, &tag).await?;
            db.soft_delete_asset(asset.id, actor.as_deref(), &reason)
                .await?;
            println!("Deleted cylinder {} (id {})", asset.tag, asset.id);
            Ok(())
        }
        AssetAction::Restore { tag, actor } => {
            let asset = require_asset(db, &tag).await?;
            db.restore_asset(asset.id, actor.as_deref()).await?;
            println!("Restored cylinder {} (id {})", asset.tag, asset.id);
            Ok(())
        }
    }
}

/// Manual rotation step, as if the cylinder had been scanned, without a reading.
pub async fn run_advance(db: &RfidFlowDb, tag: &str, actor: Option<&str>, json: bool) -> Result<()> {
    let asset = require_asset(db, tag).await?;
    let transition = db.advance_distributor(asset.id, actor).await?;
    if json {
        return print_json(&transition);
    }
    println!("{}: {}", asset.tag, rotation::describe(&transition));
    Ok(())
}

async fn list(db: &RfidFlowDb, filter: &AssetFilter, json: bool) -> Result<()> {
    let assets = db.list_assets(filter).await?;
    if json {
        return print_json(&assets);
    }
    if assets.is_empty() {
        println!("No cylinders found.");
        return Ok(());
    }

    let today = db.today();
    let rows = assets
        .iter()
        .map(|a| {
            let requal = a.requalification_on(today);
            vec![
                (a.id.to_string(), None),
                (a.tag.clone(), a.deleted.then_some(Color::DarkGrey)),
                (or_dash(a.serial_number.as_deref()), None),
                (a.status.to_string(), Some(status_color(a.status))),
                (
                    format!("{} ({})", requal, format_date(a.next_requalification)),
                    Some(requalification_color(requal)),
                ),
                (or_dash(a.rotation.last_distributor.as_deref()), None),
                (a.reading_count.to_string(), None),
            ]
        })
        .collect();
    print_table_colored(
        &["ID", "TAG", "SERIAL", "STATUS", "REQUALIFICATION", "DISTRIBUTOR", "READINGS"],
        rows,
    );
    println!("{} cylinder(s)", assets.len());
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShowOutput<'a> {
    asset: &'a Asset,
    days_until_requalification: Option<i64>,
    recent_readings: &'a [rfidflow_db::Reading],
}

async fn show(db: &RfidFlowDb, tag: &str, limit: usize, json: bool) -> Result<()> {
    let asset = require_asset(db, tag).await?;
    let readings = db.list_readings(asset.id, Some(limit)).await?;
    let today = db.today();
    let days = asset.days_until_requalification(today);

    if json {
        return print_json(&ShowOutput {
            asset: &asset,
            days_until_requalification: days,
            recent_readings: &readings,
        });
    }

    let tz = db.options().timezone;
    println!("Cylinder {} (id {})", asset.tag, asset.id);
    if asset.deleted {
        println!(
            "  DELETED      {} by {}: {}",
            asset
                .deleted_at
                .map(|at| format_datetime(at, tz))
                .unwrap_or_else(|| "-".into()),
            or_dash(asset.deleted_by.as_deref()),
            or_dash(asset.deletion_reason.as_deref()),
        );
    }
    println!("  Serial:      {}", asset.serial_or_placeholder());
    println!("  Maker:       {}", or_dash(asset.manufacturer.as_deref()));
    println!(
        "  Tare:        {}",
        asset
            .tare_weight_kg
            .map(|kg| format!("{:.2} kg", kg))
            .unwrap_or_else(|| "-".into())
    );
    println!(
        "  Capacity:    {}",
        asset
            .capacity_kg
            .map(|kg| format!("{:.2} kg", kg))
            .unwrap_or_else(|| "-".into())
    );
    println!(
        "  Made:        {}",
        asset
            .manufacture_year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "-".into())
    );
    println!("  INMETRO:     {}", or_dash(asset.inmetro_certificate.as_deref()));
    println!("  Customer:    {}", or_dash(asset.customer.as_deref()));
    println!("  Location:    {}", or_dash(asset.location.as_deref()));
    println!("  Status:      {}", asset.status);
    println!(
        "  Requal:      {} (last {}, next {}{})",
        asset.requalification_on(today),
        format_date(asset.last_requalification),
        format_date(asset.next_requalification),
        days.map(|d| format!(", {} days", d)).unwrap_or_default(),
    );
    println!(
        "  Distributor: {} since {} (previous: {} since {})",
        or_dash(asset.rotation.last_distributor.as_deref()),
        format_date(asset.rotation.last_date),
        or_dash(asset.rotation.previous_distributor.as_deref()),
        format_date(asset.rotation.previous_date),
    );
    println!("  Readings:    {}", asset.reading_count);
    println!();

    if readings.is_empty() {
        println!("No readings yet.");
        return Ok(());
    }
    let rows = readings
        .iter()
        .map(|r| {
            vec![
                r.id.to_string(),
                format_datetime(r.read_at, tz),
                r.source.to_string(),
                or_dash(r.operator.as_deref()),
                or_dash(r.location.as_deref()),
                r.rssi.map(|v| v.to_string()).unwrap_or_else(|| "-".into()),
            ]
        })
        .collect();
    print_table(&["ID", "READ AT", "SOURCE", "OPERATOR", "LOCATION", "RSSI"], rows);
    Ok(())
}

/// `None` leaves the field alone, an empty value clears it.
fn clearable(value: Option<String>) -> Option<Option<String>> {
    value.map(|v| Some(v.trim().to_string()).filter(|v| !v.is_empty()))
}

fn clearable_parsed<T>(value: Option<String>, field: &str) -> Result<Option<Option<T>>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match clearable(value) {
        None => Ok(None),
        Some(None) => Ok(Some(None)),
        Some(Some(v)) => {
            let parsed = v
                .parse::<T>()
                .with_context(|| format!("Invalid {}: '{}'", field, v))?;
            Ok(Some(Some(parsed)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clearable() {
        assert_eq!(clearable(None), None);
        assert_eq!(clearable(Some("  ".into())), Some(None));
        assert_eq!(clearable(Some(" SN-1 ".into())), Some(Some("SN-1".into())));
    }

    #[test]
    fn test_clearable_parsed() {
        let date: Option<Option<NaiveDate>> =
            clearable_parsed(Some("2026-02-01".into()), "date").unwrap();
        assert_eq!(date, Some(NaiveDate::from_ymd_opt(2026, 2, 1)));

        let cleared: Option<Option<f64>> = clearable_parsed(Some("".into()), "tare").unwrap();
        assert_eq!(cleared, Some(None));

        assert!(clearable_parsed::<f64>(Some("heavy".into()), "tare").is_err());
    }

    #[test]
    fn test_parse_filters() {
        assert_eq!(parse_status("Maintenance"), Ok(AssetStatus::Maintenance));
        assert!(parse_status("lost").is_err());
        assert_eq!(
            parse_requalification("due_soon"),
            Ok(RequalificationStatus::DueSoon)
        );
    }
}
