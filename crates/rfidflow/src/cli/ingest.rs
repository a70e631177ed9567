//! Ingest command - record a reading without going through the server

use anyhow::Result;
use rfidflow_db::{NewReading, ReadingSource, RfidFlowDb};
use serde::Serialize;

use crate::cli::output::{format_date, format_datetime, or_dash, print_json};

#[derive(Debug, Clone, clap::Args)]
pub struct IngestArgs {
    /// Tag identifier (RFID EPC or barcode payload)
    pub tag: String,

    /// rfid, barcode or manual
    #[arg(long, default_value = "manual", value_parser = parse_source)]
    pub source: ReadingSource,

    #[arg(long)]
    pub operator: Option<String>,

    #[arg(long)]
    pub location: Option<String>,

    #[arg(long)]
    pub note: Option<String>,

    /// Signal strength in dBm
    #[arg(long, allow_negative_numbers = true)]
    pub rssi: Option<i32>,

    #[arg(long)]
    pub antenna: Option<i32>,

    #[arg(long)]
    pub reader: Option<String>,

    /// User recorded on the audit entry
    #[arg(long)]
    pub actor: Option<String>,

    #[arg(long)]
    pub json: bool,
}

pub fn parse_source(s: &str) -> std::result::Result<ReadingSource, String> {
    ReadingSource::parse(s).ok_or_else(|| format!("unknown source '{}' (rfid, barcode, manual)", s))
}

#[derive(Debug, Serialize)]
struct IngestOutput {
    asset_id: i64,
    tag: String,
    created: bool,
    reading_id: i64,
    read_at: String,
    ordinal: Option<u8>,
    last_distributor: Option<String>,
    previous_distributor: Option<String>,
    reading_count: i64,
}

pub async fn run(db: &RfidFlowDb, args: IngestArgs) -> Result<()> {
    let outcome = db
        .ingest_reading(NewReading {
            tag: args.tag,
            source: args.source,
            operator: args.operator,
            location: args.location,
            note: args.note,
            rssi: args.rssi,
            antenna: args.antenna,
            reader_id: args.reader,
            actor: args.actor,
        })
        .await?;

    let tz = db.options().timezone;
    let asset = &outcome.asset;
    let output = IngestOutput {
        asset_id: asset.id,
        tag: asset.tag.clone(),
        created: outcome.created,
        reading_id: outcome.reading.id,
        read_at: format_datetime(outcome.reading.read_at, tz),
        ordinal: asset.rotation.ordinal,
        last_distributor: asset.rotation.last_distributor.clone(),
        previous_distributor: asset.rotation.previous_distributor.clone(),
        reading_count: asset.reading_count,
    };

    if args.json {
        return print_json(&output);
    }

    println!(
        "Reading {} recorded for {} (asset {}{})",
        output.reading_id,
        output.tag,
        output.asset_id,
        if output.created { ", new" } else { "" }
    );
    println!(
        "  Distributor: {} since {} (previous: {})",
        or_dash(output.last_distributor.as_deref()),
        format_date(asset.rotation.last_date),
        or_dash(output.previous_distributor.as_deref()),
    );
    println!("  Readings:    {}", output.reading_count);
    Ok(())
}
