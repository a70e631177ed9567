//! Stats and requalification commands

use anyhow::Result;
use rfidflow_db::RfidFlowDb;

use crate::cli::output::{print_json, print_table};

pub async fn run(db: &RfidFlowDb, json: bool) -> Result<()> {
    let stats = db.dashboard_stats().await?;
    if json {
        return print_json(&stats);
    }

    println!("Live cylinders:  {}", stats.live_assets);
    println!("Readings today:  {}", stats.readings_today);
    println!();
    println!("Requalification");
    println!("  Overdue:       {}", stats.requalification.overdue);
    println!("  Due soon:      {}", stats.requalification.due_soon);
    println!("  Up to date:    {}", stats.requalification.up_to_date);
    println!("  No date:       {}", stats.requalification.pending);
    println!();

    let rows = stats
        .readings_last_7_days
        .iter()
        .map(|day| vec![day.date.to_string(), day.total.to_string()])
        .collect();
    print_table(&["DATE", "READINGS"], rows);
    Ok(())
}

#[derive(Debug, Clone, clap::Subcommand)]
pub enum RequalAction {
    /// Recompute the stored requalification status of every live cylinder
    Refresh,
}

pub async fn run_requal(db: &RfidFlowDb, action: RequalAction) -> Result<()> {
    match action {
        RequalAction::Refresh => {
            let changed = db.refresh_requalification_status().await?;
            println!("Requalification status updated for {} cylinder(s)", changed);
        }
    }
    Ok(())
}
