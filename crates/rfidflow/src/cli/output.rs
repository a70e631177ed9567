//! Output formatting for CLI commands

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use rfidflow_db::{AssetStatus, AuditAction, RequalificationStatus};
use serde::Serialize;

/// Print rows as a table with a highlighted header
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    print_table_colored(
        headers,
        rows.into_iter()
            .map(|row| row.into_iter().map(|text| (text, None)).collect())
            .collect(),
    );
}

/// Print rows where each cell may carry a color
pub fn print_table_colored(headers: &[&str], rows: Vec<Vec<(String, Option<Color>)>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    for row in rows {
        let cells: Vec<Cell> = row
            .into_iter()
            .map(|(text, color)| match color {
                Some(c) => Cell::new(text).fg(c),
                None => Cell::new(text),
            })
            .collect();
        table.add_row(cells);
    }

    println!("{}", table);
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `YYYY-MM-DD`, or `-` when unset
pub fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn format_datetime(at: DateTime<Utc>, tz: Tz) -> String {
    rfidflow_protocol::format_data_hora(at, tz)
}

pub fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}

pub fn requalification_color(status: RequalificationStatus) -> Color {
    match status {
        RequalificationStatus::Overdue => Color::Red,
        RequalificationStatus::DueSoon => Color::Yellow,
        RequalificationStatus::UpToDate => Color::Green,
        RequalificationStatus::Pending => Color::Grey,
    }
}

pub fn status_color(status: AssetStatus) -> Color {
    match status {
        AssetStatus::Active => Color::Green,
        AssetStatus::Maintenance => Color::Yellow,
        AssetStatus::Inactive => Color::Grey,
    }
}

pub fn action_color(action: AuditAction) -> Color {
    match action {
        AuditAction::Create => Color::Green,
        AuditAction::Edit => Color::Yellow,
        AuditAction::Delete => Color::Red,
        AuditAction::Restore => Color::Blue,
        AuditAction::Reading => Color::Cyan,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_date() {
        assert_eq!(format_date(None), "-");
        assert_eq!(
            format_date(NaiveDate::from_ymd_opt(2025, 1, 31)),
            "2025-01-31"
        );
    }
}
