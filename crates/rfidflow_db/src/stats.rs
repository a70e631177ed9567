//! Dashboard statistics

use crate::error::Result;
use crate::types::*;
use crate::RfidFlowDb;
use chrono::{Duration, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;
use sqlx::Row;

/// Days covered by the daily reading series, today included.
const DAILY_WINDOW: i64 = 7;

impl RfidFlowDb {
    /// Counts for the dashboard, with days in the configured timezone.
    pub async fn dashboard_stats(&self) -> Result<DashboardStats> {
        let today = self.today();
        let tz = self.options.timezone;

        let live_assets: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM assets WHERE deleted = 0")
            .fetch_one(&self.pool)
            .await?;

        let mut readings_last_7_days = Vec::with_capacity(DAILY_WINDOW as usize);
        for offset in (0..DAILY_WINDOW).rev() {
            let date = today - Duration::days(offset);
            let total = self.count_readings_between(
                day_start_millis(tz, date),
                day_start_millis(tz, date + Duration::days(1)),
            )
            .await?;
            readings_last_7_days.push(DailyReadings { date, total });
        }
        let readings_today = readings_last_7_days.last().map(|d| d.total).unwrap_or(0);

        let rows = sqlx::query("SELECT next_requalification FROM assets WHERE deleted = 0")
            .fetch_all(&self.pool)
            .await?;
        let mut requalification = RequalificationCounts::default();
        for row in &rows {
            let next_due: Option<NaiveDate> = row.try_get("next_requalification")?;
            match RequalificationStatus::classify(next_due, today) {
                RequalificationStatus::Overdue => requalification.overdue += 1,
                RequalificationStatus::DueSoon => requalification.due_soon += 1,
                RequalificationStatus::UpToDate => requalification.up_to_date += 1,
                RequalificationStatus::Pending => requalification.pending += 1,
            }
        }

        Ok(DashboardStats {
            live_assets: live_assets as u64,
            readings_today,
            readings_last_7_days,
            requalification,
        })
    }

    /// Readings recorded today, optionally of one source.
    pub async fn count_readings_today(&self, source: Option<ReadingSource>) -> Result<u64> {
        let tz = self.options.timezone;
        let today = self.today();
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM readings
            WHERE read_at >= ?1 AND read_at < ?2 AND (?3 IS NULL OR source = ?3)
            "#,
        )
        .bind(day_start_millis(tz, today))
        .bind(day_start_millis(tz, today + Duration::days(1)))
        .bind(source.map(|s| s.as_str()))
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn count_readings_between(&self, from_millis: i64, to_millis: i64) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM readings WHERE read_at >= ? AND read_at < ?")
                .bind(from_millis)
                .bind(to_millis)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }
}

/// First instant of `date` in `tz`, as Unix milliseconds.
///
/// Where midnight falls in a DST gap the day starts at the first valid local time.
fn day_start_millis(tz: Tz, date: NaiveDate) -> i64 {
    let midnight = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&midnight).earliest() {
        Some(start) => start.timestamp_millis(),
        None => {
            let one_am = midnight + Duration::hours(1);
            tz.from_local_datetime(&one_am)
                .earliest()
                .map(|start| start.timestamp_millis())
                .unwrap_or_else(|| midnight.and_utc().timestamp_millis())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DbOptions, NewAsset, NewReading};

    #[test]
    fn test_day_start_in_sao_paulo() {
        let tz: Tz = chrono_tz::America::Sao_Paulo;
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        // UTC-3, no DST since 2019
        let expected = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(3, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis();
        assert_eq!(day_start_millis(tz, date), expected);
    }

    #[test]
    fn test_day_start_in_dst_gap() {
        // 2018-11-04: Sao Paulo clocks jumped from 00:00 to 01:00
        let tz: Tz = chrono_tz::America::Sao_Paulo;
        let date = NaiveDate::from_ymd_opt(2018, 11, 4).unwrap();
        let expected = date.and_hms_opt(3, 0, 0).unwrap().and_utc().timestamp_millis();
        assert_eq!(day_start_millis(tz, date), expected);
    }

    #[tokio::test]
    async fn test_dashboard_counts() {
        let db = RfidFlowDb::open_memory(DbOptions::default()).await.unwrap();
        let today = db.today();

        db.ingest_reading(NewReading::new("E200S1")).await.unwrap();
        db.ingest_reading(NewReading::new("E200S1")).await.unwrap();
        db.ingest_reading(NewReading::new("E200S2")).await.unwrap();

        let overdue = db
            .create_asset(
                NewAsset {
                    next_requalification: Some(today - Duration::days(3)),
                    ..NewAsset::with_defaults("E200S3")
                },
                None,
            )
            .await
            .unwrap();
        let gone = db
            .create_asset(NewAsset::with_defaults("E200S4"), None)
            .await
            .unwrap();
        db.soft_delete_asset(gone.id, None, "").await.unwrap();

        let stats = db.dashboard_stats().await.unwrap();
        assert_eq!(stats.live_assets, 3);
        assert_eq!(stats.readings_today, 3);
        assert_eq!(stats.readings_last_7_days.len(), 7);
        assert_eq!(stats.readings_last_7_days.last().unwrap().date, today);
        assert_eq!(stats.readings_last_7_days[0].total, 0);
        assert_eq!(stats.requalification.overdue, 1);
        assert_eq!(stats.requalification.pending, 2);
        assert_eq!(overdue.requalification_status, RequalificationStatus::Overdue);

        assert_eq!(db.count_readings_today(None).await.unwrap(), 3);
        assert_eq!(
            db.count_readings_today(Some(ReadingSource::Barcode)).await.unwrap(),
            0
        );
    }
}
