//! In-process counters for ingestion and audit health.
//!
//! Lock-free atomics, shared by every database handle in the process. The
//! server exposes a snapshot as JSON and in Prometheus text format.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Global metrics instance
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    // Ingestion
    pub readings_ingested: AtomicU64,
    pub assets_created: AtomicU64,
    pub rotation_advances: AtomicU64,
    pub ingest_errors: AtomicU64,

    // Contention
    pub lock_timeouts: AtomicU64,

    // Best-effort audit writes that failed after the primary write committed
    pub audit_write_failures: AtomicU64,

    // Cumulative microseconds spent inside ingestion transactions
    pub ingest_time_us: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            readings_ingested: AtomicU64::new(0),
            assets_created: AtomicU64::new(0),
            rotation_advances: AtomicU64::new(0),
            ingest_errors: AtomicU64::new(0),
            lock_timeouts: AtomicU64::new(0),
            audit_write_failures: AtomicU64::new(0),
            ingest_time_us: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_readings_ingested(&self) {
        self.readings_ingested.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_assets_created(&self) {
        self.assets_created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_rotation_advances(&self) {
        self.rotation_advances.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_ingest_errors(&self) {
        self.ingest_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_lock_timeouts(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_audit_write_failures(&self) {
        self.audit_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ingest_time(&self, start: Instant) {
        let elapsed_us = start.elapsed().as_micros() as u64;
        self.ingest_time_us.fetch_add(elapsed_us, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            readings_ingested: self.readings_ingested.load(Ordering::Relaxed),
            assets_created: self.assets_created.load(Ordering::Relaxed),
            rotation_advances: self.rotation_advances.load(Ordering::Relaxed),
            ingest_errors: self.ingest_errors.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
            audit_write_failures: self.audit_write_failures.load(Ordering::Relaxed),
            ingest_time_us: self.ingest_time_us.load(Ordering::Relaxed),
        }
    }

    /// Format as Prometheus exposition format
    pub fn prometheus_format(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP rfidflow_readings_ingested_total Readings committed with their rotation step
# TYPE rfidflow_readings_ingested_total counter
rfidflow_readings_ingested_total {}

# HELP rfidflow_assets_created_total Assets created on first sight of a tag
# TYPE rfidflow_assets_created_total counter
rfidflow_assets_created_total {}

# HELP rfidflow_rotation_advances_total Distributor rotation steps applied
# TYPE rfidflow_rotation_advances_total counter
rfidflow_rotation_advances_total {}

# HELP rfidflow_ingest_errors_total Readings rejected or failed
# TYPE rfidflow_ingest_errors_total counter
rfidflow_ingest_errors_total {}

# HELP rfidflow_lock_timeouts_total Per-asset lock waits that timed out
# TYPE rfidflow_lock_timeouts_total counter
rfidflow_lock_timeouts_total {}

# HELP rfidflow_audit_write_failures_total Audit entries lost after a committed write
# TYPE rfidflow_audit_write_failures_total counter
rfidflow_audit_write_failures_total {}

# HELP rfidflow_ingest_time_us_total Cumulative ingestion transaction time
# TYPE rfidflow_ingest_time_us_total counter
rfidflow_ingest_time_us_total {}
"#,
            s.readings_ingested,
            s.assets_created,
            s.rotation_advances,
            s.ingest_errors,
            s.lock_timeouts,
            s.audit_write_failures,
            s.ingest_time_us,
        )
    }
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MetricsSnapshot {
    pub readings_ingested: u64,
    pub assets_created: u64,
    pub rotation_advances: u64,
    pub ingest_errors: u64,
    pub lock_timeouts: u64,
    pub audit_write_failures: u64,
    pub ingest_time_us: u64,
}

impl MetricsSnapshot {
    /// Average ingestion transaction time in microseconds
    pub fn avg_ingest_time_us(&self) -> u64 {
        if self.readings_ingested == 0 {
            0
        } else {
            self.ingest_time_us / self.readings_ingested
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let m = Metrics::new();
        m.inc_readings_ingested();
        m.inc_readings_ingested();
        m.inc_audit_write_failures();

        let s = m.snapshot();
        assert_eq!(s.readings_ingested, 2);
        assert_eq!(s.audit_write_failures, 1);
        assert_eq!(s.lock_timeouts, 0);
    }

    #[test]
    fn test_prometheus_format() {
        let m = Metrics::new();
        m.inc_lock_timeouts();

        let output = m.prometheus_format();
        assert!(output.contains("rfidflow_lock_timeouts_total 1"));
        assert!(output.contains("# TYPE rfidflow_readings_ingested_total counter"));
    }

    #[test]
    fn test_avg_ingest_time() {
        let s = MetricsSnapshot {
            readings_ingested: 4,
            ingest_time_us: 1000,
            ..Default::default()
        };
        assert_eq!(s.avg_ingest_time_us(), 250);
        assert_eq!(MetricsSnapshot::default().avg_ingest_time_us(), 0);
    }
}
