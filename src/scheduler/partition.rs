//! Raw-tier partition lifecycle maintenance.

use chrono::{Duration, NaiveDate};

use crate::db::{partition_name, TelemetryStore};

/// Ensure partitions exist for today and the next `days_ahead` days.
///
/// Idempotent: a re-run is a no-op for partitions that already exist.
/// Returns the number of partitions actually created. DDL failures are
/// logged and skipped; the next scheduled run retries them.
pub fn add_future_partitions(
    telemetry: &dyn TelemetryStore,
    today: NaiveDate,
    days_ahead: i64,
) -> usize {
    let mut created = 0;
    for offset in 0..=days_ahead {
        let day = today + Duration::days(offset);
        match telemetry.create_partition(day) {
            Ok(true) => {
                tracing::info!(partition = %partition_name(day), "created raw partition");
                created += 1;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(partition = %partition_name(day), error = %e, "failed to create raw partition");
            }
        }
    }
    created
}

/// Drop partitions whose day is older than the retention window.
///
/// Returns the number of partitions dropped. Failures are logged per
/// partition and retried on the next run.
pub fn drop_old_partitions(
    telemetry: &dyn TelemetryStore,
    today: NaiveDate,
    retention_days: i64,
) -> usize {
    let cutoff = today - Duration::days(retention_days);

    let partitions = match telemetry.list_partitions() {
        Ok(partitions) => partitions,
        Err(e) => {
            tracing::error!(error = %e, "failed to list raw partitions");
            return 0;
        }
    };

    let mut dropped = 0;
    for p in partitions {
        if p.day >= cutoff {
            continue;
        }
        match telemetry.drop_partition(&p.name) {
            Ok(()) => {
                tracing::info!(partition = %p.name, "dropped expired raw partition");
                dropped += 1;
            }
            Err(e) => {
                tracing::error!(partition = %p.name, error = %e, "failed to drop raw partition");
            }
        }
    }
    dropped
}

/// One daily maintenance pass: extend the partition horizon, then expire.
pub fn run_maintenance(
    telemetry: &dyn TelemetryStore,
    today: NaiveDate,
    days_ahead: i64,
    retention_days: i64,
) {
    let created = add_future_partitions(telemetry, today, days_ahead);
    let dropped = drop_old_partitions(telemetry, today, retention_days);
    tracing::debug!(created, dropped, "partition maintenance finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{SqliteStore, TelemetryStore};
    use tempfile::NamedTempFile;

    fn open_store() -> (NamedTempFile, SqliteStore) {
        let tmp = NamedTempFile::new().unwrap();
        let store = SqliteStore::new(tmp.path()).unwrap();
        (tmp, store)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, d).unwrap()
    }

    #[test]
    fn test_add_future_partitions_is_idempotent() {
        let (_tmp, store) = open_store();

        let created = add_future_partitions(&store, day(24), 7);
        assert_eq!(created, 8); // today inclusive

        // Second run creates nothing and duplicates nothing
        let created_again = add_future_partitions(&store, day(24), 7);
        assert_eq!(created_again, 0);
        assert_eq!(store.list_partitions().unwrap().len(), 8);
    }

    #[test]
    fn test_drop_old_partitions_respects_retention() {
        let (_tmp, store) = open_store();
        store.create_partition(day(1)).unwrap();
        store.create_partition(day(10)).unwrap();
        store.create_partition(day(24)).unwrap();

        // Retention of 20 days from Aug 24: cutoff Aug 4
        let dropped = drop_old_partitions(&store, day(24), 20);
        assert_eq!(dropped, 1);

        let remaining = store.list_partitions().unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(!store.partition_exists(&partition_name(day(1))).unwrap());
        assert!(store.partition_exists(&partition_name(day(10))).unwrap());
    }

    #[test]
    fn test_boundary_day_is_kept() {
        let (_tmp, store) = open_store();
        store.create_partition(day(4)).unwrap();

        // cutoff is exactly Aug 4; a partition on the cutoff day survives
        assert_eq!(drop_old_partitions(&store, day(24), 20), 0);
        assert_eq!(store.list_partitions().unwrap().len(), 1);
    }
}
