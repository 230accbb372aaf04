//! Rollup aggregation of raw telemetry into hourly and daily buckets.

use chrono::{DateTime, Duration, Timelike, Utc};
use std::collections::BTreeMap;

use crate::db::{AggregateBucket, StoreError, TelemetryStore};

/// Truncate a datetime to the start of its containing hour.
pub fn hour_start(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.date_naive()
        .and_hms_opt(dt.hour(), 0, 0)
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
        .unwrap_or(dt)
}

/// Truncate a datetime to the start of its containing day.
pub fn day_start(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
        .unwrap_or(dt)
}

#[derive(Default)]
struct Accumulator {
    count: i64,
    success: i64,
    latency_sum: i64,
    latency_max: i64,
}

/// Aggregate raw records for the hour starting at `hour` into one bucket per
/// monitor. Rerunning for the same hour overwrites the same rows with the
/// same values. Returns the number of monitor-buckets affected.
pub fn aggregate_hourly(
    telemetry: &dyn TelemetryStore,
    hour: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let start = hour_start(hour);
    let end = start + Duration::hours(1);
    let records = telemetry.raw_records_between(start, end)?;

    let mut per_monitor: BTreeMap<String, Accumulator> = BTreeMap::new();
    for r in &records {
        let acc = per_monitor.entry(r.monitor_id.clone()).or_default();
        acc.count += 1;
        if r.is_successful {
            acc.success += 1;
        }
        acc.latency_sum += r.latency_ms;
        acc.latency_max = acc.latency_max.max(r.latency_ms);
    }

    let buckets: Vec<AggregateBucket> = per_monitor
        .into_iter()
        .map(|(monitor_id, acc)| AggregateBucket {
            monitor_id,
            bucket_time: start,
            ping_count: acc.count,
            success_count: acc.success,
            avg_latency_ms: (acc.latency_sum as f64 / acc.count as f64).round() as i64,
            max_latency_ms: acc.latency_max,
        })
        .collect();

    telemetry.upsert_hourly(&buckets)?;
    Ok(buckets.len())
}

/// Aggregate hourly buckets for the day starting at `day` into one daily
/// bucket per monitor. Counts are summed, the average latency is the mean of
/// the hourly averages, and the max is the max of the hourly maxima.
pub fn aggregate_daily(
    telemetry: &dyn TelemetryStore,
    day: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let start = day_start(day);
    let end = start + Duration::days(1);
    let hourly = telemetry.hourly_between(start, end)?;

    let mut per_monitor: BTreeMap<String, (i64, i64, i64, i64, i64)> = BTreeMap::new();
    for b in &hourly {
        let entry = per_monitor.entry(b.monitor_id.clone()).or_insert((0, 0, 0, 0, 0));
        entry.0 += b.ping_count;
        entry.1 += b.success_count;
        entry.2 += b.avg_latency_ms;
        entry.3 += 1;
        entry.4 = entry.4.max(b.max_latency_ms);
    }

    let buckets: Vec<AggregateBucket> = per_monitor
        .into_iter()
        .map(
            |(monitor_id, (count, success, avg_sum, hours, max))| AggregateBucket {
                monitor_id,
                bucket_time: start,
                ping_count: count,
                success_count: success,
                avg_latency_ms: (avg_sum as f64 / hours as f64).round() as i64,
                max_latency_ms: max,
            },
        )
        .collect();

    telemetry.upsert_daily(&buckets)?;
    Ok(buckets.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{RawRecord, SqliteStore};
    use chrono::TimeZone;
    use tempfile::NamedTempFile;

    fn open_store() -> (NamedTempFile, SqliteStore) {
        let tmp = NamedTempFile::new().unwrap();
        let store = SqliteStore::new(tmp.path()).unwrap();
        (tmp, store)
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 24, h, m, 0).unwrap()
    }

    fn raw(monitor: &str, h: u32, m: u32, latency: i64, success: bool) -> RawRecord {
        RawRecord {
            id: 0,
            monitor_id: monitor.to_string(),
            status_code: if success { 200 } else { 0 },
            latency_ms: latency,
            is_successful: success,
            created_at: at(h, m),
        }
    }

    #[test]
    fn test_hourly_example_bucket() {
        let (_tmp, store) = open_store();
        store
            .insert_raw_records(&[
                raw("m1", 10, 5, 100, true),
                raw("m1", 10, 15, 200, true),
                raw("m1", 10, 45, 300, false),
            ])
            .unwrap();

        let affected = aggregate_hourly(&store, at(10, 0)).unwrap();
        assert_eq!(affected, 1);

        let rows = store.hourly_between(at(10, 0), at(11, 0)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ping_count, 3);
        assert_eq!(rows[0].success_count, 2);
        assert_eq!(rows[0].avg_latency_ms, 200);
        assert_eq!(rows[0].max_latency_ms, 300);
        assert_eq!(rows[0].bucket_time, at(10, 0));
    }

    #[test]
    fn test_hourly_rerun_is_idempotent() {
        let (_tmp, store) = open_store();
        store
            .insert_raw_records(&[raw("m1", 10, 5, 100, true), raw("m2", 10, 6, 50, true)])
            .unwrap();

        aggregate_hourly(&store, at(10, 30)).unwrap();
        let first = store.hourly_between(at(10, 0), at(11, 0)).unwrap();

        aggregate_hourly(&store, at(10, 0)).unwrap();
        let second = store.hourly_between(at(10, 0), at(11, 0)).unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_hourly_ignores_records_outside_bucket() {
        let (_tmp, store) = open_store();
        store
            .insert_raw_records(&[
                raw("m1", 9, 59, 100, true),
                raw("m1", 10, 0, 200, true),
                raw("m1", 11, 0, 300, true),
            ])
            .unwrap();

        aggregate_hourly(&store, at(10, 0)).unwrap();
        let rows = store.hourly_between(at(10, 0), at(11, 0)).unwrap();
        assert_eq!(rows[0].ping_count, 1);
        assert_eq!(rows[0].avg_latency_ms, 200);
    }

    #[test]
    fn test_daily_example_bucket() {
        let (_tmp, store) = open_store();
        store
            .upsert_hourly(&[
                AggregateBucket {
                    monitor_id: "m1".to_string(),
                    bucket_time: at(10, 0),
                    ping_count: 10,
                    success_count: 9,
                    avg_latency_ms: 100,
                    max_latency_ms: 150,
                },
                AggregateBucket {
                    monitor_id: "m1".to_string(),
                    bucket_time: at(11, 0),
                    ping_count: 20,
                    success_count: 18,
                    avg_latency_ms: 200,
                    max_latency_ms: 250,
                },
            ])
            .unwrap();

        let affected = aggregate_daily(&store, at(0, 0)).unwrap();
        assert_eq!(affected, 1);

        let rows = store.daily_between(at(0, 0), at(23, 59)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ping_count, 30);
        assert_eq!(rows[0].success_count, 27);
        assert_eq!(rows[0].avg_latency_ms, 150);
        assert_eq!(rows[0].max_latency_ms, 250);
        assert_eq!(rows[0].bucket_time, at(0, 0));
    }

    #[test]
    fn test_empty_hour_affects_nothing() {
        let (_tmp, store) = open_store();
        assert_eq!(aggregate_hourly(&store, at(10, 0)).unwrap(), 0);
        assert!(store.hourly_between(at(10, 0), at(11, 0)).unwrap().is_empty());
    }

    #[test]
    fn test_truncation_helpers() {
        let dt = Utc.with_ymd_and_hms(2026, 8, 24, 12, 34, 56).unwrap();
        assert_eq!(hour_start(dt), Utc.with_ymd_and_hms(2026, 8, 24, 12, 0, 0).unwrap());
        assert_eq!(day_start(dt), Utc.with_ymd_and_hms(2026, 8, 24, 0, 0, 0).unwrap());
    }
}
