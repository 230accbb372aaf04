//! SQLite implementation of the storage ports.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::models::*;
use super::store::*;

/// Thread-safe SQLite store backing every storage port.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at the given path and apply migrations.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(include_str!("../../migrations/0001_init.sql"))
            .map_err(|e| StoreError::Migration(format!("init migration failed: {}", e)))?;
        Ok(())
    }
}

fn fmt_time(dt: DateTime<Utc>) -> String {
    dt.format(TIME_FORMAT).to_string()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [TIME_FORMAT, "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.fZ"];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

fn bad_column(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unrecognized value: {}", value).into(),
    )
}

fn time_col(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_db_time(&s).ok_or_else(|| bad_column(idx, &s))
}

fn opt_time_col(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(s) => Ok(Some(parse_db_time(&s).ok_or_else(|| bad_column(idx, &s))?)),
        None => Ok(None),
    }
}

const MONITOR_COLS: &str = "id, name, url, method, expected_status, headers, body, \
     interval_seconds, timeout_seconds, operational_status, health_status, \
     consecutive_failures, last_checked_at, next_check_at, last_status_change_at, \
     owner_id, created_at, updated_at";

fn monitor_from_row(row: &Row) -> rusqlite::Result<Monitor> {
    let op_raw: String = row.get(9)?;
    let health_raw: String = row.get(10)?;
    let headers_raw: String = row.get(5)?;

    Ok(Monitor {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        method: row.get(3)?,
        expected_status: row.get::<_, i64>(4)? as u16,
        headers: serde_json::from_str(&headers_raw).map_err(|_| bad_column(5, &headers_raw))?,
        body: row.get(6)?,
        interval_seconds: row.get(7)?,
        timeout_seconds: row.get(8)?,
        operational_status: OperationalStatus::parse(&op_raw).ok_or_else(|| bad_column(9, &op_raw))?,
        health_status: HealthStatus::parse(&health_raw).ok_or_else(|| bad_column(10, &health_raw))?,
        consecutive_failures: row.get::<_, i64>(11)? as u32,
        last_checked_at: opt_time_col(row, 12)?,
        next_check_at: time_col(row, 13)?,
        last_status_change_at: opt_time_col(row, 14)?,
        owner_id: row.get(15)?,
        created_at: time_col(row, 16)?,
        updated_at: time_col(row, 17)?,
    })
}

fn upsert_monitor(conn: &Connection, monitor: &Monitor) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO monitors (id, name, url, method, expected_status, headers, body, \
             interval_seconds, timeout_seconds, operational_status, health_status, \
             consecutive_failures, last_checked_at, next_check_at, last_status_change_at, \
             owner_id, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18) \
         ON CONFLICT(id) DO UPDATE SET \
             name=excluded.name, url=excluded.url, method=excluded.method, \
             expected_status=excluded.expected_status, headers=excluded.headers, \
             body=excluded.body, interval_seconds=excluded.interval_seconds, \
             timeout_seconds=excluded.timeout_seconds, \
             operational_status=excluded.operational_status, \
             health_status=excluded.health_status, \
             consecutive_failures=excluded.consecutive_failures, \
             last_checked_at=excluded.last_checked_at, \
             next_check_at=excluded.next_check_at, \
             last_status_change_at=excluded.last_status_change_at, \
             owner_id=excluded.owner_id, updated_at=excluded.updated_at",
        params![
            monitor.id,
            monitor.name,
            monitor.url,
            monitor.method,
            monitor.expected_status as i64,
            serde_json::to_string(&monitor.headers).unwrap_or_else(|_| "{}".to_string()),
            monitor.body,
            monitor.interval_seconds,
            monitor.timeout_seconds,
            monitor.operational_status.as_str(),
            monitor.health_status.as_str(),
            monitor.consecutive_failures as i64,
            monitor.last_checked_at.map(fmt_time),
            fmt_time(monitor.next_check_at),
            monitor.last_status_change_at.map(fmt_time),
            monitor.owner_id,
            fmt_time(monitor.created_at),
            fmt_time(monitor.updated_at),
        ],
    )?;
    Ok(())
}

impl MonitorStore for SqliteStore {
    fn find_due_monitors(&self, now: DateTime<Utc>) -> Result<Vec<Monitor>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM monitors \
             WHERE operational_status = 'ACTIVE' AND next_check_at <= ?1 \
             ORDER BY next_check_at ASC",
            MONITOR_COLS
        ))?;
        let monitors = stmt
            .query_map(params![fmt_time(now)], monitor_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(monitors)
    }

    fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Monitor>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();
        let placeholders = vec!["?"; ids.len()].join(",");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM monitors WHERE id IN ({})",
            MONITOR_COLS, placeholders
        ))?;
        let monitors = stmt
            .query_map(params_from_iter(ids.iter()), monitor_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(monitors)
    }

    fn get_monitor(&self, id: &str) -> Result<Monitor, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM monitors WHERE id = ?1", MONITOR_COLS),
            params![id],
            monitor_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("monitor", id))
    }

    fn save_monitor(&self, monitor: &Monitor) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        upsert_monitor(&conn, monitor)
    }

    fn save_monitors(&self, monitors: &[Monitor]) -> Result<(), StoreError> {
        if monitors.is_empty() {
            return Ok(());
        }
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        for monitor in monitors {
            upsert_monitor(&tx, monitor)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn remove_monitor(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM monitors WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn monitor_exists(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM monitors WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    fn count_monitors(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM monitors", [], |r| r.get(0))?;
        Ok(count as usize)
    }
}

impl TelemetryQueue for SqliteStore {
    fn push(&self, payload: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO telemetry_buffer (payload) VALUES (?1)",
            params![payload],
        )?;
        Ok(())
    }

    fn requeue_processing(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        let moved = tx.execute(
            "INSERT INTO telemetry_buffer (payload) \
             SELECT payload FROM telemetry_processing ORDER BY id ASC",
            [],
        )?;
        tx.execute("DELETE FROM telemetry_processing", [])?;
        tx.commit()?;
        Ok(moved)
    }

    fn claim_next(&self) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        let item: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, payload FROM telemetry_buffer ORDER BY id ASC LIMIT 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        let Some((id, payload)) = item else {
            return Ok(None);
        };

        tx.execute(
            "INSERT INTO telemetry_processing (id, payload) VALUES (?1, ?2)",
            params![id, payload],
        )?;
        tx.execute("DELETE FROM telemetry_buffer WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(Some(payload))
    }

    fn clear_processing(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let cleared = conn.execute("DELETE FROM telemetry_processing", [])?;
        Ok(cleared)
    }

    fn buffer_len(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM telemetry_buffer", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    fn processing_len(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM telemetry_processing", [], |r| r.get(0))?;
        Ok(count as usize)
    }
}

fn ensure_partition(conn: &Connection, day: NaiveDate) -> Result<bool, StoreError> {
    let name = partition_name(day);
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {name} (\
             id INTEGER PRIMARY KEY AUTOINCREMENT, \
             monitor_id TEXT NOT NULL, \
             status_code INTEGER NOT NULL, \
             latency_ms INTEGER NOT NULL, \
             is_successful INTEGER NOT NULL, \
             created_at TEXT NOT NULL); \
         CREATE INDEX IF NOT EXISTS idx_{name}_time ON {name} (created_at);"
    ))?;
    let created = conn.execute(
        "INSERT OR IGNORE INTO raw_partitions (name, day) VALUES (?1, ?2)",
        params![name, day.format("%Y-%m-%d").to_string()],
    )?;
    Ok(created > 0)
}

fn upsert_aggregates(
    conn: &Connection,
    table: &str,
    buckets: &[AggregateBucket],
) -> Result<(), StoreError> {
    if buckets.is_empty() {
        return Ok(());
    }
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {table} (monitor_id, bucket_time, ping_count, success_count, \
                 avg_latency_ms, max_latency_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(monitor_id, bucket_time) DO UPDATE SET \
                 ping_count=excluded.ping_count, success_count=excluded.success_count, \
                 avg_latency_ms=excluded.avg_latency_ms, max_latency_ms=excluded.max_latency_ms"
        ))?;
        for b in buckets {
            stmt.execute(params![
                b.monitor_id,
                fmt_time(b.bucket_time),
                b.ping_count,
                b.success_count,
                b.avg_latency_ms,
                b.max_latency_ms,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn aggregates_between(
    conn: &Connection,
    table: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<AggregateBucket>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT monitor_id, bucket_time, ping_count, success_count, avg_latency_ms, max_latency_ms \
         FROM {table} WHERE bucket_time >= ?1 AND bucket_time < ?2 \
         ORDER BY monitor_id ASC, bucket_time ASC"
    ))?;
    let buckets = stmt
        .query_map(params![fmt_time(start), fmt_time(end)], |row| {
            Ok(AggregateBucket {
                monitor_id: row.get(0)?,
                bucket_time: time_col(row, 1)?,
                ping_count: row.get(2)?,
                success_count: row.get(3)?,
                avg_latency_ms: row.get(4)?,
                max_latency_ms: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(buckets)
}

impl TelemetryStore for SqliteStore {
    fn insert_raw_records(&self, records: &[RawRecord]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        let mut ensured: HashSet<NaiveDate> = HashSet::new();
        for r in records {
            let day = r.created_at.date_naive();
            if ensured.insert(day) {
                ensure_partition(&tx, day)?;
            }
            tx.execute(
                &format!(
                    "INSERT INTO {} (monitor_id, status_code, latency_ms, is_successful, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    partition_name(day)
                ),
                params![
                    r.monitor_id,
                    r.status_code,
                    r.latency_ms,
                    r.is_successful,
                    fmt_time(r.created_at),
                ],
            )?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn raw_records_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawRecord>, StoreError> {
        let partitions = self.list_partitions()?;
        let conn = self.conn.lock().unwrap();
        let mut records = Vec::new();

        for p in partitions {
            if p.day < start.date_naive() || p.day > end.date_naive() {
                continue;
            }
            let mut stmt = conn.prepare(&format!(
                "SELECT id, monitor_id, status_code, latency_ms, is_successful, created_at \
                 FROM {} WHERE created_at >= ?1 AND created_at < ?2",
                p.name
            ))?;
            let rows = stmt
                .query_map(params![fmt_time(start), fmt_time(end)], |row| {
                    Ok(RawRecord {
                        id: row.get(0)?,
                        monitor_id: row.get(1)?,
                        status_code: row.get(2)?,
                        latency_ms: row.get(3)?,
                        is_successful: row.get(4)?,
                        created_at: time_col(row, 5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            records.extend(rows);
        }

        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    fn upsert_hourly(&self, buckets: &[AggregateBucket]) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        upsert_aggregates(&conn, "hourly_aggregates", buckets)
    }

    fn upsert_daily(&self, buckets: &[AggregateBucket]) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        upsert_aggregates(&conn, "daily_aggregates", buckets)
    }

    fn hourly_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AggregateBucket>, StoreError> {
        let conn = self.conn.lock().unwrap();
        aggregates_between(&conn, "hourly_aggregates", start, end)
    }

    fn daily_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AggregateBucket>, StoreError> {
        let conn = self.conn.lock().unwrap();
        aggregates_between(&conn, "daily_aggregates", start, end)
    }

    fn create_partition(&self, day: NaiveDate) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        ensure_partition(&conn, day)
    }

    fn partition_exists(&self, name: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM raw_partitions WHERE name = ?1",
            params![name],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    fn list_partitions(&self) -> Result<Vec<RawPartition>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT name, day FROM raw_partitions ORDER BY day ASC")?;
        let partitions = stmt
            .query_map([], |row| {
                let name: String = row.get(0)?;
                let day_raw: String = row.get(1)?;
                let day = NaiveDate::parse_from_str(&day_raw, "%Y-%m-%d")
                    .map_err(|_| bad_column(1, &day_raw))?;
                Ok(RawPartition { name, day })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(partitions)
    }

    fn drop_partition(&self, name: &str) -> Result<(), StoreError> {
        // Partition names come from our own registry, never from user input.
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        tx.execute(&format!("DROP TABLE IF EXISTS {}", name), [])?;
        tx.execute("DELETE FROM raw_partitions WHERE name = ?1", params![name])?;
        tx.commit()?;
        Ok(())
    }
}

fn rule_from_row(row: &Row) -> rusqlite::Result<AlertRule> {
    let notify_raw: String = row.get(4)?;
    Ok(AlertRule {
        id: row.get(0)?,
        monitor_id: row.get(1)?,
        channel_id: row.get(2)?,
        failure_threshold: row.get::<_, i64>(3)? as u32,
        notify_on: NotificationType::parse(&notify_raw).ok_or_else(|| bad_column(4, &notify_raw))?,
        cooldown_seconds: row.get(5)?,
        enabled: row.get(6)?,
    })
}

impl AlertStore for SqliteStore {
    fn enabled_rules_for(&self, monitor_id: &str) -> Result<Vec<AlertRule>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, monitor_id, channel_id, failure_threshold, notify_on, \
                 cooldown_seconds, enabled \
             FROM alert_rules WHERE monitor_id = ?1 AND enabled = 1",
        )?;
        let rules = stmt
            .query_map(params![monitor_id], rule_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rules)
    }

    fn applicable_policies_for(&self, monitor_id: &str) -> Result<Vec<EscalationPolicy>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, monitor_id, level, failure_threshold, channel_id, enabled \
             FROM escalation_policies \
             WHERE enabled = 1 AND (monitor_id = ?1 OR monitor_id IS NULL) \
             ORDER BY level ASC",
        )?;
        let policies = stmt
            .query_map(params![monitor_id], |row| {
                Ok(EscalationPolicy {
                    id: row.get(0)?,
                    monitor_id: row.get(1)?,
                    level: row.get(2)?,
                    failure_threshold: row.get::<_, i64>(3)? as u32,
                    channel_id: row.get(4)?,
                    enabled: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(policies)
    }

    fn get_channel(&self, id: &str) -> Result<NotificationChannel, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, channel_type, destination, enabled \
             FROM notification_channels WHERE id = ?1",
            params![id],
            |row| {
                let type_raw: String = row.get(1)?;
                Ok(NotificationChannel {
                    id: row.get(0)?,
                    channel_type: ChannelType::parse(&type_raw)
                        .ok_or_else(|| bad_column(1, &type_raw))?,
                    destination: row.get(2)?,
                    enabled: row.get(3)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("notification channel", id))
    }

    fn find_template(
        &self,
        channel_type: ChannelType,
        event: EventType,
    ) -> Result<Option<NotificationTemplate>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let template = conn
            .query_row(
                "SELECT channel_type, event_type, is_default, subject, body \
                 FROM notification_templates \
                 WHERE channel_type = ?1 AND event_type = ?2 \
                 ORDER BY is_default ASC LIMIT 1",
                params![channel_type.as_str(), event.as_str()],
                |row| {
                    let type_raw: String = row.get(0)?;
                    let event_raw: String = row.get(1)?;
                    Ok(NotificationTemplate {
                        channel_type: ChannelType::parse(&type_raw)
                            .ok_or_else(|| bad_column(0, &type_raw))?,
                        event_type: EventType::parse(&event_raw)
                            .ok_or_else(|| bad_column(1, &event_raw))?,
                        is_default: row.get(2)?,
                        subject: row.get(3)?,
                        body: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(template)
    }

    fn save_rule(&self, rule: &AlertRule) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO alert_rules (id, monitor_id, channel_id, failure_threshold, \
                 notify_on, cooldown_seconds, enabled) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(id) DO UPDATE SET \
                 monitor_id=excluded.monitor_id, channel_id=excluded.channel_id, \
                 failure_threshold=excluded.failure_threshold, notify_on=excluded.notify_on, \
                 cooldown_seconds=excluded.cooldown_seconds, enabled=excluded.enabled",
            params![
                rule.id,
                rule.monitor_id,
                rule.channel_id,
                rule.failure_threshold as i64,
                rule.notify_on.as_str(),
                rule.cooldown_seconds,
                rule.enabled,
            ],
        )?;
        Ok(())
    }

    fn remove_rule(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM alert_rules WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn save_policy(&self, policy: &EscalationPolicy) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO escalation_policies (id, monitor_id, level, failure_threshold, \
                 channel_id, enabled) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(id) DO UPDATE SET \
                 monitor_id=excluded.monitor_id, level=excluded.level, \
                 failure_threshold=excluded.failure_threshold, \
                 channel_id=excluded.channel_id, enabled=excluded.enabled",
            params![
                policy.id,
                policy.monitor_id,
                policy.level,
                policy.failure_threshold as i64,
                policy.channel_id,
                policy.enabled,
            ],
        )?;
        Ok(())
    }

    fn remove_policy(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM escalation_policies WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn save_channel(&self, channel: &NotificationChannel) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO notification_channels (id, channel_type, destination, enabled) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(id) DO UPDATE SET \
                 channel_type=excluded.channel_type, destination=excluded.destination, \
                 enabled=excluded.enabled",
            params![
                channel.id,
                channel.channel_type.as_str(),
                channel.destination,
                channel.enabled,
            ],
        )?;
        Ok(())
    }

    fn save_template(&self, template: &NotificationTemplate) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO notification_templates (channel_type, event_type, is_default, subject, body) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(channel_type, event_type, is_default) DO UPDATE SET \
                 subject=excluded.subject, body=excluded.body",
            params![
                template.channel_type.as_str(),
                template.event_type.as_str(),
                template.is_default,
                template.subject,
                template.body,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[test]
    fn test_monitor_crud_and_due_query() {
        let (_tmp, store) = open_store();

        let mut monitor = Monitor::new("m1", "Test", "http://example.com", at(9, 0));
        monitor.owner_id = Some("u1".to_string());
        store.save_monitor(&monitor).unwrap();

        let fetched = store.get_monitor("m1").unwrap();
        assert_eq!(fetched.name, "Test");
        assert_eq!(fetched.owner_id.as_deref(), Some("u1"));
        assert!(store.monitor_exists("m1").unwrap());
        assert_eq!(store.count_monitors().unwrap(), 1);

        let due = store.find_due_monitors(at(9, 0)).unwrap();
        assert_eq!(due.len(), 1);

        // Paused monitors are never due
        monitor.operational_status = OperationalStatus::Paused;
        store.save_monitor(&monitor).unwrap();
        assert!(store.find_due_monitors(at(9, 0)).unwrap().is_empty());

        store.remove_monitor("m1").unwrap();
        assert!(matches!(
            store.get_monitor("m1"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_find_by_ids_skips_missing() {
        let (_tmp, store) = open_store();
        store
            .save_monitor(&Monitor::new("m1", "A", "http://a", at(9, 0)))
            .unwrap();

        let found = store
            .find_by_ids(&["m1".to_string(), "ghost".to_string()])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "m1");
    }

    #[test]
    fn test_queue_claim_is_a_single_move() {
        let (_tmp, store) = open_store();
        store.push("a").unwrap();
        store.push("b").unwrap();

        let claimed = store.claim_next().unwrap();
        assert_eq!(claimed.as_deref(), Some("a"));
        assert_eq!(store.buffer_len().unwrap(), 1);
        assert_eq!(store.processing_len().unwrap(), 1);

        let recovered = store.requeue_processing().unwrap();
        assert_eq!(recovered, 1);
        assert_eq!(store.buffer_len().unwrap(), 2);
        assert_eq!(store.processing_len().unwrap(), 0);

        // FIFO order survives a requeue cycle for the remaining item
        assert_eq!(store.claim_next().unwrap().as_deref(), Some("b"));
        assert_eq!(store.clear_processing().unwrap(), 1);
    }

    #[test]
    fn test_raw_records_routed_to_day_partitions() {
        let (_tmp, store) = open_store();
        let records = vec![
            RawRecord {
                id: 0,
                monitor_id: "m1".to_string(),
                status_code: 200,
                latency_ms: 10,
                is_successful: true,
                created_at: at(10, 0),
            },
            RawRecord {
                id: 0,
                monitor_id: "m1".to_string(),
                status_code: 0,
                latency_ms: 5000,
                is_successful: false,
                created_at: Utc.with_ymd_and_hms(2026, 8, 25, 0, 5, 0).unwrap(),
            },
        ];
        assert_eq!(store.insert_raw_records(&records).unwrap(), 2);

        let partitions = store.list_partitions().unwrap();
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[0].name, "raw_records_p20260824");

        let all = store
            .raw_records_between(at(0, 0), Utc.with_ymd_and_hms(2026, 8, 26, 0, 0, 0).unwrap())
            .unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].is_successful);
        assert!(!all[1].is_successful);

        store.drop_partition("raw_records_p20260824").unwrap();
        let rest = store
            .raw_records_between(at(0, 0), Utc.with_ymd_and_hms(2026, 8, 26, 0, 0, 0).unwrap())
            .unwrap();
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn test_aggregate_upsert_overwrites() {
        let (_tmp, store) = open_store();
        let mut bucket = AggregateBucket {
            monitor_id: "m1".to_string(),
            bucket_time: at(10, 0),
            ping_count: 3,
            success_count: 2,
            avg_latency_ms: 200,
            max_latency_ms: 300,
        };
        store.upsert_hourly(std::slice::from_ref(&bucket)).unwrap();
        bucket.ping_count = 4;
        store.upsert_hourly(std::slice::from_ref(&bucket)).unwrap();

        let rows = store.hourly_between(at(10, 0), at(11, 0)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ping_count, 4);
    }

    #[test]
    fn test_template_prefers_specific_over_default() {
        let (_tmp, store) = open_store();
        store
            .save_template(&NotificationTemplate {
                channel_type: ChannelType::Email,
                event_type: EventType::Failure,
                is_default: true,
                subject: "default".to_string(),
                body: "default body".to_string(),
            })
            .unwrap();
        store
            .save_template(&NotificationTemplate {
                channel_type: ChannelType::Email,
                event_type: EventType::Failure,
                is_default: false,
                subject: "specific".to_string(),
                body: "specific body".to_string(),
            })
            .unwrap();

        let found = store
            .find_template(ChannelType::Email, EventType::Failure)
            .unwrap()
            .unwrap();
        assert_eq!(found.subject, "specific");

        assert!(store
            .find_template(ChannelType::Chat, EventType::Failure)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_policies_sorted_by_level_with_globals() {
        let (_tmp, store) = open_store();
        store
            .save_policy(&EscalationPolicy {
                id: "p2".to_string(),
                monitor_id: Some("m1".to_string()),
                level: 2,
                failure_threshold: 10,
                channel_id: "c1".to_string(),
                enabled: true,
            })
            .unwrap();
        store
            .save_policy(&EscalationPolicy {
                id: "p1".to_string(),
                monitor_id: None,
                level: 1,
                failure_threshold: 5,
                channel_id: "c1".to_string(),
                enabled: true,
            })
            .unwrap();
        store
            .save_policy(&EscalationPolicy {
                id: "p3".to_string(),
                monitor_id: Some("other".to_string()),
                level: 3,
                failure_threshold: 20,
                channel_id: "c1".to_string(),
                enabled: true,
            })
            .unwrap();

        let policies = store.applicable_policies_for("m1").unwrap();
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].id, "p1");
        assert_eq!(policies[1].id, "p2");
    }

    #[test]
    fn test_rule_cooldown_round_trip() {
        let (_tmp, store) = open_store();
        store
            .save_rule(&AlertRule {
                id: "r1".to_string(),
                monitor_id: "m1".to_string(),
                channel_id: "c1".to_string(),
                failure_threshold: 3,
                notify_on: NotificationType::Both,
                cooldown_seconds: Some(600),
                enabled: true,
            })
            .unwrap();

        let rules = store.enabled_rules_for("m1").unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].cooldown_seconds, Some(600));
        assert_eq!(rules[0].notify_on, NotificationType::Both);
    }
}
