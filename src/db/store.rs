//! Storage ports consumed by the pipeline.
//!
//! Each port has a SQLite implementation ([`super::SqliteStore`]) and an
//! in-memory implementation ([`super::MemoryStore`]) used in tests.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use super::models::*;

/// Storage error types.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }
}

/// Monitor entity store.
pub trait MonitorStore: Send + Sync {
    /// All active monitors whose next check time has passed.
    fn find_due_monitors(&self, now: DateTime<Utc>) -> Result<Vec<Monitor>, StoreError>;
    /// Batch fetch; ids with no matching row are simply absent from the result.
    fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Monitor>, StoreError>;
    fn get_monitor(&self, id: &str) -> Result<Monitor, StoreError>;
    fn save_monitor(&self, monitor: &Monitor) -> Result<(), StoreError>;
    /// Persist a whole batch in one transaction.
    fn save_monitors(&self, monitors: &[Monitor]) -> Result<(), StoreError>;
    fn remove_monitor(&self, id: &str) -> Result<(), StoreError>;
    fn monitor_exists(&self, id: &str) -> Result<bool, StoreError>;
    fn count_monitors(&self) -> Result<usize, StoreError>;
}

/// Durable telemetry queue with a crash-safe two-list protocol.
///
/// Items move buffer -> processing one atomic step at a time, so an item is
/// never visible in neither or both lists. Recovery moves everything in
/// processing back to the buffer.
pub trait TelemetryQueue: Send + Sync {
    /// Append a serialized item to the buffer.
    fn push(&self, payload: &str) -> Result<(), StoreError>;
    /// Move every leftover processing item back to the buffer. Returns the
    /// number of items recovered.
    fn requeue_processing(&self) -> Result<usize, StoreError>;
    /// Atomically move the oldest buffered item into the processing list and
    /// return its payload.
    fn claim_next(&self) -> Result<Option<String>, StoreError>;
    /// Drop the processing list after a successful bulk insert.
    fn clear_processing(&self) -> Result<usize, StoreError>;
    fn buffer_len(&self) -> Result<usize, StoreError>;
    fn processing_len(&self) -> Result<usize, StoreError>;
}

/// A date-named partition of the raw telemetry tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPartition {
    pub name: String,
    pub day: NaiveDate,
}

/// Raw telemetry tier plus the rollup tables derived from it.
pub trait TelemetryStore: Send + Sync {
    /// Bulk insert into the raw tier inside one transaction, routing each row
    /// to its day partition. Returns the number of rows inserted.
    fn insert_raw_records(&self, records: &[RawRecord]) -> Result<usize, StoreError>;
    fn raw_records_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawRecord>, StoreError>;

    /// Idempotent upsert keyed by (monitor_id, bucket_time).
    fn upsert_hourly(&self, buckets: &[AggregateBucket]) -> Result<(), StoreError>;
    fn upsert_daily(&self, buckets: &[AggregateBucket]) -> Result<(), StoreError>;
    fn hourly_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AggregateBucket>, StoreError>;
    fn daily_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AggregateBucket>, StoreError>;

    /// Create the partition for a day if missing. Returns true when a new
    /// partition was created, false when it already existed.
    fn create_partition(&self, day: NaiveDate) -> Result<bool, StoreError>;
    fn partition_exists(&self, name: &str) -> Result<bool, StoreError>;
    fn list_partitions(&self) -> Result<Vec<RawPartition>, StoreError>;
    fn drop_partition(&self, name: &str) -> Result<(), StoreError>;
}

/// Alert rules, escalation policies, channels, and templates.
pub trait AlertStore: Send + Sync {
    fn enabled_rules_for(&self, monitor_id: &str) -> Result<Vec<AlertRule>, StoreError>;
    /// Enabled policies that apply to the monitor (specific or global),
    /// sorted ascending by level.
    fn applicable_policies_for(&self, monitor_id: &str) -> Result<Vec<EscalationPolicy>, StoreError>;
    fn get_channel(&self, id: &str) -> Result<NotificationChannel, StoreError>;
    /// Best matching template for a channel/event pair, preferring a specific
    /// template over the default one.
    fn find_template(
        &self,
        channel_type: ChannelType,
        event: EventType,
    ) -> Result<Option<NotificationTemplate>, StoreError>;

    fn save_rule(&self, rule: &AlertRule) -> Result<(), StoreError>;
    fn remove_rule(&self, id: &str) -> Result<(), StoreError>;
    fn save_policy(&self, policy: &EscalationPolicy) -> Result<(), StoreError>;
    fn remove_policy(&self, id: &str) -> Result<(), StoreError>;
    fn save_channel(&self, channel: &NotificationChannel) -> Result<(), StoreError>;
    fn save_template(&self, template: &NotificationTemplate) -> Result<(), StoreError>;
}

/// Deterministic partition name for a day.
pub fn partition_name(day: NaiveDate) -> String {
    format!("raw_records_p{}", day.format("%Y%m%d"))
}
