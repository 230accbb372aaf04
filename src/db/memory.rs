//! In-memory implementation of the storage ports, used in tests.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use super::models::*;
use super::store::*;

#[derive(Default)]
struct Inner {
    monitors: HashMap<String, Monitor>,
    rules: HashMap<String, AlertRule>,
    policies: HashMap<String, EscalationPolicy>,
    channels: HashMap<String, NotificationChannel>,
    templates: Vec<NotificationTemplate>,
    buffer: VecDeque<(u64, String)>,
    processing: Vec<(u64, String)>,
    next_seq: u64,
    partitions: BTreeMap<String, NaiveDate>,
    raw: Vec<RawRecord>,
    raw_seq: i64,
    hourly: BTreeMap<(String, DateTime<Utc>), AggregateBucket>,
    daily: BTreeMap<(String, DateTime<Utc>), AggregateBucket>,
}

/// In-memory store backing every storage port.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MonitorStore for MemoryStore {
    fn find_due_monitors(&self, now: DateTime<Utc>) -> Result<Vec<Monitor>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut due: Vec<Monitor> = inner
            .monitors
            .values()
            .filter(|m| m.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|m| m.next_check_at);
        Ok(due)
    }

    fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Monitor>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| inner.monitors.get(id).cloned())
            .collect())
    }

    fn get_monitor(&self, id: &str) -> Result<Monitor, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .monitors
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("monitor", id))
    }

    fn save_monitor(&self, monitor: &Monitor) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.monitors.insert(monitor.id.clone(), monitor.clone());
        Ok(())
    }

    fn save_monitors(&self, monitors: &[Monitor]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        for m in monitors {
            inner.monitors.insert(m.id.clone(), m.clone());
        }
        Ok(())
    }

    fn remove_monitor(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.monitors.remove(id);
        Ok(())
    }

    fn monitor_exists(&self, id: &str) -> Result<bool, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.monitors.contains_key(id))
    }

    fn count_monitors(&self) -> Result<usize, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.monitors.len())
    }
}

impl TelemetryQueue for MemoryStore {
    fn push(&self, payload: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.buffer.push_back((seq, payload.to_string()));
        Ok(())
    }

    fn requeue_processing(&self) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let items: Vec<(u64, String)> = inner.processing.drain(..).collect();
        let moved = items.len();
        for (_, payload) in items {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.buffer.push_back((seq, payload));
        }
        Ok(moved)
    }

    fn claim_next(&self) -> Result<Option<String>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.buffer.pop_front() {
            Some((seq, payload)) => {
                inner.processing.push((seq, payload.clone()));
                Ok(Some(payload))
            }
            None => Ok(None),
        }
    }

    fn clear_processing(&self) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let cleared = inner.processing.len();
        inner.processing.clear();
        Ok(cleared)
    }

    fn buffer_len(&self) -> Result<usize, StoreError> {
        Ok(self.inner.lock().unwrap().buffer.len())
    }

    fn processing_len(&self) -> Result<usize, StoreError> {
        Ok(self.inner.lock().unwrap().processing.len())
    }
}

impl TelemetryStore for MemoryStore {
    fn insert_raw_records(&self, records: &[RawRecord]) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        for r in records {
            let day = r.created_at.date_naive();
            inner.partitions.entry(partition_name(day)).or_insert(day);
            inner.raw_seq += 1;
            let mut stored = r.clone();
            stored.id = inner.raw_seq;
            inner.raw.push(stored);
        }
        Ok(records.len())
    }

    fn raw_records_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut records: Vec<RawRecord> = inner
            .raw
            .iter()
            .filter(|r| r.created_at >= start && r.created_at < end)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    fn upsert_hourly(&self, buckets: &[AggregateBucket]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        for b in buckets {
            inner
                .hourly
                .insert((b.monitor_id.clone(), b.bucket_time), b.clone());
        }
        Ok(())
    }

    fn upsert_daily(&self, buckets: &[AggregateBucket]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        for b in buckets {
            inner
                .daily
                .insert((b.monitor_id.clone(), b.bucket_time), b.clone());
        }
        Ok(())
    }

    fn hourly_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AggregateBucket>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .hourly
            .values()
            .filter(|b| b.bucket_time >= start && b.bucket_time < end)
            .cloned()
            .collect())
    }

    fn daily_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AggregateBucket>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .daily
            .values()
            .filter(|b| b.bucket_time >= start && b.bucket_time < end)
            .cloned()
            .collect())
    }

    fn create_partition(&self, day: NaiveDate) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let name = partition_name(day);
        if inner.partitions.contains_key(&name) {
            return Ok(false);
        }
        inner.partitions.insert(name, day);
        Ok(true)
    }

    fn partition_exists(&self, name: &str) -> Result<bool, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.partitions.contains_key(name))
    }

    fn list_partitions(&self) -> Result<Vec<RawPartition>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut partitions: Vec<RawPartition> = inner
            .partitions
            .iter()
            .map(|(name, day)| RawPartition {
                name: name.clone(),
                day: *day,
            })
            .collect();
        partitions.sort_by_key(|p| p.day);
        Ok(partitions)
    }

    fn drop_partition(&self, name: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(day) = inner.partitions.remove(name) {
            inner.raw.retain(|r| r.created_at.date_naive() != day);
        }
        Ok(())
    }
}

impl AlertStore for MemoryStore {
    fn enabled_rules_for(&self, monitor_id: &str) -> Result<Vec<AlertRule>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut rules: Vec<AlertRule> = inner
            .rules
            .values()
            .filter(|r| r.enabled && r.monitor_id == monitor_id)
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rules)
    }

    fn applicable_policies_for(&self, monitor_id: &str) -> Result<Vec<EscalationPolicy>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut policies: Vec<EscalationPolicy> = inner
            .policies
            .values()
            .filter(|p| {
                p.enabled && p.monitor_id.as_deref().map(|id| id == monitor_id).unwrap_or(true)
            })
            .cloned()
            .collect();
        policies.sort_by_key(|p| p.level);
        Ok(policies)
    }

    fn get_channel(&self, id: &str) -> Result<NotificationChannel, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .channels
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("notification channel", id))
    }

    fn find_template(
        &self,
        channel_type: ChannelType,
        event: EventType,
    ) -> Result<Option<NotificationTemplate>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut matching: Vec<&NotificationTemplate> = inner
            .templates
            .iter()
            .filter(|t| t.channel_type == channel_type && t.event_type == event)
            .collect();
        matching.sort_by_key(|t| t.is_default);
        Ok(matching.first().map(|t| (*t).clone()))
    }

    fn save_rule(&self, rule: &AlertRule) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.rules.insert(rule.id.clone(), rule.clone());
        Ok(())
    }

    fn remove_rule(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.rules.remove(id);
        Ok(())
    }

    fn save_policy(&self, policy: &EscalationPolicy) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.policies.insert(policy.id.clone(), policy.clone());
        Ok(())
    }

    fn remove_policy(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.policies.remove(id);
        Ok(())
    }

    fn save_channel(&self, channel: &NotificationChannel) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.channels.insert(channel.id.clone(), channel.clone());
        Ok(())
    }

    fn save_template(&self, template: &NotificationTemplate) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.templates.retain(|t| {
            !(t.channel_type == template.channel_type
                && t.event_type == template.event_type
                && t.is_default == template.is_default)
        });
        inner.templates.push(template.clone());
        Ok(())
    }
}
