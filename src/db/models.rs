//! Domain model types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Timestamp format used both in the database and on the buffer wire.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Whether a monitor is scheduled to be checked at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationalStatus {
    Active,
    Paused,
    Disabled,
}

impl OperationalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Paused => "PAUSED",
            Self::Disabled => "DISABLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "PAUSED" => Some(Self::Paused),
            "DISABLED" => Some(Self::Disabled),
            _ => None,
        }
    }
}

/// Last observed reachability of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Up,
    Down,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UP" => Some(Self::Up),
            "DOWN" => Some(Self::Down),
            "UNKNOWN" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// Error raised when a state transition is not legal.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("monitor {id} is {status} and cannot record a check")]
    InvalidState { id: String, status: &'static str },
}

/// A configured HTTP endpoint under observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: String,
    pub name: String,
    pub url: String,
    pub method: String,
    pub expected_status: u16,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub interval_seconds: i64,
    pub timeout_seconds: i64,
    pub operational_status: OperationalStatus,
    pub health_status: HealthStatus,
    pub consecutive_failures: u32,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub next_check_at: DateTime<Utc>,
    pub last_status_change_at: Option<DateTime<Utc>>,
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Monitor {
    /// Create a monitor that is due for its first check immediately.
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            method: "GET".to_string(),
            expected_status: 200,
            headers: HashMap::new(),
            body: None,
            interval_seconds: 60,
            timeout_seconds: 10,
            operational_status: OperationalStatus::Active,
            health_status: HealthStatus::Unknown,
            consecutive_failures: 0,
            last_checked_at: None,
            next_check_at: now,
            last_status_change_at: None,
            owner_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record the outcome of a probe.
    ///
    /// Only legal while the monitor is active. Success resets the failure
    /// streak and marks the monitor up; failure extends the streak and marks
    /// it down. `last_status_change_at` moves only when health actually flips.
    pub fn mark_checked(&mut self, checked_at: DateTime<Utc>, success: bool) -> Result<(), MonitorError> {
        if self.operational_status != OperationalStatus::Active {
            return Err(MonitorError::InvalidState {
                id: self.id.clone(),
                status: self.operational_status.as_str(),
            });
        }

        let new_health = if success {
            self.consecutive_failures = 0;
            HealthStatus::Up
        } else {
            self.consecutive_failures += 1;
            HealthStatus::Down
        };

        if new_health != self.health_status {
            self.last_status_change_at = Some(checked_at);
        }
        self.health_status = new_health;

        self.last_checked_at = Some(checked_at);
        self.next_check_at = checked_at + Duration::seconds(self.interval_seconds);
        self.updated_at = checked_at;
        Ok(())
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.operational_status == OperationalStatus::Active && self.next_check_at <= now
    }
}

/// The outcome of a single probe.
///
/// Also the stable wire format for buffered telemetry; the field names and
/// the `checked_at` layout must not change without versioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub monitor_id: String,
    pub status_code: u16,
    pub latency_ms: i64,
    pub is_success: bool,
    #[serde(with = "wire_time")]
    pub checked_at: DateTime<Utc>,
}

pub(crate) mod wire_time {
    use super::TIME_FORMAT;
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.format(TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(d)?;
        let naive = NaiveDateTime::parse_from_str(&s, TIME_FORMAT).map_err(serde::de::Error::custom)?;
        Ok(DateTime::from_naive_utc_and_offset(naive, Utc))
    }
}

/// A persisted raw telemetry row.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub id: i64,
    pub monitor_id: String,
    pub status_code: i64,
    pub latency_ms: i64,
    pub is_successful: bool,
    pub created_at: DateTime<Utc>,
}

impl From<CheckResult> for RawRecord {
    fn from(r: CheckResult) -> Self {
        Self {
            id: 0,
            monitor_id: r.monitor_id,
            status_code: r.status_code as i64,
            latency_ms: r.latency_ms,
            is_successful: r.is_success,
            created_at: r.checked_at,
        }
    }
}

/// An hourly or daily aggregate bucket, unique per (monitor, bucket start).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateBucket {
    pub monitor_id: String,
    pub bucket_time: DateTime<Utc>,
    pub ping_count: i64,
    pub success_count: i64,
    pub avg_latency_ms: i64,
    pub max_latency_ms: i64,
}

/// Which check outcomes a rule notifies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    Failure,
    Recovery,
    Both,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Failure => "FAILURE",
            Self::Recovery => "RECOVERY",
            Self::Both => "BOTH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FAILURE" => Some(Self::Failure),
            "RECOVERY" => Some(Self::Recovery),
            "BOTH" => Some(Self::Both),
            _ => None,
        }
    }

    pub fn includes_failure(&self) -> bool {
        matches!(self, Self::Failure | Self::Both)
    }
}

/// A single-tier "notify at N consecutive failures" configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub monitor_id: String,
    pub channel_id: String,
    pub failure_threshold: u32,
    pub notify_on: NotificationType,
    /// Modeled and persisted; not consulted before sending.
    pub cooldown_seconds: Option<i64>,
    pub enabled: bool,
}

/// An ordered multi-tier alert for persistent outages. A policy without a
/// monitor id applies to every monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationPolicy {
    pub id: String,
    pub monitor_id: Option<String>,
    pub level: i32,
    pub failure_threshold: u32,
    pub channel_id: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelType {
    Email,
    Chat,
    Webhook,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::Chat => "CHAT",
            Self::Webhook => "WEBHOOK",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "EMAIL" => Some(Self::Email),
            "CHAT" => Some(Self::Chat),
            "WEBHOOK" => Some(Self::Webhook),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: String,
    pub channel_type: ChannelType,
    pub destination: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Failure,
    Recovery,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Failure => "FAILURE",
            Self::Recovery => "RECOVERY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FAILURE" => Some(Self::Failure),
            "RECOVERY" => Some(Self::Recovery),
            _ => None,
        }
    }
}

/// Subject/body template with `{{variable}}` placeholders, keyed by
/// (channel type, event type, is-default).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTemplate {
    pub channel_type: ChannelType,
    pub event_type: EventType,
    pub is_default: bool,
    pub subject: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 24, h, m, 0).unwrap()
    }

    #[test]
    fn test_failure_streak_counting() {
        let mut monitor = Monitor::new("m1", "Test", "http://example.com", at(9, 0));

        for n in 1..=4u32 {
            monitor.mark_checked(at(10, n), false).unwrap();
            assert_eq!(monitor.consecutive_failures, n);
            assert_eq!(monitor.health_status, HealthStatus::Down);
        }

        monitor.mark_checked(at(10, 5), true).unwrap();
        assert_eq!(monitor.consecutive_failures, 0);
        assert_eq!(monitor.health_status, HealthStatus::Up);
    }

    #[test]
    fn test_status_change_only_on_flip() {
        let mut monitor = Monitor::new("m1", "Test", "http://example.com", at(9, 0));

        // Unknown -> Up is a flip
        monitor.mark_checked(at(10, 0), true).unwrap();
        assert_eq!(monitor.last_status_change_at, Some(at(10, 0)));

        // Up -> Up is not
        monitor.mark_checked(at(10, 1), true).unwrap();
        assert_eq!(monitor.last_status_change_at, Some(at(10, 0)));

        // Up -> Down is
        monitor.mark_checked(at(10, 2), false).unwrap();
        assert_eq!(monitor.last_status_change_at, Some(at(10, 2)));

        // Down -> Down is not
        monitor.mark_checked(at(10, 3), false).unwrap();
        assert_eq!(monitor.last_status_change_at, Some(at(10, 2)));
    }

    #[test]
    fn test_schedule_derivation() {
        let mut monitor = Monitor::new("m1", "Test", "http://example.com", at(9, 0));
        monitor.interval_seconds = 120;

        monitor.mark_checked(at(10, 0), true).unwrap();
        assert_eq!(monitor.last_checked_at, Some(at(10, 0)));
        assert_eq!(monitor.next_check_at, at(10, 2));
        assert!(!monitor.is_due(at(10, 1)));
        assert!(monitor.is_due(at(10, 2)));
    }

    #[test]
    fn test_mark_checked_rejected_when_not_active() {
        let mut monitor = Monitor::new("m1", "Test", "http://example.com", at(9, 0));
        monitor.operational_status = OperationalStatus::Paused;

        let err = monitor.mark_checked(at(10, 0), true).unwrap_err();
        assert!(matches!(err, MonitorError::InvalidState { .. }));
        assert!(!monitor.is_due(at(11, 0)));
    }

    #[test]
    fn test_wire_format_stability() {
        let result = CheckResult {
            monitor_id: "m1".to_string(),
            status_code: 200,
            latency_ms: 34,
            is_success: true,
            checked_at: at(10, 5),
        };

        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains(r#""monitor_id":"m1""#));
        assert!(json.contains(r#""status_code":200"#));
        assert!(json.contains(r#""latency_ms":34"#));
        assert!(json.contains(r#""is_success":true"#));
        assert!(json.contains(r#""checked_at":"2026-08-24 10:05:00""#));

        let back: CheckResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.checked_at, at(10, 5));
    }
}
