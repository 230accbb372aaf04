//! Configuration commands for monitors.
//!
//! These are the only mutation paths besides `mark_checked`. Command-level
//! errors (not-found, access, validation) propagate to the caller; nothing
//! here is swallowed.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use thiserror::Error;

use crate::auth::{require_ownership, AccessError, Requester};
use crate::db::{Monitor, MonitorStore, OperationalStatus, StoreError};

#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("invalid monitor configuration: {0}")]
    Validation(String),
}

/// Target and scheduling settings supplied by the operator.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub name: String,
    pub url: String,
    pub method: String,
    pub expected_status: u16,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub interval_seconds: i64,
    pub timeout_seconds: i64,
}

impl MonitorConfig {
    fn validate(&self) -> Result<(), CommandError> {
        if self.name.trim().is_empty() {
            return Err(CommandError::Validation("name must not be empty".into()));
        }
        if self.url.trim().is_empty() {
            return Err(CommandError::Validation("url must not be empty".into()));
        }
        if self.interval_seconds <= 0 {
            return Err(CommandError::Validation("interval must be positive".into()));
        }
        if self.timeout_seconds <= 0 {
            return Err(CommandError::Validation("timeout must be positive".into()));
        }
        Ok(())
    }

    fn apply(&self, monitor: &mut Monitor, now: DateTime<Utc>) {
        monitor.name = self.name.clone();
        monitor.url = self.url.clone();
        monitor.method = self.method.clone();
        monitor.expected_status = self.expected_status;
        monitor.headers = self.headers.clone();
        monitor.body = self.body.clone();
        monitor.interval_seconds = self.interval_seconds;
        monitor.timeout_seconds = self.timeout_seconds;
        // Re-derive the schedule from the last check under the new interval;
        // a never-checked monitor stays due immediately.
        if let Some(last) = monitor.last_checked_at {
            monitor.next_check_at = last + Duration::seconds(self.interval_seconds);
        }
        monitor.updated_at = now;
    }
}

/// Create a monitor owned by the requester.
pub fn create_monitor(
    store: &dyn MonitorStore,
    requester: &Requester,
    config: MonitorConfig,
    now: DateTime<Utc>,
) -> Result<Monitor, CommandError> {
    config.validate()?;

    let id = format!("mon-{:016x}", rand::random::<u64>());
    let mut monitor = Monitor::new(id, config.name.clone(), config.url.clone(), now);
    monitor.owner_id = Some(requester.user_id.clone());
    config.apply(&mut monitor, now);

    store.save_monitor(&monitor)?;
    Ok(monitor)
}

/// Replace a monitor's target and scheduling configuration.
pub fn update_monitor_config(
    store: &dyn MonitorStore,
    requester: &Requester,
    monitor_id: &str,
    config: MonitorConfig,
    now: DateTime<Utc>,
) -> Result<Monitor, CommandError> {
    config.validate()?;

    let mut monitor = store.get_monitor(monitor_id)?;
    require_ownership(requester, monitor.owner_id.as_deref())?;

    config.apply(&mut monitor, now);
    store.save_monitor(&monitor)?;
    Ok(monitor)
}

/// Pause, resume, or disable a monitor.
pub fn set_operational_status(
    store: &dyn MonitorStore,
    requester: &Requester,
    monitor_id: &str,
    status: OperationalStatus,
    now: DateTime<Utc>,
) -> Result<Monitor, CommandError> {
    let mut monitor = store.get_monitor(monitor_id)?;
    require_ownership(requester, monitor.owner_id.as_deref())?;

    monitor.operational_status = status;
    monitor.updated_at = now;
    store.save_monitor(&monitor)?;
    Ok(monitor)
}
