//! Execution of one dispatched check batch.

use std::collections::HashMap;

use super::ingest::TelemetryBuffer;
use crate::db::{Monitor, MonitorStore, StoreError};
use crate::notify::AlertEngine;
use crate::probe::UrlChecker;

/// Check every monitor in a dispatched chunk and persist the outcome.
///
/// Monitors are loaded in one batch fetch and probed concurrently. Each
/// result is processed in isolation: a failure for one monitor is logged and
/// must not stop the rest of the batch. All mutated monitors are saved in a
/// single flush at the end; only that final persistence error propagates.
pub async fn run_check_batch(
    monitors: &dyn MonitorStore,
    checker: &UrlChecker,
    buffer: &TelemetryBuffer,
    engine: &AlertEngine,
    ids: &[String],
) -> Result<usize, StoreError> {
    let loaded = monitors.find_by_ids(ids)?;
    let results = checker.check_batch(&loaded).await;

    let mut by_id: HashMap<String, Monitor> =
        loaded.into_iter().map(|m| (m.id.clone(), m)).collect();
    let mut mutated = Vec::with_capacity(results.len());

    for result in results {
        // Deleted mid-flight: skip silently
        let Some(mut monitor) = by_id.remove(&result.monitor_id) else {
            tracing::debug!(monitor_id = %result.monitor_id, "monitor vanished during check, skipping");
            continue;
        };

        if let Err(e) = monitor.mark_checked(result.checked_at, result.is_success) {
            tracing::warn!(monitor_id = %monitor.id, error = %e, "skipping check result");
            continue;
        }

        buffer.push(&result);
        engine.check_and_notify(&monitor).await;
        mutated.push(monitor);
    }

    monitors.save_monitors(&mutated)?;
    Ok(mutated.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        AlertRule, ChannelType, HealthStatus, MemoryStore, NotificationChannel, NotificationType,
        TelemetryQueue,
    };
    use crate::db::store::AlertStore;
    use crate::notify::senders::{NotificationSender, SendError};
    use crate::notify::RenderedMessage;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    struct RecordingSender {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationSender for RecordingSender {
        fn supports(&self, _channel: &NotificationChannel) -> bool {
            true
        }

        async fn send(
            &self,
            _channel: &NotificationChannel,
            monitor: &Monitor,
            _message: &RenderedMessage,
        ) -> Result<(), SendError> {
            self.sent.lock().unwrap().push(monitor.id.clone());
            Ok(())
        }
    }

    fn unreachable_monitor(id: &str) -> Monitor {
        let mut monitor = Monitor::new(id, id, "http://127.0.0.1:1", Utc::now());
        monitor.timeout_seconds = 1;
        monitor
    }

    #[tokio::test]
    async fn test_batch_records_failures_and_alerts() {
        let store = Arc::new(MemoryStore::new());
        store.save_monitor(&unreachable_monitor("m1")).unwrap();
        store
            .save_channel(&NotificationChannel {
                id: "c1".to_string(),
                channel_type: ChannelType::Chat,
                destination: "http://hook".to_string(),
                enabled: true,
            })
            .unwrap();
        store
            .save_rule(&AlertRule {
                id: "r1".to_string(),
                monitor_id: "m1".to_string(),
                channel_id: "c1".to_string(),
                failure_threshold: 1,
                notify_on: NotificationType::Failure,
                cooldown_seconds: None,
                enabled: true,
            })
            .unwrap();

        let sender = Arc::new(RecordingSender {
            sent: Mutex::new(Vec::new()),
        });
        let engine = AlertEngine::new(store.clone(), vec![sender.clone()]);
        let buffer = TelemetryBuffer::new(store.clone());

        let saved = run_check_batch(
            store.as_ref(),
            &UrlChecker::new(),
            &buffer,
            &engine,
            &["m1".to_string()],
        )
        .await
        .unwrap();

        assert_eq!(saved, 1);
        let monitor = store.get_monitor("m1").unwrap();
        assert_eq!(monitor.health_status, HealthStatus::Down);
        assert_eq!(monitor.consecutive_failures, 1);
        assert!(monitor.next_check_at > monitor.last_checked_at.unwrap());

        // One raw result buffered, one alert fired
        assert_eq!(store.buffer_len().unwrap(), 1);
        assert_eq!(sender.sent.lock().unwrap().as_slice(), ["m1"]);
    }

    #[tokio::test]
    async fn test_missing_monitor_does_not_abort_batch() {
        let store = Arc::new(MemoryStore::new());
        store.save_monitor(&unreachable_monitor("m1")).unwrap();

        let engine = AlertEngine::new(store.clone(), Vec::new());
        let buffer = TelemetryBuffer::new(store.clone());

        let saved = run_check_batch(
            store.as_ref(),
            &UrlChecker::new(),
            &buffer,
            &engine,
            &["ghost".to_string(), "m1".to_string()],
        )
        .await
        .unwrap();

        assert_eq!(saved, 1);
        assert_eq!(
            store.get_monitor("m1").unwrap().health_status,
            HealthStatus::Down
        );
    }

    #[tokio::test]
    async fn test_paused_monitor_skipped_but_batch_continues() {
        let store = Arc::new(MemoryStore::new());
        let mut paused = unreachable_monitor("paused");
        paused.operational_status = crate::db::OperationalStatus::Paused;
        store.save_monitor(&paused).unwrap();
        store.save_monitor(&unreachable_monitor("m1")).unwrap();

        let engine = AlertEngine::new(store.clone(), Vec::new());
        let buffer = TelemetryBuffer::new(store.clone());

        let saved = run_check_batch(
            store.as_ref(),
            &UrlChecker::new(),
            &buffer,
            &engine,
            &["paused".to_string(), "m1".to_string()],
        )
        .await
        .unwrap();

        // The paused monitor's transition is rejected and skipped
        assert_eq!(saved, 1);
        let paused = store.get_monitor("paused").unwrap();
        assert_eq!(paused.consecutive_failures, 0);
        assert_eq!(paused.health_status, HealthStatus::Unknown);
    }
}
