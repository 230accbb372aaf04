//! Due-monitor dispatch.

use chrono::{DateTime, Utc};

use super::{Command, JobQueue};
use crate::db::{MonitorStore, StoreError};

/// Monitors per check-batch command.
pub const CHECK_BATCH_SIZE: usize = 50;

/// Find every active monitor whose check is due, chunk them, and submit one
/// check-batch job per chunk. Returns the total number of due monitors.
///
/// No claim is taken before dispatch: if a batch's processing time exceeds
/// the dispatch cadence the same monitor can be dispatched again. Checking
/// is at-least-once by design.
pub async fn dispatch_due_monitors(
    monitors: &dyn MonitorStore,
    jobs: &JobQueue,
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let due = monitors.find_due_monitors(now)?;
    let total = due.len();

    for chunk in due.chunks(CHECK_BATCH_SIZE) {
        let ids = chunk.iter().map(|m| m.id.clone()).collect();
        jobs.dispatch(Command::CheckBatch(ids)).await;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, Monitor, MonitorStore, OperationalStatus};
    use chrono::{Duration, TimeZone};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_due_monitors_chunked_into_batches() {
        let store = MemoryStore::new();
        let now = Utc.with_ymd_and_hms(2026, 8, 24, 10, 0, 0).unwrap();

        for i in 0..120 {
            let monitor = Monitor::new(format!("m{}", i), "Test", "http://example.com", now);
            store.save_monitor(&monitor).unwrap();
        }
        // Not yet due
        let mut future = Monitor::new("later", "Later", "http://example.com", now);
        future.next_check_at = now + Duration::minutes(5);
        store.save_monitor(&future).unwrap();
        // Not active
        let mut disabled = Monitor::new("off", "Off", "http://example.com", now);
        disabled.operational_status = OperationalStatus::Disabled;
        store.save_monitor(&disabled).unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let jobs = JobQueue::new(tx);

        let total = dispatch_due_monitors(&store, &jobs, now).await.unwrap();
        assert_eq!(total, 120);

        let mut chunk_sizes = Vec::new();
        while let Ok(Command::CheckBatch(ids)) = rx.try_recv() {
            chunk_sizes.push(ids.len());
        }
        assert_eq!(chunk_sizes, vec![50, 50, 20]);
    }

    #[tokio::test]
    async fn test_nothing_due_dispatches_nothing() {
        let store = MemoryStore::new();
        let (tx, mut rx) = mpsc::channel(4);
        let jobs = JobQueue::new(tx);

        let total = dispatch_due_monitors(&store, &jobs, Utc::now()).await.unwrap();
        assert_eq!(total, 0);
        assert!(rx.try_recv().is_err());
    }
}
