//! Telemetry buffer and crash-safe bulk ingestion.

use std::sync::Arc;

use crate::db::{CheckResult, RawRecord, StoreError, TelemetryQueue, TelemetryStore};

/// Fire-and-forget front of the durable queue.
///
/// Check execution pushes here and moves on; serialization or queue failures
/// are logged, never surfaced to the caller.
pub struct TelemetryBuffer {
    queue: Arc<dyn TelemetryQueue>,
}

impl TelemetryBuffer {
    pub fn new(queue: Arc<dyn TelemetryQueue>) -> Self {
        Self { queue }
    }

    pub fn push(&self, result: &CheckResult) {
        let payload = match serde_json::to_string(result) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(monitor_id = %result.monitor_id, error = %e, "failed to serialize check result");
                return;
            }
        };
        if let Err(e) = self.queue.push(&payload) {
            tracing::error!(monitor_id = %result.monitor_id, error = %e, "failed to buffer check result");
        }
    }
}

/// Drain up to `batch_size` buffered items into the raw store.
///
/// Order of operations: recover any processing leftovers from a prior crash,
/// claim items one atomic move at a time, drop malformed items, bulk insert
/// the rest in one transaction, then clear the processing list. On any error
/// nothing is lost: unclaimed items stay buffered and claimed items stay in
/// processing for the next invocation's recovery step.
///
/// Only one ingest invocation may run at a time system-wide; the job runner
/// serializes calls behind a mutex.
pub fn ingest(
    queue: &dyn TelemetryQueue,
    telemetry: &dyn TelemetryStore,
    batch_size: usize,
) -> usize {
    match try_ingest(queue, telemetry, batch_size) {
        Ok(inserted) => inserted,
        Err(e) => {
            tracing::error!(error = %e, "telemetry ingestion failed, items remain queued");
            0
        }
    }
}

fn try_ingest(
    queue: &dyn TelemetryQueue,
    telemetry: &dyn TelemetryStore,
    batch_size: usize,
) -> Result<usize, StoreError> {
    let recovered = queue.requeue_processing()?;
    if recovered > 0 {
        tracing::warn!(recovered, "recovered telemetry items from interrupted ingest");
    }

    let mut payloads = Vec::with_capacity(batch_size);
    while payloads.len() < batch_size {
        match queue.claim_next()? {
            Some(payload) => payloads.push(payload),
            None => break,
        }
    }
    if payloads.is_empty() {
        return Ok(0);
    }

    let mut records = Vec::with_capacity(payloads.len());
    for payload in &payloads {
        match serde_json::from_str::<CheckResult>(payload) {
            Ok(result) => records.push(RawRecord::from(result)),
            Err(e) => {
                tracing::warn!(error = %e, payload, "dropping malformed telemetry item");
            }
        }
    }

    let inserted = telemetry.insert_raw_records(&records)?;
    queue.clear_processing()?;

    tracing::debug!(claimed = payloads.len(), inserted, "telemetry batch ingested");
    Ok(inserted)
}
