//! HTTP probe execution.

use chrono::Utc;
use reqwest::Method;
use std::time::{Duration, Instant};

use crate::db::{CheckResult, Monitor};

/// Executes HTTP probes against monitors.
///
/// A probe never fails: any transport error (connect failure, timeout, DNS)
/// is reported as status code 0 with the latency measured up to the error.
#[derive(Clone)]
pub struct UrlChecker {
    client: reqwest::Client,
}

impl UrlChecker {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Probe a single monitor, bounded by the monitor's own timeout.
    pub async fn check(&self, monitor: &Monitor) -> CheckResult {
        // Jitter to avoid thundering herd when a batch launches at once
        let jitter = rand::random::<u64>() % 100;
        tokio::time::sleep(Duration::from_millis(jitter)).await;

        let checked_at = Utc::now();
        let timeout = Duration::from_secs(monitor.timeout_seconds.max(1) as u64);
        let method = Method::from_bytes(monitor.method.as_bytes()).unwrap_or(Method::GET);

        let mut request = self
            .client
            .request(method, &monitor.url)
            .timeout(timeout);
        for (key, value) in &monitor.headers {
            request = request.header(key, value);
        }
        if let Some(body) = &monitor.body {
            request = request.body(body.clone());
        }

        let start = Instant::now();
        let (status_code, transport_ok) = match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                // Read the full body to measure complete transfer time
                let _body = response.bytes().await;
                (status, true)
            }
            Err(e) => {
                tracing::debug!(monitor_id = %monitor.id, error = %e, "probe transport error");
                (0, false)
            }
        };
        let latency_ms = start.elapsed().as_millis() as i64;

        CheckResult {
            monitor_id: monitor.id.clone(),
            status_code,
            latency_ms,
            is_success: transport_ok && status_code == monitor.expected_status,
            checked_at,
        }
    }

    /// Probe a batch of monitors concurrently, one task per monitor.
    pub async fn check_batch(&self, monitors: &[Monitor]) -> Vec<CheckResult> {
        let mut handles = Vec::with_capacity(monitors.len());
        for monitor in monitors {
            let checker = self.clone();
            let monitor = monitor.clone();
            handles.push(tokio::spawn(async move { checker.check(&monitor).await }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!(error = %e, "probe task panicked"),
            }
        }
        results
    }
}

impl Default for UrlChecker {
    fn default() -> Self {
        Self::new()
    }
}
