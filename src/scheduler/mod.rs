//! Scheduling, work queue, and background pipeline loops.

pub mod batch;
pub mod dispatch;
pub mod ingest;
pub mod partition;
pub mod rollup;

pub use dispatch::{dispatch_due_monitors, CHECK_BATCH_SIZE};
pub use ingest::TelemetryBuffer;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

use crate::config::ServerConfig;
use crate::db::{MonitorStore, TelemetryQueue, TelemetryStore};
use crate::notify::AlertEngine;
use crate::probe::UrlChecker;

/// A unit of asynchronous work submitted to the job runner.
#[derive(Debug, Clone)]
pub enum Command {
    CheckBatch(Vec<String>),
    IngestTelemetry,
    RollupHourly(DateTime<Utc>),
    RollupDaily(DateTime<Utc>),
    PartitionMaintenance,
}

/// Sender half of the work queue.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Command>,
}

impl JobQueue {
    pub fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    pub async fn dispatch(&self, command: Command) {
        if self.tx.send(command).await.is_err() {
            tracing::error!("job queue closed, dropping command");
        }
    }
}

/// Shared state for command execution.
struct Worker {
    monitors: Arc<dyn MonitorStore>,
    telemetry: Arc<dyn TelemetryStore>,
    queue: Arc<dyn TelemetryQueue>,
    checker: UrlChecker,
    buffer: TelemetryBuffer,
    engine: AlertEngine,
    ingest_batch_size: usize,
    partition_days_ahead: i64,
    retention_days: i64,
    // Single-writer protocol: never run two ingest passes concurrently
    ingest_lock: tokio::sync::Mutex<()>,
}

impl Worker {
    async fn handle(&self, command: Command) {
        match command {
            Command::CheckBatch(ids) => {
                match batch::run_check_batch(
                    self.monitors.as_ref(),
                    &self.checker,
                    &self.buffer,
                    &self.engine,
                    &ids,
                )
                .await
                {
                    Ok(saved) => tracing::debug!(saved, "check batch persisted"),
                    Err(e) => {
                        tracing::error!(error = %e, batch_size = ids.len(), "check batch failed")
                    }
                }
            }
            Command::IngestTelemetry => {
                let _guard = self.ingest_lock.lock().await;
                let inserted = ingest::ingest(
                    self.queue.as_ref(),
                    self.telemetry.as_ref(),
                    self.ingest_batch_size,
                );
                if inserted > 0 {
                    tracing::debug!(inserted, "telemetry ingested");
                }
            }
            Command::RollupHourly(hour) => {
                match rollup::aggregate_hourly(self.telemetry.as_ref(), hour) {
                    Ok(affected) => tracing::debug!(affected, %hour, "hourly rollup finished"),
                    Err(e) => tracing::error!(error = %e, %hour, "hourly rollup failed"),
                }
            }
            Command::RollupDaily(day) => {
                match rollup::aggregate_daily(self.telemetry.as_ref(), day) {
                    Ok(affected) => tracing::debug!(affected, %day, "daily rollup finished"),
                    Err(e) => tracing::error!(error = %e, %day, "daily rollup failed"),
                }
            }
            Command::PartitionMaintenance => {
                partition::run_maintenance(
                    self.telemetry.as_ref(),
                    Utc::now().date_naive(),
                    self.partition_days_ahead,
                    self.retention_days,
                );
            }
        }
    }
}

async fn run_jobs(mut rx: mpsc::Receiver<Command>, worker: Arc<Worker>, max_workers: usize) {
    let semaphore = Arc::new(Semaphore::new(max_workers));
    while let Some(command) = rx.recv().await {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let worker = worker.clone();
        tokio::spawn(async move {
            let _permit = permit;
            worker.handle(command).await;
        });
    }
}

/// Owns the work queue and the recurring trigger loops.
pub struct Scheduler {
    config: ServerConfig,
    worker: Arc<Worker>,
    jobs: JobQueue,
    rx: mpsc::Receiver<Command>,
}

impl Scheduler {
    pub fn new(
        config: ServerConfig,
        monitors: Arc<dyn MonitorStore>,
        telemetry: Arc<dyn TelemetryStore>,
        queue: Arc<dyn TelemetryQueue>,
        engine: AlertEngine,
    ) -> Self {
        let (tx, rx) = mpsc::channel(1000);
        let worker = Arc::new(Worker {
            monitors,
            telemetry,
            queue: queue.clone(),
            checker: UrlChecker::new(),
            buffer: TelemetryBuffer::new(queue),
            engine,
            ingest_batch_size: config.ingest_batch_size,
            partition_days_ahead: config.partition_days_ahead,
            retention_days: config.retention_days,
            ingest_lock: tokio::sync::Mutex::new(()),
        });
        Self {
            config,
            worker,
            jobs: JobQueue::new(tx),
            rx,
        }
    }

    pub fn jobs(&self) -> JobQueue {
        self.jobs.clone()
    }

    /// Spawn the job runner and all recurring trigger loops.
    pub fn start(self) {
        let Self {
            config,
            worker,
            jobs,
            rx,
        } = self;

        tokio::spawn(run_jobs(rx, worker.clone(), config.max_workers));

        // Dispatcher cadence
        let dispatch_jobs = jobs.clone();
        let monitors = worker.monitors.clone();
        let dispatch_every = Duration::from_secs(config.dispatch_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(dispatch_every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                match dispatch_due_monitors(monitors.as_ref(), &dispatch_jobs, Utc::now()).await {
                    Ok(0) => {}
                    Ok(due) => tracing::info!(due, "dispatched due monitors"),
                    Err(e) => tracing::error!(error = %e, "dispatch failed"),
                }
            }
        });

        // Ingest cadence
        let ingest_jobs = jobs.clone();
        let ingest_every = Duration::from_secs(config.ingest_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ingest_every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                ingest_jobs.dispatch(Command::IngestTelemetry).await;
            }
        });

        // Hourly rollup of the previous hour; safe to re-run, so the
        // immediate first tick doubles as startup backfill.
        let hourly_jobs = jobs.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3600));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let previous = rollup::hour_start(Utc::now() - ChronoDuration::hours(1));
                hourly_jobs.dispatch(Command::RollupHourly(previous)).await;
            }
        });

        // Daily rollup and partition maintenance
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(86400));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let previous = rollup::day_start(Utc::now() - ChronoDuration::days(1));
                jobs.dispatch(Command::RollupDaily(previous)).await;
                jobs.dispatch(Command::PartitionMaintenance).await;
            }
        });
    }
}
