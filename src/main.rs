//! upmon - HTTP endpoint monitoring service
//!
//! Periodically probes configured endpoints, buffers telemetry durably,
//! rolls it up into hourly and daily aggregates, and sends notifications
//! when monitors go down.

mod auth;
mod commands;
mod config;
mod db;
mod notify;
mod probe;
mod scheduler;

use config::ServerConfig;
use db::{Monitor, MonitorStore, SqliteStore};
use notify::{AlertEngine, ChatSender, EmailSender, NotificationSender, WebhookSender};
use scheduler::{Command, Scheduler};

use chrono::Utc;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("upmon=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting upmon...");
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(SqliteStore::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    // Add a sample monitor if none exist
    if store.count_monitors()? == 0 {
        tracing::info!("Adding sample monitor: example.com");
        let mut monitor = Monitor::new("mon-sample", "Example", "https://example.com/", Utc::now());
        monitor.interval_seconds = 300;
        store.save_monitor(&monitor)?;
    }

    // Wire up notification senders; email only when SMTP is configured
    let mut senders: Vec<Arc<dyn NotificationSender>> =
        vec![Arc::new(ChatSender::new()), Arc::new(WebhookSender::new())];
    if let Some(smtp) = &cfg.smtp {
        match EmailSender::new(smtp) {
            Ok(sender) => senders.push(Arc::new(sender)),
            Err(e) => tracing::error!(error = %e, "email sender unavailable"),
        }
    }
    let engine = AlertEngine::new(store.clone(), senders);

    // Start the scheduler and its background loops
    let scheduler = Scheduler::new(
        cfg,
        store.clone(),
        store.clone(),
        store.clone(),
        engine,
    );
    let jobs = scheduler.jobs();
    scheduler.start();

    // Ensure partitions exist before the first checks land
    jobs.dispatch(Command::PartitionMaintenance).await;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    Ok(())
}
