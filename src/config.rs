//! Configuration loaded from environment variables with sensible defaults.

use std::env;

/// SMTP settings for the email sender. Only present when configured.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the SQLite database file (default: "upmon.db")
    pub db_path: String,
    /// Seconds between dispatcher passes (default: 60)
    pub dispatch_interval_secs: u64,
    /// Seconds between ingest passes (default: 10)
    pub ingest_interval_secs: u64,
    /// Maximum buffered items drained per ingest pass (default: 500)
    pub ingest_batch_size: usize,
    /// Concurrent jobs executed by the worker pool (default: 4)
    pub max_workers: usize,
    /// Days of raw telemetry kept before a partition is dropped (default: 30)
    pub retention_days: i64,
    /// Days of partitions created ahead of need (default: 7)
    pub partition_days_ahead: i64,
    /// SMTP delivery settings; email notifications are disabled when absent
    pub smtp: Option<SmtpConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: "upmon.db".to_string(),
            dispatch_interval_secs: 60,
            ingest_interval_secs: 10,
            ingest_batch_size: 500,
            max_workers: 4,
            retention_days: 30,
            partition_days_ahead: 7,
            smtp: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, value: &mut T) {
    if let Ok(raw) = env::var(key) {
        if let Ok(parsed) = raw.parse() {
            *value = parsed;
        }
    }
}

impl ServerConfig {
    /// Load configuration from `UPMON_*` environment variables.
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(db_path) = env::var("UPMON_DB_PATH") {
            cfg.db_path = db_path;
        }
        env_parse("UPMON_DISPATCH_INTERVAL_SECS", &mut cfg.dispatch_interval_secs);
        env_parse("UPMON_INGEST_INTERVAL_SECS", &mut cfg.ingest_interval_secs);
        env_parse("UPMON_INGEST_BATCH_SIZE", &mut cfg.ingest_batch_size);
        env_parse("UPMON_MAX_WORKERS", &mut cfg.max_workers);
        env_parse("UPMON_RETENTION_DAYS", &mut cfg.retention_days);
        env_parse("UPMON_PARTITION_DAYS_AHEAD", &mut cfg.partition_days_ahead);

        if let Ok(host) = env::var("UPMON_SMTP_HOST") {
            let mut port = 587;
            env_parse("UPMON_SMTP_PORT", &mut port);
            cfg.smtp = Some(SmtpConfig {
                host,
                port,
                username: env::var("UPMON_SMTP_USERNAME").unwrap_or_default(),
                password: env::var("UPMON_SMTP_PASSWORD").unwrap_or_default(),
                from: env::var("UPMON_SMTP_FROM").unwrap_or_else(|_| "upmon@localhost".to_string()),
            });
        }

        cfg
    }
}
