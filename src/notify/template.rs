//! Notification message rendering.

use crate::db::{AlertStore, ChannelType, EventType, Monitor, TIME_FORMAT};

/// A rendered subject/body pair ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

/// Replace every `{{key}}` placeholder with its value. Unknown placeholders
/// are left untouched.
fn substitute(text: &str, vars: &[(&str, String)]) -> String {
    let mut out = text.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{}}}}}", key), value);
    }
    out
}

fn variables(monitor: &Monitor) -> Vec<(&'static str, String)> {
    vec![
        ("monitor_name", monitor.name.clone()),
        ("monitor_url", monitor.url.clone()),
        ("method", monitor.method.clone()),
        ("health", monitor.health_status.as_str().to_string()),
        (
            "consecutive_failures",
            monitor.consecutive_failures.to_string(),
        ),
        (
            "last_checked_at",
            monitor
                .last_checked_at
                .map(|t| t.format(TIME_FORMAT).to_string())
                .unwrap_or_else(|| "never".to_string()),
        ),
    ]
}

/// Render the notification for a channel/event pair.
///
/// Looks up the stored template (specific preferred over default) and falls
/// back to a fixed message when none exists or the lookup fails.
pub fn render(
    alerts: &dyn AlertStore,
    channel_type: ChannelType,
    event: EventType,
    monitor: &Monitor,
) -> RenderedMessage {
    let vars = variables(monitor);

    let template = match alerts.find_template(channel_type, event) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(error = %e, "template lookup failed, using fallback");
            None
        }
    };

    match template {
        Some(t) => RenderedMessage {
            subject: substitute(&t.subject, &vars),
            body: substitute(&t.body, &vars),
        },
        None => fallback(event, monitor),
    }
}

fn fallback(event: EventType, monitor: &Monitor) -> RenderedMessage {
    let subject = match event {
        EventType::Failure => format!("Monitor {} is DOWN", monitor.name),
        EventType::Recovery => format!("Monitor {} has recovered", monitor.name),
    };
    let body = format!(
        "{} {} is {} ({} consecutive failures, last checked {})",
        monitor.method,
        monitor.url,
        monitor.health_status.as_str(),
        monitor.consecutive_failures,
        monitor
            .last_checked_at
            .map(|t| t.format(TIME_FORMAT).to_string())
            .unwrap_or_else(|| "never".to_string()),
    );
    RenderedMessage { subject, body }
}
