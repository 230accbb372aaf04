//! Alert rule and escalation policy evaluation.

pub mod senders;
pub mod template;

pub use senders::{ChatSender, EmailSender, NotificationSender, SendError, WebhookSender};
pub use template::{render, RenderedMessage};

use std::sync::Arc;

use crate::db::{AlertStore, EventType, HealthStatus, Monitor};

/// Evaluates alert rules and escalation policies after a failed check and
/// dispatches notifications through the configured senders.
///
/// Every delivery problem is contained here: a failing channel, template, or
/// sender is logged and never propagates into the check pipeline.
pub struct AlertEngine {
    alerts: Arc<dyn AlertStore>,
    senders: Vec<Arc<dyn NotificationSender>>,
}

impl AlertEngine {
    pub fn new(alerts: Arc<dyn AlertStore>, senders: Vec<Arc<dyn NotificationSender>>) -> Self {
        Self { alerts, senders }
    }

    /// Evaluate all rules and policies for a monitor that was just checked.
    ///
    /// Rules fire on an exact threshold match so that each failure episode
    /// produces one notification per rule, not one per subsequent check.
    pub async fn check_and_notify(&self, monitor: &Monitor) {
        if monitor.health_status != HealthStatus::Down {
            return;
        }

        let rules = match self.alerts.enabled_rules_for(&monitor.id) {
            Ok(rules) => rules,
            Err(e) => {
                tracing::error!(monitor_id = %monitor.id, error = %e, "failed to load alert rules");
                return;
            }
        };

        for rule in rules {
            if monitor.consecutive_failures != rule.failure_threshold {
                continue;
            }
            if !rule.notify_on.includes_failure() {
                continue;
            }
            self.fire(&rule.channel_id, monitor).await;
        }

        let policies = match self.alerts.applicable_policies_for(&monitor.id) {
            Ok(policies) => policies,
            Err(e) => {
                tracing::error!(monitor_id = %monitor.id, error = %e, "failed to load escalation policies");
                return;
            }
        };

        // Pre-sorted ascending by level: tier 1 notifies before tier 2.
        for policy in policies {
            if monitor.consecutive_failures != policy.failure_threshold {
                continue;
            }
            tracing::info!(
                monitor_id = %monitor.id,
                level = policy.level,
                "escalation threshold reached"
            );
            self.fire(&policy.channel_id, monitor).await;
        }
    }

    async fn fire(&self, channel_id: &str, monitor: &Monitor) {
        let channel = match self.alerts.get_channel(channel_id) {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!(channel_id, monitor_id = %monitor.id, error = %e, "notification channel unavailable");
                return;
            }
        };
        if !channel.enabled {
            return;
        }

        let message = render(
            self.alerts.as_ref(),
            channel.channel_type,
            EventType::Failure,
            monitor,
        );

        let Some(sender) = self.senders.iter().find(|s| s.supports(&channel)) else {
            tracing::warn!(
                channel_id,
                channel_type = channel.channel_type.as_str(),
                "no sender configured for channel"
            );
            return;
        };

        if let Err(e) = sender.send(&channel, monitor, &message).await {
            tracing::error!(
                channel_id,
                monitor_id = %monitor.id,
                error = %e,
                "notification delivery failed"
            );
        }
    }
}
