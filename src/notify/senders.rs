//! Per-channel notification delivery.

use async_trait::async_trait;
use thiserror::Error;

use super::template::RenderedMessage;
use crate::config::SmtpConfig;
use crate::db::{ChannelType, Monitor, NotificationChannel};

/// Delivery error types.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("email delivery failed: {0}")]
    Email(String),
    #[error("http delivery failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("delivery rejected with status {0}")]
    Rejected(reqwest::StatusCode),
}

/// Best-effort delivery for one channel type. Callers catch and log every
/// failure; a sender must never block the check pipeline.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    fn supports(&self, channel: &NotificationChannel) -> bool;
    async fn send(
        &self,
        channel: &NotificationChannel,
        monitor: &Monitor,
        message: &RenderedMessage,
    ) -> Result<(), SendError>;
}

/// SMTP email delivery. The channel destination is the recipient address.
pub struct EmailSender {
    transport: lettre::AsyncSmtpTransport<lettre::Tokio1Executor>,
    from: lettre::message::Mailbox,
}

impl EmailSender {
    pub fn new(config: &SmtpConfig) -> Result<Self, SendError> {
        use lettre::transport::smtp::authentication::Credentials;

        let transport =
            lettre::AsyncSmtpTransport::<lettre::Tokio1Executor>::relay(&config.host)
                .map_err(|e| SendError::Email(e.to_string()))?
                .credentials(Credentials::new(
                    config.username.clone(),
                    config.password.clone(),
                ))
                .port(config.port)
                .build();
        let from = config
            .from
            .parse()
            .map_err(|e| SendError::Email(format!("invalid from address: {}", e)))?;
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl NotificationSender for EmailSender {
    fn supports(&self, channel: &NotificationChannel) -> bool {
        channel.channel_type == ChannelType::Email
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        _monitor: &Monitor,
        message: &RenderedMessage,
    ) -> Result<(), SendError> {
        use lettre::message::header::ContentType;
        use lettre::{AsyncTransport, Message};

        let email = Message::builder()
            .from(self.from.clone())
            .to(channel
                .destination
                .parse()
                .map_err(|e| SendError::Email(format!("invalid recipient: {}", e)))?)
            .subject(&message.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| SendError::Email(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| SendError::Email(e.to_string()))?;
        Ok(())
    }
}

/// Chat delivery via an incoming-webhook URL (Slack-compatible payload).
pub struct ChatSender {
    client: reqwest::Client,
}

impl ChatSender {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ChatSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSender for ChatSender {
    fn supports(&self, channel: &NotificationChannel) -> bool {
        channel.channel_type == ChannelType::Chat
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        _monitor: &Monitor,
        message: &RenderedMessage,
    ) -> Result<(), SendError> {
        let payload = serde_json::json!({
            "text": format!("*{}*\n{}", message.subject, message.body),
        });

        let response = self
            .client
            .post(&channel.destination)
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SendError::Rejected(response.status()));
        }
        Ok(())
    }
}

/// Generic webhook delivery posting the event as JSON.
pub struct WebhookSender {
    client: reqwest::Client,
}

impl WebhookSender {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    fn supports(&self, channel: &NotificationChannel) -> bool {
        channel.channel_type == ChannelType::Webhook
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        monitor: &Monitor,
        message: &RenderedMessage,
    ) -> Result<(), SendError> {
        let payload = serde_json::json!({
            "subject": message.subject,
            "body": message.body,
            "monitor_id": monitor.id,
            "monitor_name": monitor.name,
            "monitor_url": monitor.url,
            "health": monitor.health_status.as_str(),
            "consecutive_failures": monitor.consecutive_failures,
        });

        let response = self
            .client
            .post(&channel.destination)
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SendError::Rejected(response.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(channel_type: ChannelType) -> NotificationChannel {
        NotificationChannel {
            id: "c1".to_string(),
            channel_type,
            destination: "http://127.0.0.1:1/hook".to_string(),
            enabled: true,
        }
    }

    #[test]
    fn test_supports_is_type_exact() {
        let chat = ChatSender::new();
        assert!(chat.supports(&channel(ChannelType::Chat)));
        assert!(!chat.supports(&channel(ChannelType::Webhook)));

        let webhook = WebhookSender::new();
        assert!(webhook.supports(&channel(ChannelType::Webhook)));
        assert!(!webhook.supports(&channel(ChannelType::Email)));
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_an_error_not_a_panic() {
        let sender = WebhookSender::new();
        let monitor = Monitor::new("m1", "Test", "http://example.com", chrono::Utc::now());
        let message = RenderedMessage {
            subject: "s".to_string(),
            body: "b".to_string(),
        };
        let result = sender
            .send(&channel(ChannelType::Webhook), &monitor, &message)
            .await;
        assert!(result.is_err());
    }
}
