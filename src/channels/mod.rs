//! Delivery channels for notifications.
//!
//! A channel is one mechanism for getting a notification to a recipient:
//! a socket push, an SMS, or an email. Socket delivery goes through the
//! room broadcaster; SMS and email go through the opaque senders below.

mod email;
mod sms;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{EmailConfig, SmsConfig};

pub use email::SmtpEmailSender;
pub use sms::HttpSmsSender;

/// The closed set of delivery channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Socket,
    Sms,
    Email,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Socket => "socket",
            ChannelKind::Sms => "sms",
            ChannelKind::Email => "email",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome reported by a channel sender.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryReport {
    pub fn delivered() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Invalid channel configuration: {0}")]
    InvalidConfig(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Opaque email sender. Implementations enforce their own timeouts and
/// report failure through the returned report or an error; the dispatcher
/// treats both the same way.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(
        &self,
        to: &str,
        template_key: &str,
        vars: &serde_json::Value,
    ) -> Result<DeliveryReport, ChannelError>;
}

/// Opaque SMS sender.
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(
        &self,
        to: &str,
        template_key: &str,
        vars: &serde_json::Value,
    ) -> Result<DeliveryReport, ChannelError>;
}

/// Sender used when a channel has no provider configured. Requests are
/// reported as failed deliveries rather than errors so a misconfigured
/// channel degrades to a per-channel failure, not an aborted dispatch.
pub struct DisabledSender {
    channel: ChannelKind,
}

impl DisabledSender {
    pub fn new(channel: ChannelKind) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl EmailSender for DisabledSender {
    async fn send(
        &self,
        to: &str,
        template_key: &str,
        _vars: &serde_json::Value,
    ) -> Result<DeliveryReport, ChannelError> {
        tracing::warn!(
            channel = %self.channel,
            to = %to,
            template_key = %template_key,
            "Channel requested but no provider is configured"
        );
        Ok(DeliveryReport::failed("email channel not configured"))
    }
}

#[async_trait]
impl SmsSender for DisabledSender {
    async fn send(
        &self,
        to: &str,
        template_key: &str,
        _vars: &serde_json::Value,
    ) -> Result<DeliveryReport, ChannelError> {
        tracing::warn!(
            channel = %self.channel,
            to = %to,
            template_key = %template_key,
            "Channel requested but no provider is configured"
        );
        Ok(DeliveryReport::failed("sms channel not configured"))
    }
}

/// Render the human-readable message line for SMS/email bodies.
/// Notification payloads carry an explicit `message`; fall back to a
/// generic line keyed by the notification type.
pub(crate) fn render_message(template_key: &str, vars: &serde_json::Value) -> String {
    vars.get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("You have a new {} notification", template_key))
}

pub fn create_email_sender(config: &EmailConfig) -> Arc<dyn EmailSender> {
    if config.is_configured() {
        Arc::new(SmtpEmailSender::new(config))
    } else {
        Arc::new(DisabledSender::new(ChannelKind::Email))
    }
}

pub fn create_sms_sender(config: &SmsConfig) -> Arc<dyn SmsSender> {
    if config.is_configured() {
        Arc::new(HttpSmsSender::new(config))
    } else {
        Arc::new(DisabledSender::new(ChannelKind::Sms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channel_kind_serde() {
        assert_eq!(serde_json::to_string(&ChannelKind::Socket).unwrap(), "\"socket\"");
        assert_eq!(serde_json::to_string(&ChannelKind::Sms).unwrap(), "\"sms\"");
        assert_eq!(serde_json::to_string(&ChannelKind::Email).unwrap(), "\"email\"");

        let parsed: ChannelKind = serde_json::from_str("\"email\"").unwrap();
        assert_eq!(parsed, ChannelKind::Email);
    }

    #[test]
    fn test_render_message_prefers_explicit_message() {
        let vars = json!({"message": "Your order is ready"});
        assert_eq!(render_message("ORDER_READY", &vars), "Your order is ready");

        let vars = json!({"orderId": "ord-1"});
        assert_eq!(
            render_message("ORDER_READY", &vars),
            "You have a new ORDER_READY notification"
        );
    }

    #[tokio::test]
    async fn test_disabled_sender_reports_failure() {
        let sender = DisabledSender::new(ChannelKind::Email);
        let report = EmailSender::send(&sender, "a@b.c", "TEST", &json!({}))
            .await
            .unwrap();
        assert!(!report.success);
        assert!(report.error.is_some());
    }
}
