use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channels::ChannelKind;
use crate::store::NotificationRecord;

/// Priority levels for notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "low" => Some(Priority::Low),
            "normal" => Some(Priority::Normal),
            "high" => Some(Priority::High),
            "critical" => Some(Priority::Critical),
            _ => None,
        }
    }
}

/// Durable outcome of a notification dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Sent => "SENT",
            NotificationStatus::Failed => "FAILED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "SENT" => Some(NotificationStatus::Sent),
            "FAILED" => Some(NotificationStatus::Failed),
            _ => None,
        }
    }
}

/// A logical notification to deliver: recipient, content, and the set of
/// channels to attempt.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationIntent {
    pub user_id: String,
    #[serde(default)]
    pub pharmacy_id: Option<String>,
    pub tenant_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelKind>,
    #[serde(default)]
    pub priority: Priority,
}

fn default_channels() -> Vec<ChannelKind> {
    vec![ChannelKind::Socket]
}

impl NotificationIntent {
    pub fn new(
        user_id: impl Into<String>,
        tenant_id: impl Into<String>,
        kind: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            pharmacy_id: None,
            tenant_id: tenant_id.into(),
            kind: kind.into(),
            title: title.into(),
            message: message.into(),
            data: serde_json::Value::Null,
            channels: default_channels(),
            priority: Priority::default(),
        }
    }

    pub fn pharmacy(mut self, pharmacy_id: impl Into<String>) -> Self {
        self.pharmacy_id = Some(pharmacy_id.into());
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn channels(mut self, channels: Vec<ChannelKind>) -> Self {
        self.channels = channels;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Per-channel delivery result. One channel's failure never suppresses
/// another channel's attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelResult {
    pub channel: ChannelKind,
    pub success: bool,
}

/// Structured result returned to dispatch callers. Never an unhandled
/// error: failures surface here as `success: false`.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<ChannelResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NotificationOutcome {
    pub fn sent(channels: Vec<ChannelResult>) -> Self {
        Self {
            success: true,
            channels,
            timestamp: Some(Utc::now()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            channels: Vec::new(),
            timestamp: None,
            error: Some(error.into()),
        }
    }

    pub fn channel(&self, kind: ChannelKind) -> Option<&ChannelResult> {
        self.channels.iter().find(|r| r.channel == kind)
    }
}

/// Aggregate result of a staff-wide notification.
#[derive(Debug, Clone, Serialize)]
pub struct PharmacistNotifyResult {
    pub success: bool,
    pub results: Vec<NotificationOutcome>,
}

/// Customer plus optional driver results for a delivery update.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryNotificationResult {
    pub success: bool,
    pub order_id: String,
    pub customer: NotificationOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<NotificationOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
    pub unread: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationPage {
    pub success: bool,
    pub notifications: Vec<NotificationRecord>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_round_trip() {
        for priority in [
            Priority::Low,
            Priority::Normal,
            Priority::High,
            Priority::Critical,
        ] {
            assert_eq!(Priority::parse(priority.as_str()), Some(priority));
        }
        assert_eq!(Priority::parse("urgent"), None);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_status_round_trip() {
        assert_eq!(NotificationStatus::parse("SENT"), Some(NotificationStatus::Sent));
        assert_eq!(NotificationStatus::parse("FAILED"), Some(NotificationStatus::Failed));
        assert_eq!(NotificationStatus::parse("sent"), None);
    }

    #[test]
    fn test_outcome_serialization() {
        let sent = NotificationOutcome::sent(vec![ChannelResult {
            channel: ChannelKind::Socket,
            success: true,
        }]);
        let value = serde_json::to_value(&sent).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["channels"][0]["channel"], "socket");
        assert!(value.get("error").is_none());

        let failed = NotificationOutcome::failed("User not found");
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "User not found");
        assert!(value.get("channels").is_none());
    }

    #[test]
    fn test_intent_defaults() {
        let intent: NotificationIntent = serde_json::from_str(
            r#"{"user_id":"u-1","tenant_id":"t-1","type":"ORDER_READY","title":"Order Ready","message":"Your order is ready"}"#,
        )
        .unwrap();

        assert_eq!(intent.channels, vec![ChannelKind::Socket]);
        assert_eq!(intent.priority, Priority::Normal);
        assert!(intent.pharmacy_id.is_none());
    }
}
