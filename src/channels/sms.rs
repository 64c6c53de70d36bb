use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::config::SmsConfig;

use super::{render_message, ChannelError, DeliveryReport, SmsSender};

const SEND_TIMEOUT_SECS: u64 = 10;

/// SMS sender backed by an HTTP gateway (Twilio-style messages endpoint).
pub struct HttpSmsSender {
    http_client: Client,
    config: SmsConfig,
}

impl HttpSmsSender {
    pub fn new(config: &SmsConfig) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            http_client,
            config: config.clone(),
        }
    }
}

#[async_trait]
impl SmsSender for HttpSmsSender {
    async fn send(
        &self,
        to: &str,
        template_key: &str,
        vars: &serde_json::Value,
    ) -> Result<DeliveryReport, ChannelError> {
        let api_url = self
            .config
            .api_url
            .as_ref()
            .ok_or_else(|| ChannelError::InvalidConfig("Missing api_url".into()))?;

        let from = self
            .config
            .from
            .as_ref()
            .ok_or_else(|| ChannelError::InvalidConfig("Missing from number".into()))?;

        let body = json!({
            "to": to,
            "from": from,
            "body": render_message(template_key, vars),
        });

        let mut request = self.http_client.post(api_url).json(&body);
        if let Some(ref api_key) = self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

        if response.status().is_success() {
            tracing::debug!(to = %to, template_key = %template_key, "SMS sent");
            Ok(DeliveryReport::delivered())
        } else {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            tracing::warn!(
                to = %to,
                template_key = %template_key,
                status = %status,
                "SMS gateway rejected message"
            );
            Ok(DeliveryReport::failed(format!("{}: {}", status, error)))
        }
    }
}
