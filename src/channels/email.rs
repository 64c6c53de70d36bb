use async_trait::async_trait;
use lettre::{
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::EmailConfig;

use super::{render_message, ChannelError, DeliveryReport, EmailSender};

/// SMTP email sender.
pub struct SmtpEmailSender {
    config: EmailConfig,
}

impl SmtpEmailSender {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn build_mailer(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, ChannelError> {
        let host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| ChannelError::InvalidConfig("Missing smtp_host".into()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| ChannelError::InvalidConfig(e.to_string()))?
            .port(self.config.smtp_port);

        if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(
        &self,
        to: &str,
        template_key: &str,
        vars: &serde_json::Value,
    ) -> Result<DeliveryReport, ChannelError> {
        let from = self
            .config
            .from
            .as_ref()
            .ok_or_else(|| ChannelError::InvalidConfig("Missing from address".into()))?;

        let subject = vars
            .get("title")
            .and_then(|t| t.as_str())
            .unwrap_or(template_key);

        let mut body = render_message(template_key, vars);
        if let Some(name) = vars.get("userName").and_then(|n| n.as_str()) {
            body = format!("Hello {},\n\n{}", name, body);
        }

        let email = Message::builder()
            .from(
                from.parse()
                    .map_err(|e| ChannelError::InvalidConfig(format!("Invalid from: {}", e)))?,
            )
            .to(to
                .parse()
                .map_err(|e| ChannelError::InvalidConfig(format!("Invalid to: {}", e)))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

        let mailer = self.build_mailer()?;

        match mailer.send(email).await {
            Ok(_) => {
                tracing::debug!(to = %to, template_key = %template_key, "Email sent");
                Ok(DeliveryReport::delivered())
            }
            Err(e) => {
                tracing::warn!(to = %to, template_key = %template_key, error = %e, "Email send failed");
                Ok(DeliveryReport::failed(e.to_string()))
            }
        }
    }
}
