//! Email notification service.

use founder_common::{AppError, AppResult, config::EmailSettings};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType, transport::smtp::authentication::Credentials,
};
use serde::Serialize;

/// Email provider configuration.
#[derive(Debug, Clone)]
pub enum EmailProvider {
    /// SMTP via lettre.
    Smtp(SmtpConfig),
    /// SendGrid HTTP API.
    SendGrid(SendGridConfig),
}

/// SMTP configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// SMTP host.
    pub host: String,
    /// SMTP port.
    pub port: u16,
    /// Username.
    pub username: Option<String>,
    /// Password.
    pub password: Option<String>,
}

/// SendGrid configuration.
#[derive(Debug, Clone)]
pub struct SendGridConfig {
    /// SendGrid API key.
    pub api_key: String,
}

/// Email configuration.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Provider.
    pub provider: EmailProvider,
    /// From address.
    pub from_address: String,
    /// From display name.
    pub from_name: String,
}

impl EmailConfig {
    /// Build from application settings. Returns `None` when no provider is
    /// configured (email disabled).
    #[must_use]
    pub fn from_settings(settings: &EmailSettings) -> Option<Self> {
        let provider = match settings.provider.as_deref() {
            Some("smtp") => {
                let host = settings.smtp_host.clone()?;
                EmailProvider::Smtp(SmtpConfig {
                    host,
                    port: settings.smtp_port,
                    username: settings.smtp_username.clone(),
                    password: settings.smtp_password.clone(),
                })
            }
            Some("sendgrid") => {
                let api_key = settings.sendgrid_api_key.clone()?;
                EmailProvider::SendGrid(SendGridConfig { api_key })
            }
            _ => return None,
        };

        Some(Self {
            provider,
            from_address: settings.from_address.clone(),
            from_name: settings.from_name.clone(),
        })
    }
}

/// A plain email message.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    /// Recipient.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub text_body: String,
}

/// Email delivery result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailDeliveryResult {
    /// Whether the email was accepted by the provider.
    pub success: bool,
    /// Error message (if failed).
    pub error: Option<String>,
}

/// Email service.
#[derive(Clone)]
pub struct EmailService {
    config: Option<EmailConfig>,
    http_client: reqwest::Client,
}

impl EmailService {
    /// Create a new email service.
    #[must_use]
    pub fn new(config: Option<EmailConfig>) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    /// Check if the email service is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    /// Send an email.
    pub async fn send(&self, message: EmailMessage) -> AppResult<EmailDeliveryResult> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| AppError::BadRequest("Email service not configured".to_string()))?;

        match &config.provider {
            EmailProvider::Smtp(smtp) => self.send_smtp(smtp, config, message).await,
            EmailProvider::SendGrid(sg) => self.send_sendgrid(sg, config, message).await,
        }
    }

    /// Welcome email after registration.
    pub async fn send_welcome(&self, to: &str, username: &str) -> AppResult<EmailDeliveryResult> {
        self.send(EmailMessage {
            to: to.to_string(),
            subject: "Welcome to FounderSocials".to_string(),
            text_body: format!(
                "Hi {username},\n\nYour FounderSocials account is ready. \
                 Join a community and introduce yourself!\n"
            ),
        })
        .await
    }

    /// Password reset email with the reset token.
    pub async fn send_password_reset(
        &self,
        to: &str,
        username: &str,
        token: &str,
    ) -> AppResult<EmailDeliveryResult> {
        self.send(EmailMessage {
            to: to.to_string(),
            subject: "Reset your FounderSocials password".to_string(),
            text_body: format!(
                "Hi {username},\n\nUse the code below to reset your password. \
                 It expires in one hour.\n\n{token}\n\n\
                 If you did not request this, you can ignore this email.\n"
            ),
        })
        .await
    }

    /// Payment confirmation after a successful charge.
    pub async fn send_payment_succeeded(
        &self,
        to: &str,
        username: &str,
        plan: &str,
    ) -> AppResult<EmailDeliveryResult> {
        self.send(EmailMessage {
            to: to.to_string(),
            subject: "Payment received".to_string(),
            text_body: format!(
                "Hi {username},\n\nYour payment for the {plan} plan went through. \
                 Thanks for supporting FounderSocials!\n"
            ),
        })
        .await
    }

    /// Payment failure notice.
    pub async fn send_payment_failed(
        &self,
        to: &str,
        username: &str,
    ) -> AppResult<EmailDeliveryResult> {
        self.send(EmailMessage {
            to: to.to_string(),
            subject: "Payment failed".to_string(),
            text_body: format!(
                "Hi {username},\n\nYour latest subscription payment failed. \
                 Please update your payment method to keep your plan active.\n"
            ),
        })
        .await
    }

    /// Cancellation confirmation.
    pub async fn send_subscription_canceled(
        &self,
        to: &str,
        username: &str,
    ) -> AppResult<EmailDeliveryResult> {
        self.send(EmailMessage {
            to: to.to_string(),
            subject: "Subscription canceled".to_string(),
            text_body: format!(
                "Hi {username},\n\nYour subscription has been canceled. \
                 Your account drops back to the free plan at the end of the \
                 billing period.\n"
            ),
        })
        .await
    }

    // Provider-specific implementations

    async fn send_smtp(
        &self,
        smtp: &SmtpConfig,
        config: &EmailConfig,
        message: EmailMessage,
    ) -> AppResult<EmailDeliveryResult> {
        let from = format!("{} <{}>", config.from_name, config.from_address)
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid from address: {e}")))?;
        let to = message
            .to
            .parse()
            .map_err(|e| AppError::BadRequest(format!("Invalid recipient address: {e}")))?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(message.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(message.text_body)
            .map_err(|e| AppError::Internal(format!("Failed to build email: {e}")))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
            .map_err(|e| AppError::ExternalService(format!("SMTP relay error: {e}")))?
            .port(smtp.port);

        if let (Some(username), Some(password)) = (&smtp.username, &smtp.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let transport = builder.build();

        match transport.send(email).await {
            Ok(_) => Ok(EmailDeliveryResult {
                success: true,
                error: None,
            }),
            Err(e) => Ok(EmailDeliveryResult {
                success: false,
                error: Some(e.to_string()),
            }),
        }
    }

    async fn send_sendgrid(
        &self,
        sg: &SendGridConfig,
        config: &EmailConfig,
        message: EmailMessage,
    ) -> AppResult<EmailDeliveryResult> {
        let body = serde_json::json!({
            "personalizations": [{
                "to": [{"email": message.to}]
            }],
            "from": {
                "email": config.from_address,
                "name": config.from_name
            },
            "subject": message.subject,
            "content": [
                {"type": "text/plain", "value": message.text_body}
            ]
        });

        let response = self
            .http_client
            .post("https://api.sendgrid.com/v3/mail/send")
            .header("Authorization", format!("Bearer {}", sg.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("SendGrid request failed: {e}")))?;

        if response.status().is_success() {
            Ok(EmailDeliveryResult {
                success: true,
                error: None,
            })
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Ok(EmailDeliveryResult {
                success: false,
                error: Some(error_text),
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_without_config_fails() {
        let service = EmailService::new(None);

        let result = service
            .send(EmailMessage {
                to: "user@example.com".to_string(),
                subject: "Hello".to_string(),
                text_body: "Body".to_string(),
            })
            .await;

        assert!(result.is_err());
        assert!(!service.is_enabled());
    }

    #[test]
    fn test_config_from_settings_disabled() {
        let settings = EmailSettings::default();
        assert!(EmailConfig::from_settings(&settings).is_none());
    }

    #[test]
    fn test_config_from_settings_sendgrid() {
        let settings = EmailSettings {
            provider: Some("sendgrid".to_string()),
            sendgrid_api_key: Some("SG.key".to_string()),
            ..EmailSettings::default()
        };

        let config = EmailConfig::from_settings(&settings).unwrap();
        assert!(matches!(config.provider, EmailProvider::SendGrid(_)));
    }

    #[test]
    fn test_config_from_settings_smtp_requires_host() {
        let settings = EmailSettings {
            provider: Some("smtp".to_string()),
            smtp_host: None,
            ..EmailSettings::default()
        };

        assert!(EmailConfig::from_settings(&settings).is_none());
    }
}
