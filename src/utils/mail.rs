//! Outbound mail delivery for OTP codes.
//!
//! Delivery failures are transport problems, never core-logic errors; they
//! surface as `Delivery` so clients know a retry is safe.

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::utils::error::AppError;

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError>;
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
}

/// Delivers through an HTTP mail API.
pub struct HttpMailSender {
    http: reqwest::Client,
    config: MailConfig,
}

impl HttpMailSender {
    pub fn new(config: MailConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl MailSender for HttpMailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        let payload = json!({
            "to": to,
            "subject": subject,
            "body": body,
        });

        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Delivery(format!("Failed to send email: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::Delivery(format!(
                "Mail API rejected the message ({status})"
            )));
        }

        Ok(())
    }
}

/// Development sender: logs the message instead of delivering (SKIP_EMAIL
/// mode), so the OTP is readable from the server output.
pub struct LogMailSender;

#[async_trait]
impl MailSender for LogMailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        info!(%to, %subject, %body, "SKIP_EMAIL enabled, not delivering");
        Ok(())
    }
}
