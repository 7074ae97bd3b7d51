use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::app::ports::NotifierPort;
use crate::domain::{Delivery, NotificationRequest};
use crate::error::{FeedbackError, Result};

/// Hands notification requests to an HTTP delivery gateway (email or SMS relay).
/// Any 2xx response counts as delivered.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedbackError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotifierPort for WebhookNotifier {
    async fn send(&self, request: &NotificationRequest) -> Result<Delivery> {
        let resp = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| FeedbackError::Unavailable {
                service: "notification gateway",
                message: e.to_string(),
            })?;
        let status = resp.status();
        debug!(
            "Gateway {} answered {} for {} via {}",
            self.url, status, request.template_id, request.channel
        );
        Ok(Delivery {
            delivered: status.is_success(),
        })
    }
}

/// Logs the request instead of sending it. Used when no gateway is configured.
pub struct LogNotifier;

#[async_trait]
impl NotifierPort for LogNotifier {
    async fn send(&self, request: &NotificationRequest) -> Result<Delivery> {
        tracing::info!(
            channel = %request.channel,
            template = %request.template_id,
            recipients = request.recipients.len(),
            "notification (log only)"
        );
        Ok(Delivery { delivered: true })
    }
}
