//! Outbound user notifications.
//!
//! Delivery is best-effort: the distribution pipeline never depends on the
//! notifier succeeding, and failures are logged by the caller rather than
//! retried.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// One outbound message, shaped like the platform's transactional emails.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub wallet_address: String,
    pub email: Option<String>,
    pub subject: String,
    pub header: String,
    pub message: String,
    pub image_url: Option<String>,
    pub link: String,
    pub action_label: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// POSTs each notification to the delivery webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.client
            .post(&self.endpoint)
            .json(notification)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Used when no delivery endpoint is configured.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}
